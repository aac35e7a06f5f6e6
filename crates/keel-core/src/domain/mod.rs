// ============================================================================
//  CLEAN MODULE BOUNDARIES
// ============================================================================

//! Core domain layer for Keel.
//!
//! Building blocks that concrete bounded contexts are written against:
//! entities, aggregate roots, value objects, domain events, the repository
//! port and specifications. There is no concrete business model here.
//!
//! ## Rules
//!
//! - **No async**: Domain logic is synchronous
//! - **No I/O**: No filesystem, network, or external calls
//! - **Identity vs value**: entities compare by id, value objects by value
//! - **Aggregates own consistency**: only aggregate roots are persisted
//!
pub mod aggregate;
pub mod entity;
pub mod error;
pub mod event;
pub mod specification;
pub mod value_object;

pub use aggregate::{AggregateRoot, Repository};
pub use entity::{Entity, EntityId};
pub use error::{DomainError, ErrorCategory};
pub use event::{DomainEvent, EventEnvelope, PendingEvents};
pub use specification::{And, FnSpec, Not, Or, Specification, spec_fn};
pub use value_object::ValueObject;
