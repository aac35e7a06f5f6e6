//! Keel Core - Layered DDD Building Blocks
//!
//! This crate provides the domain and application layers of a Keel
//! application, following hexagonal (ports and adapters) architecture.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            keel-cli (binary)            │
//! │      (Process start, bootstrapping)     │
//! └──────────────────┬──────────────────────┘
//!                    │ builds
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │      keel-adapters (Infrastructure)     │
//! │  Settings, Engines, UnitOfWork, Logging │
//! │           Registry, Container           │
//! └──────────────────┬──────────────────────┘
//!                    │ implements
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │     Application Layer (this crate)      │
//! │    BackendSelection, Mediator, Ports    │
//! └──────────────────┬──────────────────────┘
//!                    │ uses
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │       Domain Layer (this crate)         │
//! │  Entity, AggregateRoot, ValueObject,    │
//! │  DomainEvent, Repository, Specification │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use keel_core::application::{BackendSelection, EngineKind, EnvironmentTag, LogBackend};
//!
//! let selection = BackendSelection::resolve(EnvironmentTag::Prod, Some(LogBackend::Console));
//! assert_eq!(selection.engine, EngineKind::Remote);
//! assert_eq!(selection.logger, LogBackend::Console);
//! ```

pub mod domain;

pub mod application;

pub mod error;

// Public API - what external crates should use
pub mod prelude {
    pub use crate::application::{
        ApplicationError, BackendSelection, ChangeSet, Command, CommandHandler, DocumentKey,
        EngineKind, EnvironmentTag, LogBackend, Mediator, PersistenceEngine, Query, QueryHandler,
    };
    pub use crate::domain::{
        AggregateRoot, DomainError, DomainEvent, Entity, EntityId, EventEnvelope, PendingEvents,
        Repository, Specification, ValueObject, spec_fn,
    };
    pub use crate::error::{KeelError, KeelResult};
}

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
