//! Application ports (traits) for external dependencies.
//!
//! In hexagonal architecture, ports define interfaces that the application
//! needs from the outside world. Adapters in `keel-adapters` implement these.
//!
//! ## Port Types
//!
//! - **Driving (Input) Ports**: Called by the outside world, implemented by
//!   application handlers
//!   - `CommandHandler` / `QueryHandler`: one handler per request type
//!
//! - **Driven (Output) Ports**: Called by application, implemented by infrastructure
//!   - `PersistenceEngine`: committed document storage
//!
//! - **Domain Ports**: `Repository` lives in `crate::domain` because its
//!   shape is dictated by aggregates, not by storage.

pub mod input;
pub mod output;

pub use input::{Command, CommandHandler, Query, QueryHandler};
pub use output::{Change, ChangeSet, DocumentKey, PersistenceEngine};
