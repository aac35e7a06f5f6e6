//! Application layer for Keel.
//!
//! This layer contains:
//! - **Environment**: environment tags and the backend selection policy
//! - **Ports**: Interface definitions (traits) for requests and external dependencies
//! - **Mediator**: routes commands and queries to their handlers
//! - **Errors**: Application-specific error types
//!
//! The application layer coordinates the domain layer but contains no
//! business logic itself. All business rules live in `crate::domain`.

pub mod environment;
pub mod error;
pub mod mediator;
pub mod ports;

pub use environment::{BackendSelection, EngineKind, EnvironmentTag, LogBackend};

// Re-export port traits (for adapter implementation)
pub use ports::{
    Change, ChangeSet, Command, CommandHandler, DocumentKey, PersistenceEngine, Query,
    QueryHandler,
};

pub use mediator::Mediator;

pub use error::ApplicationError;
