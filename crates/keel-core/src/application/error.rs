//! Application layer errors.
//!
//! These errors represent failures in orchestration and persistence, not
//! business logic. Business logic errors are `DomainError` from `crate::domain`.

use thiserror::Error;

use crate::error::ErrorCategory;

/// Errors that occur during application orchestration.
#[derive(Debug, Error, Clone)]
pub enum ApplicationError {
    /// The persistence backend rejected or failed a read or commit.
    #[error("Persistence error: {reason}")]
    Persistence { reason: String },

    /// A unit of work was begun while another one is open on the same flow.
    #[error("A unit of work is already open on this thread for this engine")]
    Reentrancy,

    /// Container resolution miss.
    #[error("No provider registered for '{type_name}'")]
    UnregisteredDependency { type_name: &'static str },

    /// A provider (indirectly) resolved its own type.
    #[error("Cyclic dependency while resolving '{type_name}': {chain}")]
    CyclicDependency {
        type_name: &'static str,
        chain: String,
    },

    /// No handler is routed for a command or query type.
    #[error("No handler registered for {kind} '{request}'")]
    UnhandledRequest {
        kind: &'static str,
        request: &'static str,
    },

    /// A requested document or aggregate does not exist.
    #[error("{collection}/{id} not found")]
    NotFound { collection: String, id: String },

    /// A stored document could not be (de)serialized.
    #[error("Document {collection}/{id} is malformed: {reason}")]
    MalformedDocument {
        collection: String,
        id: String,
        reason: String,
    },

    /// Shared state access failed (lock poisoned).
    #[error("Engine state lock poisoned")]
    StoreLockError,
}

impl ApplicationError {
    /// Shorthand for [`ApplicationError::Persistence`].
    pub fn persistence(reason: impl Into<String>) -> Self {
        Self::Persistence {
            reason: reason.into(),
        }
    }

    /// Get user-actionable suggestions.
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Persistence { reason } => vec![
                format!("The backend refused the operation: {}", reason),
                "Staged changes were discarded; retry the whole unit of work".into(),
            ],
            Self::Reentrancy => vec![
                "Commit or roll back the open unit of work before starting another".into(),
                "Pass the open unit of work down instead of beginning a nested one".into(),
            ],
            Self::UnregisteredDependency { type_name } => vec![
                format!("Register a provider for {} on the container", type_name),
                "This is a wiring bug; check the container builder".into(),
            ],
            Self::CyclicDependency { .. } => vec![
                "Two or more providers resolve each other".into(),
                "Break the cycle by resolving one side lazily or by merging the services".into(),
            ],
            Self::UnhandledRequest { request, .. } => vec![format!(
                "Register a handler for {} when building the container",
                request
            )],
            Self::NotFound { collection, .. } => {
                vec![format!("Check the id, or list the '{}' collection", collection)]
            }
            Self::StoreLockError => vec![
                "A writer panicked while holding the engine lock".into(),
                "Restart the process".into(),
            ],
            _ => vec!["Check the error details above".into()],
        }
    }

    /// Get error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Persistence { .. } => ErrorCategory::Internal,
            Self::Reentrancy => ErrorCategory::Internal,
            Self::UnregisteredDependency { .. } => ErrorCategory::Configuration,
            Self::CyclicDependency { .. } => ErrorCategory::Configuration,
            Self::UnhandledRequest { .. } => ErrorCategory::Configuration,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::MalformedDocument { .. } => ErrorCategory::Validation,
            Self::StoreLockError => ErrorCategory::Internal,
        }
    }
}
