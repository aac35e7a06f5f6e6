//! Unified error handling for Keel Core.
//!
//! This module provides a unified error type that wraps domain and application
//! errors, plus the bootstrap failures raised while resolving configuration and
//! wiring backends.

use thiserror::Error;

use crate::application::ApplicationError;
use crate::domain::DomainError;

/// Root error type for Keel operations.
///
/// Configuration and wiring failures are meant to abort process startup;
/// application errors surface to the caller of a unit of work; telemetry
/// failures are contained by the logging adapters and only ever reported.
#[derive(Debug, Error, Clone)]
pub enum KeelError {
    /// Errors from the domain layer (invariant violations, invalid values).
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Errors from the application layer (persistence, wiring).
    #[error("Application error: {0}")]
    Application(#[from] ApplicationError),

    /// Missing or invalid environment configuration.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A remote backend was selected but its connection settings are incomplete.
    #[error("Connection configuration error for '{environment}': {reason}")]
    ConnectionConfiguration { environment: String, reason: String },

    /// The remote telemetry backend rejected or lacks credentials.
    #[error("Telemetry authentication failed: {reason}")]
    TelemetryAuth { reason: String },

    /// Unexpected internal errors (bugs).
    #[error("Internal error: {message}. This is a bug, please report it.")]
    Internal { message: String },
}

impl KeelError {
    /// Shorthand for a [`KeelError::Configuration`].
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Get user-actionable suggestions for fixing this error.
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Domain(e) => e.suggestions(),
            Self::Application(e) => e.suggestions(),
            Self::Configuration { message } => vec![
                format!("Configuration issue: {}", message),
                "APP_ENV must be one of: test, dev, staging, prod".into(),
                "LOG_BACKEND, if set, must be one of: simple, console, telemetry".into(),
            ],
            Self::ConnectionConfiguration { environment, .. } => {
                let prefix = environment.to_ascii_uppercase();
                vec![
                    format!("Set {prefix}_DATABASE_URL and {prefix}_DATABASE_KEY"),
                    "Or run with APP_ENV=dev to use the local file store".into(),
                ]
            }
            Self::TelemetryAuth { .. } => vec![
                "Set TELEMETRY_ENDPOINT and TELEMETRY_TOKEN".into(),
                "Or override the sink with LOG_BACKEND=console".into(),
            ],
            Self::Internal { .. } => vec![
                "This appears to be a bug in Keel".into(),
                "Please report it together with the log output".into(),
            ],
        }
    }

    /// Get error category for display/styling purposes.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Domain(e) => match e.category() {
                crate::domain::ErrorCategory::Validation => ErrorCategory::Validation,
                crate::domain::ErrorCategory::Internal => ErrorCategory::Internal,
            },
            Self::Application(e) => e.category(),
            Self::Configuration { .. }
            | Self::ConnectionConfiguration { .. }
            | Self::TelemetryAuth { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Application(ApplicationError::Persistence { .. })
                | Self::Application(ApplicationError::StoreLockError)
        )
    }
}

/// Error categories for UI display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    NotFound,
    Configuration,
    Internal,
}

/// Convenient result type alias.
pub type KeelResult<T> = Result<T, KeelError>;

/// Extension trait for adding context to errors.
pub trait Context<T> {
    /// Add context to an error.
    fn context(self, msg: impl Into<String>) -> KeelResult<T>;
}

impl<T, E> Context<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, msg: impl Into<String>) -> KeelResult<T> {
        self.map_err(|e| KeelError::Internal {
            message: format!("{}: {}", msg.into(), e),
        })
    }
}
