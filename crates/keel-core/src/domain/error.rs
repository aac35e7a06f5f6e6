// ============================================================================
// domain/error.rs - DOMAIN ERRORS
// ============================================================================

use thiserror::Error;

/// Root domain error type.
///
/// All errors are:
/// - Cloneable (they travel inside `KeelError`)
/// - Categorizable (for CLI display)
/// - Actionable (provides suggestions)
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    // ========================================================================
    // Validation Errors
    // ========================================================================
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Required field missing: {field}")]
    MissingRequiredField { field: &'static str },

    // ========================================================================
    // Invariant Violations
    // ========================================================================
    #[error("{aggregate} invariant violated: {reason}")]
    InvariantViolation {
        aggregate: &'static str,
        reason: String,
    },

    #[error("{entity} cannot move from '{from}' to '{to}'")]
    InvalidStateTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    // ========================================================================
    // Encoding
    // ========================================================================
    #[error("Event '{event_type}' could not be encoded: {reason}")]
    EventEncoding { event_type: String, reason: String },
}

impl DomainError {
    /// Shorthand for [`DomainError::InvalidValue`].
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }

    /// Get user-actionable suggestions for fixing this error.
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidValue { field, reason } => vec![
                format!("Fix the value of '{}'", field),
                format!("Details: {}", reason),
            ],
            Self::InvalidIdentifier(raw) => vec![
                format!("'{}' is not a valid identifier", raw),
                "Identifiers are UUIDs, e.g. 67e55044-10b1-426f-9247-bb680e5fe0c8".into(),
            ],
            Self::InvalidStateTransition { entity, from, .. } => vec![format!(
                "Check the current state of the {} ('{}') before changing it",
                entity, from
            )],
            _ => vec!["See documentation for more details".into()],
        }
    }

    /// Error category for CLI display styling.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::EventEncoding { .. } => ErrorCategory::Internal,
            _ => ErrorCategory::Validation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Internal,
}
