//! Engine error types.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome of a validation pass: blocking errors plus non-blocking warnings.
///
/// Advancement (and any other validated operation) is refused while `errors`
/// is non-empty, regardless of warnings. Warnings are advisory messages the
/// presentation layer may surface to the operator.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a report holding a single blocking error.
    pub fn single(message: impl Into<String>) -> Self {
        let mut report = Self::new();
        report.error(message);
        report
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            write!(f, "ok")
        } else {
            write!(f, "{}", self.errors.join("; "))
        }
    }
}

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// Business-rule violation with structured errors and warnings
    #[error("validation failed: {0}")]
    Validation(ValidationReport),

    /// Invariant violation such as a second Active battle or tournament
    #[error("conflict: {0}")]
    Conflict(String),

    /// Referenced entity absent
    #[error("{0} not found")]
    NotFound(String),

    /// Attempted transition past the Completed phase
    #[error("tournament phase is terminal")]
    TerminalState,

    /// Malformed calculation input
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Registered performer count below the category threshold
    #[error("insufficient performers: need {needed}, have {registered}")]
    InsufficientPerformers { needed: usize, registered: usize },

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Shorthand for a validation failure with a single error message.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Validation(ValidationReport::single(message))
    }

    /// Shorthand for a missing entity, e.g. `EngineError::not_found("battle", id)`.
    pub fn not_found(entity: &str, id: impl fmt::Display) -> Self {
        Self::NotFound(format!("{entity} {id}"))
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_blocks_on_errors_only() {
        let mut report = ValidationReport::new();
        report.warn("only one elimination will occur");
        assert!(report.is_ok());

        report.error("category has no performers");
        assert!(!report.is_ok());
    }

    #[test]
    fn test_report_merge_keeps_both_sides() {
        let mut left = ValidationReport::single("a");
        let mut right = ValidationReport::new();
        right.error("b");
        right.warn("c");
        left.merge(right);

        assert_eq!(left.errors, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(left.warnings, vec!["c".to_string()]);
    }

    #[test]
    fn test_display_joins_errors() {
        let mut report = ValidationReport::single("first");
        report.error("second");
        assert_eq!(report.to_string(), "first; second");
        assert_eq!(ValidationReport::new().to_string(), "ok");
    }
}
