// ABOUTME: Error types for the parley core engine.
// ABOUTME: Defines CoreError covering validation, lookup, external-service, and timeout failures.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("{0}")]
    Validation(String),

    #[error("{resource} not found with ID: {id}")]
    NotFound { resource: &'static str, id: String },

    #[error("Error in {service} service: {message}")]
    ExternalService { service: &'static str, message: String },

    #[error("operation timed out")]
    Timeout,

    #[error("storage error: {0}")]
    Store(anyhow::Error),

    #[error("task bridge is shutting down")]
    ShuttingDown,

    #[error("internal error: {0}")]
    Internal(String),
}

// anyhow::Error is not a std Error, so thiserror's #[from] cannot derive this.
impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        CoreError::Store(err)
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Wrap a downstream failure with the name of the service that produced it.
    pub fn external(service: &'static str, err: impl std::fmt::Display) -> Self {
        CoreError::ExternalService {
            service,
            message: err.to_string(),
        }
    }
}

/// Generate a unique correlation id for error tracking.
pub fn generate_error_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Format an error message suitable for end users.
///
/// Validation errors are safe to show as-is. Timeouts get a specific
/// message so users know to retry with a simpler query. Everything else
/// collapses to a generic apology carrying the correlation id.
pub fn format_error_for_user(error: &CoreError, error_id: &str) -> String {
    match error {
        CoreError::Validation(msg) => format!("❌ {msg}"),
        CoreError::Timeout => {
            "⏱️ The response timed out. Please try a shorter or simpler query.".to_string()
        }
        _ => format!("❌ Sorry, something went wrong (Error ID: {error_id}). Our team has been notified."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_wraps_service_name() {
        let err = CoreError::external("slack", "connection refused");
        assert_eq!(
            err.to_string(),
            "Error in slack service: connection refused"
        );
    }

    #[test]
    fn test_not_found_message() {
        let err = CoreError::NotFound {
            resource: "agent",
            id: "a-123".to_string(),
        };
        assert_eq!(err.to_string(), "agent not found with ID: a-123");
    }

    #[test]
    fn test_user_message_hides_internal_detail() {
        let err = CoreError::Internal("stack trace soup".to_string());
        let msg = format_error_for_user(&err, "abc-def");
        assert!(msg.contains("abc-def"));
        assert!(!msg.contains("stack trace"));
    }

    #[test]
    fn test_user_message_shows_validation_detail() {
        let err = CoreError::Validation("message is required".to_string());
        let msg = format_error_for_user(&err, "unused");
        assert!(msg.contains("message is required"));
        assert!(!msg.contains("unused"));
    }

    #[test]
    fn test_user_message_timeout_is_specific() {
        let msg = format_error_for_user(&CoreError::Timeout, "unused");
        assert!(msg.contains("timed out"));
    }

    #[test]
    fn test_error_ids_are_unique() {
        assert_ne!(generate_error_id(), generate_error_id());
    }
}
