//! Application-level errors

use domain::DomainError;
use thiserror::Error;

/// Errors that can occur in the application layer
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// Domain-level error
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// A dependent external service (directory, sink, notifier) failed
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Requested entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration was invalid or incomplete
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal invariant violated
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApplicationError {
    /// Whether retrying the operation that produced this error might help.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ExternalService(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_service_is_retryable() {
        assert!(ApplicationError::ExternalService("timeout".to_string()).is_retryable());
    }

    #[test]
    fn not_found_is_not_retryable() {
        assert!(!ApplicationError::NotFound("user".to_string()).is_retryable());
    }

    #[test]
    fn domain_error_converts_to_application_error() {
        let domain_err = DomainError::InvalidEmail("bad".to_string());
        let app_err: ApplicationError = domain_err.into();
        assert!(matches!(app_err, ApplicationError::Domain(_)));
    }

    #[test]
    fn error_messages_are_correct() {
        assert_eq!(
            ApplicationError::NotFound("user".to_string()).to_string(),
            "Not found: user"
        );
        assert_eq!(
            ApplicationError::Configuration("missing key".to_string()).to_string(),
            "Configuration error: missing key"
        );
    }
}
