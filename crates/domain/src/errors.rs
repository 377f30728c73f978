//! Domain-level errors

use thiserror::Error;

/// Errors that can occur in the domain layer
#[derive(Debug, Error)]
pub enum DomainError {
    /// Log entry identity was empty after parsing
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    /// Source IP failed to parse as an IPv4 dotted quad
    #[error("Invalid source IP: {0}")]
    InvalidSourceIp(String),

    /// Node name was empty or contained the `|` separator
    #[error("Invalid node name: {0}")]
    InvalidNodeName(String),

    /// Entity not found
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },

    /// Validation failed
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

impl DomainError {
    /// Create a not found error
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }
}
