//! Node-name value object
//!
//! Identifies the VPN node an agent is tailing logs on: any non-empty
//! string without `|` or newlines, since both are used as line-protocol
//! separators by the TCP ingress.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// The name of a VPN node forwarding log lines.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeName(String);

impl NodeName {
    /// Create a `NodeName`, rejecting blank names and embedded separators.
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.is_empty() || value.contains('|') || value.contains('\n') {
            return Err(DomainError::InvalidNodeName(value));
        }
        Ok(Self(value))
    }

    /// Borrow the node name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
