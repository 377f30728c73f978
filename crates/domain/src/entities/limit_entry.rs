//! Per-user device limit, as served by the panel directory.

use serde::{Deserialize, Serialize};

use crate::value_objects::Email;

/// One row from the panel's user directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserLimitEntry {
    pub email: Email,
    pub device_limit: u32,
    pub telegram_id: Option<String>,
    pub username: Option<String>,
    pub description: Option<String>,
}

impl UserLimitEntry {
    #[must_use]
    pub fn new(email: Email, device_limit: u32) -> Self {
        Self {
            email,
            device_limit,
            telegram_id: None,
            username: None,
            description: None,
        }
    }
}
