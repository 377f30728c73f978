//! HTTP middleware components
//!
//! This module contains middleware for authentication and request correlation.

pub mod auth;
pub mod request_id;

pub use auth::{BearerOrQueryTokenAuth, BearerOrQueryTokenLayer};
pub use request_id::{RequestId, RequestIdLayer};
