//! banhammer HTTP presentation layer
//!
//! This crate provides the HTTP query surface over the detection engine:
//! stats, users, violators, ban-list, and topology endpoints, plus health
//! and OpenAPI docs.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use middleware::{BearerOrQueryTokenAuth, BearerOrQueryTokenLayer, RequestId, RequestIdLayer};
pub use openapi::{ApiDoc, create_openapi_routes};
pub use routes::create_router;
pub use state::AppState;
