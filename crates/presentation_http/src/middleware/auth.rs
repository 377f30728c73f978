//! Shared bearer-token authentication.
//!
//! This surface has exactly one caller class (the operator), so
//! verification collapses to a single shared secret compared in constant
//! time. Accepted either as `Authorization: Bearer <token>` or a `?token=`
//! query parameter, the latter so the panel's own dashboard can link
//! directly into an endpoint without a header.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use axum::{
    extract::Request,
    http::header::AUTHORIZATION,
    response::{IntoResponse, Response},
};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;
use tower::{Layer, Service};

use crate::error::ApiError;

/// Layer enforcing the shared bearer token. `None` disables auth entirely.
#[derive(Clone, Default)]
pub struct BearerOrQueryTokenLayer {
    token: Option<SecretString>,
}

impl BearerOrQueryTokenLayer {
    /// Build a layer checking against `token`. `None` passes every request through.
    #[must_use]
    pub fn new(token: Option<SecretString>) -> Self {
        Self { token }
    }
}

impl<S> Layer<S> for BearerOrQueryTokenLayer {
    type Service = BearerOrQueryTokenAuth<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BearerOrQueryTokenAuth {
            inner,
            token: self.token.clone(),
        }
    }
}

/// Middleware service checking the bearer token on every request.
#[derive(Clone)]
pub struct BearerOrQueryTokenAuth<S> {
    inner: S,
    token: Option<SecretString>,
}

impl<S> Service<Request> for BearerOrQueryTokenAuth<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let mut inner = self.inner.clone();
        let Some(expected) = self.token.clone() else {
            return Box::pin(async move { inner.call(req).await });
        };

        if is_excluded(req.uri().path()) {
            return Box::pin(async move { inner.call(req).await });
        }

        Box::pin(async move {
            if token_matches(&req, expected.expose_secret()) {
                inner.call(req).await
            } else {
                Ok(ApiError::Unauthorized("missing or invalid token".to_string()).into_response())
            }
        })
    }
}

/// Liveness/readiness probes and API documentation stay open regardless of
/// the configured token.
fn is_excluded(path: &str) -> bool {
    matches!(path, "/health" | "/ready" | "/metrics")
        || path.starts_with("/redoc")
        || path.starts_with("/swagger-ui")
        || path.starts_with("/api-docs")
}

fn token_matches(req: &Request, expected: &str) -> bool {
    bearer_token(req)
        .or_else(|| query_token(req))
        .is_some_and(|presented| bool::from(presented.as_bytes().ct_eq(expected.as_bytes())))
}

fn bearer_token(req: &Request) -> Option<String> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string)
}

fn query_token(req: &Request) -> Option<String> {
    let query = req.uri().query()?;
    query.split('&').find_map(|pair| pair.strip_prefix("token=").map(str::to_string))
}
