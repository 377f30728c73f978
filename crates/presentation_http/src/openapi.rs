//! OpenAPI documentation module
//!
//! Provides OpenAPI 3.0 documentation for the banhammer HTTP API.
//! Includes Swagger UI and ReDoc for interactive API exploration.

// Allow clippy warnings from macro-generated code in utoipa derive
#![allow(clippy::needless_for_each)]

use axum::{Router, response::Html, routing::get};
use serde::Serialize;
use utoipa::OpenApi;
use utoipa_redoc::{Redoc, Servable as RedocServable};
use utoipa_swagger_ui::SwaggerUi;

use crate::{handlers, state::AppState};

/// OpenAPI documentation for the banhammer API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "banhammer API",
        version = "0.1.0",
        description = "Per-account VPN device-limit abuse detector: ingests OpenVPN/WireGuard connection logs from multiple nodes, tracks concurrent source IPs per user, and bans accounts that exceed their device limit."
    ),
    servers(
        (url = "/", description = "Local server")
    ),
    tags(
        (name = "health", description = "Liveness and readiness endpoints"),
        (name = "banhammer", description = "Detection state, ban-list, and topology queries")
    ),
    paths(
        handlers::health::health_check,
        handlers::health::readiness_check,
        handlers::api::stats,
        handlers::api::users,
        handlers::api::violators,
        handlers::api::banlist,
        handlers::api::clear_banlist,
        handlers::api::user_detail,
        handlers::api::nodes,
        handlers::api::shared_ips,
    ),
    components(
        schemas(
            handlers::health::HealthResponse,
            handlers::health::ReadinessResponse,
            handlers::api::StatsResponse,
            handlers::api::EngineStatsDto,
            handlers::api::UserSummaryDto,
            handlers::api::ViolatorSummaryDto,
            handlers::api::ClearBanlistResponse,
            handlers::api::UserDetailDto,
            crate::error::ErrorResponse,
            // Domain schemas (inline re-definitions for OpenAPI; `domain`
            // itself carries no utoipa dependency)
            BanRecordSchema,
            IpStatsEntrySchema,
            RequestRecordSchema,
        )
    ),
    security(
        ("bearer_token" = [])
    ),
    modifiers(&SecurityAddon)
)]
#[derive(Debug)]
pub struct ApiDoc;

/// Security scheme modifier for OpenAPI
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

            components.add_security_scheme(
                "bearer_token",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some(
                            "Shared operator token, also accepted as a `?token=` query parameter",
                        ))
                        .build(),
                ),
            );
        }
    }
}

/// Doc-only mirror of `domain::BanRecord`: the domain crate carries no
/// `utoipa` dependency, so its OpenAPI schema is re-declared here rather
/// than deriving `ToSchema` on the domain type directly.
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[allow(dead_code)]
pub struct BanRecordSchema {
    pub id: i64,
    pub email: String,
    pub ip_count: u32,
    pub ips: Vec<String>,
    pub nodes: Vec<String>,
    pub violation_duration_s: i64,
    pub detected_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Doc-only mirror of one `(SourceIp, domain::IpStats)` pair; utoipa has no
/// tuple schema, so the pair is flattened into a named struct.
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[allow(dead_code)]
pub struct IpStatsEntrySchema {
    pub source_ip: String,
    pub last_seen: chrono::DateTime<chrono::Utc>,
    pub request_count: u32,
}

/// Doc-only mirror of `domain::RequestRecord`.
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[allow(dead_code)]
pub struct RequestRecordSchema {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub source_ip: String,
    pub protocol: String,
    pub destination: String,
    pub destination_port: u16,
    pub action: String,
    pub node_name: String,
}

/// Create OpenAPI documentation routes
///
/// Adds the following routes:
/// - `/api-docs/openapi.json` - OpenAPI specification (used by Swagger UI)
/// - `/swagger-ui/*` - Swagger UI interactive documentation
/// - `/redoc` - ReDoc documentation
pub fn create_openapi_routes() -> Router<AppState> {
    let redoc = Redoc::with_url("/api-docs/openapi.json", ApiDoc::openapi());

    Router::new()
        // ReDoc documentation
        .route("/redoc", get(|| async move { Html(redoc.to_html()) }))
        // Swagger UI with assets - SwaggerUi will serve /api-docs/openapi.json internally
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_spec_is_valid() {
        let doc = ApiDoc::openapi();
        let json = serde_json::to_string_pretty(&doc).expect("Failed to serialize OpenAPI spec");
        assert!(json.contains("banhammer API"));
        assert!(json.contains("/health"));
        assert!(json.contains("/api/stats"));
    }

    #[test]
    fn openapi_has_all_tags() {
        let doc = ApiDoc::openapi();
        let tags: Vec<&str> = doc
            .tags
            .as_ref()
            .map(|t| t.iter().map(|tag| tag.name.as_str()).collect())
            .unwrap_or_default();

        assert!(tags.contains(&"health"));
        assert!(tags.contains(&"banhammer"));
    }

    #[test]
    fn openapi_has_security_scheme() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("Missing components");
        assert!(components.security_schemes.contains_key("bearer_token"));
    }

    #[test]
    fn ban_record_schema_round_trips() {
        let record = BanRecordSchema {
            id: 1,
            email: "user@example.com".to_string(),
            ip_count: 3,
            ips: vec!["10.0.0.1".to_string()],
            nodes: vec!["node-a".to_string()],
            violation_duration_s: 120,
            detected_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("user@example.com"));
    }
}
