//! The HTTP query surface: stats, users, violators, banlist, nodes, shared IPs.

use application::services::{EngineStats, UserDetail, UserSummary, ViolatorSummary};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use domain::{BanRecord, Email, NodeName, SourceIp};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

/// `GET /api/stats` response: global counters, configured thresholds, connected nodes.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub engine: EngineStatsDto,
    pub connected_nodes: usize,
}

/// Serializable mirror of `application::services::EngineStats`.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct EngineStatsDto {
    pub total_users: usize,
    pub total_requests: u64,
    pub total_blocked: u64,
    pub violator_count: usize,
    pub banned_count: usize,
    pub concurrent_window_s: i64,
    pub trigger_period_s: i64,
    pub trigger_count: u32,
    pub banlist_threshold_s: i64,
    pub subnet_grouping: bool,
}

impl From<EngineStats> for EngineStatsDto {
    fn from(s: EngineStats) -> Self {
        Self {
            total_users: s.total_users,
            total_requests: s.total_requests,
            total_blocked: s.total_blocked,
            violator_count: s.violator_count,
            banned_count: s.banned_count,
            concurrent_window_s: s.concurrent_window_s,
            trigger_period_s: s.trigger_period_s,
            trigger_count: s.trigger_count,
            banlist_threshold_s: s.banlist_threshold_s,
            subnet_grouping: s.subnet_grouping,
        }
    }
}

#[utoipa::path(get, path = "/api/stats", tag = "banhammer", responses((status = 200, body = StatsResponse)))]
pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let engine = state
        .engine
        .stats()
        .await
        .ok_or_else(|| ApiError::Internal("engine actor is not responding".to_string()))?;

    Ok(Json(StatsResponse {
        engine: engine.into(),
        connected_nodes: state.registry.len(),
    }))
}

/// `GET /api/users` row, mirroring `application::services::UserSummary`.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct UserSummaryDto {
    #[schema(value_type = String)]
    pub email: Email,
    pub ip_count: usize,
    pub device_limit: Option<u32>,
    pub is_violator: bool,
    pub is_banned: bool,
    pub request_count: u64,
    pub blocked_count: u64,
    pub last_seen: chrono::DateTime<chrono::Utc>,
}

impl From<UserSummary> for UserSummaryDto {
    fn from(u: UserSummary) -> Self {
        Self {
            email: u.email,
            ip_count: u.ip_count,
            device_limit: u.device_limit,
            is_violator: u.is_violator,
            is_banned: u.is_banned,
            request_count: u.request_count,
            blocked_count: u.blocked_count,
            last_seen: u.last_seen,
        }
    }
}

#[utoipa::path(get, path = "/api/users", tag = "banhammer", responses((status = 200, body = [UserSummaryDto])))]
pub async fn users(State(state): State<AppState>) -> Json<Vec<UserSummaryDto>> {
    Json(state.engine.users().await.into_iter().map(Into::into).collect())
}

/// `GET /api/violators` row, mirroring `application::services::ViolatorSummary`.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct ViolatorSummaryDto {
    #[schema(value_type = String)]
    pub email: Email,
    pub ip_count: usize,
    pub elapsed_s: i64,
    pub remaining_to_ban_s: i64,
}

impl From<ViolatorSummary> for ViolatorSummaryDto {
    fn from(v: ViolatorSummary) -> Self {
        Self {
            email: v.email,
            ip_count: v.ip_count,
            elapsed_s: v.elapsed_s,
            remaining_to_ban_s: v.remaining_to_ban_s,
        }
    }
}

#[utoipa::path(get, path = "/api/violators", tag = "banhammer", responses((status = 200, body = [ViolatorSummaryDto])))]
pub async fn violators(State(state): State<AppState>) -> Json<Vec<ViolatorSummaryDto>> {
    Json(state.engine.violators().await.into_iter().map(Into::into).collect())
}

/// Query parameters for `GET /api/banlist`.
#[derive(Debug, Clone, Deserialize, utoipa::IntoParams)]
pub struct BanlistQuery {
    /// Lookback window in hours, default one day.
    #[serde(default = "default_banlist_hours")]
    pub hours: i64,
}

const fn default_banlist_hours() -> i64 {
    24
}

#[utoipa::path(
    get,
    path = "/api/banlist",
    tag = "banhammer",
    params(BanlistQuery),
    responses((status = 200, body = [crate::openapi::BanRecordSchema]))
)]
pub async fn banlist(
    State(state): State<AppState>,
    Query(query): Query<BanlistQuery>,
) -> Result<Json<Vec<BanRecord>>, ApiError> {
    let records = state.ban_sink.list(query.hours).await?;
    Ok(Json(records))
}

/// `POST /api/banlist/clear` response.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct ClearBanlistResponse {
    pub deleted: u64,
}

#[utoipa::path(
    post,
    path = "/api/banlist/clear",
    tag = "banhammer",
    responses((status = 200, body = ClearBanlistResponse))
)]
pub async fn clear_banlist(State(state): State<AppState>) -> Result<Json<ClearBanlistResponse>, ApiError> {
    let deleted = state.ban_sink.clear().await?;
    state.engine.notify_banlist_cleared().await;
    Ok(Json(ClearBanlistResponse { deleted }))
}

/// `GET /api/user/{email}` response, mirroring `application::services::UserDetail`.
/// Serializes the real domain value objects; the `*Schema` types above exist
/// only so utoipa can document the field shapes without `domain` depending
/// on it.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct UserDetailDto {
    #[schema(value_type = String)]
    pub email: Email,
    pub device_limit: Option<u32>,
    #[schema(value_type = Vec<crate::openapi::IpStatsEntrySchema>)]
    pub ip_stats: Vec<(SourceIp, domain::IpStats)>,
    #[schema(value_type = Vec<crate::openapi::RequestRecordSchema>)]
    pub recent_requests: Vec<domain::RequestRecord>,
    pub request_count: u64,
    pub blocked_count: u64,
    pub first_seen: chrono::DateTime<chrono::Utc>,
    pub last_seen: chrono::DateTime<chrono::Utc>,
    pub is_violator: bool,
    pub is_banned: bool,
}

impl From<UserDetail> for UserDetailDto {
    fn from(d: UserDetail) -> Self {
        Self {
            email: d.email,
            device_limit: d.device_limit,
            ip_stats: d.ip_stats,
            recent_requests: d.recent_requests,
            request_count: d.request_count,
            blocked_count: d.blocked_count,
            first_seen: d.first_seen,
            last_seen: d.last_seen,
            is_violator: d.is_violator,
            is_banned: d.is_banned,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/user/{email}",
    tag = "banhammer",
    params(("email" = String, Path)),
    responses((status = 200, body = UserDetailDto), (status = 404))
)]
pub async fn user_detail(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<UserDetailDto>, ApiError> {
    let email = Email::new(&email).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    state
        .engine
        .user_detail(&email)
        .await
        .map(|d| Json(d.into()))
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

#[utoipa::path(get, path = "/api/nodes", tag = "banhammer", responses((status = 200, body = [String])))]
pub async fn nodes(State(state): State<AppState>) -> Json<Vec<NodeName>> {
    Json(state.registry.snapshot())
}

#[utoipa::path(get, path = "/api/shared_ips", tag = "banhammer", responses((status = 200, body = [String])))]
pub async fn shared_ips(State(state): State<AppState>) -> Json<Vec<SourceIp>> {
    Json(state.engine.shared_ips().await.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_banlist_hours_is_one_day() {
        assert_eq!(default_banlist_hours(), 24);
    }

    #[test]
    fn engine_stats_dto_round_trips_fields() {
        let stats = EngineStats {
            total_users: 3,
            total_requests: 10,
            total_blocked: 2,
            violator_count: 1,
            banned_count: 0,
            concurrent_window_s: 2,
            trigger_period_s: 30,
            trigger_count: 5,
            banlist_threshold_s: 300,
            subnet_grouping: false,
        };
        let dto: EngineStatsDto = stats.into();
        assert_eq!(dto.total_users, 3);
        assert_eq!(dto.trigger_count, 5);
    }
}
