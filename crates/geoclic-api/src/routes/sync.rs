//! # Sync API
//!
//! Endpoints used by field clients: the sync exchange, offline packages
//! and sync health, plus the operator listing of unfinished sessions.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use geoclic_sync::{
    OfflinePackage, PackageRequest, Role, SyncOutcomes, SyncRequest, SyncResponse,
    SyncSessionRecord, SyncStatus,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{require_role, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_json, extract_query};
use crate::state::AppState;

/// Default number of unfinished sessions listed.
const DEFAULT_SESSION_LIMIT: usize = 100;
/// Upper bound on unfinished sessions listed.
const MAX_SESSION_LIMIT: usize = 1000;

/// Offline package query for a project addressed by path.
#[derive(Debug, Clone, Copy, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProjectPackageQuery {
    /// Embed the project's observations.
    #[serde(default)]
    pub include_points: bool,
    /// Keep only observations within this many km of the project centre.
    #[serde(default)]
    pub radius_km: Option<f64>,
}

/// Sync status query.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StatusQuery {
    /// Restrict to sessions from this device.
    #[serde(default)]
    pub device_id: Option<String>,
}

/// Unfinished-session listing query.
#[derive(Debug, Clone, Copy, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SessionListQuery {
    /// Max sessions to return (default 100, max 1000).
    #[serde(default)]
    pub limit: Option<usize>,
}

/// One sync audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SyncSessionView {
    pub id: Uuid,
    pub device_id: String,
    pub user_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub outcomes: SyncOutcomes,
    pub downloaded: u32,
}

impl From<SyncSessionRecord> for SyncSessionView {
    fn from(r: SyncSessionRecord) -> Self {
        Self {
            id: r.id,
            device_id: r.device_id,
            user_id: r.user_id,
            started_at: r.started_at,
            completed_at: r.completed_at,
            outcomes: r.outcomes,
            downloaded: r.downloaded,
        }
    }
}

/// Build the sync router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/sync", post(run_sync))
        .route("/v1/sync/offline-package", get(offline_package))
        .route("/v1/projects/:id/offline-package", get(project_offline_package))
        .route("/v1/sync/status", get(sync_status))
        .route("/v1/sync/sessions/incomplete", get(incomplete_sessions))
}

/// POST /v1/sync — Upload pending changes and download what changed.
#[utoipa::path(
    post,
    path = "/v1/sync",
    request_body = SyncRequest,
    responses(
        (status = 200, description = "Sync completed; per-item failures are listed in `errors`", body = SyncResponse),
        (status = 400, description = "Malformed request body", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid request", body = crate::error::ErrorBody),
        (status = 500, description = "Session failed and was not committed", body = crate::error::ErrorBody),
    ),
    tag = "sync"
)]
async fn run_sync(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<SyncRequest>, JsonRejection>,
) -> Result<Json<SyncResponse>, AppError> {
    let req = extract_json(body)?;
    let response = state.engine.sync(&caller.principal(), req).await?;
    Ok(Json(response))
}

/// GET /v1/sync/offline-package — Bootstrap snapshot for going offline.
#[utoipa::path(
    get,
    path = "/v1/sync/offline-package",
    params(PackageRequest),
    responses(
        (status = 200, description = "Offline package", body = OfflinePackage),
        (status = 403, description = "Project outside the caller's permissions", body = crate::error::ErrorBody),
        (status = 404, description = "Project not found", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid radius", body = crate::error::ErrorBody),
    ),
    tag = "sync"
)]
async fn offline_package(
    State(state): State<AppState>,
    caller: CallerIdentity,
    query: Result<Query<PackageRequest>, QueryRejection>,
) -> Result<Json<OfflinePackage>, AppError> {
    let req = extract_query(query)?;
    let package = state
        .engine
        .offline_package(&caller.principal(), req)
        .await?;
    Ok(Json(package))
}

/// GET /v1/projects/:id/offline-package — Offline package for one project.
#[utoipa::path(
    get,
    path = "/v1/projects/{id}/offline-package",
    params(("id" = Uuid, Path, description = "Project ID"), ProjectPackageQuery),
    responses(
        (status = 200, description = "Offline package", body = OfflinePackage),
        (status = 403, description = "Project outside the caller's permissions", body = crate::error::ErrorBody),
        (status = 404, description = "Project not found", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid radius", body = crate::error::ErrorBody),
    ),
    tag = "sync"
)]
async fn project_offline_package(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    query: Result<Query<ProjectPackageQuery>, QueryRejection>,
) -> Result<Json<OfflinePackage>, AppError> {
    let q = extract_query(query)?;
    let req = PackageRequest {
        project_id: Some(id),
        include_points: q.include_points,
        radius_km: q.radius_km,
    };
    let package = state
        .engine
        .offline_package(&caller.principal(), req)
        .await?;
    Ok(Json(package))
}

/// GET /v1/sync/status — Last completed sync and pending change count.
#[utoipa::path(
    get,
    path = "/v1/sync/status",
    params(StatusQuery),
    responses(
        (status = 200, description = "Sync status", body = SyncStatus),
    ),
    tag = "sync"
)]
async fn sync_status(
    State(state): State<AppState>,
    caller: CallerIdentity,
    query: Result<Query<StatusQuery>, QueryRejection>,
) -> Result<Json<SyncStatus>, AppError> {
    let q = extract_query(query)?;
    let device = q.device_id.as_deref().filter(|d| !d.trim().is_empty());
    let status = state.engine.status(&caller.principal(), device).await?;
    Ok(Json(status))
}

/// GET /v1/sync/sessions/incomplete — Sessions that never committed.
#[utoipa::path(
    get,
    path = "/v1/sync/sessions/incomplete",
    params(SessionListQuery),
    responses(
        (status = 200, description = "Unfinished sessions, newest first", body = Vec<SyncSessionView>),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
    ),
    tag = "sync"
)]
async fn incomplete_sessions(
    State(state): State<AppState>,
    caller: CallerIdentity,
    query: Result<Query<SessionListQuery>, QueryRejection>,
) -> Result<Json<Vec<SyncSessionView>>, AppError> {
    require_role(&caller, Role::Admin)?;
    let q = extract_query(query)?;
    let limit = q
        .limit
        .unwrap_or(DEFAULT_SESSION_LIMIT)
        .min(MAX_SESSION_LIMIT);
    let sessions = state.engine.incomplete_sessions(limit).await?;
    Ok(Json(sessions.into_iter().map(SyncSessionView::from).collect()))
}
