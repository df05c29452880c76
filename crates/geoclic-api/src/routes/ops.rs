//! # Operator API

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use geoclic_sync::Role;

use crate::auth::{require_role, CallerIdentity};
use crate::error::AppError;
use crate::middleware::metrics::MetricsSnapshot;
use crate::state::AppState;

/// Build the operator router.
pub fn router() -> Router<AppState> {
    Router::new().route("/v1/metrics", get(metrics))
}

/// GET /v1/metrics — Request counters since process start.
#[utoipa::path(
    get,
    path = "/v1/metrics",
    responses(
        (status = 200, description = "Counter snapshot", body = MetricsSnapshot),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
    ),
    tag = "operations"
)]
async fn metrics(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<MetricsSnapshot>, AppError> {
    require_role(&caller, Role::Admin)?;
    Ok(Json(state.metrics.snapshot()))
}
