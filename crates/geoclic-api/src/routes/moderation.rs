//! # Moderation API
//!
//! `POST /v1/observations/:id/:action` moves an observation through its
//! review lifecycle. The body is optional; a rejection needs one carrying a
//! non-empty `comment`.

use axum::body::Bytes;
use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use geoclic_core::{ModerationAction, ObservationView};
use geoclic_sync::ModerationRequest;
use uuid::Uuid;

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::state::AppState;

/// Build the moderation router.
pub fn router() -> Router<AppState> {
    Router::new().route("/v1/observations/:id/:action", post(moderate))
}

fn decode_body(body: &Bytes) -> Result<ModerationRequest, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ModerationRequest::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(e.to_string()))
}

/// POST /v1/observations/:id/:action — Apply a moderation action.
#[utoipa::path(
    post,
    path = "/v1/observations/{id}/{action}",
    params(
        ("id" = Uuid, Path, description = "Observation ID"),
        ("action" = String, Path, description = "One of submit, validate, reject, publish"),
    ),
    request_body(content = ModerationRequest, description = "Optional; a comment is required for reject"),
    responses(
        (status = 200, description = "Observation after the transition", body = ObservationView),
        (status = 403, description = "Role or ownership insufficient", body = crate::error::ErrorBody),
        (status = 404, description = "Observation or action not found", body = crate::error::ErrorBody),
        (status = 409, description = "Transition not allowed from the current status", body = crate::error::ErrorBody),
        (status = 422, description = "Rejection without comment", body = crate::error::ErrorBody),
    ),
    tag = "moderation"
)]
async fn moderate(
    State(state): State<AppState>,
    caller: CallerIdentity,
    path: Result<Path<(Uuid, String)>, PathRejection>,
    body: Bytes,
) -> Result<Json<ObservationView>, AppError> {
    let Path((id, action)) = path.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let action: ModerationAction = action
        .parse()
        .map_err(|_| AppError::NotFound(format!("unknown moderation action '{action}'")))?;
    let req = decode_body(&body)?;

    let view = state
        .engine
        .moderate(&caller.principal(), id, action, req.comment)
        .await?;
    Ok(Json(view))
}
