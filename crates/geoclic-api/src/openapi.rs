//! # OpenAPI Specification Assembly
//!
//! Assembles the utoipa-documented routes into a single OpenAPI document
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

/// Assembled OpenAPI spec for the entire API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "GeoClic Sync API",
        version = "0.1.0",
        description = "Offline-first synchronisation for GeoClic field clients: change upload, delta download, taxonomy versioning, offline packages and moderation.",
        license(name = "AGPL-3.0-or-later")
    ),
    paths(
        // Sync
        crate::routes::sync::run_sync,
        crate::routes::sync::offline_package,
        crate::routes::sync::project_offline_package,
        crate::routes::sync::sync_status,
        crate::routes::sync::incomplete_sessions,
        // Moderation
        crate::routes::moderation::moderate,
        // Operations
        crate::routes::ops::metrics,
    ),
    components(schemas(
        // Sync DTOs
        geoclic_sync::SyncRequest,
        geoclic_sync::SyncResponse,
        geoclic_sync::SyncOutcomes,
        geoclic_sync::CategoryOutcome,
        geoclic_sync::CreatedRecord,
        geoclic_sync::OfflinePackage,
        geoclic_sync::SyncStatus,
        geoclic_sync::ModerationRequest,
        geoclic_sync::Role,
        crate::routes::sync::SyncSessionView,
        // Domain types
        geoclic_core::NewObservation,
        geoclic_core::ObservationView,
        geoclic_core::ObservationPatch,
        geoclic_core::Attachment,
        geoclic_core::TechnicalAttributes,
        geoclic_core::GeometryKind,
        geoclic_core::LatLng,
        geoclic_core::ObservationStatus,
        geoclic_core::ModerationAction,
        geoclic_core::TaxonomyEntry,
        geoclic_core::DynamicFieldConfig,
        geoclic_core::FieldType,
        geoclic_core::VisibilityRule,
        geoclic_core::ConditionOperator,
        geoclic_core::Project,
        geoclic_core::BoundingBox,
        geoclic_core::PermissionGrant,
        // Operations
        crate::middleware::metrics::MetricsSnapshot,
        // Error types
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "sync", description = "Field client synchronisation"),
        (name = "moderation", description = "Observation review lifecycle"),
        (name = "operations", description = "Operator endpoints"),
    )
)]
pub struct ApiDoc;

/// Build the OpenAPI router.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

/// GET /openapi.json — Return the generated OpenAPI specification.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
