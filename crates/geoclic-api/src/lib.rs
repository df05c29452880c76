//! # geoclic-api — HTTP Service for GeoClic Field Sync
//!
//! Exposes the [`geoclic_sync::SyncEngine`] to field clients and operators.
//!
//! ## API Surface
//!
//! | Route                                      | Module                  |
//! |--------------------------------------------|-------------------------|
//! | `POST /v1/sync`                            | [`routes::sync`]        |
//! | `GET /v1/sync/offline-package`             | [`routes::sync`]        |
//! | `GET /v1/projects/:id/offline-package`     | [`routes::sync`]        |
//! | `GET /v1/sync/status`                      | [`routes::sync`]        |
//! | `GET /v1/sync/sessions/incomplete`         | [`routes::sync`]        |
//! | `POST /v1/observations/:id/:action`        | [`routes::moderation`]  |
//! | `GET /v1/metrics`                          | [`routes::ops`]         |
//! | `GET /openapi.json`                        | [`openapi`]             |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → AuthMiddleware (with failure throttle) → Handler
//! ```
//!
//! ## Storage
//!
//! With `DATABASE_URL` set the engine runs on [`db::PgStore`]
//! (PostgreSQL + PostGIS); otherwise on the in-memory store.

pub mod auth;
pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::Router;

use crate::auth::AuthConfig;
use crate::middleware::auth_throttle::AuthThrottle;
use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
///
/// Health probes (`/health/*`) are mounted outside the auth middleware
/// so they remain accessible without credentials.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };
    let throttle = AuthThrottle::new(state.config.auth_throttle);
    let metrics = state.metrics.clone();

    let api = Router::new()
        .merge(routes::sync::router())
        .merge(routes::moderation::router())
        .merge(routes::ops::router())
        .merge(openapi::router())
        .layer(from_fn(auth::auth_middleware))
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(middleware::tracing_layer::layer())
        .layer(axum::Extension(auth_config))
        .layer(axum::Extension(throttle))
        .layer(axum::Extension(metrics))
        .with_state(state.clone());

    let health = Router::new()
        .route("/health/liveness", axum::routing::get(liveness))
        .route("/health/readiness", axum::routing::get(readiness))
        .with_state(state);

    Router::new().merge(health).merge(api)
}

/// Liveness probe: 200 while the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe: 200 once the store answers.
async fn readiness(State(state): State<AppState>) -> (StatusCode, &'static str) {
    let Some(pool) = &state.db_pool else {
        return (StatusCode::OK, "ready");
    };
    match sqlx::query("SELECT 1").execute(pool).await {
        Ok(_) => (StatusCode::OK, "ready"),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "database unavailable")
        }
    }
}
