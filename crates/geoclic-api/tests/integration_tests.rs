//! # Integration Tests for geoclic-api
//!
//! Drives the full router (auth, metrics and tracing layers included)
//! against the in-memory store: sync sessions, offline packages, sync
//! status, moderation, authentication and the OpenAPI document.

use std::collections::BTreeSet;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use geoclic_api::state::{AppConfig, AppState};
use geoclic_core::{PermissionGrant, Project};
use geoclic_sync::MemoryStore;

const SECRET: &str = "s3cret";

/// Helper: build the test app with auth disabled (every caller is admin).
fn test_app() -> axum::Router {
    geoclic_api::app(AppState::new())
}

/// Helper: build the test app with auth enabled over a shared store.
fn test_app_with_auth(store: &MemoryStore) -> axum::Router {
    let config = AppConfig {
        auth_token: Some(SECRET.to_string()),
        ..AppConfig::default()
    };
    geoclic_api::app(AppState::with_memory_store(config, store.clone()))
}

fn bearer(role: &str, user: Uuid) -> String {
    format!("Bearer {role}:{user}:{SECRET}")
}

async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    auth: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(a) = auth {
        builder = builder.header(header::AUTHORIZATION, a);
    }
    let body = match body {
        Some(v) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn point(name: &str) -> Value {
    json!({
        "name": name,
        "kind": "lighting",
        "coordinates": [{"latitude": 45.0, "longitude": 5.0}]
    })
}

/// Sync one created point and return its server ID.
async fn create_point(app: &axum::Router, auth: Option<&str>, name: &str) -> Uuid {
    let (status, body) = send(
        app,
        "POST",
        "/v1/sync",
        auth,
        Some(json!({"device_id": "tab-a", "creates": [point(name)]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["created"][0]["id"].as_str().unwrap().parse().unwrap()
}

fn project(id: Uuid) -> Project {
    Project {
        id,
        name: "Centre-ville".into(),
        description: None,
        collectivity_name: None,
        status: None,
        active: true,
        bbox: None,
    }
}

// -- Health Probes ------------------------------------------------------------

#[tokio::test]
async fn test_health_probes() {
    let app = test_app();
    for (uri, expected) in [("/health/liveness", "ok"), ("/health/readiness", "ready")] {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], expected.as_bytes());
    }
}

#[tokio::test]
async fn test_health_needs_no_credentials() {
    let app = test_app_with_auth(&MemoryStore::new());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/health/liveness")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// -- Sync ---------------------------------------------------------------------

#[tokio::test]
async fn test_sync_round_trip_between_devices() {
    let app = test_app();
    let (status, body) = send(
        &app,
        "POST",
        "/v1/sync",
        None,
        Some(json!({"device_id": "tab-a", "creates": [point("Lamp 1"), point("Lamp 2")]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["uploaded"], 2);
    assert_eq!(body["created"].as_array().unwrap().len(), 2);
    assert_eq!(body["outcomes"]["creates"]["applied"], 2);

    let (status, body) = send(
        &app,
        "POST",
        "/v1/sync",
        None,
        Some(json!({"device_id": "tab-b"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let names: BTreeSet<&str> = body["downloaded"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, BTreeSet::from(["Lamp 1", "Lamp 2"]));
}

#[tokio::test]
async fn test_sync_reports_item_errors_without_failing() {
    let app = test_app();
    let (status, body) = send(
        &app,
        "POST",
        "/v1/sync",
        None,
        Some(json!({
            "device_id": "tab-a",
            "creates": [point("good"), {"name": "no-coords", "kind": "lighting", "coordinates": []}]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["uploaded"], 1);
    let errors = body["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].as_str().unwrap().contains("no-coords"));
}

#[tokio::test]
async fn test_sync_malformed_body_is_400() {
    let app = test_app();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/sync")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_sync_blank_device_is_422() {
    let app = test_app();
    let (status, body) = send(&app, "POST", "/v1/sync", None, Some(json!({"device_id": "  "}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

// -- Offline Package ----------------------------------------------------------

#[tokio::test]
async fn test_offline_package_unknown_project_is_404() {
    let app = test_app();
    let uri = format!("/v1/projects/{}/offline-package", Uuid::new_v4());
    let (status, body) = send(&app, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_offline_package_outside_grant_is_403() {
    let store = MemoryStore::new();
    let allowed = Uuid::new_v4();
    let denied = Uuid::new_v4();
    store.put_project(project(allowed));
    store.put_project(project(denied));
    let user = Uuid::new_v4();
    store.set_permissions(
        user,
        PermissionGrant {
            projects: Some(BTreeSet::from([allowed])),
            categories: None,
        },
    );
    let app = test_app_with_auth(&store);
    let auth = bearer("collector", user);

    let uri = format!("/v1/sync/offline-package?project_id={denied}");
    let (status, _) = send(&app, "GET", &uri, Some(&auth), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let uri = format!("/v1/sync/offline-package?project_id={allowed}&include_points=true");
    let (status, body) = send(&app, "GET", &uri, Some(&auth), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["project"]["id"], allowed.to_string());
    assert_eq!(body["total_points"], 0);
}

#[tokio::test]
async fn test_sync_naming_project_outside_grant_is_403() {
    let store = MemoryStore::new();
    let allowed = Uuid::new_v4();
    let denied = Uuid::new_v4();
    let user = Uuid::new_v4();
    store.set_permissions(
        user,
        PermissionGrant {
            projects: Some(BTreeSet::from([allowed])),
            categories: None,
        },
    );
    let app = test_app_with_auth(&store);
    let auth = bearer("collector", user);

    let (status, body) = send(
        &app,
        "POST",
        "/v1/sync",
        Some(&auth),
        Some(json!({"device_id": "tab-a", "project_id": denied, "include_taxonomy": true})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
    assert!(store.sessions().is_empty());
}

#[tokio::test]
async fn test_offline_package_invalid_radius_is_422() {
    let app = test_app();
    let uri = format!("/v1/projects/{}/offline-package?radius_km=-2", Uuid::new_v4());
    let (status, _) = send(&app, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_offline_package_bad_query_is_400() {
    let app = test_app();
    let (status, _) = send(&app, "GET", "/v1/sync/offline-package?project_id=nope", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// -- Status -------------------------------------------------------------------

#[tokio::test]
async fn test_status_reports_last_completed_session() {
    let app = test_app();
    let (status, body) = send(&app, "GET", "/v1/sync/status", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["last_sync_id"].is_null());

    let (_, sync) = send(
        &app,
        "POST",
        "/v1/sync",
        None,
        Some(json!({"device_id": "tab-a", "creates": [point("Lamp")]})),
    )
    .await;

    let (status, body) = send(&app, "GET", "/v1/sync/status?device_id=tab-a", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["last_sync_id"], sync["sync_id"]);

    let (_, body) = send(&app, "GET", "/v1/sync/status?device_id=tab-z", None, None).await;
    assert!(body["last_sync_id"].is_null());
}

#[tokio::test]
async fn test_incomplete_sessions_admin_only() {
    let store = MemoryStore::new();
    let app = test_app_with_auth(&store);

    let collector = bearer("collector", Uuid::new_v4());
    let (status, _) = send(&app, "GET", "/v1/sync/sessions/incomplete", Some(&collector), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = bearer("admin", Uuid::new_v4());
    let (status, body) = send(&app, "GET", "/v1/sync/sessions/incomplete", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());
}

// -- Moderation ---------------------------------------------------------------

#[tokio::test]
async fn test_moderation_lifecycle() {
    let store = MemoryStore::new();
    let app = test_app_with_auth(&store);
    let owner = bearer("collector", Uuid::new_v4());
    let moderator = bearer("moderator", Uuid::new_v4());
    let id = create_point(&app, Some(&owner), "Bench").await;

    let (status, body) = send(&app, "POST", &format!("/v1/observations/{id}/submit"), Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");

    let (status, _) = send(&app, "POST", &format!("/v1/observations/{id}/validate"), Some(&owner), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, "POST", &format!("/v1/observations/{id}/reject"), Some(&moderator), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/v1/observations/{id}/reject"),
        Some(&moderator),
        Some(json!({"comment": "photo missing"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "rejected");
    assert_eq!(body["rejection_comment"], "photo missing");

    let (status, body) = send(&app, "POST", &format!("/v1/observations/{id}/publish"), Some(&moderator), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn test_moderation_unknown_targets_are_404() {
    let app = test_app();
    let id = create_point(&app, None, "Sign").await;

    let (status, _) = send(&app, "POST", &format!("/v1/observations/{id}/approve"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let missing = Uuid::new_v4();
    let (status, _) = send(&app, "POST", &format!("/v1/observations/{missing}/submit"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// -- Authentication -----------------------------------------------------------

#[tokio::test]
async fn test_missing_token_is_401() {
    let app = test_app_with_auth(&MemoryStore::new());
    let (status, body) = send(&app, "GET", "/v1/sync/status", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_repeated_bad_tokens_are_rate_limited() {
    let app = test_app_with_auth(&MemoryStore::new());
    let user = Uuid::new_v4();
    let bad = format!("Bearer collector:{user}:wrong");
    for _ in 0..5 {
        let (status, _) = send(&app, "GET", "/v1/sync/status", Some(&bad), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, body) = send(&app, "GET", "/v1/sync/status", Some(&bad), None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "RATE_LIMITED");

    let other = bearer("collector", Uuid::new_v4());
    let (status, _) = send(&app, "GET", "/v1/sync/status", Some(&other), None).await;
    assert_eq!(status, StatusCode::OK);
}

// -- Operations ---------------------------------------------------------------

#[tokio::test]
async fn test_metrics_admin_only_and_counting() {
    let app = test_app_with_auth(&MemoryStore::new());
    let (status, _) = send(&app, "GET", "/v1/sync/status", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let collector = bearer("collector", Uuid::new_v4());
    let (status, _) = send(&app, "GET", "/v1/metrics", Some(&collector), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = bearer("admin", Uuid::new_v4());
    let (status, body) = send(&app, "GET", "/v1/metrics", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["requests"].as_u64().unwrap() >= 2);
    assert!(body["auth_rejections"].as_u64().unwrap() >= 1);
    assert!(body["client_errors"].as_u64().unwrap() >= 2);
}

#[tokio::test]
async fn test_openapi_document_lists_routes() {
    let app = test_app();
    let (status, body) = send(&app, "GET", "/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let paths = body["paths"].as_object().unwrap();
    for path in [
        "/v1/sync",
        "/v1/sync/offline-package",
        "/v1/projects/{id}/offline-package",
        "/v1/sync/status",
        "/v1/observations/{id}/{action}",
    ] {
        assert!(paths.contains_key(path), "missing {path}");
    }
}
