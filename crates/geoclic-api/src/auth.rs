//! # Authentication & Authorization Middleware
//!
//! Bearer token middleware producing a [`CallerIdentity`] for every
//! authenticated request.
//!
//! ## Token Format
//!
//! ```text
//! Bearer {role}:{user_id}:{secret}   — role is collector, moderator or admin
//! Bearer {secret}                    — legacy format (treated as admin)
//! ```
//!
//! `user_id` may be empty only for `admin`. Failed attempts are counted per
//! claimed user by the [`AuthThrottle`]; a blocked user gets 429 before the
//! token is even checked.

use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use geoclic_sync::{Principal, Role};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::{AppError, ErrorBody};
use crate::middleware::auth_throttle::AuthThrottle;

/// Throttle key for requests that carry no usable claim.
const ANONYMOUS: &str = "anonymous";
/// Throttle key for legacy bare-secret tokens.
const LEGACY: &str = "legacy";

// ── CallerIdentity ──────────────────────────────────────────────────────────

/// Identity of the authenticated caller, available to route handlers via
/// Axum's `FromRequestParts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerIdentity {
    pub role: Role,
    /// Nil for the system administrator.
    pub user_id: Uuid,
}

impl CallerIdentity {
    /// Identity injected when authentication is disabled.
    pub fn system() -> Self {
        Self::from(Principal::system())
    }

    pub fn has_role(&self, minimum: Role) -> bool {
        self.role >= minimum
    }

    /// The engine-side principal for this caller.
    pub fn principal(&self) -> Principal {
        Principal::new(self.user_id, self.role)
    }
}

impl From<Principal> for CallerIdentity {
    fn from(p: Principal) -> Self {
        Self {
            role: p.role,
            user_id: p.user_id,
        }
    }
}

#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .copied()
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

/// Check that the caller has at least the required role.
pub fn require_role(caller: &CallerIdentity, minimum: Role) -> Result<(), AppError> {
    if caller.has_role(minimum) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "role '{}' required, caller has '{}'",
            minimum.as_str(),
            caller.role.as_str()
        )))
    }
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Auth configuration injected into request extensions.
///
/// Custom `Debug` redacts the token value.
#[derive(Clone)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// ── Token Validation ────────────────────────────────────────────────────────

/// Constant-time comparison of bearer secrets.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// The user a token claims to be, used to key the failure throttle.
pub fn claimed_principal(provided: &str) -> &str {
    let mut parts = provided.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(user), Some(_)) if !user.is_empty() => user,
        (Some(role), Some(_), Some(_)) => role,
        _ => LEGACY,
    }
}

/// Parse a bearer token in format `{role}:{user_id}:{secret}` or `{secret}`.
pub fn parse_bearer_token(provided: &str, expected_secret: &str) -> Result<CallerIdentity, String> {
    let parts: Vec<&str> = provided.splitn(3, ':').collect();

    match parts.as_slice() {
        [secret] => {
            if constant_time_token_eq(secret, expected_secret) {
                Ok(CallerIdentity::system())
            } else {
                Err("invalid bearer token".into())
            }
        }
        [role, user, secret] => {
            if !constant_time_token_eq(secret, expected_secret) {
                return Err("invalid bearer token".into());
            }
            let role: Role = role.parse()?;
            let user_id = if user.is_empty() {
                if role != Role::Admin {
                    return Err(format!("role {role} requires a user id"));
                }
                Uuid::nil()
            } else {
                user.parse::<Uuid>()
                    .map_err(|e| format!("invalid user_id: {e}"))?
            };
            Ok(CallerIdentity { role, user_id })
        }
        _ => Err("invalid token format, expected {role}:{user_id}:{secret} or {secret}".into()),
    }
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Validate the Bearer token and inject the caller's identity.
///
/// When `AuthConfig.token` is `None`, every request runs as the system
/// administrator.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let expected = request
        .extensions()
        .get::<AuthConfig>()
        .and_then(|c| c.token.clone());
    let Some(expected) = expected else {
        request.extensions_mut().insert(CallerIdentity::system());
        return next.run(request).await;
    };
    let throttle = request.extensions().get::<AuthThrottle>().cloned();

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").ok_or("authorization header must use Bearer scheme"))
        .unwrap_or(Err("missing authorization header"))
        .map(str::to_string);

    let key = match &provided {
        Ok(token) => claimed_principal(token).to_string(),
        Err(_) => ANONYMOUS.to_string(),
    };

    if let Some(t) = &throttle {
        if t.is_blocked(&key) {
            tracing::warn!(principal = %key, "authentication throttled");
            return error_response(
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                "too many failed authentication attempts; retry later",
            );
        }
    }

    let outcome = provided
        .map_err(str::to_string)
        .and_then(|token| parse_bearer_token(&token, &expected));

    match outcome {
        Ok(identity) => {
            if let Some(t) = &throttle {
                t.clear(&key);
            }
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(msg) => {
            if let Some(t) = &throttle {
                t.record_failure(&key);
            }
            tracing::warn!(principal = %key, reason = %msg, "authentication failed");
            error_response(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", &msg)
        }
    }
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (status, Json(ErrorBody::new(code, message))).into_response()
}
