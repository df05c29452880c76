//! # Application State
//!
//! [`AppState`] is cloned into every handler. It owns the sync engine (and
//! through it the store), the runtime configuration, the request counters
//! and, when running against PostgreSQL, the pool used by the readiness
//! probe.

use std::sync::Arc;

use geoclic_sync::{MemoryStore, SyncConfig, SyncEngine, SyncStore};
use sqlx::PgPool;

use crate::middleware::auth_throttle::AuthThrottleConfig;
use crate::middleware::metrics::ApiMetrics;

/// Runtime configuration of the HTTP service.
#[derive(Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Shared bearer secret; `None` disables authentication.
    pub auth_token: Option<String>,
    pub sync: SyncConfig,
    pub auth_throttle: AuthThrottleConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            sync: SyncConfig::default(),
            auth_throttle: AuthThrottleConfig::default(),
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("sync", &self.sync)
            .field("auth_throttle", &self.auth_throttle)
            .finish()
    }
}

/// Shared state handed to every route handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub engine: SyncEngine,
    pub config: AppConfig,
    pub metrics: ApiMetrics,
    /// Present when the store is PostgreSQL-backed.
    pub db_pool: Option<PgPool>,
}

impl AppState {
    /// In-memory state with default configuration and auth disabled.
    pub fn new() -> Self {
        Self::with_memory_store(AppConfig::default(), MemoryStore::new())
    }

    /// State backed by the given in-memory store.
    pub fn with_memory_store(config: AppConfig, store: MemoryStore) -> Self {
        Self::with_store(config, Arc::new(store), None)
    }

    /// State backed by an arbitrary store.
    pub fn with_store(config: AppConfig, store: Arc<dyn SyncStore>, db_pool: Option<PgPool>) -> Self {
        Self {
            engine: SyncEngine::new(store, config.sync),
            config,
            metrics: ApiMetrics::new(),
            db_pool,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
