//! # geoclic-api — Binary Entry Point
//!
//! Starts the Axum HTTP server for GeoClic field sync.
//! Every setting can be given as a flag or through the environment.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use geoclic_core::RingClosure;
use geoclic_sync::{MemoryStore, SyncConfig};
use tracing_subscriber::EnvFilter;

use geoclic_api::db::{self, PgStore};
use geoclic_api::middleware::auth_throttle::AuthThrottleConfig;
use geoclic_api::state::{AppConfig, AppState};

/// GeoClic sync server.
#[derive(Parser, Debug)]
#[command(name = "geoclic-api", version, about, long_about = None)]
struct Cli {
    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Shared bearer secret. Unset disables authentication.
    #[arg(long, env = "AUTH_TOKEN", hide_env_values = true)]
    auth_token: Option<String>,

    /// PostgreSQL URL. Unset runs on the in-memory store.
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 20)]
    db_max_connections: u32,

    /// Maximum records returned by one delta download.
    #[arg(long, env = "SYNC_DOWNLOAD_LIMIT", default_value_t = geoclic_sync::config::DEFAULT_DOWNLOAD_LIMIT)]
    sync_download_limit: usize,

    /// Maximum items accepted per category in one sync request.
    #[arg(long, env = "SYNC_MAX_BATCH", default_value_t = geoclic_sync::config::DEFAULT_MAX_BATCH)]
    sync_max_batch: usize,

    /// Maximum observations embedded in one offline package.
    #[arg(long, env = "PACKAGE_POINT_LIMIT", default_value_t = geoclic_sync::config::DEFAULT_PACKAGE_POINT_LIMIT)]
    package_point_limit: usize,

    /// Close unclosed polygon rings instead of rejecting them.
    #[arg(long, env = "POLYGON_AUTO_CLOSE", default_value_t = true, action = clap::ArgAction::Set)]
    polygon_auto_close: bool,

    /// Failed authentications tolerated per window before 429.
    #[arg(long, env = "AUTH_MAX_FAILURES", default_value_t = 5)]
    auth_max_failures: usize,

    #[arg(long, env = "AUTH_FAILURE_WINDOW_SECS", default_value_t = 60)]
    auth_failure_window_secs: u64,

    /// Emit logs as JSON lines.
    #[arg(long, env = "LOG_JSON", default_value_t = false, action = clap::ArgAction::Set)]
    log_json: bool,
}

impl Cli {
    fn app_config(&self) -> AppConfig {
        AppConfig {
            port: self.port,
            auth_token: self.auth_token.clone().filter(|t| !t.is_empty()),
            sync: SyncConfig {
                download_limit: self.sync_download_limit,
                max_batch: self.sync_max_batch,
                package_point_limit: self.package_point_limit,
                ring_closure: if self.polygon_auto_close {
                    RingClosure::Auto
                } else {
                    RingClosure::Strict
                },
            },
            auth_throttle: AuthThrottleConfig {
                max_failures: self.auth_max_failures,
                window: Duration::from_secs(self.auth_failure_window_secs),
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = cli.app_config();
    if config.auth_token.is_none() {
        tracing::warn!("AUTH_TOKEN not set: authentication disabled, every caller is admin");
    }

    // No DATABASE_URL means the in-memory store.
    let db_pool = db::init_pool(cli.database_url.as_deref(), cli.db_max_connections)
        .await
        .map_err(|e| {
            tracing::error!("Database initialization failed: {e}");
            e
        })?;

    let state = match db_pool {
        Some(pool) => {
            let store = Arc::new(PgStore::new(pool.clone()));
            AppState::with_store(config, store, Some(pool))
        }
        None => AppState::with_memory_store(config, MemoryStore::new()),
    };
    tracing::debug!(config = ?state.config, "configuration loaded");

    let app = geoclic_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], cli.port));
    tracing::info!("GeoClic sync API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
