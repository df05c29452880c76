//! # Database Persistence Layer
//!
//! PostgreSQL + PostGIS implementation of the sync storage ports via SQLx.
//!
//! The database layer is optional. When `DATABASE_URL` is set, the engine
//! runs on [`PgStore`]; when absent, the API uses the in-memory store
//! (suitable for development and testing).
//!
//! ## Layout
//!
//! - [`observations`] — observation rows, geometry encoding, delta queries.
//! - [`sessions`] — the sync audit ledger.
//! - [`reference`] — taxonomy, dynamic fields, projects, permission grants.
//! - [`store`] — [`PgStore`] / `PgTransaction` adapting the above to the
//!   `SyncStore` / `SyncTransaction` traits.
//!
//! Coordinates are stored as `geometry(Geometry, 4326)` in `(lng, lat)`
//! order, written with `ST_GeomFromText` and read back with
//! `ST_AsGeoJSON`.

pub mod observations;
pub mod reference;
pub mod sessions;
pub mod store;

pub use store::PgStore;

use geoclic_sync::StoreError;
use sqlx::postgres::{PgPool, PgPoolOptions};

/// Initialize the database connection pool and run migrations.
///
/// Returns `None` if no URL is configured (in-memory-only mode).
/// Returns `Err` if the URL is set but the connection or migration fails.
pub async fn init_pool(
    database_url: Option<&str>,
    max_connections: u32,
) -> Result<Option<PgPool>, sqlx::Error> {
    let Some(url) = database_url else {
        tracing::warn!(
            "DATABASE_URL not set; running in-memory only mode. \
             State will not survive restarts."
        );
        return Ok(None);
    };

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(2.min(max_connections))
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(url)
        .await?;

    tracing::info!(max_connections, "Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(Some(pool))
}

/// Classify a driver error for the engine.
///
/// Integrity (`23xxx`) and data (`22xxx`) violations affect only the
/// statement that raised them; connection-level failures make the store
/// unavailable; everything else is a backend error.
pub(crate) fn store_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) => {
            let code = db.code();
            match code.as_deref() {
                Some(c) if c.starts_with("23") || c.starts_with("22") => {
                    StoreError::Constraint(db.message().to_string())
                }
                _ => StoreError::Backend(err.to_string()),
            }
        }
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
        _ => StoreError::Backend(err.to_string()),
    }
}

/// A stored value that cannot be turned back into a domain type.
pub(crate) fn malformed(what: &str, detail: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("malformed {what} row: {detail}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_errors_are_unavailable() {
        assert!(matches!(
            store_error(sqlx::Error::PoolTimedOut),
            StoreError::Unavailable(_)
        ));
        assert!(matches!(
            store_error(sqlx::Error::RowNotFound),
            StoreError::Backend(_)
        ));
    }

    #[tokio::test]
    async fn no_url_means_no_pool() {
        assert!(init_pool(None, 5).await.unwrap().is_none());
    }
}
