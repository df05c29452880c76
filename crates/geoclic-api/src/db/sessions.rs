//! Sync audit ledger persistence.

use chrono::{DateTime, Utc};
use geoclic_sync::{StoreError, SyncOutcomes, SyncSessionRecord};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::store_error;

const SESSION_COLUMNS: &str =
    "id, device_id, user_id, started_at, completed_at, outcomes, downloaded";

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    device_id: String,
    user_id: Uuid,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    outcomes: Json<SyncOutcomes>,
    downloaded: i32,
}

impl From<SessionRow> for SyncSessionRecord {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            device_id: row.device_id,
            user_id: row.user_id,
            started_at: row.started_at,
            completed_at: row.completed_at,
            outcomes: row.outcomes.0,
            downloaded: u32::try_from(row.downloaded).unwrap_or(0),
        }
    }
}

/// Record a session start. Runs on the pool so it survives a rolled-back
/// session transaction.
pub async fn open(pool: &PgPool, record: &SyncSessionRecord) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO sync_sessions (id, device_id, user_id, started_at, completed_at, outcomes, downloaded)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(record.id)
    .bind(&record.device_id)
    .bind(record.user_id)
    .bind(record.started_at)
    .bind(record.completed_at)
    .bind(Json(&record.outcomes))
    .bind(i32::try_from(record.downloaded).unwrap_or(i32::MAX))
    .execute(pool)
    .await
    .map_err(store_error)?;

    Ok(())
}

/// Stamp completion on an opened session inside the session transaction.
pub async fn close(
    conn: &mut PgConnection,
    id: Uuid,
    outcomes: &SyncOutcomes,
    downloaded: u32,
    completed_at: DateTime<Utc>,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        "UPDATE sync_sessions SET completed_at = $1, outcomes = $2, downloaded = $3 WHERE id = $4",
    )
    .bind(completed_at)
    .bind(Json(outcomes))
    .bind(i32::try_from(downloaded).unwrap_or(i32::MAX))
    .bind(id)
    .execute(conn)
    .await
    .map_err(store_error)?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(format!("sync session {id}")));
    }
    Ok(())
}

/// Latest completed session of a user, optionally for one device.
pub async fn last_completed(
    pool: &PgPool,
    user_id: Uuid,
    device_id: Option<&str>,
) -> Result<Option<SyncSessionRecord>, StoreError> {
    let sql = format!(
        "SELECT {SESSION_COLUMNS} FROM sync_sessions
         WHERE user_id = $1 AND completed_at IS NOT NULL
           AND ($2::text IS NULL OR device_id = $2)
         ORDER BY completed_at DESC
         LIMIT 1"
    );
    let row = sqlx::query_as::<_, SessionRow>(&sql)
        .bind(user_id)
        .bind(device_id)
        .fetch_optional(pool)
        .await
        .map_err(store_error)?;
    Ok(row.map(SyncSessionRecord::from))
}

/// Sessions that never completed, newest first.
pub async fn incomplete(pool: &PgPool, limit: usize) -> Result<Vec<SyncSessionRecord>, StoreError> {
    let sql = format!(
        "SELECT {SESSION_COLUMNS} FROM sync_sessions
         WHERE completed_at IS NULL
         ORDER BY started_at DESC
         LIMIT $1"
    );
    let rows = sqlx::query_as::<_, SessionRow>(&sql)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(pool)
        .await
        .map_err(store_error)?;
    Ok(rows.into_iter().map(SyncSessionRecord::from).collect())
}
