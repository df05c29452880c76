//! # Sync Audit Ledger
//!
//! One append-only record per sync session. The record is opened with its
//! own commit before the session transaction begins and closed inside it, so
//! a session that never commits leaves a record with no completion time.
//! Nothing retries or cleans up such records; operators list them with
//! [`incomplete`].

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::dto::{SyncOutcomes, SyncStatus};
use crate::error::StoreError;
use crate::principal::Principal;
use crate::reference::visible_projects;
use crate::store::{SyncSessionRecord, SyncStore, SyncTransaction};

/// Durably open a session record.
pub async fn open(
    store: &dyn SyncStore,
    device_id: &str,
    principal: &Principal,
) -> Result<SyncSessionRecord, StoreError> {
    let record = SyncSessionRecord::open(Uuid::new_v4(), device_id, principal.user_id, Utc::now());
    store.open_session(&record).await?;
    tracing::info!(
        sync_id = %record.id,
        device_id,
        user = %principal.user_id,
        "sync session opened"
    );
    Ok(record)
}

/// Stamp final counts and completion inside the session transaction.
pub async fn close(
    tx: &mut dyn SyncTransaction,
    sync_id: Uuid,
    outcomes: &SyncOutcomes,
    downloaded: u32,
) -> Result<DateTime<Utc>, StoreError> {
    let completed_at = Utc::now();
    tx.close_session(sync_id, outcomes, downloaded, completed_at)
        .await?;
    Ok(completed_at)
}

/// Sessions that never completed, newest first.
pub async fn incomplete(
    store: &dyn SyncStore,
    limit: usize,
) -> Result<Vec<SyncSessionRecord>, StoreError> {
    store.incomplete_sessions(limit).await
}

/// Sync health for `principal`, optionally for one device.
pub async fn status(
    store: &dyn SyncStore,
    principal: &Principal,
    device_id: Option<&str>,
) -> Result<SyncStatus, StoreError> {
    let last = store
        .last_completed_session(principal.user_id, device_id)
        .await?;
    let last_sync_at = last.as_ref().and_then(|s| s.completed_at);
    let pending_changes = store.count_changed_since(last_sync_at).await?;

    let entries = store.taxonomy_entries().await?;
    let taxonomy_version = geoclic_core::TaxonomyVersion::compute(&entries);
    let taxonomy_count = entries.iter().filter(|e| e.active).count();

    let grant = store.permissions_for(principal.user_id).await?;
    let project_count = visible_projects(store, principal, &grant).await?.len();

    Ok(SyncStatus {
        server_time: Utc::now(),
        last_sync_at,
        last_sync_id: last.map(|s| s.id),
        pending_changes,
        taxonomy_version: taxonomy_version.into(),
        taxonomy_count,
        project_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::principal::Role;

    #[tokio::test]
    async fn open_record_is_incomplete_until_commit() {
        let store = MemoryStore::new();
        let principal = Principal::new(Uuid::new_v4(), Role::Collector);
        let record = open(&store, "tab-01", &principal).await.unwrap();
        assert_eq!(incomplete(&store, 10).await.unwrap().len(), 1);

        let mut tx = store.begin().await.unwrap();
        close(tx.as_mut(), record.id, &SyncOutcomes::default(), 0)
            .await
            .unwrap();
        assert_eq!(incomplete(&store, 10).await.unwrap().len(), 1);
        tx.commit().await.unwrap();
        assert!(incomplete(&store, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn closing_unknown_session_fails() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let err = close(tx.as_mut(), Uuid::new_v4(), &SyncOutcomes::default(), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn status_without_history_counts_everything() {
        let store = MemoryStore::new();
        let principal = Principal::new(Uuid::new_v4(), Role::Collector);
        let s = status(&store, &principal, None).await.unwrap();
        assert!(s.last_sync_at.is_none());
        assert_eq!(s.pending_changes, 0);
        assert_eq!(s.taxonomy_version.len(), 16);
    }
}
