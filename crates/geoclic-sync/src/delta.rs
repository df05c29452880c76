//! # Delta Downloader
//!
//! Records modified strictly after the client's cursor, newest first, capped.
//! Read inside the session transaction so that the session's own writes are
//! echoed back with their server-assigned ids.

use chrono::{DateTime, Utc};
use geoclic_core::ObservationView;

use crate::error::StoreError;
use crate::store::SyncTransaction;

/// Fetch the delta since `cursor`, or everything (capped) when `None`.
pub async fn download(
    tx: &mut dyn SyncTransaction,
    cursor: Option<DateTime<Utc>>,
    limit: usize,
) -> Result<Vec<ObservationView>, StoreError> {
    let rows = tx.changed_since(cursor, limit).await?;
    if rows.len() == limit {
        tracing::debug!(limit, ?cursor, "delta download reached its cap");
    }
    Ok(rows.iter().map(ObservationView::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::store::SyncStore;
    use geoclic_core::{NewObservation, RingClosure};
    use serde_json::json;
    use uuid::Uuid;

    fn seed(store: &MemoryStore, n: usize, base: DateTime<Utc>) {
        for i in 0..n {
            let sub: NewObservation = serde_json::from_value(json!({
                "name": format!("o{i}"),
                "kind": "k",
                "coordinates": [{"latitude": 48.85, "longitude": 2.35}]
            }))
            .unwrap();
            let mut obs = sub
                .into_observation(Uuid::new_v4(), Uuid::new_v4(), base, RingClosure::Auto)
                .unwrap();
            obs.updated_at = base + chrono::Duration::milliseconds(i as i64);
            store.put_observation(obs);
        }
    }

    #[tokio::test]
    async fn cap_keeps_newest() {
        let store = MemoryStore::new();
        let base = Utc::now();
        seed(&store, 5, base);
        let mut tx = store.begin().await.unwrap();
        let rows = download(tx.as_mut(), None, 3).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].name, "o4");
        assert!(rows.windows(2).all(|w| w[0].updated_at >= w[1].updated_at));
    }

    #[tokio::test]
    async fn coordinates_leave_in_wire_order() {
        let store = MemoryStore::new();
        seed(&store, 1, Utc::now());
        let mut tx = store.begin().await.unwrap();
        let rows = download(tx.as_mut(), None, 10).await.unwrap();
        assert_eq!(rows[0].coordinates[0].latitude, 48.85);
        assert_eq!(rows[0].coordinates[0].longitude, 2.35);
    }

    #[tokio::test]
    async fn cursor_equal_to_newest_returns_nothing() {
        let store = MemoryStore::new();
        let base = Utc::now();
        seed(&store, 2, base);
        let newest = base + chrono::Duration::milliseconds(1);
        let mut tx = store.begin().await.unwrap();
        assert!(download(tx.as_mut(), Some(newest), 10).await.unwrap().is_empty());
    }
}
