//! Mixed batches of good and bad items always account for every item.

use std::sync::Arc;

use chrono::Utc;
use geoclic_core::{NewObservation, RingClosure};
use geoclic_sync::{MemoryStore, Principal, Role, SyncConfig, SyncEngine, SyncRequest};
use proptest::prelude::*;
use serde_json::{json, Value};
use uuid::Uuid;

const SEEDED: usize = 3;

#[derive(Debug, Clone, Copy)]
enum Create {
    Valid,
    DegeneratePolygon,
    StorageFault,
    Undecodable,
}

#[derive(Debug, Clone, Copy)]
enum Update {
    Existing(usize),
    Missing,
    StatusField,
    BadId,
}

#[derive(Debug, Clone, Copy)]
enum Delete {
    Seeded(usize),
    Missing,
    Garbage,
}

fn create_item() -> impl Strategy<Value = Create> {
    prop_oneof![
        Just(Create::Valid),
        Just(Create::DegeneratePolygon),
        Just(Create::StorageFault),
        Just(Create::Undecodable),
    ]
}

fn update_item() -> impl Strategy<Value = Update> {
    prop_oneof![
        (0..SEEDED).prop_map(Update::Existing),
        Just(Update::Missing),
        Just(Update::StatusField),
        Just(Update::BadId),
    ]
}

fn delete_item() -> impl Strategy<Value = Delete> {
    prop_oneof![
        (0..SEEDED).prop_map(Delete::Seeded),
        Just(Delete::Missing),
        Just(Delete::Garbage),
    ]
}

fn create_value(kind: Create, index: usize) -> Value {
    match kind {
        Create::Valid => json!({
            "name": format!("lamp-{index}"),
            "kind": "lighting",
            "coordinates": [{"latitude": 45.76, "longitude": 4.83}]
        }),
        Create::DegeneratePolygon => json!({
            "name": format!("zone-{index}"),
            "kind": "zone",
            "geometry_kind": "POLYGON",
            "coordinates": [{"latitude": 45.0, "longitude": 5.0}, {"latitude": 45.1, "longitude": 5.0}]
        }),
        Create::StorageFault => json!({
            "name": "poison",
            "kind": "lighting",
            "coordinates": [{"latitude": 45.76, "longitude": 4.83}]
        }),
        Create::Undecodable => json!([index]),
    }
}

fn seed(store: &MemoryStore) -> Vec<Uuid> {
    (0..SEEDED)
        .map(|i| {
            let sub: NewObservation = serde_json::from_value(json!({
                "name": format!("seed-{i}"),
                "kind": "lighting",
                "coordinates": [{"latitude": 45.0, "longitude": 5.0}]
            }))
            .unwrap();
            let obs = sub
                .into_observation(Uuid::new_v4(), Uuid::new_v4(), Utc::now(), RingClosure::Auto)
                .unwrap();
            let id = obs.id;
            store.put_observation(obs);
            id
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn every_item_is_applied_skipped_or_failed(
        creates in prop::collection::vec(create_item(), 0..12),
        updates in prop::collection::vec(update_item(), 0..12),
        deletes in prop::collection::vec(delete_item(), 0..12),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let store = MemoryStore::new();
        store.fail_inserts_named("poison");
        let seeded = seed(&store);
        let engine = SyncEngine::new(Arc::new(store.clone()), SyncConfig::default());

        let request = SyncRequest {
            device_id: "tab-prop".into(),
            creates: creates.iter().enumerate().map(|(i, c)| create_value(*c, i)).collect(),
            updates: updates
                .iter()
                .map(|u| match u {
                    Update::Existing(i) => json!({"id": seeded[*i].to_string(), "comment": "seen"}),
                    Update::Missing => json!({"id": Uuid::new_v4().to_string(), "name": "ghost"}),
                    Update::StatusField => {
                        json!({"id": seeded[0].to_string(), "status": "published"})
                    }
                    Update::BadId => json!({"id": "not-a-uuid", "name": "x"}),
                })
                .collect(),
            deletes: deletes
                .iter()
                .map(|d| match d {
                    Delete::Seeded(i) => seeded[*i].to_string(),
                    Delete::Missing => Uuid::new_v4().to_string(),
                    Delete::Garbage => "garbage".to_string(),
                })
                .collect(),
            ..Default::default()
        };

        let principal = Principal::new(Uuid::new_v4(), Role::Collector);
        let resp = runtime.block_on(engine.sync(&principal, request)).unwrap();
        let outcomes = resp.outcomes;

        prop_assert!(outcomes.creates.is_balanced());
        prop_assert!(outcomes.updates.is_balanced());
        prop_assert!(outcomes.deletes.is_balanced());
        prop_assert_eq!(outcomes.creates.submitted as usize, creates.len());
        prop_assert_eq!(outcomes.updates.submitted as usize, updates.len());
        prop_assert_eq!(outcomes.deletes.submitted as usize, deletes.len());

        let failed = outcomes.creates.failed + outcomes.updates.failed + outcomes.deletes.failed;
        prop_assert_eq!(resp.errors.len(), failed as usize);
        prop_assert_eq!(resp.created.len(), outcomes.creates.applied as usize);

        let valid = creates.iter().filter(|c| matches!(c, Create::Valid)).count();
        prop_assert_eq!(outcomes.creates.applied as usize, valid);
        prop_assert_eq!(
            store.observation_count(),
            SEEDED + outcomes.creates.applied as usize - outcomes.deletes.applied as usize
        );
    }
}
