//! # Change Uploader
//!
//! Applies a client's creates, updates and deletes inside the session's
//! outer transaction. Each item gets its own savepoint: a failing item is
//! rolled back alone and reported as a message naming the item (creates by
//! name, updates and deletes by id) while the rest of the batch proceeds.
//!
//! Every item is checked against the caller's [`WriteScope`]: a record
//! outside the granted projects or categories is rejected like any other
//! invalid item.
//!
//! Only storage failures that are not scoped to one statement abort the
//! whole session.

use std::collections::BTreeSet;

use chrono::Utc;
use geoclic_core::{NewObservation, PermissionGrant, RingClosure, UpdateItem, ValidatedPatch};
use serde_json::Value;
use uuid::Uuid;

use crate::dto::{CategoryOutcome, CreatedRecord};
use crate::error::StoreError;
use crate::principal::Principal;
use crate::store::{DeleteOutcome, SavepointId, SyncTransaction};

/// Result of applying one category of changes.
#[derive(Debug, Default)]
pub struct UploadReport {
    pub outcome: CategoryOutcome,
    pub errors: Vec<String>,
    pub created: Vec<CreatedRecord>,
}

impl UploadReport {
    fn fail(&mut self, message: String) {
        tracing::warn!(error = %message, "sync item rejected");
        self.outcome.failed += 1;
        self.errors.push(message);
    }
}

/// The projects and taxonomy codes a caller may write to.
#[derive(Debug, Clone, Default)]
pub struct WriteScope {
    grant: PermissionGrant,
    categories: Option<BTreeSet<String>>,
}

impl WriteScope {
    /// `categories` is the covered code set of `grant`, subtrees included.
    pub fn new(grant: PermissionGrant, categories: Option<BTreeSet<String>>) -> Self {
        Self { grant, categories }
    }

    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Check one record's project and classification code.
    fn check(&self, project_id: Option<Uuid>, code: Option<&str>) -> Result<(), String> {
        match project_id {
            Some(id) if !self.grant.allows_project(id) => {
                return Err(format!("project {id} outside permissions"));
            }
            None if self.grant.projects.is_some() => {
                return Err("a project is required by the caller's permissions".into());
            }
            _ => {}
        }
        match (&self.categories, code) {
            (Some(codes), Some(c)) if !codes.contains(c) => {
                Err(format!("category {c} outside permissions"))
            }
            (Some(_), None) => Err("a category is required by the caller's permissions".into()),
            _ => Ok(()),
        }
    }
}

/// Close a savepoint, undoing its writes first when `keep` is false.
async fn settle(
    tx: &mut dyn SyncTransaction,
    sp: SavepointId,
    keep: bool,
) -> Result<(), StoreError> {
    if !keep {
        tx.rollback_to_savepoint(sp).await?;
    }
    tx.release_savepoint(sp).await
}

fn create_label(value: &Value, index: usize) -> String {
    match value.get("name").and_then(Value::as_str) {
        Some(name) if !name.trim().is_empty() => format!("\"{name}\""),
        _ => format!("#{index}"),
    }
}

/// Insert new observations in `draft`, owned by `principal`.
pub async fn apply_creates(
    tx: &mut dyn SyncTransaction,
    items: Vec<Value>,
    principal: &Principal,
    scope: &WriteScope,
    closure: RingClosure,
) -> Result<UploadReport, StoreError> {
    let mut report = UploadReport::default();

    for (index, value) in items.into_iter().enumerate() {
        report.outcome.submitted += 1;
        let label = create_label(&value, index);

        let submission: NewObservation = match serde_json::from_value(value) {
            Ok(s) => s,
            Err(e) => {
                report.fail(format!("create {label}: malformed record: {e}"));
                continue;
            }
        };
        let obs = match submission.into_observation(
            Uuid::new_v4(),
            principal.user_id,
            Utc::now(),
            closure,
        ) {
            Ok(obs) => obs,
            Err(e) => {
                report.fail(format!("create {label}: {e}"));
                continue;
            }
        };
        if let Err(message) = scope.check(obs.project_id, obs.classification_code.as_deref()) {
            report.fail(format!("create {label}: {message}"));
            continue;
        }

        let sp = tx.savepoint().await?;
        match tx.insert_observation(&obs).await {
            Ok(()) => {
                settle(tx, sp, true).await?;
                report.outcome.applied += 1;
                report.created.push(CreatedRecord {
                    index,
                    name: obs.name.clone(),
                    id: obs.id,
                });
            }
            Err(e) if e.is_item_scoped() => {
                settle(tx, sp, false).await?;
                report.fail(format!("create {label}: {e}"));
            }
            Err(e) => return Err(e),
        }
    }

    Ok(report)
}

/// Apply sparse field-mask updates. Last write wins.
pub async fn apply_updates(
    tx: &mut dyn SyncTransaction,
    items: Vec<Value>,
    principal: &Principal,
    scope: &WriteScope,
    closure: RingClosure,
) -> Result<UploadReport, StoreError> {
    let mut report = UploadReport::default();

    for (index, value) in items.into_iter().enumerate() {
        report.outcome.submitted += 1;
        let label = UpdateItem::raw_id(&value).unwrap_or_else(|| format!("#{index}"));

        let item = match UpdateItem::from_value(value) {
            Ok(item) => item,
            Err(e) => {
                report.fail(format!("update {label}: {e}"));
                continue;
            }
        };

        let sp = tx.savepoint().await?;
        let result = update_one(tx, item, principal, scope, closure).await;
        match result {
            Ok(()) => {
                settle(tx, sp, true).await?;
                report.outcome.applied += 1;
            }
            Err(ItemFailure::Rejected(message)) => {
                settle(tx, sp, false).await?;
                report.fail(format!("update {label}: {message}"));
            }
            Err(ItemFailure::Fatal(e)) => return Err(e),
        }
    }

    Ok(report)
}

enum ItemFailure {
    Rejected(String),
    Fatal(StoreError),
}

impl From<StoreError> for ItemFailure {
    fn from(e: StoreError) -> Self {
        if e.is_item_scoped() {
            Self::Rejected(e.to_string())
        } else {
            Self::Fatal(e)
        }
    }
}

async fn update_one(
    tx: &mut dyn SyncTransaction,
    item: UpdateItem,
    principal: &Principal,
    scope: &WriteScope,
    closure: RingClosure,
) -> Result<(), ItemFailure> {
    let current = tx
        .observation(item.id)
        .await?
        .ok_or_else(|| ItemFailure::Rejected("observation not found".into()))?;
    scope
        .check(current.project_id, current.classification_code.as_deref())
        .map_err(ItemFailure::Rejected)?;
    if let Some(code) = item.patch.classification_code.as_deref() {
        scope
            .check(current.project_id, Some(code))
            .map_err(ItemFailure::Rejected)?;
    }
    let patch = ValidatedPatch::new(item.patch, current.geometry.kind(), closure)
        .map_err(|e| ItemFailure::Rejected(e.to_string()))?;
    if tx
        .apply_patch(item.id, &patch, principal.user_id, Utc::now())
        .await?
    {
        Ok(())
    } else {
        Err(ItemFailure::Rejected("observation not found".into()))
    }
}

/// Delete drafts. Non-draft and missing ids are skipped, not errors.
pub async fn apply_deletes(
    tx: &mut dyn SyncTransaction,
    items: Vec<String>,
    scope: &WriteScope,
) -> Result<UploadReport, StoreError> {
    let mut report = UploadReport::default();

    for raw in items {
        report.outcome.submitted += 1;
        let id = match Uuid::parse_str(raw.trim()) {
            Ok(id) => id,
            Err(_) => {
                report.fail(format!("delete {raw}: not a valid UUID"));
                continue;
            }
        };
        if let Some(current) = tx.observation(id).await? {
            if let Err(message) =
                scope.check(current.project_id, current.classification_code.as_deref())
            {
                report.fail(format!("delete {id}: {message}"));
                continue;
            }
        }

        let sp = tx.savepoint().await?;
        match tx.delete_draft(id).await {
            Ok(DeleteOutcome::Deleted) => {
                settle(tx, sp, true).await?;
                report.outcome.applied += 1;
            }
            Ok(DeleteOutcome::NotDraft(status)) => {
                settle(tx, sp, true).await?;
                tracing::debug!(%id, %status, "delete skipped: observation is no longer a draft");
                report.outcome.skipped += 1;
            }
            Ok(DeleteOutcome::NotFound) => {
                settle(tx, sp, true).await?;
                tracing::debug!(%id, "delete skipped: observation not found");
                report.outcome.skipped += 1;
            }
            Err(e) if e.is_item_scoped() => {
                settle(tx, sp, false).await?;
                report.fail(format!("delete {id}: {e}"));
            }
            Err(e) => return Err(e),
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::principal::Role;
    use crate::store::SyncStore;
    use geoclic_core::ObservationStatus;
    use serde_json::json;

    fn collector() -> Principal {
        Principal::new(Uuid::new_v4(), Role::Collector)
    }

    fn point(name: &str) -> Value {
        json!({
            "name": name,
            "kind": "lighting",
            "coordinates": [{"latitude": 45.76, "longitude": 4.83}]
        })
    }

    #[tokio::test]
    async fn creates_isolate_invalid_items() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let items = vec![
            point("ok-1"),
            json!({"name": "bad-poly", "kind": "zone", "geometry_kind": "POLYGON",
                   "coordinates": [{"latitude": 45.0, "longitude": 5.0}, {"latitude": 45.1, "longitude": 5.0}]}),
            point("ok-2"),
        ];
        let report = apply_creates(
            tx.as_mut(),
            items,
            &collector(),
            &WriteScope::unrestricted(),
            RingClosure::Auto,
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(report.outcome.applied, 2);
        assert_eq!(report.outcome.failed, 1);
        assert!(report.outcome.is_balanced());
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("\"bad-poly\""));
        assert_eq!(report.created.iter().map(|c| c.index).collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(store.observation_count(), 2);
    }

    #[tokio::test]
    async fn storage_constraint_rolls_back_only_that_item() {
        let store = MemoryStore::new();
        store.fail_inserts_named("poison");
        let mut tx = store.begin().await.unwrap();
        let report = apply_creates(
            tx.as_mut(),
            vec![point("a"), point("poison"), point("b")],
            &collector(),
            &WriteScope::unrestricted(),
            RingClosure::Auto,
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();
        assert_eq!(report.outcome.applied, 2);
        assert_eq!(store.observation_count(), 2);
    }

    #[tokio::test]
    async fn undecodable_create_is_labelled_by_index() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let report = apply_creates(
            tx.as_mut(),
            vec![json!(42)],
            &collector(),
            &WriteScope::unrestricted(),
            RingClosure::Auto,
        )
        .await
        .unwrap();
        assert!(report.errors[0].starts_with("create #0"));
    }

    #[tokio::test]
    async fn update_of_missing_id_is_an_error() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let id = Uuid::new_v4();
        let report = apply_updates(
            tx.as_mut(),
            vec![json!({"id": id.to_string(), "name": "x"})],
            &collector(),
            &WriteScope::unrestricted(),
            RingClosure::Auto,
        )
        .await
        .unwrap();
        assert_eq!(report.outcome.failed, 1);
        assert!(report.errors[0].contains(&id.to_string()));
        assert!(report.errors[0].contains("not found"));
    }

    #[tokio::test]
    async fn update_cannot_touch_status() {
        let store = MemoryStore::new();
        let principal = collector();
        let mut tx = store.begin().await.unwrap();
        let created = apply_creates(
            tx.as_mut(),
            vec![point("a")],
            &principal,
            &WriteScope::unrestricted(),
            RingClosure::Auto,
        )
        .await
        .unwrap();
        let id = created.created[0].id;
        let report = apply_updates(
            tx.as_mut(),
            vec![json!({"id": id.to_string(), "status": "published"})],
            &principal,
            &WriteScope::unrestricted(),
            RingClosure::Auto,
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();
        assert_eq!(report.outcome.failed, 1);
        assert_eq!(
            store.get_observation(id).unwrap().status,
            ObservationStatus::Draft
        );
    }

    #[tokio::test]
    async fn deletes_skip_non_drafts_and_missing_ids() {
        let store = MemoryStore::new();
        let principal = collector();
        let mut tx = store.begin().await.unwrap();
        let created = apply_creates(
            tx.as_mut(),
            vec![point("draft"), point("pending")],
            &principal,
            &WriteScope::unrestricted(),
            RingClosure::Auto,
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();
        let (draft_id, pending_id) = (created.created[0].id, created.created[1].id);
        let mut pending = store.get_observation(pending_id).unwrap();
        pending.status = ObservationStatus::Pending;
        store.put_observation(pending);

        let mut tx = store.begin().await.unwrap();
        let report = apply_deletes(
            tx.as_mut(),
            vec![
                draft_id.to_string(),
                pending_id.to_string(),
                Uuid::new_v4().to_string(),
                "garbage".into(),
            ],
            &WriteScope::unrestricted(),
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(report.outcome.submitted, 4);
        assert_eq!(report.outcome.applied, 1);
        assert_eq!(report.outcome.skipped, 2);
        assert_eq!(report.outcome.failed, 1);
        assert!(store.get_observation(draft_id).is_none());
        assert!(store.get_observation(pending_id).is_some());
    }

    fn scoped_to(project: Uuid, category: &str) -> WriteScope {
        WriteScope::new(
            PermissionGrant {
                projects: Some([project].into_iter().collect()),
                categories: Some([category.to_string()].into_iter().collect()),
            },
            Some([category.to_string()].into_iter().collect()),
        )
    }

    fn point_in(name: &str, project: Uuid, code: &str) -> Value {
        json!({
            "name": name,
            "project_id": project,
            "classification_code": code,
            "kind": "lighting",
            "coordinates": [{"latitude": 45.76, "longitude": 4.83}]
        })
    }

    #[tokio::test]
    async fn creates_outside_the_grant_are_rejected() {
        let store = MemoryStore::new();
        let (granted, foreign) = (Uuid::new_v4(), Uuid::new_v4());
        let scope = scoped_to(granted, "LAMP");
        let mut tx = store.begin().await.unwrap();
        let report = apply_creates(
            tx.as_mut(),
            vec![
                point_in("ok", granted, "LAMP"),
                point_in("elsewhere", foreign, "LAMP"),
                point_in("tree", granted, "TREE"),
                point("loose"),
            ],
            &collector(),
            &scope,
            RingClosure::Auto,
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(report.outcome.applied, 1);
        assert_eq!(report.outcome.failed, 3);
        assert!(report.outcome.is_balanced());
        assert_eq!(
            report.errors[0],
            format!("create \"elsewhere\": project {foreign} outside permissions")
        );
        assert!(report.errors[1].contains("category TREE outside permissions"));
        assert!(report.errors[2].starts_with("create \"loose\""));
        assert_eq!(store.observation_count(), 1);
    }

    #[tokio::test]
    async fn updates_outside_the_grant_are_rejected() {
        let store = MemoryStore::new();
        let (granted, foreign) = (Uuid::new_v4(), Uuid::new_v4());
        let mut tx = store.begin().await.unwrap();
        let seeded = apply_creates(
            tx.as_mut(),
            vec![point_in("mine", granted, "LAMP"), point_in("theirs", foreign, "LAMP")],
            &collector(),
            &WriteScope::unrestricted(),
            RingClosure::Auto,
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();
        let (mine, theirs) = (seeded.created[0].id, seeded.created[1].id);
        let mut published = store.get_observation(theirs).unwrap();
        published.status = ObservationStatus::Published;
        store.put_observation(published);

        let mut tx = store.begin().await.unwrap();
        let report = apply_updates(
            tx.as_mut(),
            vec![
                json!({"id": theirs.to_string(), "name": "hijacked"}),
                json!({"id": mine.to_string(), "classification_code": "TREE"}),
                json!({"id": mine.to_string(), "comment": "checked"}),
            ],
            &collector(),
            &scoped_to(granted, "LAMP"),
            RingClosure::Auto,
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(report.outcome.applied, 1);
        assert_eq!(report.outcome.failed, 2);
        assert!(report.errors[0].contains(&format!("project {foreign} outside permissions")));
        assert!(report.errors[1].contains("category TREE outside permissions"));
        assert_eq!(store.get_observation(theirs).unwrap().name, "theirs");
        let after = store.get_observation(mine).unwrap();
        assert_eq!(after.classification_code.as_deref(), Some("LAMP"));
        assert_eq!(after.comment.as_deref(), Some("checked"));

        let mut tx = store.begin().await.unwrap();
        let report = apply_deletes(
            tx.as_mut(),
            vec![theirs.to_string()],
            &scoped_to(granted, "LAMP"),
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();
        assert_eq!(report.outcome.failed, 1);
        assert!(store.get_observation(theirs).is_some());
    }
}
