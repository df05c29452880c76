//! # In-Memory Store
//!
//! A [`SyncStore`] backed by `parking_lot` locks. Used when no database is
//! configured and by tests.
//!
//! A transaction is a journal of operations over the committed state:
//! reads see committed rows with the journal replayed on top, savepoints are
//! journal positions, and commit replays the journal under the write lock.
//! Replay re-checks the conditions a concurrent commit may have invalidated
//! (a delete only removes a row that is still a draft, a status change only
//! applies from the expected status).

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use geoclic_core::{
    haversine_km, DynamicFieldConfig, Observation, ObservationStatus, PermissionGrant, Project,
    TaxonomyEntry, ValidatedPatch,
};
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::dto::SyncOutcomes;
use crate::error::StoreError;
use crate::store::{
    DeleteOutcome, RadiusFilter, SavepointId, SyncSessionRecord, SyncStore, SyncTransaction,
};

#[derive(Debug, Default)]
struct Faults {
    /// Inserts of observations with these names fail with a constraint error.
    insert_names: HashSet<String>,
    /// Every commit fails.
    fail_commit: bool,
}

#[derive(Debug, Default)]
struct Inner {
    observations: RwLock<HashMap<Uuid, Observation>>,
    sessions: RwLock<Vec<SyncSessionRecord>>,
    taxonomy: RwLock<Vec<TaxonomyEntry>>,
    fields: RwLock<Vec<DynamicFieldConfig>>,
    projects: RwLock<Vec<Project>>,
    permissions: RwLock<HashMap<Uuid, PermissionGrant>>,
    faults: Mutex<Faults>,
}

/// Thread-safe in-process store. Cloning shares the underlying data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a committed observation directly.
    pub fn put_observation(&self, obs: Observation) {
        self.inner.observations.write().insert(obs.id, obs);
    }

    /// Committed state of one observation.
    pub fn get_observation(&self, id: Uuid) -> Option<Observation> {
        self.inner.observations.read().get(&id).cloned()
    }

    /// Number of committed observations.
    pub fn observation_count(&self) -> usize {
        self.inner.observations.read().len()
    }

    pub fn put_taxonomy_entry(&self, entry: TaxonomyEntry) {
        let mut taxonomy = self.inner.taxonomy.write();
        taxonomy.retain(|e| e.id != entry.id);
        taxonomy.push(entry);
    }

    pub fn put_field_config(&self, config: DynamicFieldConfig) {
        let mut fields = self.inner.fields.write();
        fields.retain(|c| c.id != config.id);
        fields.push(config);
    }

    pub fn put_project(&self, project: Project) {
        let mut projects = self.inner.projects.write();
        projects.retain(|p| p.id != project.id);
        projects.push(project);
    }

    pub fn set_permissions(&self, user_id: Uuid, grant: PermissionGrant) {
        self.inner.permissions.write().insert(user_id, grant);
    }

    /// Every audit record, in insertion order.
    pub fn sessions(&self) -> Vec<SyncSessionRecord> {
        self.inner.sessions.read().clone()
    }

    /// Make inserts of observations named `name` fail with a constraint error.
    pub fn fail_inserts_named(&self, name: &str) {
        self.inner.faults.lock().insert_names.insert(name.to_string());
    }

    /// Make every subsequent commit fail as if the connection dropped.
    pub fn fail_commits(&self, fail: bool) {
        self.inner.faults.lock().fail_commit = fail;
    }
}

fn newest_first(rows: &mut [Observation]) {
    rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
}

#[async_trait]
impl SyncStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn SyncTransaction>, StoreError> {
        Ok(Box::new(MemoryTransaction {
            inner: Arc::clone(&self.inner),
            journal: Vec::new(),
            savepoints: HashMap::new(),
            next_savepoint: 0,
        }))
    }

    async fn open_session(&self, record: &SyncSessionRecord) -> Result<(), StoreError> {
        let mut sessions = self.inner.sessions.write();
        if sessions.iter().any(|s| s.id == record.id) {
            return Err(StoreError::Constraint(format!("duplicate session id {}", record.id)));
        }
        sessions.push(record.clone());
        Ok(())
    }

    async fn last_completed_session(
        &self,
        user_id: Uuid,
        device_id: Option<&str>,
    ) -> Result<Option<SyncSessionRecord>, StoreError> {
        Ok(self
            .inner
            .sessions
            .read()
            .iter()
            .filter(|s| s.user_id == user_id && s.is_complete())
            .filter(|s| device_id.map_or(true, |d| s.device_id == d))
            .max_by_key(|s| s.completed_at)
            .cloned())
    }

    async fn incomplete_sessions(&self, limit: usize) -> Result<Vec<SyncSessionRecord>, StoreError> {
        let mut open: Vec<_> = self
            .inner
            .sessions
            .read()
            .iter()
            .filter(|s| !s.is_complete())
            .cloned()
            .collect();
        open.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        open.truncate(limit);
        Ok(open)
    }

    async fn taxonomy_entries(&self) -> Result<Vec<TaxonomyEntry>, StoreError> {
        Ok(self.inner.taxonomy.read().clone())
    }

    async fn field_configs(&self) -> Result<Vec<DynamicFieldConfig>, StoreError> {
        Ok(self.inner.fields.read().clone())
    }

    async fn projects(&self) -> Result<Vec<Project>, StoreError> {
        Ok(self.inner.projects.read().clone())
    }

    async fn project(&self, id: Uuid) -> Result<Option<Project>, StoreError> {
        Ok(self.inner.projects.read().iter().find(|p| p.id == id).cloned())
    }

    async fn permissions_for(&self, user_id: Uuid) -> Result<PermissionGrant, StoreError> {
        Ok(self
            .inner
            .permissions
            .read()
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn project_observations(
        &self,
        project_id: Uuid,
        radius: Option<RadiusFilter>,
        categories: Option<&BTreeSet<String>>,
        limit: usize,
    ) -> Result<(Vec<Observation>, u64), StoreError> {
        let mut rows: Vec<Observation> = self
            .inner
            .observations
            .read()
            .values()
            .filter(|o| o.project_id == Some(project_id))
            .filter(|o| {
                categories.map_or(true, |codes| {
                    o.classification_code.as_ref().is_some_and(|c| codes.contains(c))
                })
            })
            .filter(|o| {
                radius.map_or(true, |r| haversine_km(o.geometry.anchor(), r.center) <= r.radius_km)
            })
            .cloned()
            .collect();
        let total = rows.len() as u64;
        newest_first(&mut rows);
        rows.truncate(limit);
        Ok((rows, total))
    }

    async fn count_changed_since(&self, since: Option<DateTime<Utc>>) -> Result<u64, StoreError> {
        let count = self
            .inner
            .observations
            .read()
            .values()
            .filter(|o| since.map_or(true, |s| o.updated_at > s))
            .count();
        Ok(count as u64)
    }
}

#[derive(Debug, Clone)]
enum Op {
    Insert(Observation),
    Patch {
        id: Uuid,
        patch: ValidatedPatch,
        editor: Uuid,
        at: DateTime<Utc>,
    },
    Delete(Uuid),
    Status {
        id: Uuid,
        from: ObservationStatus,
        to: ObservationStatus,
        comment: Option<String>,
        editor: Uuid,
        at: DateTime<Utc>,
    },
    CloseSession {
        id: Uuid,
        outcomes: SyncOutcomes,
        downloaded: u32,
        completed_at: DateTime<Utc>,
    },
}

impl Op {
    /// The observation this operation touches.
    fn target(&self) -> Option<Uuid> {
        match self {
            Op::Insert(obs) => Some(obs.id),
            Op::Patch { id, .. } | Op::Delete(id) | Op::Status { id, .. } => Some(*id),
            Op::CloseSession { .. } => None,
        }
    }

    fn apply(&self, rows: &mut HashMap<Uuid, Observation>) {
        match self {
            Op::Insert(obs) => {
                rows.insert(obs.id, obs.clone());
            }
            Op::Patch {
                id,
                patch,
                editor,
                at,
            } => {
                if let Some(obs) = rows.get_mut(id) {
                    patch.apply_to(obs, *editor, *at);
                }
            }
            Op::Delete(id) => {
                if rows.get(id).is_some_and(|o| o.status.is_deletable_via_sync()) {
                    rows.remove(id);
                }
            }
            Op::Status {
                id,
                from,
                to,
                comment,
                editor,
                at,
            } => {
                if let Some(obs) = rows.get_mut(id).filter(|o| o.status == *from) {
                    obs.status = *to;
                    if comment.is_some() {
                        obs.rejection_comment = comment.clone();
                    }
                    obs.updated_by = Some(*editor);
                    obs.updated_at = *at;
                }
            }
            Op::CloseSession { .. } => {}
        }
    }
}

struct MemoryTransaction {
    inner: Arc<Inner>,
    journal: Vec<Op>,
    savepoints: HashMap<SavepointId, usize>,
    next_savepoint: u32,
}

impl MemoryTransaction {
    /// Committed rows with this transaction's whole journal replayed on top.
    fn overlay(&self) -> HashMap<Uuid, Observation> {
        let mut rows = self.inner.observations.read().clone();
        for op in &self.journal {
            op.apply(&mut rows);
        }
        rows
    }

    /// One row as this transaction sees it: the committed row with only the
    /// journal entries for `id` replayed on top.
    fn current(&self, id: Uuid) -> Option<Observation> {
        let mut rows: HashMap<Uuid, Observation> = self
            .inner
            .observations
            .read()
            .get(&id)
            .map(|obs| (id, obs.clone()))
            .into_iter()
            .collect();
        for op in self.journal.iter().filter(|op| op.target() == Some(id)) {
            op.apply(&mut rows);
        }
        rows.remove(&id)
    }
}

#[async_trait]
impl SyncTransaction for MemoryTransaction {
    async fn savepoint(&mut self) -> Result<SavepointId, StoreError> {
        let sp = SavepointId(self.next_savepoint);
        self.next_savepoint += 1;
        self.savepoints.insert(sp, self.journal.len());
        Ok(sp)
    }

    async fn release_savepoint(&mut self, sp: SavepointId) -> Result<(), StoreError> {
        self.savepoints
            .remove(&sp)
            .map(|_| ())
            .ok_or_else(|| StoreError::Backend(format!("unknown savepoint {sp}")))
    }

    async fn rollback_to_savepoint(&mut self, sp: SavepointId) -> Result<(), StoreError> {
        let mark = *self
            .savepoints
            .get(&sp)
            .ok_or_else(|| StoreError::Backend(format!("unknown savepoint {sp}")))?;
        self.journal.truncate(mark);
        Ok(())
    }

    async fn insert_observation(&mut self, obs: &Observation) -> Result<(), StoreError> {
        if self.inner.faults.lock().insert_names.contains(&obs.name) {
            return Err(StoreError::Constraint(format!(
                "insert rejected for \"{}\"",
                obs.name
            )));
        }
        if self.current(obs.id).is_some() {
            return Err(StoreError::Constraint(format!("duplicate observation id {}", obs.id)));
        }
        self.journal.push(Op::Insert(obs.clone()));
        Ok(())
    }

    async fn observation(&mut self, id: Uuid) -> Result<Option<Observation>, StoreError> {
        Ok(self.current(id))
    }

    async fn apply_patch(
        &mut self,
        id: Uuid,
        patch: &ValidatedPatch,
        editor: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        if self.current(id).is_none() {
            return Ok(false);
        }
        self.journal.push(Op::Patch {
            id,
            patch: patch.clone(),
            editor,
            at,
        });
        Ok(true)
    }

    async fn delete_draft(&mut self, id: Uuid) -> Result<DeleteOutcome, StoreError> {
        let status = match self.current(id) {
            None => return Ok(DeleteOutcome::NotFound),
            Some(obs) => obs.status,
        };
        if !status.is_deletable_via_sync() {
            return Ok(DeleteOutcome::NotDraft(status));
        }
        self.journal.push(Op::Delete(id));
        Ok(DeleteOutcome::Deleted)
    }

    async fn set_status(
        &mut self,
        id: Uuid,
        from: ObservationStatus,
        to: ObservationStatus,
        rejection_comment: Option<&str>,
        editor: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        if !self.current(id).is_some_and(|o| o.status == from) {
            return Ok(false);
        }
        self.journal.push(Op::Status {
            id,
            from,
            to,
            comment: rejection_comment.map(str::to_string),
            editor,
            at,
        });
        Ok(true)
    }

    async fn changed_since(
        &mut self,
        cursor: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Observation>, StoreError> {
        let mut rows: Vec<Observation> = self
            .overlay()
            .into_values()
            .filter(|o| cursor.map_or(true, |c| o.updated_at > c))
            .collect();
        newest_first(&mut rows);
        rows.truncate(limit);
        Ok(rows)
    }

    async fn close_session(
        &mut self,
        id: Uuid,
        outcomes: &SyncOutcomes,
        downloaded: u32,
        completed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if !self.inner.sessions.read().iter().any(|s| s.id == id) {
            return Err(StoreError::NotFound(format!("sync session {id}")));
        }
        self.journal.push(Op::CloseSession {
            id,
            outcomes: *outcomes,
            downloaded,
            completed_at,
        });
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        if self.inner.faults.lock().fail_commit {
            return Err(StoreError::Unavailable("connection lost during commit".into()));
        }
        let mut rows = self.inner.observations.write();
        let mut sessions = self.inner.sessions.write();
        for op in &self.journal {
            if let Op::CloseSession {
                id,
                outcomes,
                downloaded,
                completed_at,
            } = op
            {
                if let Some(s) = sessions.iter_mut().find(|s| s.id == *id) {
                    s.outcomes = *outcomes;
                    s.downloaded = *downloaded;
                    s.completed_at = Some(*completed_at);
                }
            } else {
                op.apply(&mut rows);
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
