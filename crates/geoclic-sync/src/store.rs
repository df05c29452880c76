//! # Storage Ports
//!
//! The engine talks to storage through two traits:
//!
//! - [`SyncStore`] — shared handle: reference data, audit records written
//!   outside any session transaction, and [`SyncStore::begin`].
//! - [`SyncTransaction`] — the outer transaction of one sync session, with
//!   savepoints for per-item isolation.
//!
//! Dropping a transaction without calling [`SyncTransaction::commit`] discards
//! all of its writes.

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use geoclic_core::{
    DynamicFieldConfig, LngLat, Observation, ObservationStatus, PermissionGrant, Project,
    TaxonomyEntry, ValidatedPatch,
};
use uuid::Uuid;

use crate::dto::SyncOutcomes;
use crate::error::StoreError;

/// Handle to a savepoint inside a [`SyncTransaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SavepointId(pub u32);

impl SavepointId {
    /// SQL identifier for this savepoint. Only digits follow the prefix.
    pub fn name(&self) -> String {
        format!("sync_item_{}", self.0)
    }
}

impl fmt::Display for SavepointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Result of a draft-only delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The row was a draft and has been removed.
    Deleted,
    /// The row exists but has left `draft`; nothing changed.
    NotDraft(ObservationStatus),
    /// No such row; nothing changed.
    NotFound,
}

/// Keep only observations whose anchor lies within `radius_km` of `center`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusFilter {
    pub center: LngLat,
    pub radius_km: f64,
}

/// One row of the sync audit ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSessionRecord {
    pub id: Uuid,
    pub device_id: String,
    pub user_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// `None` while running, or forever if the session never committed.
    pub completed_at: Option<DateTime<Utc>>,
    pub outcomes: SyncOutcomes,
    pub downloaded: u32,
}

impl SyncSessionRecord {
    /// A freshly opened, not yet completed session.
    pub fn open(id: Uuid, device_id: &str, user_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            device_id: device_id.to_string(),
            user_id,
            started_at,
            completed_at: None,
            outcomes: SyncOutcomes::default(),
            downloaded: 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Shared storage handle.
#[async_trait]
pub trait SyncStore: Send + Sync {
    /// Start the outer transaction of a sync session.
    async fn begin(&self) -> Result<Box<dyn SyncTransaction>, StoreError>;

    /// Durably record a session start, independently of any transaction.
    async fn open_session(&self, record: &SyncSessionRecord) -> Result<(), StoreError>;

    /// Latest completed session of `user_id`, optionally for one device.
    async fn last_completed_session(
        &self,
        user_id: Uuid,
        device_id: Option<&str>,
    ) -> Result<Option<SyncSessionRecord>, StoreError>;

    /// Sessions that never completed, newest first.
    async fn incomplete_sessions(&self, limit: usize) -> Result<Vec<SyncSessionRecord>, StoreError>;

    /// Every taxonomy entry, active or not.
    async fn taxonomy_entries(&self) -> Result<Vec<TaxonomyEntry>, StoreError>;

    /// Every dynamic field configuration, active or not.
    async fn field_configs(&self) -> Result<Vec<DynamicFieldConfig>, StoreError>;

    /// Every project, active or not.
    async fn projects(&self) -> Result<Vec<Project>, StoreError>;

    async fn project(&self, id: Uuid) -> Result<Option<Project>, StoreError>;

    /// Authorization scope of `user_id`. Users without a recorded grant are
    /// unrestricted.
    async fn permissions_for(&self, user_id: Uuid) -> Result<PermissionGrant, StoreError>;

    /// Observations of one project, newest first, up to `limit`, plus the
    /// number of matches before the limit. With `categories`, only rows whose
    /// classification code is in the set match; unclassified rows never do.
    async fn project_observations(
        &self,
        project_id: Uuid,
        radius: Option<RadiusFilter>,
        categories: Option<&BTreeSet<String>>,
        limit: usize,
    ) -> Result<(Vec<Observation>, u64), StoreError>;

    /// Number of observations modified strictly after `since` (all when `None`).
    async fn count_changed_since(&self, since: Option<DateTime<Utc>>) -> Result<u64, StoreError>;
}

/// The outer transaction of one sync session or moderation call.
#[async_trait]
pub trait SyncTransaction: Send {
    async fn savepoint(&mut self) -> Result<SavepointId, StoreError>;

    async fn release_savepoint(&mut self, sp: SavepointId) -> Result<(), StoreError>;

    /// Undo everything written since `sp` was taken.
    async fn rollback_to_savepoint(&mut self, sp: SavepointId) -> Result<(), StoreError>;

    async fn insert_observation(&mut self, obs: &Observation) -> Result<(), StoreError>;

    /// Current state of one observation as seen by this transaction.
    async fn observation(&mut self, id: Uuid) -> Result<Option<Observation>, StoreError>;

    /// Write the masked columns plus `updated_by`/`updated_at`. Returns
    /// `false` when the row does not exist.
    async fn apply_patch(
        &mut self,
        id: Uuid,
        patch: &ValidatedPatch,
        editor: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Delete `id` only if it is still a draft.
    async fn delete_draft(&mut self, id: Uuid) -> Result<DeleteOutcome, StoreError>;

    /// Move `id` from `from` to `to`. Returns `false` when the row does not
    /// exist or is no longer in `from`.
    async fn set_status(
        &mut self,
        id: Uuid,
        from: ObservationStatus,
        to: ObservationStatus,
        rejection_comment: Option<&str>,
        editor: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Observations with `updated_at` strictly after `cursor` (all when
    /// `None`), newest first, at most `limit`.
    async fn changed_since(
        &mut self,
        cursor: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Observation>, StoreError>;

    /// Stamp completion and final counts on an opened session.
    async fn close_session(
        &mut self,
        id: Uuid,
        outcomes: &SyncOutcomes,
        downloaded: u32,
        completed_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
