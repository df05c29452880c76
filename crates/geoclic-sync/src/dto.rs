//! Request and response bodies exchanged with field clients.

use chrono::{DateTime, Utc};
use geoclic_core::{DynamicFieldConfig, ObservationView, PermissionGrant, Project, TaxonomyEntry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Per-category item counts for one sync session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CategoryOutcome {
    /// Items received.
    pub submitted: u32,
    /// Items that changed stored state.
    pub applied: u32,
    /// Items accepted as no-ops.
    pub skipped: u32,
    /// Items rejected with an error.
    pub failed: u32,
}

impl CategoryOutcome {
    /// Whether every submitted item was accounted for exactly once.
    pub fn is_balanced(&self) -> bool {
        self.applied + self.skipped + self.failed == self.submitted
    }
}

/// Outcome counts for creates, updates and deletes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SyncOutcomes {
    pub creates: CategoryOutcome,
    pub updates: CategoryOutcome,
    pub deletes: CategoryOutcome,
}

/// One sync exchange from a field client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SyncRequest {
    /// Opaque client device identifier.
    pub device_id: String,
    /// Server time returned by the client's previous sync; `None` on first sync.
    #[serde(default)]
    pub last_sync_at: Option<DateTime<Utc>>,
    /// New observations, decoded one by one.
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Vec<geoclic_core::NewObservation>))]
    pub creates: Vec<Value>,
    /// Sparse updates: `id` plus any mutable fields.
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Vec<Object>))]
    pub updates: Vec<Value>,
    /// Ids of draft observations to delete.
    #[serde(default)]
    pub deletes: Vec<String>,
    /// Always attach the taxonomy.
    #[serde(default)]
    pub include_taxonomy: bool,
    /// Always attach dynamic field configs.
    #[serde(default)]
    pub include_fields: bool,
    /// Attach the permitted project list.
    #[serde(default)]
    pub include_projects: bool,
    /// Taxonomy version the client holds.
    #[serde(default)]
    pub taxonomy_version: Option<String>,
    /// Project used to scope reference data.
    #[serde(default)]
    pub project_id: Option<Uuid>,
}

/// Server id assigned to a created observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CreatedRecord {
    /// Position of the item in the request's `creates` array.
    pub index: usize,
    pub name: String,
    pub id: Uuid,
}

/// Result of one sync exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SyncResponse {
    /// `true` when no item failed.
    pub success: bool,
    /// Audit record id of this session.
    pub sync_id: Uuid,
    /// Cursor for the next sync, taken after commit.
    pub server_time: DateTime<Utc>,
    /// Applied creates.
    pub uploaded: u32,
    /// Applied updates.
    pub updated: u32,
    /// Applied deletes.
    pub deleted: u32,
    pub outcomes: SyncOutcomes,
    pub created: Vec<CreatedRecord>,
    /// Records changed since the cursor, newest first.
    pub downloaded: Vec<ObservationView>,
    pub taxonomy_changed: bool,
    pub taxonomy_version: String,
    pub taxonomy: Vec<TaxonomyEntry>,
    pub field_configs: Vec<DynamicFieldConfig>,
    pub projects: Vec<Project>,
    /// One human-readable message per failed item.
    pub errors: Vec<String>,
}

/// Offline package query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
pub struct PackageRequest {
    /// Project to bootstrap.
    #[serde(default)]
    pub project_id: Option<Uuid>,
    /// Embed the project's observations.
    #[serde(default)]
    pub include_points: bool,
    /// Keep only observations within this many km of the project centre.
    #[serde(default)]
    pub radius_km: Option<f64>,
}

/// Bootstrap snapshot for a client going offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct OfflinePackage {
    pub server_time: DateTime<Utc>,
    pub taxonomy_version: String,
    pub project: Option<Project>,
    pub taxonomy: Vec<TaxonomyEntry>,
    pub field_configs: Vec<DynamicFieldConfig>,
    pub projects: Vec<Project>,
    /// The caller's authorization scope.
    pub permissions: PermissionGrant,
    /// Embedded observations, newest first, capped.
    pub points: Vec<ObservationView>,
    /// Matching observations before the cap.
    pub total_points: u64,
}

/// Sync health for one caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SyncStatus {
    pub server_time: DateTime<Utc>,
    /// Completion time of the caller's last completed session.
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_sync_id: Option<Uuid>,
    /// Records changed since the last completed session.
    pub pending_changes: u64,
    pub taxonomy_version: String,
    /// Active taxonomy entries.
    pub taxonomy_count: usize,
    /// Active projects visible to the caller.
    pub project_count: usize,
}

/// Body of a moderation call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ModerationRequest {
    /// Reason recorded on rejection.
    #[serde(default)]
    pub comment: Option<String>,
}
