//! # Sync Session Manager
//!
//! [`SyncEngine`] is the entry point used by the HTTP layer. One call to
//! [`SyncEngine::sync`] is one audited session: upload, download and
//! reference-data check inside a single outer transaction.

use std::sync::Arc;

use chrono::Utc;
use geoclic_core::ModerationAction;
use geoclic_core::ObservationView;
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::delta;
use crate::dto::{
    OfflinePackage, PackageRequest, SyncOutcomes, SyncRequest, SyncResponse, SyncStatus,
};
use crate::error::SyncError;
use crate::ledger;
use crate::moderation;
use crate::package;
use crate::principal::Principal;
use crate::reference::{self, ReferenceQuery};
use crate::store::{SyncSessionRecord, SyncStore};
use crate::uploader::{self, WriteScope};

/// The sync engine. Cheap to clone; clones share the store.
#[derive(Clone)]
pub struct SyncEngine {
    store: Arc<dyn SyncStore>,
    config: SyncConfig,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    pub fn new(store: Arc<dyn SyncStore>, config: SyncConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn SyncStore {
        self.store.as_ref()
    }

    fn validate(&self, request: &SyncRequest) -> Result<(), SyncError> {
        if request.device_id.trim().is_empty() {
            return Err(SyncError::Validation("device_id must not be empty".into()));
        }
        let max = self.config.max_batch;
        for (category, len) in [
            ("creates", request.creates.len()),
            ("updates", request.updates.len()),
            ("deletes", request.deletes.len()),
        ] {
            if len > max {
                return Err(SyncError::Validation(format!(
                    "{category} carries {len} items; at most {max} are accepted per sync"
                )));
            }
        }
        Ok(())
    }

    /// Run one sync session for `principal`.
    ///
    /// Item-level problems are reported in the response; only request-level
    /// validation, a `project_id` outside the caller's grant and session-wide
    /// storage failures return `Err`. On `Err` after the audit record was
    /// opened, that record stays incomplete.
    pub async fn sync(
        &self,
        principal: &Principal,
        request: SyncRequest,
    ) -> Result<SyncResponse, SyncError> {
        self.validate(&request)?;
        let store = self.store.as_ref();
        let closure = self.config.ring_closure;

        let grant = reference::grant_for(store, principal).await?;
        if let Some(id) = request.project_id {
            if !grant.allows_project(id) {
                return Err(SyncError::Forbidden(format!(
                    "project {id} is outside the caller's permissions"
                )));
            }
        }
        let categories = if grant.categories.is_some() {
            reference::covered_categories(&store.taxonomy_entries().await?, &grant)
        } else {
            None
        };
        let scope = WriteScope::new(grant.clone(), categories);

        let record: SyncSessionRecord = ledger::open(store, &request.device_id, principal).await?;

        let mut tx = store.begin().await?;

        let creates =
            uploader::apply_creates(tx.as_mut(), request.creates, principal, &scope, closure)
                .await?;
        let updates =
            uploader::apply_updates(tx.as_mut(), request.updates, principal, &scope, closure)
                .await?;
        let deletes = uploader::apply_deletes(tx.as_mut(), request.deletes, &scope).await?;

        let downloaded =
            delta::download(tx.as_mut(), request.last_sync_at, self.config.download_limit).await?;

        let reference = reference::resolve(
            store,
            ReferenceQuery {
                client_version: request.taxonomy_version.as_deref(),
                project_id: request.project_id,
                include_taxonomy: request.include_taxonomy,
                include_fields: request.include_fields,
            },
            &grant,
        )
        .await?;

        let projects = if request.include_projects {
            reference::visible_projects(store, principal, &grant).await?
        } else {
            Vec::new()
        };

        let outcomes = SyncOutcomes {
            creates: creates.outcome,
            updates: updates.outcome,
            deletes: deletes.outcome,
        };
        let downloaded_count = u32::try_from(downloaded.len()).unwrap_or(u32::MAX);
        ledger::close(tx.as_mut(), record.id, &outcomes, downloaded_count).await?;
        tx.commit().await?;
        let server_time = Utc::now();

        let mut errors = creates.errors;
        errors.extend(updates.errors);
        errors.extend(deletes.errors);

        tracing::info!(
            sync_id = %record.id,
            device_id = %record.device_id,
            uploaded = outcomes.creates.applied,
            updated = outcomes.updates.applied,
            deleted = outcomes.deletes.applied,
            skipped = outcomes.deletes.skipped,
            failed = errors.len(),
            downloaded = downloaded_count,
            taxonomy_changed = reference.changed,
            "sync session completed"
        );

        Ok(SyncResponse {
            success: errors.is_empty(),
            sync_id: record.id,
            server_time,
            uploaded: outcomes.creates.applied,
            updated: outcomes.updates.applied,
            deleted: outcomes.deletes.applied,
            outcomes,
            created: creates.created,
            downloaded,
            taxonomy_changed: reference.changed,
            taxonomy_version: reference.version.into(),
            taxonomy: reference.taxonomy,
            field_configs: reference.field_configs,
            projects,
            errors,
        })
    }

    /// Assemble the offline bootstrap package.
    pub async fn offline_package(
        &self,
        principal: &Principal,
        request: PackageRequest,
    ) -> Result<OfflinePackage, SyncError> {
        package::assemble(
            self.store.as_ref(),
            principal,
            request,
            self.config.package_point_limit,
        )
        .await
    }

    /// Sync health for `principal`.
    pub async fn status(
        &self,
        principal: &Principal,
        device_id: Option<&str>,
    ) -> Result<SyncStatus, SyncError> {
        Ok(ledger::status(self.store.as_ref(), principal, device_id).await?)
    }

    /// Sessions that never completed, newest first.
    pub async fn incomplete_sessions(
        &self,
        limit: usize,
    ) -> Result<Vec<SyncSessionRecord>, SyncError> {
        Ok(ledger::incomplete(self.store.as_ref(), limit).await?)
    }

    /// Apply a moderation action.
    pub async fn moderate(
        &self,
        principal: &Principal,
        id: Uuid,
        action: ModerationAction,
        comment: Option<String>,
    ) -> Result<ObservationView, SyncError> {
        moderation::moderate(self.store.as_ref(), principal, id, action, comment).await
    }
}
