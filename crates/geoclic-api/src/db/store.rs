//! [`PgStore`]: the sync storage ports on PostgreSQL.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use geoclic_core::{
    DynamicFieldConfig, Observation, ObservationStatus, PermissionGrant, Project, TaxonomyEntry,
    ValidatedPatch,
};
use geoclic_sync::{
    DeleteOutcome, RadiusFilter, SavepointId, StoreError, SyncOutcomes, SyncSessionRecord,
    SyncStore, SyncTransaction,
};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{observations, reference, sessions, store_error};

/// Storage handle backed by a connection pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// One session transaction. Dropping it without commit rolls back.
pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
    next_savepoint: u32,
}

impl PgTransaction {
    async fn exec(&mut self, sql: &str) -> Result<(), StoreError> {
        sqlx::query(sql)
            .execute(&mut *self.tx)
            .await
            .map_err(store_error)?;
        Ok(())
    }
}

#[async_trait]
impl SyncStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn SyncTransaction>, StoreError> {
        let tx = self.pool.begin().await.map_err(store_error)?;
        Ok(Box::new(PgTransaction {
            tx,
            next_savepoint: 0,
        }))
    }

    async fn open_session(&self, record: &SyncSessionRecord) -> Result<(), StoreError> {
        sessions::open(&self.pool, record).await
    }

    async fn last_completed_session(
        &self,
        user_id: Uuid,
        device_id: Option<&str>,
    ) -> Result<Option<SyncSessionRecord>, StoreError> {
        sessions::last_completed(&self.pool, user_id, device_id).await
    }

    async fn incomplete_sessions(&self, limit: usize) -> Result<Vec<SyncSessionRecord>, StoreError> {
        sessions::incomplete(&self.pool, limit).await
    }

    async fn taxonomy_entries(&self) -> Result<Vec<TaxonomyEntry>, StoreError> {
        reference::taxonomy_entries(&self.pool).await
    }

    async fn field_configs(&self) -> Result<Vec<DynamicFieldConfig>, StoreError> {
        reference::field_configs(&self.pool).await
    }

    async fn projects(&self) -> Result<Vec<Project>, StoreError> {
        reference::projects(&self.pool).await
    }

    async fn project(&self, id: Uuid) -> Result<Option<Project>, StoreError> {
        reference::project(&self.pool, id).await
    }

    async fn permissions_for(&self, user_id: Uuid) -> Result<PermissionGrant, StoreError> {
        reference::permissions_for(&self.pool, user_id).await
    }

    async fn project_observations(
        &self,
        project_id: Uuid,
        radius: Option<RadiusFilter>,
        categories: Option<&BTreeSet<String>>,
        limit: usize,
    ) -> Result<(Vec<Observation>, u64), StoreError> {
        observations::for_project(&self.pool, project_id, radius, categories, limit).await
    }

    async fn count_changed_since(&self, since: Option<DateTime<Utc>>) -> Result<u64, StoreError> {
        observations::count_changed_since(&self.pool, since).await
    }
}

#[async_trait]
impl SyncTransaction for PgTransaction {
    async fn savepoint(&mut self) -> Result<SavepointId, StoreError> {
        self.next_savepoint += 1;
        let sp = SavepointId(self.next_savepoint);
        self.exec(&format!("SAVEPOINT {}", sp.name())).await?;
        Ok(sp)
    }

    async fn release_savepoint(&mut self, sp: SavepointId) -> Result<(), StoreError> {
        self.exec(&format!("RELEASE SAVEPOINT {}", sp.name())).await
    }

    async fn rollback_to_savepoint(&mut self, sp: SavepointId) -> Result<(), StoreError> {
        self.exec(&format!("ROLLBACK TO SAVEPOINT {}", sp.name())).await
    }

    async fn insert_observation(&mut self, obs: &Observation) -> Result<(), StoreError> {
        observations::insert(&mut *self.tx, obs).await
    }

    async fn observation(&mut self, id: Uuid) -> Result<Option<Observation>, StoreError> {
        observations::get_by_id(&mut *self.tx, id).await
    }

    async fn apply_patch(
        &mut self,
        id: Uuid,
        patch: &ValidatedPatch,
        editor: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        observations::apply_patch(&mut *self.tx, id, patch, editor, at).await
    }

    async fn delete_draft(&mut self, id: Uuid) -> Result<DeleteOutcome, StoreError> {
        observations::delete_draft(&mut *self.tx, id).await
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
        observations::set_status(&mut *self.tx, id, from, to, rejection_comment, editor, at).await
    }

    async fn changed_since(
        &mut self,
        cursor: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Observation>, StoreError> {
        observations::changed_since(&mut *self.tx, cursor, limit).await
    }

    async fn close_session(
        &mut self,
        id: Uuid,
        outcomes: &SyncOutcomes,
        downloaded: u32,
        completed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sessions::close(&mut *self.tx, id, outcomes, downloaded, completed_at).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let PgTransaction { tx, .. } = *self;
        tx.commit().await.map_err(store_error)
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let PgTransaction { tx, .. } = *self;
        tx.rollback().await.map_err(store_error)
    }
}
