//! PostgreSQL-backed [`RecordStore`].
//!
//! `commit_batch` runs every write of a batch in one transaction, so a
//! failing write rolls back the whole batch.

use async_trait::async_trait;

use recordport_core::duplicate_detection::{ExistingRecordSummary, RecordWrite};
use recordport_core::record::{normalize_identity, RecordFields, RecordKind};
use recordport_core::store::{RecordStore, StoreError};
use recordport_core::types::{ActorContext, DbId};

use crate::models::imported_record::fields_to_json;
use crate::repositories::ImportedRecordRepo;
use crate::DbPool;

pub struct PgRecordStore {
    pool: DbPool,
}

impl PgRecordStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn identity_of(kind: RecordKind, fields: &RecordFields) -> Option<String> {
    fields
        .get(kind.identity_field())
        .map(|v| normalize_identity(v))
}

async fn insert_one<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    kind: RecordKind,
    fields: &RecordFields,
    actor: &ActorContext,
) -> Result<DbId, sqlx::Error> {
    ImportedRecordRepo::create(
        executor,
        actor.organization_id,
        kind,
        &identity_of(kind, fields).unwrap_or_default(),
        &fields_to_json(fields),
        actor.actor_id,
    )
    .await
}

async fn update_one<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    kind: RecordKind,
    id: DbId,
    fields: &RecordFields,
    actor: &ActorContext,
) -> Result<(), StoreError> {
    let updated = ImportedRecordRepo::merge_data(
        executor,
        actor.organization_id,
        kind,
        id,
        identity_of(kind, fields).as_deref(),
        &fields_to_json(fields),
        actor.actor_id,
    )
    .await
    .map_err(store_error)?;
    if updated {
        Ok(())
    } else {
        Err(StoreError::NotFound { kind, id })
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn insert(
        &self,
        kind: RecordKind,
        records: &[RecordFields],
        actor: &ActorContext,
    ) -> Result<Vec<DbId>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;
        let mut ids = Vec::with_capacity(records.len());
        for fields in records {
            ids.push(
                insert_one(&mut *tx, kind, fields, actor)
                    .await
                    .map_err(store_error)?,
            );
        }
        tx.commit().await.map_err(store_error)?;
        Ok(ids)
    }

    async fn update(
        &self,
        kind: RecordKind,
        id: DbId,
        fields: &RecordFields,
        actor: &ActorContext,
    ) -> Result<(), StoreError> {
        update_one(&self.pool, kind, id, fields, actor).await
    }

    async fn query_by_identity(
        &self,
        kind: RecordKind,
        identities: &[String],
        actor: &ActorContext,
    ) -> Result<Vec<ExistingRecordSummary>, StoreError> {
        let normalized: Vec<String> = identities.iter().map(|i| normalize_identity(i)).collect();
        let rows = ImportedRecordRepo::find_by_identities(
            &self.pool,
            actor.organization_id,
            kind,
            &normalized,
        )
        .await
        .map_err(store_error)?;
        Ok(rows.iter().filter_map(|row| row.to_summary()).collect())
    }

    async fn commit_batch(
        &self,
        kind: RecordKind,
        writes: &[RecordWrite],
        actor: &ActorContext,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;
        for write in writes {
            match write {
                RecordWrite::Insert { record } => {
                    insert_one(&mut *tx, kind, &record.fields(), actor)
                        .await
                        .map_err(store_error)?;
                }
                RecordWrite::Update {
                    existing_id, fields, ..
                } => update_one(&mut *tx, kind, *existing_id, fields, actor).await?,
            }
        }
        tx.commit().await.map_err(store_error)?;
        tracing::debug!(
            kind = %kind,
            organization_id = actor.organization_id,
            writes = writes.len(),
            "Batch transaction committed",
        );
        Ok(())
    }
}

/// Classify a database error for the pipeline's retry policy.
pub fn store_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) => {
            let code = db.code().map(|c| c.into_owned()).unwrap_or_default();
            match code.as_str() {
                c if c.starts_with("23") => StoreError::Constraint(db.message().to_string()),
                "42501" => StoreError::Unauthorized(db.message().to_string()),
                // serialization_failure, deadlock_detected, admin/crash shutdown
                "40001" | "40P01" | "57P01" | "57P02" | "57P03" => {
                    StoreError::Unavailable(db.message().to_string())
                }
                _ => StoreError::Other(err.to_string()),
            }
        }
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
        _ => StoreError::Other(err.to_string()),
    }
}
