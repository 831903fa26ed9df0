//! Repository for the `imported_records` table.
//!
//! Every query is scoped by organization and record kind. Functions take any
//! Postgres executor so they can run on the pool or inside a transaction.

use recordport_core::record::RecordKind;
use recordport_core::types::DbId;
use serde_json::Value;
use sqlx::PgExecutor;

use crate::models::imported_record::ImportedRecord;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, organization_id, kind, identity, data, \
    created_by, updated_by, created_at, updated_at";

/// Provides CRUD operations for imported records.
pub struct ImportedRecordRepo;

impl ImportedRecordRepo {
    /// Insert a new record, returning its id.
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        organization_id: DbId,
        kind: RecordKind,
        identity: &str,
        data: &Value,
        created_by: DbId,
    ) -> Result<DbId, sqlx::Error> {
        let row: (DbId,) = sqlx::query_as(
            "INSERT INTO imported_records (organization_id, kind, identity, data, created_by) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id",
        )
        .bind(organization_id)
        .bind(kind.as_str())
        .bind(identity)
        .bind(data)
        .bind(created_by)
        .fetch_one(executor)
        .await?;
        Ok(row.0)
    }

    /// Merge `data` into an existing record's JSONB object.
    ///
    /// `identity` replaces the stored identity when given. Returns `false`
    /// when no record matched.
    pub async fn merge_data<'e, E: PgExecutor<'e>>(
        executor: E,
        organization_id: DbId,
        kind: RecordKind,
        id: DbId,
        identity: Option<&str>,
        data: &Value,
        updated_by: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE imported_records \
             SET data = data || $4, identity = COALESCE($5, identity), \
                 updated_by = $6, updated_at = now() \
             WHERE id = $1 AND organization_id = $2 AND kind = $3",
        )
        .bind(id)
        .bind(organization_id)
        .bind(kind.as_str())
        .bind(data)
        .bind(identity)
        .bind(updated_by)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Records whose normalized identity is in `identities`, oldest first.
    pub async fn find_by_identities<'e, E: PgExecutor<'e>>(
        executor: E,
        organization_id: DbId,
        kind: RecordKind,
        identities: &[String],
    ) -> Result<Vec<ImportedRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM imported_records \
             WHERE organization_id = $1 AND kind = $2 AND identity = ANY($3) \
             ORDER BY id"
        );
        sqlx::query_as::<_, ImportedRecord>(&query)
            .bind(organization_id)
            .bind(kind.as_str())
            .bind(identities)
            .fetch_all(executor)
            .await
    }

    /// All records of one kind for an organization, oldest first.
    pub async fn list_by_kind<'e, E: PgExecutor<'e>>(
        executor: E,
        organization_id: DbId,
        kind: RecordKind,
    ) -> Result<Vec<ImportedRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM imported_records \
             WHERE organization_id = $1 AND kind = $2 \
             ORDER BY id"
        );
        sqlx::query_as::<_, ImportedRecord>(&query)
            .bind(organization_id)
            .bind(kind.as_str())
            .fetch_all(executor)
            .await
    }
}
