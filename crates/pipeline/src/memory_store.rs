//! In-process [`RecordStore`] used by tests and dry runs.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use recordport_core::duplicate_detection::{ExistingRecordSummary, RecordWrite};
use recordport_core::record::{normalize_identity, RecordFields, RecordKind};
use recordport_core::store::{RecordStore, StoreError};
use recordport_core::types::{ActorContext, DbId};

/// A record as held by [`InMemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub id: DbId,
    pub organization_id: DbId,
    pub kind: RecordKind,
    pub identity: String,
    pub fields: RecordFields,
    pub created_by: DbId,
    pub updated_by: Option<DbId>,
}

#[derive(Default)]
struct MemoryState {
    next_id: DbId,
    records: BTreeMap<DbId, StoredRecord>,
}

impl MemoryState {
    fn insert(&mut self, kind: RecordKind, fields: &RecordFields, actor: &ActorContext) -> DbId {
        self.next_id += 1;
        let id = self.next_id;
        let identity = fields
            .get(kind.identity_field())
            .map(|v| normalize_identity(v))
            .unwrap_or_default();
        self.records.insert(
            id,
            StoredRecord {
                id,
                organization_id: actor.organization_id,
                kind,
                identity,
                fields: fields.clone(),
                created_by: actor.actor_id,
                updated_by: None,
            },
        );
        id
    }

    fn find_mut(
        &mut self,
        kind: RecordKind,
        id: DbId,
        actor: &ActorContext,
    ) -> Result<&mut StoredRecord, StoreError> {
        self.records
            .get_mut(&id)
            .filter(|r| r.kind == kind && r.organization_id == actor.organization_id)
            .ok_or(StoreError::NotFound { kind, id })
    }

    fn update(
        &mut self,
        kind: RecordKind,
        id: DbId,
        fields: &RecordFields,
        actor: &ActorContext,
    ) -> Result<(), StoreError> {
        let record = self.find_mut(kind, id, actor)?;
        record
            .fields
            .extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        if let Some(identity) = fields.get(kind.identity_field()) {
            record.identity = normalize_identity(identity);
        }
        record.updated_by = Some(actor.actor_id);
        Ok(())
    }
}

/// Thread-safe in-memory record store, scoped by organization.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pre-existing record outside of any import.
    pub async fn seed(&self, kind: RecordKind, fields: RecordFields, actor: &ActorContext) -> DbId {
        self.state.write().await.insert(kind, &fields, actor)
    }

    /// All records of `kind` for the actor's organization, in id order.
    pub async fn records(&self, kind: RecordKind, actor: &ActorContext) -> Vec<StoredRecord> {
        self.state
            .read()
            .await
            .records
            .values()
            .filter(|r| r.kind == kind && r.organization_id == actor.organization_id)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn insert(
        &self,
        kind: RecordKind,
        records: &[RecordFields],
        actor: &ActorContext,
    ) -> Result<Vec<DbId>, StoreError> {
        let mut state = self.state.write().await;
        Ok(records
            .iter()
            .map(|fields| state.insert(kind, fields, actor))
            .collect())
    }

    async fn update(
        &self,
        kind: RecordKind,
        id: DbId,
        fields: &RecordFields,
        actor: &ActorContext,
    ) -> Result<(), StoreError> {
        self.state.write().await.update(kind, id, fields, actor)
    }

    async fn query_by_identity(
        &self,
        kind: RecordKind,
        identities: &[String],
        actor: &ActorContext,
    ) -> Result<Vec<ExistingRecordSummary>, StoreError> {
        let wanted: HashSet<String> = identities.iter().map(|i| normalize_identity(i)).collect();
        Ok(self
            .state
            .read()
            .await
            .records
            .values()
            .filter(|r| {
                r.kind == kind
                    && r.organization_id == actor.organization_id
                    && wanted.contains(&r.identity)
            })
            .map(|r| ExistingRecordSummary {
                id: r.id,
                kind: r.kind,
                identity: r.identity.clone(),
                fields: r.fields.clone(),
            })
            .collect())
    }

    /// Checks every update target before writing anything, so a batch with
    /// a missing target leaves the store untouched.
    async fn commit_batch(
        &self,
        kind: RecordKind,
        writes: &[RecordWrite],
        actor: &ActorContext,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        for write in writes {
            if let RecordWrite::Update { existing_id, .. } = write {
                state.find_mut(kind, *existing_id, actor)?;
            }
        }
        for write in writes {
            match write {
                RecordWrite::Insert { record } => {
                    state.insert(kind, &record.fields(), actor);
                }
                RecordWrite::Update {
                    existing_id, fields, ..
                } => state.update(kind, *existing_id, fields, actor)?,
            }
        }
        Ok(())
    }
}
