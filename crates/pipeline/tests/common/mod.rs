#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use recordport_core::duplicate_detection::{ExistingRecordSummary, RecordWrite};
use recordport_core::record::{RecordFields, RecordKind, ValidatedRecord};
use recordport_core::store::{RecordStore, StoreError};
use recordport_core::tabular::{parse, ParseOptions};
use recordport_core::types::{ActorContext, DbId};
use recordport_core::validation::{validate_rows, ImportKind};
use recordport_pipeline::{InMemoryStore, PipelineConfig};

/// Actor of organization 1 used by every test unless stated otherwise.
pub fn actor() -> ActorContext {
    ActorContext::new(1, 42)
}

/// Config with no pauses, so tests never sleep.
pub fn fast_config() -> PipelineConfig {
    PipelineConfig {
        invitation_delay: std::time::Duration::ZERO,
        ..PipelineConfig::default()
    }
}

pub fn fields(pairs: &[(&str, &str)]) -> RecordFields {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Native contact CSV with `count` valid rows: `Contact N`, `contactN@example.com`.
pub fn contact_csv(count: usize) -> String {
    let mut csv = String::from("name,email,phone\n");
    for n in 1..=count {
        csv.push_str(&format!("Contact {n},contact{n}@example.com,600000{n:03}\n"));
    }
    csv
}

/// Validated contact records for `contact_csv(count)`.
pub fn contact_records(count: usize) -> Vec<ValidatedRecord> {
    let table = parse(contact_csv(count).as_bytes(), &ParseOptions::default())
        .expect("fixture csv parses");
    let outcome = validate_rows(ImportKind::Contact.validator(), &table.rows);
    assert!(outcome.is_clean(), "fixture rows are valid");
    outcome.records
}

/// Wraps an [`InMemoryStore`] and fails chosen `commit_batch` calls.
///
/// Calls are counted from zero across the lifetime of the store.
pub struct FlakyStore {
    pub inner: InMemoryStore,
    failing_calls: HashSet<usize>,
    error: StoreError,
    calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new(failing_calls: &[usize], error: StoreError) -> Self {
        Self {
            inner: InMemoryStore::new(),
            failing_calls: failing_calls.iter().copied().collect(),
            error,
            calls: AtomicUsize::new(0),
        }
    }

    /// A store that never fails.
    pub fn reliable() -> Self {
        Self::new(&[], StoreError::Other("unused".into()))
    }

    pub fn commit_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn insert(
        &self,
        kind: RecordKind,
        records: &[RecordFields],
        actor: &ActorContext,
    ) -> Result<Vec<DbId>, StoreError> {
        self.inner.insert(kind, records, actor).await
    }

    async fn update(
        &self,
        kind: RecordKind,
        id: DbId,
        fields: &RecordFields,
        actor: &ActorContext,
    ) -> Result<(), StoreError> {
        self.inner.update(kind, id, fields, actor).await
    }

    async fn query_by_identity(
        &self,
        kind: RecordKind,
        identities: &[String],
        actor: &ActorContext,
    ) -> Result<Vec<ExistingRecordSummary>, StoreError> {
        self.inner.query_by_identity(kind, identities, actor).await
    }

    async fn commit_batch(
        &self,
        kind: RecordKind,
        writes: &[RecordWrite],
        actor: &ActorContext,
    ) -> Result<(), StoreError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_calls.contains(&call) {
            return Err(self.error.clone());
        }
        self.inner.commit_batch(kind, writes, actor).await
    }
}
