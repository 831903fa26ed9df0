//! Migration session: the orchestrator of one import run.
//!
//! A [`MigrationSession`] owns every transient value of a run (parsed rows,
//! mappings, validation outcome, duplicate matches, resolutions, summary)
//! and sequences calls into the core stages. State transitions go through
//! the guards in [`recordport_core::migration_state`].

use std::collections::BTreeSet;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use recordport_core::batching::{format_rows, LogEntry, LogLevel, MigrationSummary};
use recordport_core::duplicate_detection::{
    apply_overrides, build_commit_plan, default_resolutions, detect, CommitPlan, DuplicateMatch,
    DuplicateStrategy, Resolution, ResolutionOverride,
};
use recordport_core::field_mapping::{
    apply_override, remap_row, suggest_mappings, unmapped_required_fields, FieldMapping,
};
use recordport_core::migration_state::{
    check_advance, check_back, terminal_state, GuardContext, MigrationFlow, MigrationState,
};
use recordport_core::record::ValidatedRecord;
use recordport_core::store::RecordStore;
use recordport_core::tabular::{parse, ColumnSet, ParseOptions, ParsedTable, RawRow};
use recordport_core::types::{ActorContext, RowIndex};
use recordport_core::validation::{
    find_repeated_identities, validate_rows, ImportKind, RowValidator, ValidationOutcome,
};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::executor::{BatchCommitExecutor, BatchProgress};

pub struct MigrationSession {
    id: Uuid,
    kind: ImportKind,
    flow: MigrationFlow,
    state: MigrationState,
    actor: ActorContext,
    config: PipelineConfig,
    table: Option<ParsedTable>,
    mappings: Vec<FieldMapping>,
    outcome: ValidationOutcome,
    excluded_rows: BTreeSet<RowIndex>,
    strategy: DuplicateStrategy,
    matches: Vec<DuplicateMatch>,
    resolutions: Vec<Resolution>,
    summary: Option<MigrationSummary>,
    log: Vec<LogEntry>,
}

impl MigrationSession {
    pub fn new(kind: ImportKind, actor: ActorContext, config: PipelineConfig) -> Self {
        let strategy = config.duplicate_strategy;
        Self {
            id: Uuid::now_v7(),
            kind,
            flow: kind.flow(),
            state: MigrationState::Uploading,
            actor,
            config,
            table: None,
            mappings: Vec::new(),
            outcome: ValidationOutcome::default(),
            excluded_rows: BTreeSet::new(),
            strategy,
            matches: Vec::new(),
            resolutions: Vec::new(),
            summary: None,
            log: Vec::new(),
        }
    }

    // -- accessors --

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> ImportKind {
        self.kind
    }

    pub fn flow(&self) -> MigrationFlow {
        self.flow
    }

    pub fn state(&self) -> MigrationState {
        self.state
    }

    pub fn actor(&self) -> &ActorContext {
        &self.actor
    }

    pub fn columns(&self) -> Option<&ColumnSet> {
        self.table.as_ref().map(|t| &t.columns)
    }

    pub fn mappings(&self) -> &[FieldMapping] {
        &self.mappings
    }

    pub fn outcome(&self) -> &ValidationOutcome {
        &self.outcome
    }

    pub fn duplicate_strategy(&self) -> DuplicateStrategy {
        self.strategy
    }

    pub fn matches(&self) -> &[DuplicateMatch] {
        &self.matches
    }

    pub fn resolutions(&self) -> &[Resolution] {
        &self.resolutions
    }

    pub fn summary(&self) -> Option<&MigrationSummary> {
        self.summary.as_ref()
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    fn validator(&self) -> &'static dyn RowValidator {
        self.kind.validator()
    }

    // -- stage: upload --

    /// Parse and validate an uploaded file. Replaces any previous upload.
    ///
    /// Foreign-source kinds are validated through the suggested column
    /// mappings; native kinds validate the raw rows directly.
    pub fn upload(
        &mut self,
        bytes: &[u8],
        options: &ParseOptions,
    ) -> Result<&ValidationOutcome, PipelineError> {
        self.require_state(&[MigrationState::Uploading], "upload a file")?;

        let table = parse(bytes, options).inspect_err(|e| {
            tracing::warn!(migration_id = %self.id, error = %e, "Upload rejected");
        })?;

        let validator = self.validator();
        self.mappings = suggest_mappings(&table.columns, validator.schema(), validator.column_patterns());
        self.table = Some(table);
        self.excluded_rows.clear();
        self.clear_duplicates();
        self.revalidate();

        let rows = self.outcome.total_rows;
        let valid = self.outcome.valid_count();
        let invalid = self.outcome.invalid_rows().len();
        self.push_log(
            LogLevel::Info,
            format!("File parsed: {rows} row(s), {valid} valid, {invalid} with errors"),
        );
        tracing::info!(
            migration_id = %self.id,
            kind = %self.kind,
            rows,
            valid,
            invalid,
            "File uploaded",
        );

        for repeated in find_repeated_identities(&self.outcome.records) {
            tracing::warn!(
                migration_id = %self.id,
                identity = %repeated.identity,
                rows = ?repeated.row_indices,
                "Identity repeated within file",
            );
            self.push_log(
                LogLevel::Warning,
                format!(
                    "'{}' appears on rows {}",
                    repeated.identity,
                    format_rows(&repeated.row_indices)
                ),
            );
        }

        Ok(&self.outcome)
    }

    fn revalidate(&mut self) {
        let Some(table) = &self.table else {
            self.outcome = ValidationOutcome::default();
            return;
        };
        let validator = self.kind.validator();
        self.outcome = match self.flow {
            MigrationFlow::Full => {
                let rows: Vec<RawRow> = table
                    .rows
                    .iter()
                    .map(|row| remap_row(row, &self.mappings))
                    .collect();
                validate_rows(validator, &rows)
            }
            MigrationFlow::Simple => validate_rows(validator, &table.rows),
        };
    }

    // -- stage: mapping --

    /// Point a source column at a target field (or unmap it with `None`)
    /// and re-validate.
    pub fn override_mapping(
        &mut self,
        source_column: &str,
        target_field: Option<&str>,
    ) -> Result<&[FieldMapping], PipelineError> {
        self.require_state(&[MigrationState::Mapping], "change column mappings")?;

        self.mappings = apply_override(
            &self.mappings,
            self.validator().schema(),
            source_column,
            target_field,
        )?;
        self.revalidate();
        if !self.excluded_rows.is_empty() {
            self.excluded_rows.clear();
            self.push_log(
                LogLevel::Info,
                "Row exclusions cleared; the file was re-validated".to_string(),
            );
        }
        self.push_log(
            LogLevel::Info,
            format!(
                "Column '{source_column}' mapped to {}",
                target_field.unwrap_or("nothing")
            ),
        );
        Ok(&self.mappings)
    }

    pub fn unmapped_required_fields(&self) -> Vec<String> {
        match self.flow {
            MigrationFlow::Full => unmapped_required_fields(&self.mappings, self.validator().schema()),
            MigrationFlow::Simple => Vec::new(),
        }
    }

    // -- stage: configuring --

    /// Change the default duplicate strategy. Existing resolutions are
    /// reset to the new default.
    pub fn set_duplicate_strategy(&mut self, strategy: DuplicateStrategy) -> Result<(), PipelineError> {
        self.require_not_finished("change the duplicate strategy")?;
        self.strategy = strategy;
        self.resolutions = default_resolutions(&self.matches, strategy);
        self.push_log(
            LogLevel::Info,
            format!("Duplicate strategy set to {}", strategy.as_str()),
        );
        Ok(())
    }

    // -- stage: previewing --

    /// Replace the action (and optionally the fields) of one or more matches.
    pub fn override_resolutions(
        &mut self,
        overrides: &[ResolutionOverride],
    ) -> Result<&[Resolution], PipelineError> {
        self.require_state(&[MigrationState::Previewing], "override duplicate resolutions")?;
        self.resolutions = apply_overrides(&self.resolutions, &self.matches, overrides)?;
        let count: usize = overrides.iter().map(|o| o.match_keys.len()).sum();
        self.push_log(LogLevel::Info, format!("{count} duplicate resolution(s) overridden"));
        Ok(&self.resolutions)
    }

    /// Acknowledge every row that still has validation errors; those rows
    /// are left out of the commit.
    pub fn exclude_invalid_rows(&mut self) -> Result<usize, PipelineError> {
        self.require_state(
            &[MigrationState::Uploading, MigrationState::Previewing],
            "exclude invalid rows",
        )?;
        let invalid = self.outcome.invalid_rows();
        let newly: Vec<RowIndex> = invalid.difference(&self.excluded_rows).copied().collect();
        if !newly.is_empty() {
            self.push_log(
                LogLevel::Warning,
                format!("{} row(s) excluded: rows {}", newly.len(), format_rows(&newly)),
            );
            tracing::warn!(
                migration_id = %self.id,
                excluded = newly.len(),
                "Invalid rows excluded",
            );
        }
        self.excluded_rows.extend(newly.iter().copied());
        Ok(newly.len())
    }

    /// Validation errors on rows that have not been excluded.
    pub fn outstanding_errors(&self) -> usize {
        self.outcome
            .errors
            .iter()
            .filter(|e| !self.excluded_rows.contains(&e.row_index))
            .count()
    }

    // -- transitions --

    fn guard_context(&self) -> GuardContext {
        // Foreign rows can only validate once their columns are mapped.
        let validated_records = match (self.flow, self.state) {
            (MigrationFlow::Full, MigrationState::Uploading) => self.outcome.total_rows,
            _ => self.outcome.valid_count(),
        };
        GuardContext {
            validated_records,
            unmapped_required: self.unmapped_required_fields(),
            outstanding_errors: self.outstanding_errors(),
        }
    }

    /// Whether [`advance`](Self::advance) (or [`commit`](Self::commit) from
    /// the preview stage) would be allowed right now.
    pub fn can_advance(&self) -> bool {
        check_advance(self.flow, self.state, &self.guard_context()).is_ok()
    }

    /// Move one stage forward. Entering the preview stage runs duplicate
    /// detection against `store`. Leaving the preview stage is done by
    /// [`commit`](Self::commit).
    pub async fn advance(&mut self, store: &dyn RecordStore) -> Result<MigrationState, PipelineError> {
        if self.state == MigrationState::Previewing {
            return Err(PipelineError::InvalidState(
                "the preview stage is left by committing".into(),
            ));
        }
        let next = check_advance(self.flow, self.state, &self.guard_context())?;
        if next == MigrationState::Previewing {
            self.detect_duplicates(store).await?;
        }
        self.transition(next);
        Ok(next)
    }

    /// Move one stage back. Entered configuration is kept.
    pub fn back(&mut self) -> Result<MigrationState, PipelineError> {
        let previous = check_back(self.flow, self.state)?;
        self.transition(previous);
        Ok(previous)
    }

    /// Discard everything and return to the upload stage.
    pub fn restart(&mut self) {
        let previous = self.state;
        *self = Self {
            id: self.id,
            ..Self::new(self.kind, self.actor, self.config.clone())
        };
        tracing::info!(migration_id = %self.id, from = %previous, "Migration restarted");
        self.push_log(LogLevel::Info, format!("Restarted from {previous}"));
    }

    fn transition(&mut self, to: MigrationState) {
        tracing::info!(
            migration_id = %self.id,
            from = %self.state,
            to = %to,
            "Migration state changed",
        );
        self.push_log(LogLevel::Info, format!("{} -> {}", self.state, to));
        self.state = to;
    }

    // -- duplicate detection --

    async fn detect_duplicates(&mut self, store: &dyn RecordStore) -> Result<(), PipelineError> {
        let previous = std::mem::take(&mut self.resolutions);
        self.clear_duplicates();
        if !self.config.detect_duplicates {
            return Ok(());
        }

        let identities: Vec<String> = self
            .outcome
            .records
            .iter()
            .filter_map(ValidatedRecord::identity)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if identities.is_empty() {
            return Ok(());
        }

        let existing = store
            .query_by_identity(self.kind.record_kind(), &identities, &self.actor)
            .await
            .inspect_err(|e| {
                tracing::warn!(migration_id = %self.id, error = %e, "Duplicate lookup failed");
            })?;

        self.matches = detect(&self.outcome.records, &existing);
        // Decisions entered before going back survive for matches still found.
        self.resolutions = default_resolutions(&self.matches, self.strategy)
            .into_iter()
            .map(|default| {
                previous
                    .iter()
                    .find(|r| r.match_key == default.match_key)
                    .cloned()
                    .unwrap_or(default)
            })
            .collect();

        if !self.matches.is_empty() {
            tracing::info!(
                migration_id = %self.id,
                matches = self.matches.len(),
                strategy = self.strategy.as_str(),
                "Duplicates detected",
            );
            self.push_log(
                LogLevel::Warning,
                format!(
                    "{} possible duplicate(s) found; default action: {}",
                    self.matches.len(),
                    self.strategy.as_str()
                ),
            );
        }
        Ok(())
    }

    fn clear_duplicates(&mut self) {
        self.matches.clear();
        self.resolutions.clear();
    }

    // -- commit --

    /// Commit the resolved records and move to `Completed` or `Failed`.
    ///
    /// Only valid from the preview stage with no outstanding errors. Batch
    /// failures do not make this return an error; they are in the summary.
    pub async fn commit(
        &mut self,
        store: &dyn RecordStore,
        progress: Option<mpsc::Sender<BatchProgress>>,
        cancel: CancellationToken,
    ) -> Result<&MigrationSummary, PipelineError> {
        if self.state != MigrationState::Previewing {
            return Err(PipelineError::InvalidState(format!(
                "cannot commit from the {} stage",
                self.state
            )));
        }
        let next = check_advance(self.flow, self.state, &self.guard_context())?;
        self.transition(next);

        let plan = self.commit_plan();
        let executor = BatchCommitExecutor::new(store, self.config.executor_options(self.kind));
        let mut summary = executor
            .commit(
                self.id,
                self.kind.record_kind(),
                plan,
                &self.actor,
                progress.as_ref(),
                &cancel,
            )
            .await;

        let terminal = terminal_state(summary.batches_submitted(), summary.batches_succeeded);
        if terminal == MigrationState::Failed {
            tracing::error!(
                migration_id = %self.id,
                failed = summary.total_failed,
                "Migration failed: no batch committed",
            );
        }
        self.transition(terminal);

        let mut log = std::mem::take(&mut self.log);
        log.append(&mut summary.log);
        summary.log = log.clone();
        self.log = log;

        Ok(self.summary.insert(summary))
    }

    /// Writes the commit would issue right now.
    pub fn commit_plan(&self) -> CommitPlan {
        build_commit_plan(self.outcome.records.clone(), &self.matches, &self.resolutions)
    }

    // -- helpers --

    fn require_state(&self, allowed: &[MigrationState], action: &str) -> Result<(), PipelineError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(PipelineError::InvalidState(format!(
                "cannot {action} in the {} stage",
                self.state
            )))
        }
    }

    fn require_not_finished(&self, action: &str) -> Result<(), PipelineError> {
        if self.state.is_terminal() || self.state == MigrationState::Committing {
            Err(PipelineError::InvalidState(format!(
                "cannot {action} in the {} stage",
                self.state
            )))
        } else {
            Ok(())
        }
    }

    fn push_log(&mut self, level: LogLevel, message: String) {
        self.log.push(LogEntry::new(level, message));
    }
}
