//! Duplicate detection against existing records, and resolution planning.
//!
//! Detection matches incoming records to existing ones by identity and scores
//! the agreement of secondary fields. Resolution turns the matches plus a
//! default strategy and user overrides into a [`CommitPlan`]. Nothing here
//! touches the store.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::record::{normalize_identity, RecordFields, RecordKind, ValidatedRecord};
use crate::types::{DbId, RowIndex};

// ---------------------------------------------------------------------------
// Threshold constants
// ---------------------------------------------------------------------------

pub const HIGH_CONFIDENCE_THRESHOLD: u8 = 90;
pub const MEDIUM_CONFIDENCE_THRESHOLD: u8 = 70;

/// Score floor for an identity match; secondary agreement adds up to 10.
const IDENTITY_MATCH_BASE: f64 = 90.0;
const SECONDARY_WEIGHT: f64 = 10.0;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What the store returns about a record that already exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingRecordSummary {
    pub id: DbId,
    pub kind: RecordKind,
    pub identity: String,
    pub fields: RecordFields,
}

/// UI emphasis tier for a similarity score. Does not affect behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    pub fn from_score(score: u8) -> Self {
        if score >= HIGH_CONFIDENCE_THRESHOLD {
            Self::High
        } else if score >= MEDIUM_CONFIDENCE_THRESHOLD {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConflict {
    pub field: String,
    pub incoming_value: String,
    pub existing_value: String,
}

/// Best existing match for one incoming record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateMatch {
    pub incoming: ValidatedRecord,
    pub existing: ExistingRecordSummary,
    /// 0..=100.
    pub similarity_score: u8,
    pub matching_fields: Vec<String>,
    pub conflicting_fields: Vec<FieldConflict>,
}

impl DuplicateMatch {
    /// Stable key tying a resolution to this match.
    pub fn match_key(&self) -> String {
        format!("{}:{}", self.incoming.row_index(), self.existing.id)
    }

    pub fn tier(&self) -> ConfidenceTier {
        ConfidenceTier::from_score(self.similarity_score)
    }
}

// ---------------------------------------------------------------------------
// Similarity
// ---------------------------------------------------------------------------

/// Case- and whitespace-insensitive comparison form of a value.
pub fn normalize_value(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn digits(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

fn is_phone_field(field: &str) -> bool {
    field.contains("phone")
}

/// Similarity of two values of the same field in `[0.0, 1.0]`.
///
/// Phone-like fields compare their digits exactly; everything else uses
/// Jaro-Winkler over the normalized text.
pub fn field_similarity(field: &str, a: &str, b: &str) -> f64 {
    if is_phone_field(field) {
        let (da, db) = (digits(a), digits(b));
        return if !da.is_empty() && da == db { 1.0 } else { 0.0 };
    }
    strsim::jaro_winkler(&normalize_value(a), &normalize_value(b))
}

/// Score an identity match by the agreement of secondary fields.
///
/// Fields missing on either side are not compared. With nothing to compare
/// the agreement is full, so an identity match alone scores 100.
pub fn similarity_score(incoming: &RecordFields, existing: &RecordFields, comparable: &[&str]) -> u8 {
    let similarities: Vec<f64> = comparable
        .iter()
        .filter_map(|field| {
            let a = incoming.get(*field)?;
            let b = existing.get(*field)?;
            Some(field_similarity(field, a, b))
        })
        .collect();

    let agreement = if similarities.is_empty() {
        1.0
    } else {
        similarities.iter().sum::<f64>() / similarities.len() as f64
    };

    (IDENTITY_MATCH_BASE + SECONDARY_WEIGHT * agreement)
        .round()
        .clamp(0.0, 100.0) as u8
}

/// Compare one incoming record to one existing record.
///
/// Returns `None` unless both carry the same normalized identity.
pub fn compare(incoming: &ValidatedRecord, existing: &ExistingRecordSummary) -> Option<DuplicateMatch> {
    let identity = incoming.identity()?;
    if incoming.kind() != existing.kind || normalize_identity(&existing.identity) != identity {
        return None;
    }

    let kind = incoming.kind();
    let incoming_fields = incoming.fields();
    let score = similarity_score(&incoming_fields, &existing.fields, kind.comparable_fields());

    let mut matching_fields = Vec::new();
    let mut conflicting_fields = Vec::new();
    for (field, incoming_value) in &incoming_fields {
        let Some(existing_value) = existing.fields.get(field) else {
            continue;
        };
        if normalize_value(incoming_value) == normalize_value(existing_value) {
            matching_fields.push(field.clone());
        } else {
            conflicting_fields.push(FieldConflict {
                field: field.clone(),
                incoming_value: incoming_value.clone(),
                existing_value: existing_value.clone(),
            });
        }
    }
    if !matching_fields.iter().any(|f| f == kind.identity_field()) {
        matching_fields.insert(0, kind.identity_field().to_string());
    }

    Some(DuplicateMatch {
        incoming: incoming.clone(),
        existing: existing.clone(),
        similarity_score: score,
        matching_fields,
        conflicting_fields,
    })
}

/// Find the best existing match for each incoming record.
///
/// Records without an identity, or without any candidate, are absent from
/// the result. Ties go to the lowest existing id.
pub fn detect(incoming: &[ValidatedRecord], existing: &[ExistingRecordSummary]) -> Vec<DuplicateMatch> {
    let mut by_identity: HashMap<(RecordKind, String), Vec<&ExistingRecordSummary>> = HashMap::new();
    for summary in existing {
        by_identity
            .entry((summary.kind, normalize_identity(&summary.identity)))
            .or_default()
            .push(summary);
    }

    incoming
        .iter()
        .filter_map(|record| {
            let identity = record.identity()?;
            let candidates = by_identity.get(&(record.kind(), identity))?;
            candidates
                .iter()
                .filter_map(|candidate| compare(record, candidate))
                .max_by(|a, b| {
                    a.similarity_score
                        .cmp(&b.similarity_score)
                        .then_with(|| b.existing.id.cmp(&a.existing.id))
                })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Default action applied to every match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateStrategy {
    #[default]
    Skip,
    Update,
    CreateNew,
}

impl DuplicateStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Update => "update",
            Self::CreateNew => "create_new",
        }
    }

    pub fn action(&self) -> ResolutionAction {
        match self {
            Self::Skip => ResolutionAction::Skip,
            Self::Update => ResolutionAction::Update,
            Self::CreateNew => ResolutionAction::CreateNew,
        }
    }
}

impl std::str::FromStr for DuplicateStrategy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "update" => Ok(Self::Update),
            "create_new" => Ok(Self::CreateNew),
            other => Err(CoreError::Validation(format!(
                "Invalid duplicate strategy '{other}'. Must be one of: skip, update, create_new"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionAction {
    Skip,
    Update,
    CreateNew,
    Merge,
}

/// Decision for one match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub match_key: String,
    pub action: ResolutionAction,
    pub fields_to_apply: Vec<String>,
}

/// User decision applied to one or more matches at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionOverride {
    pub match_keys: Vec<String>,
    pub action: ResolutionAction,
    /// Replaces `fields_to_apply` when set; otherwise the current list is kept.
    #[serde(default)]
    pub fields_to_apply: Option<Vec<String>>,
}

/// One resolution per match, all with the strategy's action and
/// `fields_to_apply` pre-filled from the conflicting fields.
pub fn default_resolutions(matches: &[DuplicateMatch], strategy: DuplicateStrategy) -> Vec<Resolution> {
    matches
        .iter()
        .map(|m| Resolution {
            match_key: m.match_key(),
            action: strategy.action(),
            fields_to_apply: m.conflicting_fields.iter().map(|c| c.field.clone()).collect(),
        })
        .collect()
}

/// Apply overrides in order onto existing resolutions.
///
/// Unknown match keys, and fields the incoming record does not carry, are
/// rejected and nothing is applied.
pub fn apply_overrides(
    resolutions: &[Resolution],
    matches: &[DuplicateMatch],
    overrides: &[ResolutionOverride],
) -> Result<Vec<Resolution>, CoreError> {
    let by_key: HashMap<String, &DuplicateMatch> =
        matches.iter().map(|m| (m.match_key(), m)).collect();
    let mut out = resolutions.to_vec();

    for ov in overrides {
        for key in &ov.match_keys {
            let m = by_key
                .get(key)
                .ok_or_else(|| CoreError::Validation(format!("Unknown duplicate match '{key}'")))?;
            if let Some(fields) = &ov.fields_to_apply {
                let available = m.incoming.fields();
                if let Some(bad) = fields.iter().find(|f| !available.contains_key(*f)) {
                    return Err(CoreError::Validation(format!(
                        "Field '{bad}' is not present on incoming row {}",
                        m.incoming.row_index()
                    )));
                }
            }

            let position = match out.iter().position(|r| &r.match_key == key) {
                Some(position) => position,
                None => {
                    out.push(Resolution {
                        match_key: key.clone(),
                        action: ov.action,
                        fields_to_apply: Vec::new(),
                    });
                    out.len() - 1
                }
            };
            let resolution = &mut out[position];
            resolution.action = ov.action;
            if let Some(fields) = &ov.fields_to_apply {
                resolution.fields_to_apply = fields.clone();
            }
        }
    }

    Ok(out)
}

/// Default resolutions for every match, then the overrides.
pub fn resolve(
    matches: &[DuplicateMatch],
    strategy: DuplicateStrategy,
    overrides: &[ResolutionOverride],
) -> Result<Vec<Resolution>, CoreError> {
    apply_overrides(&default_resolutions(matches, strategy), matches, overrides)
}

// ---------------------------------------------------------------------------
// Commit plan
// ---------------------------------------------------------------------------

/// One store write derived from a resolved record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RecordWrite {
    Insert {
        record: ValidatedRecord,
    },
    Update {
        existing_id: DbId,
        record: ValidatedRecord,
        /// Fields to write onto the existing record.
        fields: RecordFields,
    },
}

impl RecordWrite {
    pub fn record(&self) -> &ValidatedRecord {
        match self {
            Self::Insert { record } | Self::Update { record, .. } => record,
        }
    }

    pub fn row_index(&self) -> RowIndex {
        self.record().row_index()
    }

    pub fn kind(&self) -> RecordKind {
        self.record().kind()
    }

    /// Fields sent to the store for this write.
    pub fn payload(&self) -> RecordFields {
        match self {
            Self::Insert { record } => record.fields(),
            Self::Update { fields, .. } => fields.clone(),
        }
    }
}

/// Ordered writes plus the rows removed by `Skip`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitPlan {
    pub writes: Vec<RecordWrite>,
    pub skipped: Vec<RowIndex>,
}

impl CommitPlan {
    /// Plan that inserts every record, for runs without duplicate detection.
    pub fn insert_all(records: Vec<ValidatedRecord>) -> Self {
        Self {
            writes: records
                .into_iter()
                .map(|record| RecordWrite::Insert { record })
                .collect(),
            skipped: Vec::new(),
        }
    }

    pub fn total_planned(&self) -> usize {
        self.writes.len() + self.skipped.len()
    }
}

/// Fields an `Update` or `Merge` writes onto the existing record.
///
/// `Update` overwrites with every incoming value. `Merge` overwrites only
/// `fields_to_apply` and otherwise fills fields the existing record lacks.
pub fn update_payload(
    incoming: &RecordFields,
    existing: &RecordFields,
    action: ResolutionAction,
    fields_to_apply: &[String],
) -> RecordFields {
    match action {
        ResolutionAction::Merge => incoming
            .iter()
            .filter(|(field, _)| {
                fields_to_apply.contains(*field)
                    || existing.get(*field).map_or(true, |v| v.trim().is_empty())
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        _ => incoming.clone(),
    }
}

/// Turn records and their resolved matches into ordered store writes.
///
/// Records without a match are inserted. A match without a resolution is
/// skipped rather than risk creating a duplicate.
pub fn build_commit_plan(
    records: Vec<ValidatedRecord>,
    matches: &[DuplicateMatch],
    resolutions: &[Resolution],
) -> CommitPlan {
    let matches_by_row: BTreeMap<RowIndex, &DuplicateMatch> =
        matches.iter().map(|m| (m.incoming.row_index(), m)).collect();
    let resolutions_by_key: HashMap<&str, &Resolution> =
        resolutions.iter().map(|r| (r.match_key.as_str(), r)).collect();

    let mut plan = CommitPlan::default();
    for record in records {
        let Some(m) = matches_by_row.get(&record.row_index()) else {
            plan.writes.push(RecordWrite::Insert { record });
            continue;
        };

        match resolutions_by_key.get(m.match_key().as_str()) {
            None => plan.skipped.push(record.row_index()),
            Some(r) => match r.action {
                ResolutionAction::Skip => plan.skipped.push(record.row_index()),
                ResolutionAction::CreateNew => plan.writes.push(RecordWrite::Insert { record }),
                ResolutionAction::Update | ResolutionAction::Merge => {
                    let fields = update_payload(
                        &record.fields(),
                        &m.existing.fields,
                        r.action,
                        &r.fields_to_apply,
                    );
                    plan.writes.push(RecordWrite::Update {
                        existing_id: m.existing.id,
                        record,
                        fields,
                    });
                }
            },
        }
    }
    plan
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
