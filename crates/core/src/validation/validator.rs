//! Validator trait, import kinds, and whole-file aggregation.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::field_mapping::{ColumnPattern, TargetField};
use crate::migration_state::MigrationFlow;
use crate::record::{RecordKind, ValidatedRecord};
use crate::tabular::RawRow;
use crate::types::RowIndex;

use super::catalog::CatalogItemValidator;
use super::contact::ContactValidator;
use super::hubspot::HubSpotContactValidator;
use super::user_invitation::UserInvitationValidator;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// One field-level problem in one source row.
///
/// Stored by value so it stays meaningful after the row is discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// 1-based data row number, header excluded.
    pub row_index: RowIndex,
    pub field: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "row {}, {}: {}", self.row_index, self.field, self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " (suggested: '{suggestion}')")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Validator trait
// ---------------------------------------------------------------------------

/// Validates one raw row into a record of a single target kind.
///
/// Success and failure are exclusive: either a fully normalized record, or a
/// non-empty list of errors.
pub trait RowValidator: Send + Sync {
    fn kind(&self) -> ImportKind;

    /// Canonical fields this validator reads.
    fn schema(&self) -> &'static [TargetField];

    /// Source-name patterns for auto-mapping foreign columns.
    fn column_patterns(&self) -> &'static [ColumnPattern] {
        &[]
    }

    fn validate(
        &self,
        row: &RawRow,
        row_index: RowIndex,
    ) -> Result<ValidatedRecord, Vec<ValidationError>>;
}

// ---------------------------------------------------------------------------
// Import kinds
// ---------------------------------------------------------------------------

/// Selects the validator (and migration flow) for an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportKind {
    Contact,
    HubSpotContact,
    UserInvitation,
    CatalogItem,
}

static CONTACT_VALIDATOR: ContactValidator = ContactValidator;
static HUBSPOT_VALIDATOR: HubSpotContactValidator = HubSpotContactValidator;
static USER_INVITATION_VALIDATOR: UserInvitationValidator = UserInvitationValidator;
static CATALOG_ITEM_VALIDATOR: CatalogItemValidator = CatalogItemValidator;

impl ImportKind {
    pub const ALL: &'static [ImportKind] = &[
        Self::Contact,
        Self::HubSpotContact,
        Self::UserInvitation,
        Self::CatalogItem,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contact => "contact",
            Self::HubSpotContact => "hubspot_contact",
            Self::UserInvitation => "user_invitation",
            Self::CatalogItem => "catalog_item",
        }
    }

    pub fn validator(&self) -> &'static dyn RowValidator {
        match self {
            Self::Contact => &CONTACT_VALIDATOR,
            Self::HubSpotContact => &HUBSPOT_VALIDATOR,
            Self::UserInvitation => &USER_INVITATION_VALIDATOR,
            Self::CatalogItem => &CATALOG_ITEM_VALIDATOR,
        }
    }

    /// Kind of record the import produces.
    pub fn record_kind(&self) -> RecordKind {
        match self {
            Self::Contact | Self::HubSpotContact => RecordKind::Contact,
            Self::UserInvitation => RecordKind::UserInvitation,
            Self::CatalogItem => RecordKind::CatalogItem,
        }
    }

    /// Foreign sources need the mapping and configuration steps.
    pub fn flow(&self) -> MigrationFlow {
        match self {
            Self::HubSpotContact => MigrationFlow::Full,
            _ => MigrationFlow::Simple,
        }
    }

    /// Whether committing this kind has an external side effect (emails).
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::UserInvitation)
    }
}

impl std::fmt::Display for ImportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ImportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown import kind '{s}'"))
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Result of validating every row of a file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub total_rows: usize,
    pub records: Vec<ValidatedRecord>,
    pub errors: Vec<ValidationError>,
}

impl ValidationOutcome {
    pub fn valid_count(&self) -> usize {
        self.records.len()
    }

    /// Distinct row indices with at least one error.
    pub fn invalid_rows(&self) -> BTreeSet<RowIndex> {
        self.errors.iter().map(|e| e.row_index).collect()
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate every row in order. `rows[i]` is reported as row `i + 1`.
pub fn validate_rows(validator: &dyn RowValidator, rows: &[RawRow]) -> ValidationOutcome {
    let mut outcome = ValidationOutcome {
        total_rows: rows.len(),
        ..ValidationOutcome::default()
    };

    for (position, row) in rows.iter().enumerate() {
        match validator.validate(row, position + 1) {
            Ok(record) => outcome.records.push(record),
            Err(errors) => outcome.errors.extend(errors),
        }
    }

    outcome
}

/// An identity that appears on more than one row of the same file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatedIdentity {
    pub identity: String,
    pub row_indices: Vec<RowIndex>,
}

/// Identities repeated within one file, ordered by first occurrence row.
pub fn find_repeated_identities(records: &[ValidatedRecord]) -> Vec<RepeatedIdentity> {
    let mut by_identity: BTreeMap<String, Vec<RowIndex>> = BTreeMap::new();
    for record in records {
        if let Some(identity) = record.identity() {
            by_identity.entry(identity).or_default().push(record.row_index());
        }
    }

    let mut repeated: Vec<RepeatedIdentity> = by_identity
        .into_iter()
        .filter(|(_, rows)| rows.len() > 1)
        .map(|(identity, row_indices)| RepeatedIdentity {
            identity,
            row_indices,
        })
        .collect();
    repeated.sort_by_key(|r| r.row_indices[0]);
    repeated
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
