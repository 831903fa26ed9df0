//! Column-to-field mapping for foreign-source files.
//!
//! Suggests a target field for every detected column from a static pattern
//! table, applies manual overrides, and re-keys raw rows by target field.
//! All operations return new values; inputs are never mutated.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::tabular::{ColumnSet, RawRow};

// ---------------------------------------------------------------------------
// Schema types
// ---------------------------------------------------------------------------

/// Shape of the value a target field accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldDataType {
    Text,
    Email,
    Phone,
    Url,
    Enumerated,
    Boolean,
    Number,
}

/// One field of a target kind's canonical schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TargetField {
    pub name: &'static str,
    pub required: bool,
    pub data_type: FieldDataType,
}

impl TargetField {
    pub const fn required(name: &'static str, data_type: FieldDataType) -> Self {
        Self {
            name,
            required: true,
            data_type,
        }
    }

    pub const fn optional(name: &'static str, data_type: FieldDataType) -> Self {
        Self {
            name,
            required: false,
            data_type,
        }
    }
}

/// Normalized source column name paired with the target field it maps to.
pub type ColumnPattern = (&'static str, &'static str);

/// Patterns for the HubSpot contact export.
pub const HUBSPOT_CONTACT_PATTERNS: &[ColumnPattern] = &[
    ("firstname", "first_name"),
    ("first_name", "first_name"),
    ("nombre", "first_name"),
    ("lastname", "last_name"),
    ("last_name", "last_name"),
    ("apellidos", "last_name"),
    ("email", "email"),
    ("email_address", "email"),
    ("correo", "email"),
    ("phone", "phone"),
    ("phone_number", "phone"),
    ("telefono", "phone"),
    ("mobilephone", "mobile_phone"),
    ("mobile_phone", "mobile_phone"),
    ("mobile_phone_number", "mobile_phone"),
    ("movil", "mobile_phone"),
    ("company", "company"),
    ("company_name", "company"),
    ("empresa", "company"),
    ("jobtitle", "job_title"),
    ("job_title", "job_title"),
    ("cargo", "job_title"),
    ("website", "website"),
    ("website_url", "website"),
    ("web", "website"),
    ("city", "city"),
    ("ciudad", "city"),
    ("country", "country"),
    ("country_region", "country"),
    ("pais", "country"),
    ("hs_lead_status", "hs_lead_status"),
    ("lead_status", "hs_lead_status"),
    ("lifecyclestage", "lifecycle_stage"),
    ("lifecycle_stage", "lifecycle_stage"),
    ("notes", "notes"),
    ("notas", "notes"),
];

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

/// Mapping of one detected source column. `target_field == None` means the
/// column is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub source_column: String,
    pub target_field: Option<String>,
    pub required: bool,
    pub data_type: FieldDataType,
}

impl FieldMapping {
    fn unmapped(source_column: &str) -> Self {
        Self {
            source_column: source_column.to_string(),
            target_field: None,
            required: false,
            data_type: FieldDataType::Text,
        }
    }

    fn mapped(source_column: &str, field: &TargetField) -> Self {
        Self {
            source_column: source_column.to_string(),
            target_field: Some(field.name.to_string()),
            required: field.required,
            data_type: field.data_type,
        }
    }

    pub fn is_mapped(&self) -> bool {
        self.target_field.is_some()
    }
}

/// Lowercase, replace non-alphanumerics with `_`, collapse and trim `_` runs.
///
/// Non-ASCII letters are kept as-is, so `Teléfono` normalizes to `teléfono`.
pub fn normalize_column_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.trim().chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() {
            out.push(ch);
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Suggest a mapping for every column, in column order.
///
/// A column maps through `patterns` first, then by exact normalized match
/// against a schema field name. A target already claimed by an earlier
/// column is not suggested again.
pub fn suggest_mappings(
    columns: &ColumnSet,
    schema: &[TargetField],
    patterns: &[ColumnPattern],
) -> Vec<FieldMapping> {
    let mut claimed: Vec<&str> = Vec::new();

    columns
        .iter()
        .map(|column| {
            let normalized = normalize_column_name(column);
            let target = patterns
                .iter()
                .find(|(source, _)| *source == normalized)
                .map(|(_, target)| *target)
                .or_else(|| {
                    schema
                        .iter()
                        .find(|f| f.name == normalized)
                        .map(|f| f.name)
                })
                .and_then(|name| schema.iter().find(|f| f.name == name));

            match target {
                Some(field) if !claimed.contains(&field.name) => {
                    claimed.push(field.name);
                    FieldMapping::mapped(column, field)
                }
                _ => FieldMapping::unmapped(column),
            }
        })
        .collect()
}

/// Point `source_column` at `target_field` (or unmap it with `None`).
///
/// Any other column holding the same target loses it.
pub fn apply_override(
    mappings: &[FieldMapping],
    schema: &[TargetField],
    source_column: &str,
    target_field: Option<&str>,
) -> Result<Vec<FieldMapping>, CoreError> {
    if !mappings.iter().any(|m| m.source_column == source_column) {
        return Err(CoreError::Validation(format!(
            "Unknown source column '{source_column}'"
        )));
    }

    let field = match target_field {
        Some(name) => Some(schema.iter().find(|f| f.name == name).ok_or_else(|| {
            CoreError::Validation(format!(
                "Unknown target field '{name}'. Must be one of: {}",
                schema.iter().map(|f| f.name).collect::<Vec<_>>().join(", ")
            ))
        })?),
        None => None,
    };

    Ok(mappings
        .iter()
        .map(|m| {
            if m.source_column == source_column {
                match field {
                    Some(f) => FieldMapping::mapped(source_column, f),
                    None => FieldMapping::unmapped(source_column),
                }
            } else if field.is_some_and(|f| m.target_field.as_deref() == Some(f.name)) {
                FieldMapping::unmapped(&m.source_column)
            } else {
                m.clone()
            }
        })
        .collect())
}

/// Required schema fields that no column maps to, in schema order.
pub fn unmapped_required_fields(mappings: &[FieldMapping], schema: &[TargetField]) -> Vec<String> {
    schema
        .iter()
        .filter(|f| f.required)
        .filter(|f| {
            !mappings
                .iter()
                .any(|m| m.target_field.as_deref() == Some(f.name))
        })
        .map(|f| f.name.to_string())
        .collect()
}

/// Build a new row keyed by target field. Unmapped columns are dropped.
pub fn remap_row(row: &RawRow, mappings: &[FieldMapping]) -> RawRow {
    let mut out = RawRow::new();
    for mapping in mappings {
        if let Some(target) = &mapping.target_field {
            out.insert(target.clone(), row.get(&mapping.source_column));
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
