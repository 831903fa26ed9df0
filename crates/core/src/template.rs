//! Downloadable import templates.
//!
//! Each template is the canonical header row for a kind followed by a few
//! example rows. Native templates are produced by validating a fixed sample
//! set and serializing the records back, so a template always re-imports
//! cleanly.

use crate::error::CoreError;
use crate::field_mapping::TargetField;
use crate::record::{RecordKind, ValidatedRecord};
use crate::tabular::RawRow;
use crate::validation::catalog::CATALOG_SCHEMA;
use crate::validation::contact::CONTACT_SCHEMA;
use crate::validation::user_invitation::USER_INVITATION_SCHEMA;
use crate::validation::ImportKind;

// ---------------------------------------------------------------------------
// Sample data
// ---------------------------------------------------------------------------

type SampleRow = &'static [(&'static str, &'static str)];

const CONTACT_SAMPLES: &[SampleRow] = &[
    &[
        ("name", "Ana Ruiz"),
        ("email", "ana.ruiz@example.com"),
        ("phone", "+34 600 123 456"),
        ("company", "Ruiz Consultoría"),
        ("job_title", "Directora"),
        ("website", "https://ruiz.example.com"),
        ("address_street", "Calle Mayor 1"),
        ("address_city", "Madrid"),
        ("address_postal_code", "28013"),
        ("address_country", "España"),
        ("status", "activo"),
        ("relationship_type", "cliente"),
        ("notes", "Cliente desde 2021"),
    ],
    &[("name", "Luis Gómez"), ("email", "luis.gomez@example.com")],
];

const USER_INVITATION_SAMPLES: &[SampleRow] = &[
    &[
        ("email", "maria.lopez@example.com"),
        ("first_name", "María"),
        ("last_name", "López"),
        ("role", "manager"),
        ("department", "Ventas"),
        ("phone", "+34 611 222 333"),
        ("send_notification", "true"),
    ],
    &[
        ("email", "jon.perez@example.com"),
        ("first_name", "Jon"),
        ("role", "user"),
        ("send_notification", "false"),
    ],
];

const CATALOG_SAMPLES: &[SampleRow] = &[
    &[
        ("code", "SRV-001"),
        ("name", "Consultoría (hora)"),
        ("description", "Hora de consultoría técnica"),
        ("category", "servicio"),
        ("unit_price", "90"),
        ("currency", "EUR"),
        ("tax_rate", "21"),
        ("url", "https://example.com/servicios/consultoria"),
        ("active", "true"),
    ],
    &[
        ("code", "PRD-001"),
        ("name", "Licencia anual"),
        ("category", "suscripcion"),
        ("unit_price", "1200.5"),
    ],
];

/// Column headers as HubSpot writes them in a contact export.
const HUBSPOT_HEADER: &[&str] = &[
    "First Name",
    "Last Name",
    "Email",
    "Phone Number",
    "Mobile Phone Number",
    "Company Name",
    "Job Title",
    "Website URL",
    "City",
    "Country/Region",
    "Lead Status",
    "Lifecycle Stage",
    "Notes",
];

const HUBSPOT_SAMPLES: &[&[&str]] = &[
    &[
        "Ana", "Ruiz", "ana.ruiz@example.com", "+34 600 123 456", "", "Ruiz Consultoría",
        "Directora", "ruiz.example.com", "Madrid", "España", "open", "customer", "",
    ],
    &[
        "", "", "info@example.com", "", "+34 699 000 111", "Example SL", "", "", "Bilbao", "",
        "new", "lead", "Lead from web form",
    ],
];

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

fn native_schema(kind: RecordKind) -> &'static [TargetField] {
    match kind {
        RecordKind::Contact => CONTACT_SCHEMA,
        RecordKind::UserInvitation => USER_INVITATION_SCHEMA,
        RecordKind::CatalogItem => CATALOG_SCHEMA,
    }
}

/// Header row of the template for `kind`.
pub fn template_header(kind: ImportKind) -> Vec<&'static str> {
    match kind {
        ImportKind::HubSpotContact => HUBSPOT_HEADER.to_vec(),
        other => native_schema(other.record_kind())
            .iter()
            .map(|f| f.name)
            .collect(),
    }
}

/// Serialize a validated record onto its kind's native template header.
pub fn record_to_template_row(record: &ValidatedRecord) -> Vec<String> {
    let fields = record.fields();
    native_schema(record.kind())
        .iter()
        .map(|f| fields.get(f.name).cloned().unwrap_or_default())
        .collect()
}

/// CSV template (header plus examples) for `kind`.
pub fn template_csv(kind: ImportKind) -> Result<String, CoreError> {
    let header = template_header(kind);

    let rows: Vec<Vec<String>> = match kind {
        ImportKind::HubSpotContact => HUBSPOT_SAMPLES
            .iter()
            .map(|row| row.iter().map(|v| v.to_string()).collect())
            .collect(),
        ImportKind::Contact => sample_rows(kind, CONTACT_SAMPLES)?,
        ImportKind::UserInvitation => sample_rows(kind, USER_INVITATION_SAMPLES)?,
        ImportKind::CatalogItem => sample_rows(kind, CATALOG_SAMPLES)?,
    };

    write_csv(&header, &rows)
}

fn sample_rows(kind: ImportKind, samples: &[SampleRow]) -> Result<Vec<Vec<String>>, CoreError> {
    let validator = kind.validator();
    samples
        .iter()
        .enumerate()
        .map(|(i, pairs)| {
            let row = RawRow::from_pairs(pairs.iter().copied());
            validator
                .validate(&row, i + 1)
                .map(|record| record_to_template_row(&record))
                .map_err(|errors| {
                    CoreError::Internal(format!(
                        "{kind} template sample {} is invalid: {}",
                        i + 1,
                        errors
                            .iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                            .join("; ")
                    ))
                })
        })
        .collect()
}

fn write_csv(header: &[&str], rows: &[Vec<String>]) -> Result<String, CoreError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(header)
        .map_err(|e| CoreError::Internal(format!("template write failed: {e}")))?;
    for row in rows {
        writer
            .write_record(row)
            .map_err(|e| CoreError::Internal(format!("template write failed: {e}")))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| CoreError::Internal(format!("template flush failed: {e}")))?;
    String::from_utf8(bytes).map_err(|e| CoreError::Internal(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_mapping::{remap_row, suggest_mappings, unmapped_required_fields};
    use crate::tabular::{parse, ParseOptions};
    use crate::validation::validate_rows;

    #[test]
    fn native_templates_reimport_to_identical_records() {
        for kind in [ImportKind::Contact, ImportKind::UserInvitation, ImportKind::CatalogItem] {
            let csv = template_csv(kind).unwrap();
            let table = parse(csv.as_bytes(), &ParseOptions::default()).unwrap();
            let outcome = validate_rows(kind.validator(), &table.rows);
            assert!(outcome.is_clean(), "{kind}: {:?}", outcome.errors);
            assert_eq!(outcome.records.len(), table.rows.len());

            // Serialize once more and compare: the template is a fixed point.
            let rows: Vec<RawRow> = outcome
                .records
                .iter()
                .map(|r| {
                    let values = record_to_template_row(r);
                    RawRow::from_pairs(template_header(kind).into_iter().zip(values))
                })
                .collect();
            let again = validate_rows(kind.validator(), &rows);
            assert_eq!(again.records, outcome.records, "{kind}");
        }
    }

    #[test]
    fn hubspot_template_maps_and_validates() {
        let kind = ImportKind::HubSpotContact;
        let validator = kind.validator();
        let table = parse(template_csv(kind).unwrap().as_bytes(), &ParseOptions::default()).unwrap();
        let mappings = suggest_mappings(&table.columns, validator.schema(), validator.column_patterns());

        assert!(mappings.iter().all(|m| m.is_mapped()), "{mappings:?}");
        assert!(unmapped_required_fields(&mappings, validator.schema()).is_empty());

        let rows: Vec<RawRow> = table.rows.iter().map(|r| remap_row(r, &mappings)).collect();
        let outcome = validate_rows(validator, &rows);
        assert!(outcome.is_clean(), "{:?}", outcome.errors);
        assert_eq!(outcome.records.len(), 2);
    }

    #[test]
    fn header_matches_schema_order() {
        assert_eq!(template_header(ImportKind::CatalogItem)[0..2], ["code", "name"]);
        assert_eq!(template_header(ImportKind::HubSpotContact)[2], "Email");
    }
}
