//! Validator for HubSpot contact exports.
//!
//! Runs on rows already re-keyed by target field (see
//! [`remap_row`](crate::field_mapping::remap_row)) and produces a native
//! [`Contact`] tagged with `source = "hubspot"`.

use crate::field_mapping::{ColumnPattern, FieldDataType, TargetField, HUBSPOT_CONTACT_PATTERNS};
use crate::record::{Contact, ContactStatus, RelationshipType, ValidatedRecord, DEFAULT_COUNTRY};
use crate::tabular::RawRow;
use crate::types::RowIndex;

use super::rules::{compose_name, RowCheck};
use super::validator::{ImportKind, RowValidator, ValidationError};

pub const HUBSPOT_SOURCE: &str = "hubspot";

pub const LEAD_STATUSES: &[&str] = &[
    "new",
    "open",
    "in_progress",
    "open_deal",
    "unqualified",
    "attempted_to_contact",
    "connected",
    "bad_timing",
];
pub const LEAD_STATUS_SUGGESTION: &str = "new";

pub const LIFECYCLE_STAGES: &[&str] = &[
    "subscriber",
    "lead",
    "marketingqualifiedlead",
    "salesqualifiedlead",
    "opportunity",
    "customer",
    "evangelist",
    "other",
];
pub const LIFECYCLE_STAGE_SUGGESTION: &str = "lead";

/// Lead statuses that mark the contact inactive.
const INACTIVE_LEAD_STATUSES: &[&str] = &["unqualified", "bad_timing"];
/// Lifecycle stages that make the contact a client.
const CLIENT_STAGES: &[&str] = &["customer", "evangelist"];

pub const HUBSPOT_SCHEMA: &[TargetField] = &[
    TargetField::required("email", FieldDataType::Email),
    TargetField::optional("first_name", FieldDataType::Text),
    TargetField::optional("last_name", FieldDataType::Text),
    TargetField::optional("phone", FieldDataType::Phone),
    TargetField::optional("mobile_phone", FieldDataType::Phone),
    TargetField::optional("company", FieldDataType::Text),
    TargetField::optional("job_title", FieldDataType::Text),
    TargetField::optional("website", FieldDataType::Url),
    TargetField::optional("city", FieldDataType::Text),
    TargetField::optional("country", FieldDataType::Text),
    TargetField::optional("hs_lead_status", FieldDataType::Enumerated),
    TargetField::optional("lifecycle_stage", FieldDataType::Enumerated),
    TargetField::optional("notes", FieldDataType::Text),
];

pub struct HubSpotContactValidator;

impl RowValidator for HubSpotContactValidator {
    fn kind(&self) -> ImportKind {
        ImportKind::HubSpotContact
    }

    fn schema(&self) -> &'static [TargetField] {
        HUBSPOT_SCHEMA
    }

    fn column_patterns(&self) -> &'static [ColumnPattern] {
        HUBSPOT_CONTACT_PATTERNS
    }

    fn validate(
        &self,
        row: &RawRow,
        row_index: RowIndex,
    ) -> Result<ValidatedRecord, Vec<ValidationError>> {
        let mut check = RowCheck::new(row, row_index);

        let email = check.email("email", true);
        let lead_status =
            check.optional_token("hs_lead_status", LEAD_STATUSES, Some(LEAD_STATUS_SUGGESTION));
        let lifecycle_stage = check.optional_token(
            "lifecycle_stage",
            LIFECYCLE_STAGES,
            Some(LIFECYCLE_STAGE_SUGGESTION),
        );

        let first_name = check.text("first_name");
        let last_name = check.text("last_name");
        let company = check.text("company");
        let name = compose_name(
            &[first_name.as_deref(), last_name.as_deref()],
            &[company.as_deref(), email.as_deref()],
        );

        let status = match lead_status {
            Some(s) if INACTIVE_LEAD_STATUSES.contains(&s) => ContactStatus::Inactivo,
            _ => ContactStatus::Activo,
        };
        let relationship_type = match lifecycle_stage {
            Some(s) if CLIENT_STAGES.contains(&s) => RelationshipType::Cliente,
            _ => RelationshipType::Prospecto,
        };

        let contact = Contact {
            row_index,
            name,
            email,
            phone: check.text("phone").or_else(|| check.text("mobile_phone")),
            company,
            job_title: check.text("job_title"),
            website: check.url("website"),
            address_street: None,
            address_city: check.text("city"),
            address_postal_code: None,
            address_country: check
                .text("country")
                .unwrap_or_else(|| DEFAULT_COUNTRY.to_string()),
            notes: check.text("notes"),
            status,
            relationship_type,
            source: Some(HUBSPOT_SOURCE.to_string()),
        };

        check.finish(ValidatedRecord::Contact(contact))
    }
}
