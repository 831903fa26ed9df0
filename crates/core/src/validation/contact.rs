//! Validator for the native contact template.

use crate::field_mapping::{FieldDataType, TargetField};
use crate::record::{Contact, ContactStatus, RelationshipType, ValidatedRecord, DEFAULT_COUNTRY};
use crate::tabular::RawRow;
use crate::types::RowIndex;

use super::rules::RowCheck;
use super::validator::{ImportKind, RowValidator, ValidationError};

pub const CONTACT_SCHEMA: &[TargetField] = &[
    TargetField::required("name", FieldDataType::Text),
    TargetField::optional("email", FieldDataType::Email),
    TargetField::optional("phone", FieldDataType::Phone),
    TargetField::optional("company", FieldDataType::Text),
    TargetField::optional("job_title", FieldDataType::Text),
    TargetField::optional("website", FieldDataType::Url),
    TargetField::optional("address_street", FieldDataType::Text),
    TargetField::optional("address_city", FieldDataType::Text),
    TargetField::optional("address_postal_code", FieldDataType::Text),
    TargetField::optional("address_country", FieldDataType::Text),
    TargetField::optional("status", FieldDataType::Enumerated),
    TargetField::optional("relationship_type", FieldDataType::Enumerated),
    TargetField::optional("notes", FieldDataType::Text),
];

pub struct ContactValidator;

impl RowValidator for ContactValidator {
    fn kind(&self) -> ImportKind {
        ImportKind::Contact
    }

    fn schema(&self) -> &'static [TargetField] {
        CONTACT_SCHEMA
    }

    fn validate(
        &self,
        row: &RawRow,
        row_index: RowIndex,
    ) -> Result<ValidatedRecord, Vec<ValidationError>> {
        let mut check = RowCheck::new(row, row_index);

        let name = check.required("name");
        let email = check.email("email", false);
        let status = check.enumerated("status", ContactStatus::ALL, ContactStatus::Activo, None);
        let relationship_type = check.enumerated(
            "relationship_type",
            RelationshipType::ALL,
            RelationshipType::Prospecto,
            None,
        );

        let contact = Contact {
            row_index,
            name,
            email,
            phone: check.text("phone"),
            company: check.text("company"),
            job_title: check.text("job_title"),
            website: check.url("website"),
            address_street: check.text("address_street"),
            address_city: check.text("address_city"),
            address_postal_code: check.text("address_postal_code"),
            address_country: check
                .text("address_country")
                .unwrap_or_else(|| DEFAULT_COUNTRY.to_string()),
            notes: check.text("notes"),
            status,
            relationship_type,
            source: None,
        };

        check.finish(ValidatedRecord::Contact(contact))
    }
}
