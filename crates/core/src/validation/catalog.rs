//! Validator for catalog items (products and services).

use crate::field_mapping::{FieldDataType, TargetField};
use crate::record::{CatalogCategory, CatalogItem, Currency, ValidatedRecord};
use crate::tabular::RawRow;
use crate::types::RowIndex;

use super::rules::RowCheck;
use super::validator::{ImportKind, RowValidator, ValidationError};

pub const CATEGORY_SUGGESTION: &str = "producto";
pub const DEFAULT_TAX_RATE: f64 = 21.0;
pub const MAX_TAX_RATE: f64 = 100.0;

pub const CATALOG_SCHEMA: &[TargetField] = &[
    TargetField::required("code", FieldDataType::Text),
    TargetField::required("name", FieldDataType::Text),
    TargetField::optional("description", FieldDataType::Text),
    TargetField::optional("category", FieldDataType::Enumerated),
    TargetField::optional("unit_price", FieldDataType::Number),
    TargetField::optional("currency", FieldDataType::Enumerated),
    TargetField::optional("tax_rate", FieldDataType::Number),
    TargetField::optional("url", FieldDataType::Url),
    TargetField::optional("active", FieldDataType::Boolean),
];

pub struct CatalogItemValidator;

impl RowValidator for CatalogItemValidator {
    fn kind(&self) -> ImportKind {
        ImportKind::CatalogItem
    }

    fn schema(&self) -> &'static [TargetField] {
        CATALOG_SCHEMA
    }

    fn validate(
        &self,
        row: &RawRow,
        row_index: RowIndex,
    ) -> Result<ValidatedRecord, Vec<ValidationError>> {
        let mut check = RowCheck::new(row, row_index);

        let item = CatalogItem {
            row_index,
            code: check.required("code"),
            name: check.required("name"),
            description: check.text("description"),
            category: check.enumerated(
                "category",
                CatalogCategory::ALL,
                CatalogCategory::Producto,
                Some(CATEGORY_SUGGESTION),
            ),
            unit_price: check.number("unit_price", Some(0.0), None, 0.0),
            currency: check.enumerated("currency", Currency::ALL, Currency::Eur, None),
            tax_rate: check.number("tax_rate", Some(0.0), Some(MAX_TAX_RATE), DEFAULT_TAX_RATE),
            url: check.url("url"),
            active: check.boolean("active", true),
        };

        check.finish(ValidatedRecord::CatalogItem(item))
    }
}
