//! Imported record model.
//!
//! Maps to the `imported_records` table. Record fields live in the `data`
//! JSONB column as a flat object of strings.

use recordport_core::duplicate_detection::ExistingRecordSummary;
use recordport_core::record::{RecordFields, RecordKind};
use recordport_core::types::{DbId, Timestamp};
use serde::Serialize;
use serde_json::Value;
use sqlx::FromRow;

/// A row from the `imported_records` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ImportedRecord {
    pub id: DbId,
    pub organization_id: DbId,
    pub kind: String,
    pub identity: String,
    pub data: Value,
    pub created_by: DbId,
    pub updated_by: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ImportedRecord {
    pub fn fields(&self) -> RecordFields {
        fields_from_json(&self.data)
    }

    /// Summary used by duplicate detection. `None` for an unknown kind.
    pub fn to_summary(&self) -> Option<ExistingRecordSummary> {
        let kind = self.kind.parse::<RecordKind>().ok()?;
        Some(ExistingRecordSummary {
            id: self.id,
            kind,
            identity: self.identity.clone(),
            fields: self.fields(),
        })
    }
}

/// Encode record fields as a JSON object of strings.
pub fn fields_to_json(fields: &RecordFields) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

/// Decode a JSON object into record fields. Non-string scalars are kept in
/// their JSON text form; nested values and nulls are dropped.
pub fn fields_from_json(value: &Value) -> RecordFields {
    let Some(object) = value.as_object() else {
        return RecordFields::new();
    };
    object
        .iter()
        .filter_map(|(k, v)| {
            let text = match v {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((k.clone(), text))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_fields_keep_scalars_only() {
        let fields = fields_from_json(&json!({
            "name": "Ana",
            "unit_price": 12.5,
            "active": true,
            "tags": ["a"],
            "notes": null,
        }));
        assert_eq!(fields.get("name").map(String::as_str), Some("Ana"));
        assert_eq!(fields.get("unit_price").map(String::as_str), Some("12.5"));
        assert_eq!(fields.get("active").map(String::as_str), Some("true"));
        assert_eq!(fields.len(), 3);
    }

    #[test]
    fn fields_encode_as_string_object() {
        let mut fields = RecordFields::new();
        fields.insert("email".into(), "ana@x.com".into());
        assert_eq!(fields_to_json(&fields), json!({ "email": "ana@x.com" }));
        assert_eq!(fields_from_json(&fields_to_json(&fields)), fields);
    }

    #[test]
    fn unknown_kind_has_no_summary() {
        let record = ImportedRecord {
            id: 1,
            organization_id: 1,
            kind: "invoice".into(),
            identity: String::new(),
            data: json!({}),
            created_by: 1,
            updated_by: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        assert!(record.to_summary().is_none());
        let contact = ImportedRecord {
            kind: "contact".into(),
            ..record
        };
        assert_eq!(contact.to_summary().map(|s| s.kind), Some(RecordKind::Contact));
    }
}
