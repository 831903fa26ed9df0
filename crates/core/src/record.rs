//! Validated record types, one per target kind.
//!
//! Records are immutable once a validator produces them. Later stages read
//! their identity and flattened fields but never change validated values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::RowIndex;

/// Flattened `field -> value` view of a record. Empty values are omitted.
pub type RecordFields = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// Record kind
// ---------------------------------------------------------------------------

/// Kind of record as persisted by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Contact,
    UserInvitation,
    CatalogItem,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contact => "contact",
            Self::UserInvitation => "user_invitation",
            Self::CatalogItem => "catalog_item",
        }
    }

    /// Field used as the primary key for duplicate matching.
    pub fn identity_field(&self) -> &'static str {
        match self {
            Self::Contact | Self::UserInvitation => "email",
            Self::CatalogItem => "code",
        }
    }

    /// Secondary fields compared when scoring a duplicate.
    pub fn comparable_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Contact => &["name", "phone", "company"],
            Self::UserInvitation => &["full_name", "phone", "department"],
            Self::CatalogItem => &["name", "category", "unit_price"],
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contact" => Ok(Self::Contact),
            "user_invitation" => Ok(Self::UserInvitation),
            "catalog_item" => Ok(Self::CatalogItem),
            other => Err(format!("unknown record kind '{other}'")),
        }
    }
}

/// Normalize an identity value for comparison: trimmed, lowercase.
pub fn normalize_identity(value: &str) -> String {
    value.trim().to_lowercase()
}

// ---------------------------------------------------------------------------
// Contact
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactStatus {
    Activo,
    Inactivo,
}

impl ContactStatus {
    pub const ALL: &'static [(&'static str, Self)] =
        &[("activo", Self::Activo), ("inactivo", Self::Inactivo)];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Activo => "activo",
            Self::Inactivo => "inactivo",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipType {
    Prospecto,
    Cliente,
    Proveedor,
    Socio,
    Otro,
}

impl RelationshipType {
    pub const ALL: &'static [(&'static str, Self)] = &[
        ("prospecto", Self::Prospecto),
        ("cliente", Self::Cliente),
        ("proveedor", Self::Proveedor),
        ("socio", Self::Socio),
        ("otro", Self::Otro),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prospecto => "prospecto",
            Self::Cliente => "cliente",
            Self::Proveedor => "proveedor",
            Self::Socio => "socio",
            Self::Otro => "otro",
        }
    }
}

pub const DEFAULT_COUNTRY: &str = "España";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub row_index: RowIndex,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub job_title: Option<String>,
    pub website: Option<String>,
    pub address_street: Option<String>,
    pub address_city: Option<String>,
    pub address_postal_code: Option<String>,
    pub address_country: String,
    pub notes: Option<String>,
    pub status: ContactStatus,
    pub relationship_type: RelationshipType,
    /// Origin system for foreign-source imports (e.g. `hubspot`).
    pub source: Option<String>,
}

// ---------------------------------------------------------------------------
// User invitation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Manager,
    User,
    Viewer,
}

impl UserRole {
    pub const ALL: &'static [(&'static str, Self)] = &[
        ("admin", Self::Admin),
        ("manager", Self::Manager),
        ("user", Self::User),
        ("viewer", Self::Viewer),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::User => "user",
            Self::Viewer => "viewer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInvitation {
    pub row_index: RowIndex,
    pub email: String,
    pub full_name: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: UserRole,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub send_notification: bool,
}

// ---------------------------------------------------------------------------
// Catalog item
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogCategory {
    Producto,
    Servicio,
    Suscripcion,
    Otro,
}

impl CatalogCategory {
    pub const ALL: &'static [(&'static str, Self)] = &[
        ("producto", Self::Producto),
        ("servicio", Self::Servicio),
        ("suscripcion", Self::Suscripcion),
        ("otro", Self::Otro),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Producto => "producto",
            Self::Servicio => "servicio",
            Self::Suscripcion => "suscripcion",
            Self::Otro => "otro",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Eur,
    Usd,
    Gbp,
}

impl Currency {
    pub const ALL: &'static [(&'static str, Self)] =
        &[("EUR", Self::Eur), ("USD", Self::Usd), ("GBP", Self::Gbp)];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eur => "EUR",
            Self::Usd => "USD",
            Self::Gbp => "GBP",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub row_index: RowIndex,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub category: CatalogCategory,
    pub unit_price: f64,
    pub currency: Currency,
    pub tax_rate: f64,
    pub url: Option<String>,
    pub active: bool,
}

// ---------------------------------------------------------------------------
// ValidatedRecord
// ---------------------------------------------------------------------------

/// Output of a successful row validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidatedRecord {
    Contact(Contact),
    UserInvitation(UserInvitation),
    CatalogItem(CatalogItem),
}

impl ValidatedRecord {
    /// 1-based position of the source row, header excluded.
    pub fn row_index(&self) -> RowIndex {
        match self {
            Self::Contact(c) => c.row_index,
            Self::UserInvitation(u) => u.row_index,
            Self::CatalogItem(c) => c.row_index,
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Contact(_) => RecordKind::Contact,
            Self::UserInvitation(_) => RecordKind::UserInvitation,
            Self::CatalogItem(_) => RecordKind::CatalogItem,
        }
    }

    /// Normalized identity value, or `None` when the identity field is empty.
    /// Records without an identity can never be matched as duplicates.
    pub fn identity(&self) -> Option<String> {
        let raw = match self {
            Self::Contact(c) => c.email.as_deref(),
            Self::UserInvitation(u) => Some(u.email.as_str()),
            Self::CatalogItem(c) => Some(c.code.as_str()),
        };
        raw.map(normalize_identity).filter(|v| !v.is_empty())
    }

    /// Flattened non-empty fields, used for comparison and as the store payload.
    pub fn fields(&self) -> RecordFields {
        let mut out = RecordFields::new();
        match self {
            Self::Contact(c) => {
                put(&mut out, "name", Some(&c.name));
                put(&mut out, "email", c.email.as_ref());
                put(&mut out, "phone", c.phone.as_ref());
                put(&mut out, "company", c.company.as_ref());
                put(&mut out, "job_title", c.job_title.as_ref());
                put(&mut out, "website", c.website.as_ref());
                put(&mut out, "address_street", c.address_street.as_ref());
                put(&mut out, "address_city", c.address_city.as_ref());
                put(&mut out, "address_postal_code", c.address_postal_code.as_ref());
                put(&mut out, "address_country", Some(&c.address_country));
                put(&mut out, "notes", c.notes.as_ref());
                out.insert("status".into(), c.status.as_str().into());
                out.insert("relationship_type".into(), c.relationship_type.as_str().into());
                put(&mut out, "source", c.source.as_ref());
            }
            Self::UserInvitation(u) => {
                put(&mut out, "email", Some(&u.email));
                put(&mut out, "full_name", Some(&u.full_name));
                put(&mut out, "first_name", u.first_name.as_ref());
                put(&mut out, "last_name", u.last_name.as_ref());
                out.insert("role".into(), u.role.as_str().into());
                put(&mut out, "department", u.department.as_ref());
                put(&mut out, "phone", u.phone.as_ref());
                out.insert("send_notification".into(), u.send_notification.to_string());
            }
            Self::CatalogItem(c) => {
                put(&mut out, "code", Some(&c.code));
                put(&mut out, "name", Some(&c.name));
                put(&mut out, "description", c.description.as_ref());
                out.insert("category".into(), c.category.as_str().into());
                out.insert("unit_price".into(), format_decimal(c.unit_price));
                out.insert("currency".into(), c.currency.as_str().into());
                out.insert("tax_rate".into(), format_decimal(c.tax_rate));
                put(&mut out, "url", c.url.as_ref());
                out.insert("active".into(), c.active.to_string());
            }
        }
        out
    }
}

fn put(out: &mut RecordFields, field: &str, value: Option<&String>) {
    if let Some(v) = value.filter(|v| !v.is_empty()) {
        out.insert(field.to_string(), v.clone());
    }
}

/// Render a decimal without a trailing `.0` for whole numbers.
pub fn format_decimal(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}
