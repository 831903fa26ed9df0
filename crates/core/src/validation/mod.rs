//! Row validation.
//!
//! One [`RowValidator`] implementation per import kind, shared field rules,
//! and whole-file aggregation. No I/O.

pub mod catalog;
pub mod contact;
pub mod hubspot;
pub mod rules;
pub mod user_invitation;
pub mod validator;

pub use validator::{
    find_repeated_identities, validate_rows, ImportKind, RepeatedIdentity, RowValidator,
    ValidationError, ValidationOutcome,
};
