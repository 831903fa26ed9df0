//! Validator for user invitation rosters.

use crate::field_mapping::{FieldDataType, TargetField};
use crate::record::{UserInvitation, UserRole, ValidatedRecord};
use crate::tabular::RawRow;
use crate::types::RowIndex;

use super::rules::{compose_name, RowCheck};
use super::validator::{ImportKind, RowValidator, ValidationError};

pub const ROLE_SUGGESTION: &str = "user";

pub const USER_INVITATION_SCHEMA: &[TargetField] = &[
    TargetField::required("email", FieldDataType::Email),
    TargetField::optional("first_name", FieldDataType::Text),
    TargetField::optional("last_name", FieldDataType::Text),
    TargetField::optional("role", FieldDataType::Enumerated),
    TargetField::optional("department", FieldDataType::Text),
    TargetField::optional("phone", FieldDataType::Phone),
    TargetField::optional("send_notification", FieldDataType::Boolean),
];

pub struct UserInvitationValidator;

impl RowValidator for UserInvitationValidator {
    fn kind(&self) -> ImportKind {
        ImportKind::UserInvitation
    }

    fn schema(&self) -> &'static [TargetField] {
        USER_INVITATION_SCHEMA
    }

    fn validate(
        &self,
        row: &RawRow,
        row_index: RowIndex,
    ) -> Result<ValidatedRecord, Vec<ValidationError>> {
        let mut check = RowCheck::new(row, row_index);

        let email = check.email("email", true);
        let role = check.enumerated("role", UserRole::ALL, UserRole::User, Some(ROLE_SUGGESTION));
        let send_notification = check.boolean("send_notification", true);

        let first_name = check.text("first_name");
        let last_name = check.text("last_name");
        let full_name = compose_name(
            &[first_name.as_deref(), last_name.as_deref()],
            &[email.as_deref()],
        );

        let invitation = UserInvitation {
            row_index,
            email: email.unwrap_or_default(),
            full_name,
            first_name,
            last_name,
            role,
            department: check.text("department"),
            phone: check.text("phone"),
            send_notification,
        };

        check.finish(ValidatedRecord::UserInvitation(invitation))
    }
}
