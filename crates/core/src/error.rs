use crate::migration_state::MigrationState;
use crate::tabular::ParseError;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Parse failed: {0}")]
    Parse(#[from] ParseError),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Mapping incomplete: required fields without a source column: {}", .fields.join(", "))]
    MappingIncomplete { fields: Vec<String> },

    #[error("Cannot move from {from} to {to}: {reason}")]
    InvalidTransition {
        from: MigrationState,
        to: MigrationState,
        reason: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}
