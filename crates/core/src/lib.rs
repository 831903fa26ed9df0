//! Pure domain logic for bulk record imports: parsing, field mapping, row
//! validation, duplicate resolution, batch accounting and the migration
//! state machine. No I/O beyond the [`store::RecordStore`] trait definition.

pub mod batching;
pub mod duplicate_detection;
pub mod error;
pub mod field_mapping;
pub mod migration_state;
pub mod record;
pub mod store;
pub mod tabular;
pub mod template;
pub mod types;
pub mod validation;
