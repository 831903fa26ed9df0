pub mod imported_record_repo;

pub use imported_record_repo::ImportedRecordRepo;
