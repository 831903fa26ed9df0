pub mod imported_record;
