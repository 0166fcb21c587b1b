pub mod processing_record;
pub mod record_store;
