pub mod file_catalog;
pub mod file_storage;
