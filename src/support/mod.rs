//! Helpers shared by the operation pipelines.

pub mod catalog_store;
pub mod metacard;
pub mod security;
pub mod storage;
