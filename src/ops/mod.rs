//! Operation pipelines, one module per operation family.

pub mod create;
pub mod delete;
pub mod query;
pub mod resource;
pub mod source;
pub mod update;

use crate::error::CatalogError;

/// Rejects a request with nothing to act on.
pub(crate) fn ensure_not_empty<T>(items: &[T], what: &str) -> Result<(), CatalogError> {
    if items.is_empty() {
        return Err(CatalogError::Ingest(format!("no {what} in request")));
    }
    Ok(())
}

/// Plugin failures during ingest: a veto becomes `Ingest`, anything else an
/// internal fault.
pub(crate) fn ingest_error(err: crate::error::PluginError) -> CatalogError {
    CatalogError::from(err).into_ingest()
}
