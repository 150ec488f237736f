use std::sync::Arc;

use tracing::{debug, warn};

use crate::content::ContentItem;
use crate::error::CatalogError;
use crate::framework::FrameworkProperties;
use crate::fs_util::TempContentFiles;
use crate::storage::StorageProvider;

pub struct StorageSupport<'a> {
    properties: &'a FrameworkProperties,
}

impl<'a> StorageSupport<'a> {
    pub fn new(properties: &'a FrameworkProperties) -> Self {
        Self { properties }
    }

    /// The configured storage provider, if it is currently usable.
    pub fn provider(&self) -> Result<Arc<dyn StorageProvider>, CatalogError> {
        match &self.properties.storage_provider {
            Some(storage) if storage.is_available() => Ok(storage.clone()),
            Some(_) => Err(CatalogError::SourceUnavailable(
                "local storage provider is not available".to_string(),
            )),
            None => Err(CatalogError::SourceUnavailable(
                "no storage provider configured".to_string(),
            )),
        }
    }

    pub fn temp_files(&self) -> Result<TempContentFiles, CatalogError> {
        TempContentFiles::new(self.properties.settings.temp_dir.as_deref())
    }
}

pub fn ensure_content(content_items: &[ContentItem]) -> Result<(), CatalogError> {
    if content_items.is_empty() {
        return Err(CatalogError::Ingest(
            "no content items to store".to_string(),
        ));
    }
    Ok(())
}

pub fn commit(storage: &dyn StorageProvider, transaction_id: &str) -> Result<(), CatalogError> {
    debug!(transaction = transaction_id, "committing storage transaction");
    storage
        .commit(transaction_id)
        .map_err(|err| CatalogError::InternalIngest(format!("unable to commit content: {err}")))
}

/// Rolls back without surfacing failures; the operation has already failed.
pub fn rollback(storage: &dyn StorageProvider, transaction_id: &str) {
    debug!(transaction = transaction_id, "rolling back storage transaction");
    if let Err(err) = storage.rollback(transaction_id) {
        warn!(transaction = transaction_id, error = %err, "storage rollback failed");
    }
}

/// Commits when the operation succeeded and rolls back otherwise, logging failures.
pub fn commit_or_rollback(storage: &dyn StorageProvider, transaction_id: &str, succeeded: bool) {
    if succeeded {
        if let Err(err) = commit(storage, transaction_id) {
            warn!(transaction = transaction_id, error = %err, "storage commit failed");
        }
    } else {
        rollback(storage, transaction_id);
    }
}
