use crate::error::CatalogError;
use crate::operation::{DeleteResponse, UpdateResponse};
use crate::storage::UpdateStorageResponse;

/// Keeps prior versions of metacards and content. Every call is made after the
/// change it records has been applied, so failures are logged rather than
/// undoing the operation.
pub trait Historian: Send + Sync {
    fn version_update(&self, response: UpdateResponse) -> Result<UpdateResponse, CatalogError> {
        Ok(response)
    }

    fn version_delete(&self, response: DeleteResponse) -> Result<DeleteResponse, CatalogError> {
        Ok(response)
    }

    /// Versions replaced content and returns a key for the history transaction,
    /// if one was opened.
    fn version_storage(
        &self,
        _response: &UpdateStorageResponse,
    ) -> Result<Option<String>, CatalogError> {
        Ok(None)
    }

    fn commit(&self, _key: &str) -> Result<(), CatalogError> {
        Ok(())
    }

    fn rollback(&self, _key: &str) -> Result<(), CatalogError> {
        Ok(())
    }
}
