use std::fs;
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::CatalogError;
use crate::fs_util::write_json_atomic;
use crate::metacard::Metacard;
use crate::operation::{
    CreateRequest, CreateResponse, DeleteRequest, DeleteResponse, ProcessingDetail,
    QueryRequest, Update, UpdateRequest, UpdateResponse,
};
use crate::query::Filter;
use crate::source::{CatalogProvider, Source, SourceResponse};
use crate::store::Store;

/// Catalog provider keeping one JSON document per metacard.
pub struct FileCatalogProvider {
    id: String,
    store: Store,
    // Serializes writers so read-modify-write updates do not interleave.
    write_lock: Mutex<()>,
}

impl FileCatalogProvider {
    pub fn new(id: &str, store: Store) -> Self {
        Self {
            id: id.to_string(),
            store,
            write_lock: Mutex::new(()),
        }
    }

    fn all(&self) -> Result<Vec<Metacard>, CatalogError> {
        Store::list_json(&self.store.metacards_dir())
    }

    fn find(&self, filter: &Filter) -> Result<Vec<Metacard>, CatalogError> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|metacard| filter.matches(metacard))
            .collect())
    }

    fn write(&self, metacard: &Metacard) -> Result<(), CatalogError> {
        let id = metacard
            .id()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| CatalogError::Ingest("metacard has no id".to_string()))?;
        write_json_atomic(&self.store.metacard_path(id), metacard)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>, CatalogError> {
        self.write_lock
            .lock()
            .map_err(|_| CatalogError::Storage("catalog lock poisoned".to_string()))
    }
}

impl Source for FileCatalogProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_available(&self) -> bool {
        self.store.ensure_catalog_root().is_ok()
    }

    fn query(&self, request: &QueryRequest) -> Result<SourceResponse, CatalogError> {
        let (results, hits) = request.query.apply(self.all()?);
        debug!(source = %self.id, hits, "answered query");
        Ok(SourceResponse::new(results, hits))
    }

    fn version(&self) -> Option<String> {
        Some(env!("CARGO_PKG_VERSION").to_string())
    }
}

impl CatalogProvider for FileCatalogProvider {
    fn create(&self, request: &CreateRequest) -> Result<CreateResponse, CatalogError> {
        let _guard = self.lock()?;
        self.store.ensure_catalog_root()?;
        for metacard in &request.metacards {
            self.write(metacard)?;
        }
        Ok(CreateResponse::new(
            request.clone(),
            request.metacards.clone(),
        ))
    }

    fn update(&self, request: &UpdateRequest) -> Result<UpdateResponse, CatalogError> {
        let _guard = self.lock()?;
        let mut updated = Vec::new();
        let mut details = Vec::new();
        for (key, metacard) in &request.updates {
            let existing = self.find(&Filter::equal(&request.attribute_name, key.clone()))?;
            if existing.is_empty() {
                warn!(source = %self.id, %key, "no metacard to update");
                details.push(ProcessingDetail::new(
                    &self.id,
                    format!("no metacard with {} = {key}", request.attribute_name),
                ));
                continue;
            }
            for old in existing {
                let mut new = metacard.clone();
                if let Some(id) = old.id() {
                    new.set_id(id);
                }
                self.write(&new)?;
                updated.push(Update { new, old });
            }
        }
        let mut response = UpdateResponse::new(request.clone(), updated);
        response.processing_details.extend(details);
        Ok(response)
    }

    fn delete(&self, request: &DeleteRequest) -> Result<DeleteResponse, CatalogError> {
        let _guard = self.lock()?;
        let filter = Filter::any_of(&request.attribute_name, request.values.iter().cloned());
        let mut deleted = Vec::new();
        for metacard in self.find(&filter)? {
            let Some(id) = metacard.id() else {
                continue;
            };
            let path = self.store.metacard_path(id);
            fs::remove_file(path.as_std_path())
                .map_err(|err| CatalogError::Filesystem(format!("remove {path}: {err}")))?;
            deleted.push(metacard);
        }
        debug!(source = %self.id, count = deleted.len(), "deleted metacards");
        Ok(DeleteResponse::new(request.clone(), deleted))
    }
}
