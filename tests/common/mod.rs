#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use camino::Utf8PathBuf;
use catalog_ops::error::{CatalogError, PluginError};
use catalog_ops::framework::{FrameworkProperties, FrameworkSettings};
use catalog_ops::metacard::Metacard;
use catalog_ops::operation::{
    CreateRequest, CreateResponse, DeleteRequest, DeleteResponse, QueryRequest, Update,
    UpdateRequest, UpdateResponse,
};
use catalog_ops::content::ContentItem;
use catalog_ops::plugin::{
    AccessPlugin, PolicyPlugin, PreCreateStoragePlugin, PreIngestPlugin, PreUpdateStoragePlugin,
};
use catalog_ops::policy::{PolicyMap, PolicyResponse};
use catalog_ops::query::Filter;
use catalog_ops::source::{CatalogProvider, Source, SourceResponse};
use catalog_ops::storage::{
    CreateStorageRequest, CreateStorageResponse, DeleteStorageRequest, DeleteStorageResponse,
    StorageProvider, UpdateStorageRequest, UpdateStorageResponse,
};
use catalog_ops::store::Store;

pub const LOCAL: &str = "local";

/// Keeps metacards in memory and counts every write it receives.
pub struct MemoryProvider {
    id: String,
    available: AtomicBool,
    metacards: Mutex<BTreeMap<String, Metacard>>,
    pub creates: AtomicUsize,
    pub updates: AtomicUsize,
    pub deletes: AtomicUsize,
    failing_deletes: AtomicBool,
}

impl MemoryProvider {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            available: AtomicBool::new(true),
            metacards: Mutex::new(BTreeMap::new()),
            creates: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            failing_deletes: AtomicBool::new(false),
        })
    }

    /// Every delete reaching the provider fails from now on.
    pub fn fail_deletes(&self) {
        self.failing_deletes.store(true, Ordering::SeqCst);
    }

    pub fn unavailable(id: &str) -> Arc<Self> {
        let provider = Self::new(id);
        provider.available.store(false, Ordering::SeqCst);
        provider
    }

    pub fn seed(&self, metacards: impl IntoIterator<Item = Metacard>) {
        let mut stored = self.metacards.lock().unwrap();
        for metacard in metacards {
            stored.insert(metacard.id().unwrap().to_string(), metacard);
        }
    }

    pub fn get(&self, id: &str) -> Option<Metacard> {
        self.metacards.lock().unwrap().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.metacards.lock().unwrap().len()
    }

    pub fn writes(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
            + self.updates.load(Ordering::SeqCst)
            + self.deletes.load(Ordering::SeqCst)
    }
}

impl Source for MemoryProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn query(&self, request: &QueryRequest) -> Result<SourceResponse, CatalogError> {
        let metacards = self.metacards.lock().unwrap().values().cloned().collect::<Vec<_>>();
        let (results, hits) = request.query.apply(metacards);
        Ok(SourceResponse::new(results, hits))
    }
}

impl CatalogProvider for MemoryProvider {
    fn create(&self, request: &CreateRequest) -> Result<CreateResponse, CatalogError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.seed(request.metacards.clone());
        Ok(CreateResponse::new(request.clone(), request.metacards.clone()))
    }

    fn update(&self, request: &UpdateRequest) -> Result<UpdateResponse, CatalogError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        let mut stored = self.metacards.lock().unwrap();
        let mut updated = Vec::new();
        for (key, metacard) in &request.updates {
            let Some(id) = key.as_str() else { continue };
            if let Some(old) = stored.insert(id.to_string(), metacard.clone()) {
                updated.push(Update {
                    new: metacard.clone(),
                    old,
                });
            }
        }
        Ok(UpdateResponse::new(request.clone(), updated))
    }

    fn delete(&self, request: &DeleteRequest) -> Result<DeleteResponse, CatalogError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.failing_deletes.load(Ordering::SeqCst) {
            return Err(CatalogError::Storage("metacard index is read-only".to_string()));
        }
        let filter = Filter::any_of(&request.attribute_name, request.values.iter().cloned());
        let mut stored = self.metacards.lock().unwrap();
        let ids = stored
            .values()
            .filter(|metacard| filter.matches(metacard))
            .filter_map(|metacard| metacard.id().map(str::to_string))
            .collect::<Vec<_>>();
        let deleted = ids.iter().filter_map(|id| stored.remove(id)).collect();
        Ok(DeleteResponse::new(request.clone(), deleted))
    }
}

/// Stamps a fixed item and operation policy at every pre-create stage.
pub struct FixedPolicy(pub PolicyMap);

impl PolicyPlugin for FixedPolicy {
    fn process_pre_create(
        &self,
        _metacard: &Metacard,
        _context: &catalog_ops::operation::OperationContext,
    ) -> Result<PolicyResponse, PluginError> {
        Ok(PolicyResponse {
            item_policy: self.0.clone(),
            operation_policy: self.0.clone(),
        })
    }
}

/// A policy plugin with no opinion; only its presence matters.
pub struct NoPolicy;

impl PolicyPlugin for NoPolicy {}

pub struct BrokenPreIngest;

impl PreIngestPlugin for BrokenPreIngest {
    fn process_create(&self, _request: CreateRequest) -> Result<CreateRequest, PluginError> {
        Err(PluginError::Execution("broken".to_string()))
    }

    fn process_delete(&self, _request: DeleteRequest) -> Result<DeleteRequest, PluginError> {
        Err(PluginError::Execution("broken".to_string()))
    }
}

/// Vetoes every create and delete.
pub struct DenyAll;

impl AccessPlugin for DenyAll {
    fn process_pre_create(&self, _request: CreateRequest) -> Result<CreateRequest, PluginError> {
        Err(PluginError::StopProcessing("access denied".to_string()))
    }

    fn process_pre_delete(&self, _request: DeleteRequest) -> Result<DeleteRequest, PluginError> {
        Err(PluginError::StopProcessing("access denied".to_string()))
    }
}

/// Storage that keeps nothing and records how each transaction was settled.
#[derive(Default)]
pub struct RecordingStorage {
    pub fail_create: bool,
    pub fail_delete: bool,
    pub creates: AtomicUsize,
    pub deletes: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
}

impl RecordingStorage {
    pub fn failing_create() -> Arc<Self> {
        Arc::new(Self {
            fail_create: true,
            ..Self::default()
        })
    }

    pub fn failing_delete() -> Arc<Self> {
        Arc::new(Self {
            fail_delete: true,
            ..Self::default()
        })
    }
}

impl StorageProvider for RecordingStorage {
    fn create(
        &self,
        request: &CreateStorageRequest,
    ) -> Result<CreateStorageResponse, CatalogError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.fail_create {
            return Err(CatalogError::Storage("disk full".to_string()));
        }
        Ok(CreateStorageResponse::new(
            request.clone(),
            request.content_items.clone(),
        ))
    }

    fn update(
        &self,
        request: &UpdateStorageRequest,
    ) -> Result<UpdateStorageResponse, CatalogError> {
        Ok(UpdateStorageResponse::new(
            request.clone(),
            request.content_items.clone(),
        ))
    }

    fn delete(
        &self,
        request: &DeleteStorageRequest,
    ) -> Result<DeleteStorageResponse, CatalogError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete {
            return Err(CatalogError::Storage("content volume offline".to_string()));
        }
        Ok(DeleteStorageResponse {
            request: request.clone(),
            deleted_items: Vec::new(),
        })
    }

    fn read(&self, uri: &str) -> Result<ContentItem, CatalogError> {
        Err(CatalogError::ResourceNotFound(uri.to_string()))
    }

    fn commit(&self, _transaction_id: &str) -> Result<(), CatalogError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(&self, _transaction_id: &str) -> Result<(), CatalogError> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Refuses every storage write.
pub struct VetoStorage;

impl PreCreateStoragePlugin for VetoStorage {
    fn process(
        &self,
        _request: CreateStorageRequest,
    ) -> Result<CreateStorageRequest, PluginError> {
        Err(PluginError::StopProcessing("quarantined upload".to_string()))
    }
}

impl PreUpdateStoragePlugin for VetoStorage {
    fn process(
        &self,
        _request: UpdateStorageRequest,
    ) -> Result<UpdateStorageRequest, PluginError> {
        Err(PluginError::StopProcessing("quarantined upload".to_string()))
    }
}

pub fn settings() -> FrameworkSettings {
    FrameworkSettings {
        site_name: LOCAL.to_string(),
        ..FrameworkSettings::default()
    }
}

pub fn properties(provider: Arc<MemoryProvider>) -> FrameworkProperties {
    FrameworkProperties::new(settings()).with_catalog_provider(provider)
}

pub fn temp_store() -> (tempfile::TempDir, Store) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let store = Store::new_with_paths(root.join("catalog"), root.join("content"));
    (temp, store)
}
