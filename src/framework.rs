//! The catalog framework: every collaborator an operation needs, and the facade
//! callers use to run operations.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use camino::Utf8PathBuf;

use crate::content::ContentItem;
use crate::error::CatalogError;
use crate::history::Historian;
use crate::mime::{DefaultMimeTypeMapper, MimeTypeMapper};
use crate::operation::{
    CreateRequest, CreateResponse, DeleteRequest, DeleteResponse, OperationContext, QueryRequest,
    QueryResponse, ResourceRequest, ResourceResponse, UpdateRequest, UpdateResponse,
};
use crate::ops::create::CreateOperations;
use crate::ops::delete::DeleteOperations;
use crate::ops::query::QueryOperations;
use crate::ops::resource::ResourceOperations;
use crate::ops::source::{SourceInfoRequest, SourceInfoResponse, SourceOperations};
use crate::ops::update::UpdateOperations;
use crate::plugin::{
    AccessPlugin, PolicyPlugin, PostCreateStoragePlugin, PostIngestPlugin, PostQueryPlugin,
    PostResourcePlugin, PostUpdateStoragePlugin, PreCreateStoragePlugin, PreIngestPlugin,
    PreQueryPlugin, PreResourcePlugin, PreUpdateStoragePlugin,
};
use crate::resource::{
    ContentResourceReader, DirectDownloadManager, DownloadManager, FileResourceReader,
    ResourceReader,
};
use crate::source::{
    CatalogProvider, DirectSourcePoller, FederationStrategy, SortedFederationStrategy, Source,
    SourcePoller,
};
use crate::storage::StorageProvider;
use crate::support::metacard::{AttributeInjector, DefaultAttributeValues};
use crate::transform::TransformerRegistry;

pub const DEFAULT_SITE_NAME: &str = "ddf.distribution";

/// Framework-wide switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameworkSettings {
    /// Id of the local catalog as seen by callers.
    pub site_name: String,
    /// Present every source behind the local id.
    pub fanout: bool,
    /// Queries carrying one of these tags stay local in fan-out mode.
    pub fanout_tag_blacklist: BTreeSet<String>,
    /// Parent for temporary content; the system temp dir when unset.
    pub temp_dir: Option<Utf8PathBuf>,
}

impl Default for FrameworkSettings {
    fn default() -> Self {
        Self {
            site_name: DEFAULT_SITE_NAME.to_string(),
            fanout: false,
            fanout_tag_blacklist: BTreeSet::new(),
            temp_dir: None,
        }
    }
}

/// Collaborators shared by all operations. Plugin lists run in the order they
/// were pushed.
pub struct FrameworkProperties {
    pub settings: FrameworkSettings,
    pub catalog_provider: Option<Arc<dyn CatalogProvider>>,
    pub storage_provider: Option<Arc<dyn StorageProvider>>,
    pub catalog_stores: BTreeMap<String, Arc<dyn CatalogProvider>>,
    pub federated_sources: BTreeMap<String, Arc<dyn Source>>,
    pub connected_sources: Vec<Arc<dyn Source>>,
    pub pre_ingest: Vec<Arc<dyn PreIngestPlugin>>,
    pub post_ingest: Vec<Arc<dyn PostIngestPlugin>>,
    pub pre_query: Vec<Arc<dyn PreQueryPlugin>>,
    pub post_query: Vec<Arc<dyn PostQueryPlugin>>,
    pub pre_resource: Vec<Arc<dyn PreResourcePlugin>>,
    pub post_resource: Vec<Arc<dyn PostResourcePlugin>>,
    pub policy_plugins: Vec<Arc<dyn PolicyPlugin>>,
    pub access_plugins: Vec<Arc<dyn AccessPlugin>>,
    pub pre_create_storage: Vec<Arc<dyn PreCreateStoragePlugin>>,
    pub post_create_storage: Vec<Arc<dyn PostCreateStoragePlugin>>,
    pub pre_update_storage: Vec<Arc<dyn PreUpdateStoragePlugin>>,
    pub post_update_storage: Vec<Arc<dyn PostUpdateStoragePlugin>>,
    pub historian: Option<Arc<dyn Historian>>,
    pub attribute_injectors: Vec<Arc<dyn AttributeInjector>>,
    pub default_values: DefaultAttributeValues,
    pub mime_types: Arc<dyn MimeTypeMapper>,
    pub transformers: TransformerRegistry,
    pub federation_strategy: Arc<dyn FederationStrategy>,
    pub source_poller: Arc<dyn SourcePoller>,
    pub download_manager: Arc<dyn DownloadManager>,
    pub resource_readers: Vec<Arc<dyn ResourceReader>>,
}

impl FrameworkProperties {
    pub fn new(settings: FrameworkSettings) -> Self {
        let mime_types: Arc<dyn MimeTypeMapper> = Arc::new(DefaultMimeTypeMapper::default());
        Self {
            settings,
            catalog_provider: None,
            storage_provider: None,
            catalog_stores: BTreeMap::new(),
            federated_sources: BTreeMap::new(),
            connected_sources: Vec::new(),
            pre_ingest: Vec::new(),
            post_ingest: Vec::new(),
            pre_query: Vec::new(),
            post_query: Vec::new(),
            pre_resource: Vec::new(),
            post_resource: Vec::new(),
            policy_plugins: Vec::new(),
            access_plugins: Vec::new(),
            pre_create_storage: Vec::new(),
            post_create_storage: Vec::new(),
            pre_update_storage: Vec::new(),
            post_update_storage: Vec::new(),
            historian: None,
            attribute_injectors: Vec::new(),
            default_values: DefaultAttributeValues::default(),
            resource_readers: vec![Arc::new(FileResourceReader::new(mime_types.clone()))],
            mime_types,
            transformers: TransformerRegistry::with_defaults(),
            federation_strategy: Arc::new(SortedFederationStrategy),
            source_poller: Arc::new(DirectSourcePoller),
            download_manager: Arc::new(DirectDownloadManager::default()),
        }
    }

    pub fn local_id(&self) -> &str {
        &self.settings.site_name
    }

    pub fn with_catalog_provider(mut self, provider: Arc<dyn CatalogProvider>) -> Self {
        self.catalog_provider = Some(provider);
        self
    }

    /// Also registers a reader so `content:` resource URIs resolve against it.
    pub fn with_storage_provider(mut self, storage: Arc<dyn StorageProvider>) -> Self {
        self.resource_readers
            .push(Arc::new(ContentResourceReader::new(storage.clone())));
        self.storage_provider = Some(storage);
        self
    }

    pub fn with_catalog_store(mut self, store: Arc<dyn CatalogProvider>) -> Self {
        self.catalog_stores.insert(store.id().to_string(), store);
        self
    }

    pub fn with_federated_source(mut self, source: Arc<dyn Source>) -> Self {
        self.federated_sources
            .insert(source.id().to_string(), source);
        self
    }

    pub fn with_connected_source(mut self, source: Arc<dyn Source>) -> Self {
        self.connected_sources.push(source);
        self
    }
}

impl Default for FrameworkProperties {
    fn default() -> Self {
        Self::new(FrameworkSettings::default())
    }
}

/// Entry point for every catalog operation.
pub struct CatalogFramework {
    create: CreateOperations,
    update: UpdateOperations,
    delete: DeleteOperations,
    query: QueryOperations,
    resource: ResourceOperations,
    source: SourceOperations,
}

impl CatalogFramework {
    pub fn new(properties: FrameworkProperties) -> Self {
        let properties = Arc::new(properties);
        Self {
            create: CreateOperations::new(properties.clone()),
            update: UpdateOperations::new(properties.clone()),
            delete: DeleteOperations::new(properties.clone()),
            query: QueryOperations::new(properties.clone()),
            resource: ResourceOperations::new(properties.clone()),
            source: SourceOperations::new(properties),
        }
    }

    pub fn id(&self) -> &str {
        self.source.local_id()
    }

    pub fn create(&self, request: CreateRequest) -> Result<CreateResponse, CatalogError> {
        self.create.create(request)
    }

    /// Stores `content_items` and creates a metacard for each unqualified item.
    pub fn create_with_content(
        &self,
        content_items: Vec<ContentItem>,
        store_ids: BTreeSet<String>,
        context: OperationContext,
    ) -> Result<CreateResponse, CatalogError> {
        self.create
            .create_with_content(content_items, store_ids, context)
    }

    pub fn update(&self, request: UpdateRequest) -> Result<UpdateResponse, CatalogError> {
        self.update.update(request)
    }

    pub fn update_with_content(
        &self,
        content_items: Vec<ContentItem>,
        store_ids: BTreeSet<String>,
        context: OperationContext,
    ) -> Result<UpdateResponse, CatalogError> {
        self.update
            .update_with_content(content_items, store_ids, context)
    }

    pub fn delete(&self, request: DeleteRequest) -> Result<DeleteResponse, CatalogError> {
        self.delete.delete(request)
    }

    pub fn query(&self, request: QueryRequest) -> Result<QueryResponse, CatalogError> {
        self.query.query(request, false)
    }

    pub fn retrieve_resource(
        &self,
        request: ResourceRequest,
    ) -> Result<ResourceResponse, CatalogError> {
        self.resource.retrieve(request)
    }

    pub fn source_info(
        &self,
        request: SourceInfoRequest,
    ) -> Result<SourceInfoResponse, CatalogError> {
        self.source.source_info(request)
    }

    pub fn is_source_available(&self, source_id: &str) -> bool {
        self.source.is_source_available(source_id)
    }
}
