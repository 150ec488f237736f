mod common;

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::sync::Arc;

use assert_matches::assert_matches;
use catalog_ops::content::ContentItem;
use catalog_ops::error::{CatalogError, PluginError};
use catalog_ops::framework::CatalogFramework;
use catalog_ops::metacard::{self, Metacard};
use catalog_ops::operation::{
    CreateRequest, OperationContext, QueryRequest, ResourceRequest, ResourceSite,
};
use catalog_ops::plugin::PreResourcePlugin;
use catalog_ops::providers::file_storage::FileSystemStorageProvider;
use catalog_ops::resource::Resource;
use catalog_ops::source::{Source, SourceResponse};
use url::Url;

use common::{LOCAL, MemoryProvider, properties, temp_store};

/// A federated source that serves its own products.
struct RemoteSource {
    catalog: Arc<MemoryProvider>,
}

impl Source for RemoteSource {
    fn id(&self) -> &str {
        self.catalog.id()
    }

    fn is_available(&self) -> bool {
        true
    }

    fn query(&self, request: &QueryRequest) -> Result<SourceResponse, CatalogError> {
        self.catalog.query(request)
    }

    fn retrieve_resource(
        &self,
        uri: &Url,
        _options: &BTreeMap<String, String>,
    ) -> Result<Resource, CatalogError> {
        Ok(Resource::new(
            uri.path().trim_start_matches('/'),
            "text/plain",
            b"remote bytes".to_vec(),
        ))
    }
}

struct RefuseResources;

impl PreResourcePlugin for RefuseResources {
    fn process(&self, _request: ResourceRequest) -> Result<ResourceRequest, PluginError> {
        Err(PluginError::StopProcessing("no downloads".to_string()))
    }
}

#[test]
fn stored_content_is_retrievable_by_id() {
    let (_temp, store) = temp_store();
    let storage = Arc::new(FileSystemStorageProvider::new(store));
    let framework = CatalogFramework::new(
        properties(MemoryProvider::new(LOCAL)).with_storage_provider(storage),
    );

    let created = framework
        .create_with_content(
            vec![ContentItem::from_bytes("report.csv", "", b"a,b\n1,2\n".to_vec())],
            BTreeSet::new(),
            OperationContext::default(),
        )
        .unwrap();
    let id = created.created[0].id().unwrap();

    let response = framework.retrieve_resource(ResourceRequest::by_id(id)).unwrap();
    assert_eq!(response.resource.name, "report.csv");
    assert_eq!(response.resource.mime_type, "text/csv");
    assert_eq!(response.resource.data, b"a,b\n1,2\n");
}

#[test]
fn file_resources_are_read_from_disk() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("product.txt");
    fs::write(&path, b"on disk").unwrap();
    let uri = Url::from_file_path(&path).unwrap();

    let provider = MemoryProvider::new(LOCAL);
    let framework = CatalogFramework::new(properties(provider));
    framework
        .create(CreateRequest::new(vec![
            Metacard::with_id("p1").with_attribute(metacard::RESOURCE_URI, uri.as_str()),
        ]))
        .unwrap();

    let by_id = framework.retrieve_resource(ResourceRequest::by_id("p1")).unwrap();
    assert_eq!(by_id.resource.data, b"on disk");
    let by_uri = framework.retrieve_resource(ResourceRequest::by_uri(&uri)).unwrap();
    assert_eq!(by_uri.resource.name, "product.txt");
}

#[test]
fn unknown_metacard_is_not_found() {
    let framework = CatalogFramework::new(properties(MemoryProvider::new(LOCAL)));
    assert_matches!(
        framework.retrieve_resource(ResourceRequest::by_id("missing")),
        Err(CatalogError::ResourceNotFound(_))
    );
}

#[test]
fn metacard_without_resource_is_not_found() {
    let provider = MemoryProvider::new(LOCAL);
    provider.seed([Metacard::with_id("bare")]);
    let framework = CatalogFramework::new(properties(provider));
    assert_matches!(
        framework.retrieve_resource(ResourceRequest::by_id("bare")),
        Err(CatalogError::ResourceNotFound(_))
    );
}

#[test]
fn remote_resources_come_from_their_source() {
    let catalog = MemoryProvider::new("remote");
    catalog.seed([Metacard::with_id("r1")
        .with_attribute(metacard::RESOURCE_URI, "http://remote.example/r1.txt")]);
    let properties = properties(MemoryProvider::new(LOCAL))
        .with_federated_source(Arc::new(RemoteSource { catalog }));
    let framework = CatalogFramework::new(properties);

    let response = framework
        .retrieve_resource(
            ResourceRequest::by_id("r1").at(ResourceSite::Source("remote".to_string())),
        )
        .unwrap();
    assert_eq!(response.resource.data, b"remote bytes");

    let enterprise = framework
        .retrieve_resource(ResourceRequest::by_id("r1").at(ResourceSite::Enterprise))
        .unwrap();
    assert_eq!(enterprise.resource.name, "r1.txt");
}

#[test]
fn pre_resource_veto_is_not_supported() {
    let provider = MemoryProvider::new(LOCAL);
    provider.seed([Metacard::with_id("x")]);
    let mut properties = properties(provider);
    properties.pre_resource.push(Arc::new(RefuseResources));
    let framework = CatalogFramework::new(properties);

    assert_matches!(
        framework.retrieve_resource(ResourceRequest::by_id("x")),
        Err(CatalogError::ResourceNotSupported(_))
    );
}
