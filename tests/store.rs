use std::collections::BTreeSet;
use std::sync::Arc;

use camino::Utf8PathBuf;
use catalog_ops::config::{Config, ConfigLoader};
use catalog_ops::content::ContentItem;
use catalog_ops::framework::CatalogFramework;
use catalog_ops::metacard;
use catalog_ops::operation::{DeleteRequest, OperationContext, QueryRequest, ResourceRequest};
use catalog_ops::providers::file_catalog::FileCatalogProvider;
use catalog_ops::query::{Filter, Query};
use catalog_ops::store::Store;

fn roots() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}

#[test]
fn file_backed_catalog_round_trip() {
    let (_temp, root) = roots();
    let config = Config {
        site_name: Some("site".to_string()),
        catalog_root: Some(root.join("catalog").to_string()),
        storage_root: Some(root.join("content").to_string()),
        temp_dir: Some(root.join("tmp").to_string()),
        default_values: vec![catalog_ops::config::DefaultValueEntry::Shorthand(
            "classification=U".to_string(),
        )],
        ..Config::default()
    };
    std::fs::create_dir_all(root.join("tmp")).unwrap();
    let resolved = ConfigLoader::resolve_config(config).unwrap();
    let framework = CatalogFramework::new(resolved.build_properties().unwrap());
    assert_eq!(framework.id(), "site");

    let created = framework
        .create_with_content(
            vec![ContentItem::from_bytes("notes.txt", "", b"field notes".to_vec())],
            BTreeSet::new(),
            OperationContext::default(),
        )
        .unwrap();
    let id = created.created[0].id().unwrap().to_string();
    assert_eq!(created.created[0].string("classification"), Some("U"));
    assert!(resolved.store().metacard_path(&id).as_std_path().exists());
    assert!(resolved.store().content_dir(&id).as_std_path().exists());

    let found = framework
        .query(QueryRequest::new(Query::new(Filter::like(
            metacard::TITLE,
            "notes*",
        ))))
        .unwrap();
    assert_eq!(found.hits, 1);

    let resource = framework
        .retrieve_resource(ResourceRequest::by_id(&id))
        .unwrap();
    assert_eq!(resource.resource.data, b"field notes");

    let deleted = framework.delete(DeleteRequest::by_ids([id.as_str()])).unwrap();
    assert_eq!(deleted.deleted.len(), 1);
    assert!(!resolved.store().metacard_path(&id).as_std_path().exists());
    assert!(!resolved.store().content_dir(&id).as_std_path().exists());
}

#[test]
fn metacards_survive_a_new_provider() {
    let (_temp, root) = roots();
    let store = Store::new_with_paths(root.join("catalog"), root.join("content"));
    let first = CatalogFramework::new(
        catalog_ops::FrameworkProperties::default()
            .with_catalog_provider(Arc::new(FileCatalogProvider::new("local", store.clone()))),
    );
    first
        .create(catalog_ops::operation::CreateRequest::new(vec![
            catalog_ops::metacard::Metacard::with_id("kept"),
        ]))
        .unwrap();

    let second = CatalogFramework::new(
        catalog_ops::FrameworkProperties::default()
            .with_catalog_provider(Arc::new(FileCatalogProvider::new("local", store))),
    );
    let response = second
        .query(QueryRequest::new(Query::new(Filter::equal(metacard::ID, "kept"))))
        .unwrap();
    assert_eq!(response.hits, 1);
}

#[test]
fn ids_differing_only_in_punctuation_are_stored_apart() {
    use catalog_ops::operation::CreateRequest;
    use catalog_ops::source::{CatalogProvider, Source};

    let (_temp, root) = roots();
    let store = Store::new_with_paths(root.join("catalog"), root.join("content"));
    let provider = FileCatalogProvider::new("local", store);
    let ids = ["a b", "a_b", "x/a", "a", "a:b"];
    let created = provider
        .create(&CreateRequest::new(
            ids.iter().map(|id| metacard::Metacard::with_id(id)).collect(),
        ))
        .unwrap();
    assert_eq!(created.created.len(), ids.len());

    let all = provider
        .query(&QueryRequest::new(Query::new(Filter::Include).with_page_size(100)))
        .unwrap();
    let mut stored = all
        .results
        .iter()
        .filter_map(|result| result.metacard.id().map(str::to_string))
        .collect::<Vec<_>>();
    stored.sort();
    let mut expected = ids.iter().map(|id| id.to_string()).collect::<Vec<_>>();
    expected.sort();
    assert_eq!(stored, expected);

    provider.delete(&DeleteRequest::by_ids(["a b"])).unwrap();
    let remaining = provider
        .query(&QueryRequest::new(Query::new(Filter::equal(metacard::ID, "a_b"))))
        .unwrap();
    assert_eq!(remaining.hits, 1);
}

#[test]
fn content_of_colliding_ids_is_kept_apart() {
    use catalog_ops::providers::file_storage::FileSystemStorageProvider;
    use catalog_ops::storage::{CreateStorageRequest, StorageProvider};

    let (_temp, root) = roots();
    let storage = FileSystemStorageProvider::new(Store::new_with_paths(
        root.join("catalog"),
        root.join("content"),
    ));
    let request = CreateStorageRequest::new(vec![
        ContentItem::from_bytes("a.txt", "text/plain", b"spaced".to_vec()).with_id("a b"),
        ContentItem::from_bytes("a.txt", "text/plain", b"underscored".to_vec()).with_id("a_b"),
    ]);
    storage.create(&request).unwrap();
    storage.commit(&request.id).unwrap();

    let spaced = storage.read("content:a b").unwrap();
    let underscored = storage.read("content:a_b").unwrap();
    assert_eq!(spaced.read_bytes().unwrap(), b"spaced");
    assert_eq!(underscored.read_bytes().unwrap(), b"underscored");
    assert_eq!(underscored.id, "a_b");
}

#[test]
fn file_resources_are_limited_to_configured_roots() {
    use catalog_ops::error::CatalogError;
    use catalog_ops::operation::CreateRequest;

    let (_temp, root) = roots();
    let shared = root.join("shared");
    let private = root.join("private");
    std::fs::create_dir_all(&shared).unwrap();
    std::fs::create_dir_all(&private).unwrap();
    std::fs::write(shared.join("map.txt"), b"public map").unwrap();
    std::fs::write(private.join("keys.txt"), b"do not serve").unwrap();

    let config = Config {
        catalog_root: Some(root.join("catalog").to_string()),
        storage_root: Some(root.join("content").to_string()),
        resource_roots: vec![shared.to_string()],
        ..Config::default()
    };
    let resolved = ConfigLoader::resolve_config(config).unwrap();
    let framework = CatalogFramework::new(resolved.build_properties().unwrap());

    let file_uri = |path: Utf8PathBuf| {
        url::Url::from_file_path(path.as_std_path())
            .unwrap()
            .to_string()
    };
    framework
        .create(CreateRequest::new(vec![
            metacard::Metacard::with_id("map")
                .with_attribute(metacard::RESOURCE_URI, file_uri(shared.join("map.txt"))),
            metacard::Metacard::with_id("keys")
                .with_attribute(metacard::RESOURCE_URI, file_uri(private.join("keys.txt"))),
        ]))
        .unwrap();

    let map = framework
        .retrieve_resource(ResourceRequest::by_id("map"))
        .unwrap();
    assert_eq!(map.resource.data, b"public map");
    assert_matches::assert_matches!(
        framework.retrieve_resource(ResourceRequest::by_id("keys")),
        Err(CatalogError::ResourceNotSupported(_))
    );
}
