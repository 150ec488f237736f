mod common;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use assert_matches::assert_matches;
use catalog_ops::content::ContentItem;
use catalog_ops::error::CatalogError;
use catalog_ops::framework::CatalogFramework;
use catalog_ops::history::Historian;
use catalog_ops::metacard::{self, AttributeValue, Metacard};
use catalog_ops::operation::{OperationContext, ResourceRequest, UpdateRequest, UpdateResponse};
use catalog_ops::providers::file_storage::FileSystemStorageProvider;
use chrono::{TimeZone, Utc};

use common::{LOCAL, MemoryProvider, NoPolicy, VetoStorage, properties, temp_store};

#[derive(Default)]
struct CountingHistorian {
    versions: AtomicUsize,
}

impl Historian for CountingHistorian {
    fn version_update(&self, response: UpdateResponse) -> Result<UpdateResponse, CatalogError> {
        self.versions.fetch_add(response.updated.len(), Ordering::SeqCst);
        Ok(response)
    }
}

fn seeded() -> Arc<MemoryProvider> {
    let provider = MemoryProvider::new(LOCAL);
    let created = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    provider.seed([
        Metacard::with_id("a")
            .with_attribute(metacard::TITLE, "alpha")
            .with_attribute(metacard::METACARD_CREATED, created),
        Metacard::with_id("b").with_attribute(metacard::TITLE, "beta"),
    ]);
    provider
}

#[test]
fn update_by_id_replaces_metacards() {
    let provider = seeded();
    let historian = Arc::new(CountingHistorian::default());
    let mut properties = properties(provider.clone());
    properties.historian = Some(historian.clone());
    let framework = CatalogFramework::new(properties);

    let response = framework
        .update(UpdateRequest::by_id(vec![
            Metacard::with_id("a").with_attribute(metacard::TITLE, "renamed"),
        ]))
        .unwrap();
    assert_eq!(response.updated.len(), 1);
    assert_eq!(response.updated[0].old.title(), Some("alpha"));
    assert_eq!(provider.get("a").unwrap().title(), Some("renamed"));
    assert!(provider.get("a").unwrap().has_value(metacard::METACARD_MODIFIED));
    assert_eq!(historian.versions.load(Ordering::SeqCst), 1);
}

#[test]
fn update_by_other_attribute_is_rekeyed_to_ids() {
    let provider = seeded();
    let framework = CatalogFramework::new(properties(provider.clone()));

    let response = framework
        .update(UpdateRequest::new(
            metacard::TITLE,
            vec![(
                AttributeValue::from("beta"),
                Metacard::default().with_attribute(metacard::TITLE, "beta 2"),
            )],
        ))
        .unwrap();
    assert_eq!(response.updated.len(), 1);
    assert_eq!(response.updated[0].new.id(), Some("b"));
    assert_eq!(provider.get("b").unwrap().title(), Some("beta 2"));
}

#[test]
fn update_by_unknown_attribute_value_fails() {
    let provider = seeded();
    let framework = CatalogFramework::new(properties(provider.clone()));

    let result = framework.update(UpdateRequest::new(
        metacard::TITLE,
        vec![(AttributeValue::from("nothing"), Metacard::default())],
    ));
    assert_matches!(result, Err(CatalogError::UnsupportedQuery(_)));
    assert_eq!(provider.updates.load(Ordering::SeqCst), 0);
}

#[test]
fn empty_update_is_rejected() {
    let provider = seeded();
    let framework = CatalogFramework::new(properties(provider.clone()));

    assert_matches!(
        framework.update(UpdateRequest::by_id(Vec::new())),
        Err(CatalogError::Ingest(_))
    );
    assert_eq!(provider.updates.load(Ordering::SeqCst), 0);
}

#[test]
fn update_with_policy_keeps_original_creation_time() {
    let provider = seeded();
    let mut properties = properties(provider.clone());
    properties.policy_plugins.push(Arc::new(NoPolicy));
    let framework = CatalogFramework::new(properties);

    framework
        .update(UpdateRequest::by_id(vec![Metacard::with_id("a")]))
        .unwrap();
    let stored = provider.get("a").unwrap();
    assert_eq!(
        stored
            .first(metacard::METACARD_CREATED)
            .and_then(AttributeValue::as_date),
        Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).single()
    );
}

#[test]
fn update_with_content_replaces_stored_bytes() {
    let (_temp, store) = temp_store();
    let provider = MemoryProvider::new(LOCAL);
    let storage = Arc::new(FileSystemStorageProvider::new(store));
    let framework =
        CatalogFramework::new(properties(provider.clone()).with_storage_provider(storage));

    let created = framework
        .create_with_content(
            vec![ContentItem::from_bytes("note.txt", "text/plain", b"first".to_vec())],
            BTreeSet::new(),
            OperationContext::default(),
        )
        .unwrap();
    let id = created.created[0].id().unwrap().to_string();

    let updated = framework
        .update_with_content(
            vec![ContentItem::from_bytes("note.txt", "text/plain", b"second!".to_vec()).with_id(&id)],
            BTreeSet::new(),
            OperationContext::default(),
        )
        .unwrap();
    assert_eq!(updated.updated.len(), 1);
    assert_eq!(
        provider.get(&id).unwrap().string(metacard::RESOURCE_SIZE),
        Some("7")
    );

    let resource = framework.retrieve_resource(ResourceRequest::by_id(&id)).unwrap();
    assert_eq!(resource.resource.data, b"second!");
}

#[test]
fn update_with_content_needs_metacard_ids() {
    let (_temp, store) = temp_store();
    let provider = MemoryProvider::new(LOCAL);
    let storage = Arc::new(FileSystemStorageProvider::new(store));
    let framework = CatalogFramework::new(properties(provider).with_storage_provider(storage));

    let result = framework.update_with_content(
        vec![ContentItem::from_bytes("note.txt", "text/plain", b"x".to_vec())],
        BTreeSet::new(),
        OperationContext::default(),
    );
    assert_matches!(result, Err(CatalogError::Ingest(_)));
}

#[test]
fn vetoed_content_update_keeps_previous_bytes() {
    let (_temp, store) = temp_store();
    let provider = MemoryProvider::new(LOCAL);
    let storage = Arc::new(FileSystemStorageProvider::new(store.clone()));
    let framework = CatalogFramework::new(
        properties(provider.clone()).with_storage_provider(storage.clone()),
    );
    let created = framework
        .create_with_content(
            vec![ContentItem::from_bytes("note.txt", "text/plain", b"first".to_vec())],
            BTreeSet::new(),
            OperationContext::default(),
        )
        .unwrap();
    let id = created.created[0].id().unwrap().to_string();

    let mut properties = properties(provider.clone()).with_storage_provider(storage);
    properties.pre_update_storage.push(Arc::new(VetoStorage));
    let vetoed = CatalogFramework::new(properties);
    let result = vetoed.update_with_content(
        vec![ContentItem::from_bytes("note.txt", "text/plain", b"second!".to_vec()).with_id(&id)],
        BTreeSet::new(),
        OperationContext::default(),
    );

    assert_matches!(result, Err(CatalogError::Ingest(_)));
    assert_eq!(provider.updates.load(Ordering::SeqCst), 0);
    let resource = framework.retrieve_resource(ResourceRequest::by_id(&id)).unwrap();
    assert_eq!(resource.resource.data, b"first");
    let staging = store.storage_root().join("staging");
    assert_eq!(
        std::fs::read_dir(staging.as_std_path()).map(|entries| entries.count()).unwrap_or(0),
        0
    );
}
