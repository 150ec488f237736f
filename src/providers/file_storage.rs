//! Content storage on the local file system.
//!
//! Writes land in a per-transaction staging directory and only replace
//! committed content on `commit`:
//!
//! ```text
//! <root>/staging/<transaction>/<metacard id>/<part>/<filename>
//! <root>/content/<metacard id>/<part>/<filename>
//! ```
//!
//! Ids are encoded with `encode_path_segment`. `<part>` is `q.` plus the
//! encoded qualifier, or `_` for the main product. Each part directory
//! also holds a `.content.json` sidecar describing the file.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::content::{ContentData, ContentItem, parse_content_uri};
use crate::error::CatalogError;
use crate::fs_util::{
    atomic_rename_dir, encode_path_segment, sanitize_filename, write_bytes_atomic,
    write_json_atomic,
};
use crate::storage::{
    CreateStorageRequest, CreateStorageResponse, DeleteStorageRequest, DeleteStorageResponse,
    StorageProvider, UpdateStorageRequest, UpdateStorageResponse,
};
use crate::store::Store;

const SIDECAR: &str = ".content.json";
const MAIN_PART: &str = "_";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ContentRecord {
    id: String,
    #[serde(default)]
    qualifier: Option<String>,
    filename: String,
    mime_type: String,
    size: u64,
}

#[derive(Debug, Clone)]
enum Pending {
    Write(Vec<(String, String)>),
    Delete(BTreeSet<String>),
}

pub struct FileSystemStorageProvider {
    store: Store,
    pending: Mutex<HashMap<String, Pending>>,
}

impl FileSystemStorageProvider {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn part_name(qualifier: Option<&str>) -> String {
        match qualifier {
            Some(qualifier) if !qualifier.is_empty() => {
                format!("q.{}", encode_path_segment(qualifier))
            }
            _ => MAIN_PART.to_string(),
        }
    }

    fn remember(&self, transaction_id: &str, change: Pending) -> Result<(), CatalogError> {
        self.pending
            .lock()
            .map_err(|_| CatalogError::Storage("storage lock poisoned".to_string()))?
            .insert(transaction_id.to_string(), change);
        Ok(())
    }

    fn take(&self, transaction_id: &str) -> Result<Option<Pending>, CatalogError> {
        Ok(self
            .pending
            .lock()
            .map_err(|_| CatalogError::Storage("storage lock poisoned".to_string()))?
            .remove(transaction_id))
    }

    /// Copies every item into the staging area of `transaction_id`.
    fn stage(
        &self,
        transaction_id: &str,
        items: &[ContentItem],
    ) -> Result<Vec<ContentItem>, CatalogError> {
        let staging = self.store.staging_dir(transaction_id);
        let mut staged = Vec::with_capacity(items.len());
        let mut parts = Vec::with_capacity(items.len());
        for item in items {
            if item.id.is_empty() {
                return Err(CatalogError::Storage(format!(
                    "content item {} has no id",
                    item.filename
                )));
            }
            let part = Self::part_name(item.qualifier.as_deref());
            let dir = staging.join(encode_path_segment(&item.id)).join(&part);
            let path = dir.join(sanitize_filename(&item.filename));
            let bytes = item.read_bytes()?;
            write_bytes_atomic(&path, &bytes)?;
            let record = ContentRecord {
                id: item.id.clone(),
                qualifier: item.qualifier.clone(),
                filename: item.filename.clone(),
                mime_type: item.mime_type.clone(),
                size: bytes.len() as u64,
            };
            write_json_atomic(&dir.join(SIDECAR), &record)?;

            let mut stored = item.clone();
            stored.size = record.size;
            staged.push(stored);
            parts.push((item.id.clone(), part));
        }
        self.remember(transaction_id, Pending::Write(parts))?;
        debug!(transaction = transaction_id, count = staged.len(), "staged content");
        Ok(staged)
    }

    fn read_part(&self, dir: &Utf8Path) -> Result<ContentItem, CatalogError> {
        let record: ContentRecord = Store::read_json(&dir.join(SIDECAR))?;
        let path = dir.join(sanitize_filename(&record.filename));
        Ok(ContentItem {
            id: record.id,
            qualifier: record.qualifier,
            filename: record.filename,
            mime_type: record.mime_type,
            size: record.size,
            data: ContentData::File(path),
            metacard: None,
        })
    }

    fn committed_parts(&self, id: &str) -> Result<Vec<ContentItem>, CatalogError> {
        let dir = self.store.content_dir(id);
        if !dir.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let mut parts = Vec::new();
        let entries = fs::read_dir(dir.as_std_path())
            .map_err(|err| CatalogError::Filesystem(format!("list {dir}: {err}")))?;
        for entry in entries {
            let entry = entry.map_err(|err| CatalogError::Filesystem(err.to_string()))?;
            let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) else {
                continue;
            };
            if path.join(SIDECAR).as_std_path().exists() {
                parts.push(self.read_part(&path)?);
            }
        }
        Ok(parts)
    }
}

impl StorageProvider for FileSystemStorageProvider {
    fn is_available(&self) -> bool {
        self.store.ensure_storage_root().is_ok()
    }

    fn create(
        &self,
        request: &CreateStorageRequest,
    ) -> Result<CreateStorageResponse, CatalogError> {
        let staged = self.stage(&request.id, &request.content_items)?;
        Ok(CreateStorageResponse::new(request.clone(), staged))
    }

    fn update(
        &self,
        request: &UpdateStorageRequest,
    ) -> Result<UpdateStorageResponse, CatalogError> {
        if let Some(item) = request
            .content_items
            .iter()
            .find(|item| !self.store.content_dir(&item.id).as_std_path().exists())
        {
            return Err(CatalogError::Storage(format!(
                "no stored content for metacard {}",
                item.id
            )));
        }
        let staged = self.stage(&request.id, &request.content_items)?;
        Ok(UpdateStorageResponse::new(request.clone(), staged))
    }

    fn delete(
        &self,
        request: &DeleteStorageRequest,
    ) -> Result<DeleteStorageResponse, CatalogError> {
        let ids: BTreeSet<String> = request
            .metacards
            .iter()
            .filter_map(|metacard| metacard.resource_uri())
            .filter_map(parse_content_uri)
            .map(|(id, _)| id)
            .collect();
        let mut deleted_items = Vec::new();
        for id in &ids {
            deleted_items.extend(self.committed_parts(id)?);
        }
        self.remember(&request.id, Pending::Delete(ids))?;
        Ok(DeleteStorageResponse {
            request: request.clone(),
            deleted_items,
        })
    }

    fn read(&self, uri: &str) -> Result<ContentItem, CatalogError> {
        let (id, qualifier) = parse_content_uri(uri)
            .ok_or_else(|| CatalogError::ResourceNotFound(format!("not a content uri: {uri}")))?;
        let dir = self
            .store
            .content_dir(&id)
            .join(Self::part_name(qualifier.as_deref()));
        if !dir.join(SIDECAR).as_std_path().exists() {
            return Err(CatalogError::ResourceNotFound(format!(
                "no stored content for {uri}"
            )));
        }
        self.read_part(&dir)
    }

    fn commit(&self, transaction_id: &str) -> Result<(), CatalogError> {
        let change = self.take(transaction_id)?.ok_or_else(|| {
            CatalogError::Storage(format!("unknown storage transaction {transaction_id}"))
        })?;
        match change {
            Pending::Write(parts) => {
                let staging = self.store.staging_dir(transaction_id);
                for (id, part) in parts {
                    let from = staging.join(encode_path_segment(&id)).join(&part);
                    let to = self.store.content_dir(&id).join(&part);
                    atomic_rename_dir(from.as_std_path(), to.as_std_path())
                        .map_err(|err| CatalogError::Storage(format!("commit {id}: {err}")))?;
                }
                if let Err(err) = fs::remove_dir_all(staging.as_std_path()) {
                    warn!(transaction = transaction_id, error = %err, "unable to clear staging");
                }
            }
            Pending::Delete(ids) => {
                for id in ids {
                    let dir = self.store.content_dir(&id);
                    if dir.as_std_path().exists() {
                        fs::remove_dir_all(dir.as_std_path()).map_err(|err| {
                            CatalogError::Storage(format!("delete content {id}: {err}"))
                        })?;
                    }
                }
            }
        }
        debug!(transaction = transaction_id, "committed content");
        Ok(())
    }

    fn rollback(&self, transaction_id: &str) -> Result<(), CatalogError> {
        self.take(transaction_id)?;
        let staging = self.store.staging_dir(transaction_id);
        if staging.as_std_path().exists() {
            fs::remove_dir_all(staging.as_std_path())
                .map_err(|err| CatalogError::Storage(format!("rollback: {err}")))?;
        }
        debug!(transaction = transaction_id, "rolled back content");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metacard::{self, Metacard};

    fn provider() -> (tempfile::TempDir, FileSystemStorageProvider) {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let store = Store::new_with_paths(root.join("catalog"), root.join("content"));
        (temp, FileSystemStorageProvider::new(store))
    }

    #[test]
    fn content_visible_only_after_commit() {
        let (_temp, storage) = provider();
        let item = ContentItem::from_bytes("a.txt", "text/plain", b"hello".to_vec()).with_id("m1");
        let request = CreateStorageRequest::new(vec![item]);
        storage.create(&request).unwrap();
        assert!(storage.read("content:m1").is_err());

        storage.commit(&request.id).unwrap();
        let read = storage.read("content:m1").unwrap();
        assert_eq!(read.read_bytes().unwrap(), b"hello");
        assert_eq!(read.mime_type, "text/plain");
    }

    #[test]
    fn rollback_discards_staged_content() {
        let (_temp, storage) = provider();
        let item = ContentItem::from_bytes("a.txt", "text/plain", b"x".to_vec()).with_id("m1");
        let request = CreateStorageRequest::new(vec![item]);
        storage.create(&request).unwrap();
        storage.rollback(&request.id).unwrap();
        assert!(storage.commit(&request.id).is_err());
        assert!(storage.read("content:m1").is_err());
    }

    #[test]
    fn qualified_parts_stored_alongside() {
        let (_temp, storage) = provider();
        let request = CreateStorageRequest::new(vec![
            ContentItem::from_bytes("a.txt", "text/plain", b"main".to_vec()).with_id("m1"),
            ContentItem::from_bytes("thumb.png", "image/png", b"png".to_vec())
                .with_id("m1")
                .with_qualifier("thumbnail"),
        ]);
        storage.create(&request).unwrap();
        storage.commit(&request.id).unwrap();
        let thumb = storage.read("content:m1#thumbnail").unwrap();
        assert_eq!(thumb.read_bytes().unwrap(), b"png");
    }

    #[test]
    fn delete_removes_content_on_commit() {
        let (_temp, storage) = provider();
        let create = CreateStorageRequest::new(vec![
            ContentItem::from_bytes("a.txt", "text/plain", b"x".to_vec()).with_id("m1"),
        ]);
        storage.create(&create).unwrap();
        storage.commit(&create.id).unwrap();

        let metacard = Metacard::with_id("m1").with_attribute(metacard::RESOURCE_URI, "content:m1");
        let delete = DeleteStorageRequest::new(vec![metacard]);
        let response = storage.delete(&delete).unwrap();
        assert_eq!(response.deleted_items.len(), 1);
        assert!(storage.read("content:m1").is_ok());
        storage.commit(&delete.id).unwrap();
        assert!(storage.read("content:m1").is_err());
    }

    #[test]
    fn update_requires_existing_content() {
        let (_temp, storage) = provider();
        let request = UpdateStorageRequest::new(vec![
            ContentItem::from_bytes("a.txt", "text/plain", b"x".to_vec()).with_id("nope"),
        ]);
        assert!(matches!(storage.update(&request), Err(CatalogError::Storage(_))));
    }
}
