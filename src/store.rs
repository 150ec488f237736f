use std::fs;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::de::DeserializeOwned;

use crate::error::CatalogError;
use crate::fs_util::encode_path_segment;

/// On-disk layout shared by the file-backed catalog and storage providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Store {
    catalog_root: Utf8PathBuf,
    storage_root: Utf8PathBuf,
}

impl Store {
    /// Roots under the user's data directory.
    pub fn new() -> Result<Self, CatalogError> {
        let data_root = default_data_root()?;
        Ok(Self {
            catalog_root: data_root.join("catalog"),
            storage_root: data_root.join("content"),
        })
    }

    pub fn new_with_paths(catalog_root: Utf8PathBuf, storage_root: Utf8PathBuf) -> Self {
        Self {
            catalog_root,
            storage_root,
        }
    }

    pub fn catalog_root(&self) -> &Utf8Path {
        &self.catalog_root
    }

    pub fn storage_root(&self) -> &Utf8Path {
        &self.storage_root
    }

    pub fn metacards_dir(&self) -> Utf8PathBuf {
        self.catalog_root.join("metacards")
    }

    pub fn metacard_path(&self, id: &str) -> Utf8PathBuf {
        self.metacards_dir()
            .join(format!("{}.json", encode_path_segment(id)))
    }

    /// Committed content of one metacard; one sub-directory per part.
    pub fn content_dir(&self, id: &str) -> Utf8PathBuf {
        self.storage_root.join("content").join(encode_path_segment(id))
    }

    pub fn staging_dir(&self, transaction_id: &str) -> Utf8PathBuf {
        self.storage_root
            .join("staging")
            .join(encode_path_segment(transaction_id))
    }

    pub fn ensure_catalog_root(&self) -> Result<(), CatalogError> {
        fs::create_dir_all(self.metacards_dir().as_std_path())
            .map_err(|err| CatalogError::Filesystem(err.to_string()))
    }

    pub fn ensure_storage_root(&self) -> Result<(), CatalogError> {
        fs::create_dir_all(self.storage_root.join("content").as_std_path())
            .map_err(|err| CatalogError::Filesystem(err.to_string()))
    }

    pub fn read_json<T: DeserializeOwned>(path: &Utf8Path) -> Result<T, CatalogError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| CatalogError::Filesystem(format!("read {path}: {err}")))?;
        serde_json::from_str(&content)
            .map_err(|err| CatalogError::Filesystem(format!("parse {path}: {err}")))
    }

    /// Every `*.json` document under `root`, in path order.
    pub fn list_json<T: DeserializeOwned>(root: &Utf8Path) -> Result<Vec<T>, CatalogError> {
        if !root.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let mut paths = walk_dir(root.as_std_path())?
            .into_iter()
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
            .collect::<Vec<_>>();
        paths.sort();
        paths
            .into_iter()
            .map(|path| {
                let path = Utf8PathBuf::from_path_buf(path)
                    .map_err(|_| CatalogError::Filesystem("invalid metacard path".to_string()))?;
                Self::read_json(&path)
            })
            .collect()
    }
}

pub fn default_data_root() -> Result<Utf8PathBuf, CatalogError> {
    BaseDirs::new()
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.data_dir().join("catalog-ops")).ok())
        .ok_or_else(|| CatalogError::Filesystem("unable to resolve data directory".to_string()))
}

fn walk_dir(root: &Path) -> Result<Vec<PathBuf>, CatalogError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries =
            fs::read_dir(&path).map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| CatalogError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path.clone());
            }
            items.push(path);
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let store = Store::new_with_paths(
            Utf8PathBuf::from("/data/catalog"),
            Utf8PathBuf::from("/data/content"),
        );
        assert!(store.metacard_path("abc").ends_with("metacards/abc.json"));
        assert!(store.metacard_path("../x").ends_with("metacards/%2E%2E%2Fx.json"));
        assert_ne!(store.metacard_path("a b"), store.metacard_path("a_b"));
        assert!(store.content_dir("abc").ends_with("content/content/abc"));
        assert!(store.staging_dir("t1").ends_with("staging/t1"));
    }
}
