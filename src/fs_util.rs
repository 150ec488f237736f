use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::OnceLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::Serialize;
use tempfile::{Builder, TempDir};
use tracing::warn;

use crate::error::CatalogError;

fn unsafe_chars() -> &'static Regex {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    UNSAFE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("valid filename pattern"))
}

/// Reduces an uploaded filename to something safe to create on disk.
pub fn sanitize_filename(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    let cleaned = unsafe_chars().replace_all(base, "_");
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// File name for an identifier. Unlike [`sanitize_filename`] the mapping is
/// injective, so distinct ids never share a path.
pub fn encode_path_segment(id: &str) -> String {
    if id.is_empty() {
        return "%".to_string();
    }
    url::form_urlencoded::byte_serialize(id.as_bytes())
        .collect::<String>()
        .replace('.', "%2E")
        .replace('*', "%2A")
}

pub fn write_json_atomic<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), CatalogError> {
    let content =
        serde_json::to_vec_pretty(value).map_err(|err| CatalogError::Filesystem(err.to_string()))?;
    write_bytes_atomic(path, &content)
}

pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), CatalogError> {
    let parent = path
        .parent()
        .ok_or_else(|| CatalogError::Filesystem("invalid destination path".to_string()))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
    let mut temp = Builder::new()
        .prefix(".catalog-write")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
    Ok(())
}

pub fn atomic_rename_dir(from: &Path, to: &Path) -> io::Result<()> {
    if to.exists() {
        fs::remove_dir_all(to)?;
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::rename(from, to)
}

/// Temporary copies of uploaded content for one ingest, keyed by metacard id.
/// Everything is deleted when the guard is dropped, whichever way the ingest ends.
#[derive(Debug)]
pub struct TempContentFiles {
    dir: Option<TempDir>,
    paths: BTreeMap<String, Vec<Utf8PathBuf>>,
}

impl TempContentFiles {
    pub fn new(parent: Option<&Utf8Path>) -> Result<Self, CatalogError> {
        let mut builder = Builder::new();
        builder.prefix("catalog-content");
        let dir = match parent {
            Some(parent) => {
                fs::create_dir_all(parent.as_std_path())
                    .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
                builder.tempdir_in(parent.as_std_path())
            }
            None => builder.tempdir(),
        }
        .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        Ok(Self {
            dir: Some(dir),
            paths: BTreeMap::new(),
        })
    }

    /// Writes `bytes` under a sanitized `filename` and records it against `id`.
    pub fn write(&mut self, id: &str, filename: &str, bytes: &[u8]) -> Result<Utf8PathBuf, CatalogError> {
        let root = self
            .dir
            .as_ref()
            .ok_or_else(|| CatalogError::Filesystem("temporary content already released".to_string()))?;
        let root = Utf8Path::from_path(root.path())
            .ok_or_else(|| CatalogError::Filesystem("invalid temp dir".to_string()))?;
        let index = self.paths.get(id).map(Vec::len).unwrap_or(0);
        let path = root
            .join(encode_path_segment(id))
            .join(index.to_string())
            .join(sanitize_filename(filename));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        }
        fs::write(path.as_std_path(), bytes)
            .map_err(|err| CatalogError::Filesystem(format!("write {path}: {err}")))?;
        self.paths.entry(id.to_string()).or_default().push(path.clone());
        Ok(path)
    }

    pub fn paths(&self) -> &BTreeMap<String, Vec<Utf8PathBuf>> {
        &self.paths
    }

    pub fn as_context_paths(&self) -> BTreeMap<String, Vec<String>> {
        self.paths
            .iter()
            .map(|(id, paths)| (id.clone(), paths.iter().map(|path| path.to_string()).collect()))
            .collect()
    }
}

impl Drop for TempContentFiles {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(err) = dir.close() {
                warn!(path = %path.display(), error = %err, "failed to remove temporary content");
            }
        }
    }
}
