use std::fs;

use camino::Utf8PathBuf;

use crate::error::CatalogError;
use crate::metacard::Metacard;

pub const CONTENT_SCHEME: &str = "content";
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentData {
    Bytes(Vec<u8>),
    File(Utf8PathBuf),
}

/// Bytes of one product (or one qualified part of it) belonging to a metacard.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentItem {
    /// Id of the owning metacard; empty until one is assigned.
    pub id: String,
    pub qualifier: Option<String>,
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
    pub data: ContentData,
    pub metacard: Option<Metacard>,
}

impl ContentItem {
    pub fn from_bytes(filename: &str, mime_type: &str, bytes: Vec<u8>) -> Self {
        Self {
            id: String::new(),
            qualifier: None,
            filename: filename.to_string(),
            mime_type: mime_type.to_string(),
            size: bytes.len() as u64,
            data: ContentData::Bytes(bytes),
            metacard: None,
        }
    }

    pub fn from_file(path: Utf8PathBuf, mime_type: &str) -> Result<Self, CatalogError> {
        let size = fs::metadata(path.as_std_path())
            .map_err(|err| CatalogError::Filesystem(format!("stat {path}: {err}")))?
            .len();
        Ok(Self {
            id: String::new(),
            qualifier: None,
            filename: path.file_name().unwrap_or_default().to_string(),
            mime_type: mime_type.to_string(),
            size,
            data: ContentData::File(path),
            metacard: None,
        })
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    pub fn with_qualifier(mut self, qualifier: &str) -> Self {
        self.qualifier = Some(qualifier.to_string());
        self
    }

    pub fn with_metacard(mut self, metacard: Metacard) -> Self {
        self.metacard = Some(metacard);
        self
    }

    pub fn uri(&self) -> String {
        content_uri(&self.id, self.qualifier.as_deref())
    }

    pub fn read_bytes(&self) -> Result<Vec<u8>, CatalogError> {
        match &self.data {
            ContentData::Bytes(bytes) => Ok(bytes.clone()),
            ContentData::File(path) => fs::read(path.as_std_path())
                .map_err(|err| CatalogError::Filesystem(format!("read {path}: {err}"))),
        }
    }
}

pub fn content_uri(id: &str, qualifier: Option<&str>) -> String {
    match qualifier {
        Some(qualifier) if !qualifier.is_empty() => {
            format!("{CONTENT_SCHEME}:{id}#{qualifier}")
        }
        _ => format!("{CONTENT_SCHEME}:{id}"),
    }
}

/// Splits `content:<id>[#qualifier]` into its id and qualifier.
pub fn parse_content_uri(uri: &str) -> Option<(String, Option<String>)> {
    let rest = uri.strip_prefix(CONTENT_SCHEME)?.strip_prefix(':')?;
    let (id, qualifier) = match rest.split_once('#') {
        Some((id, qualifier)) if !qualifier.is_empty() => (id, Some(qualifier.to_string())),
        Some((id, _)) => (id, None),
        None => (rest, None),
    };
    if id.is_empty() {
        return None;
    }
    Some((id.to_string(), qualifier))
}
