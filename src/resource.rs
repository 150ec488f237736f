use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use tracing::{debug, warn};
use url::Url;

use crate::content::{CONTENT_SCHEME, DEFAULT_MIME_TYPE};
use crate::error::CatalogError;
use crate::metacard::Metacard;
use crate::mime::MimeTypeMapper;
use crate::operation::{ResourceRequest, ResourceResponse};
use crate::source::Source;
use crate::storage::StorageProvider;

/// Product bytes behind a metacard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl Resource {
    pub fn new(name: &str, mime_type: &str, data: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            data,
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Reads resources for the URI schemes it supports.
pub trait ResourceReader: Send + Sync {
    fn schemes(&self) -> Vec<String>;

    fn retrieve(
        &self,
        uri: &Url,
        options: &BTreeMap<String, String>,
    ) -> Result<Resource, CatalogError>;
}

/// Reads `file:` URIs. With roots set, only files under one of them are served.
pub struct FileResourceReader {
    mime_types: Arc<dyn MimeTypeMapper>,
    roots: Vec<PathBuf>,
}

impl FileResourceReader {
    pub fn new(mime_types: Arc<dyn MimeTypeMapper>) -> Self {
        Self {
            mime_types,
            roots: Vec::new(),
        }
    }

    pub fn with_roots<I, P>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.roots = roots.into_iter().map(Into::into).collect();
        self
    }

    /// Resolves links and `..` before comparing against the roots.
    fn check_readable(&self, path: &Path) -> Result<PathBuf, CatalogError> {
        let resolved = path
            .canonicalize()
            .map_err(|err| CatalogError::ResourceNotFound(format!("{}: {err}", path.display())))?;
        if self.roots.is_empty() {
            return Ok(resolved);
        }
        let permitted = self
            .roots
            .iter()
            .filter_map(|root| root.canonicalize().ok())
            .any(|root| resolved.starts_with(root));
        if !permitted {
            warn!(path = %resolved.display(), "file outside readable roots");
            return Err(CatalogError::ResourceNotSupported(format!(
                "{} is outside the readable directories",
                path.display()
            )));
        }
        Ok(resolved)
    }
}

impl ResourceReader for FileResourceReader {
    fn schemes(&self) -> Vec<String> {
        vec!["file".to_string()]
    }

    fn retrieve(
        &self,
        uri: &Url,
        _options: &BTreeMap<String, String>,
    ) -> Result<Resource, CatalogError> {
        let path = uri
            .to_file_path()
            .map_err(|_| CatalogError::ResourceNotFound(format!("not a file path: {uri}")))?;
        let path = self.check_readable(&path)?;
        let data = fs::read(&path)
            .map_err(|err| CatalogError::ResourceNotFound(format!("{}: {err}", path.display())))?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let mime_type = path
            .extension()
            .and_then(|ext| self.mime_types.mime_for_extension(&ext.to_string_lossy()))
            .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());
        Ok(Resource::new(&name, &mime_type, data))
    }
}

#[derive(Clone)]
pub struct HttpResourceReader {
    client: Client,
}

impl HttpResourceReader {
    pub fn new() -> Result<Self, CatalogError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("catalog-ops/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| CatalogError::Http(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| CatalogError::Http(err.to_string()))?;
        Ok(Self { client })
    }
}

impl ResourceReader for HttpResourceReader {
    fn schemes(&self) -> Vec<String> {
        vec!["http".to_string(), "https".to_string()]
    }

    fn retrieve(
        &self,
        uri: &Url,
        _options: &BTreeMap<String, String>,
    ) -> Result<Resource, CatalogError> {
        let response = self
            .client
            .get(uri.as_str())
            .send()
            .map_err(|err| CatalogError::Http(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "resource request failed".to_string());
            return Err(CatalogError::HttpStatus { status, message });
        }
        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or(DEFAULT_MIME_TYPE)
            .to_string();
        let name = uri
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|segment| !segment.is_empty())
            .unwrap_or("resource")
            .to_string();
        let bytes = response
            .bytes()
            .map_err(|err| CatalogError::Http(err.to_string()))?;
        Ok(Resource::new(&name, &mime_type, bytes.to_vec()))
    }
}

/// Serves `content:` URIs out of the storage provider.
pub struct ContentResourceReader {
    storage: Arc<dyn StorageProvider>,
}

impl ContentResourceReader {
    pub fn new(storage: Arc<dyn StorageProvider>) -> Self {
        Self { storage }
    }
}

impl ResourceReader for ContentResourceReader {
    fn schemes(&self) -> Vec<String> {
        vec![CONTENT_SCHEME.to_string()]
    }

    fn retrieve(
        &self,
        uri: &Url,
        options: &BTreeMap<String, String>,
    ) -> Result<Resource, CatalogError> {
        let mut uri = uri.clone();
        if let Some(qualifier) = options.get(QUALIFIER_OPTION) {
            uri.set_fragment(Some(qualifier));
        }
        let item = self.storage.read(uri.as_str())?;
        Ok(Resource::new(&item.filename, &item.mime_type, item.read_bytes()?))
    }
}

/// Option key selecting a qualified part of a multi-part product.
pub const QUALIFIER_OPTION: &str = "qualifier";

/// Fetches the bytes of one resolved resource.
pub trait ResourceRetriever {
    fn retrieve(&self) -> Result<Resource, CatalogError>;
}

pub struct LocalResourceRetriever<'a> {
    readers: &'a [Arc<dyn ResourceReader>],
    uri: Url,
    options: BTreeMap<String, String>,
}

impl<'a> LocalResourceRetriever<'a> {
    pub fn new(
        readers: &'a [Arc<dyn ResourceReader>],
        uri: Url,
        options: BTreeMap<String, String>,
    ) -> Self {
        Self {
            readers,
            uri,
            options,
        }
    }
}

impl ResourceRetriever for LocalResourceRetriever<'_> {
    fn retrieve(&self) -> Result<Resource, CatalogError> {
        let scheme = self.uri.scheme();
        let mut last_error = None;
        for reader in self
            .readers
            .iter()
            .filter(|reader| reader.schemes().iter().any(|candidate| candidate == scheme))
        {
            match reader.retrieve(&self.uri, &self.options) {
                Ok(resource) => return Ok(resource),
                Err(err) => {
                    debug!(uri = %self.uri, error = %err, "resource reader failed");
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            CatalogError::ResourceNotSupported(format!("no resource reader for scheme {scheme}"))
        }))
    }
}

pub struct RemoteResourceRetriever {
    source: Arc<dyn Source>,
    uri: Url,
    options: BTreeMap<String, String>,
}

impl RemoteResourceRetriever {
    pub fn new(source: Arc<dyn Source>, uri: Url, options: BTreeMap<String, String>) -> Self {
        Self {
            source,
            uri,
            options,
        }
    }
}

impl ResourceRetriever for RemoteResourceRetriever {
    fn retrieve(&self) -> Result<Resource, CatalogError> {
        self.source.retrieve_resource(&self.uri, &self.options)
    }
}

/// Owns the actual transfer of a resource once it has been located.
pub trait DownloadManager: Send + Sync {
    fn download(
        &self,
        request: ResourceRequest,
        metacard: &Metacard,
        retriever: &dyn ResourceRetriever,
    ) -> Result<ResourceResponse, CatalogError>;
}

/// Retrieves inline on the calling thread, retrying failed attempts.
#[derive(Debug, Clone, Copy)]
pub struct DirectDownloadManager {
    retries: u32,
}

impl DirectDownloadManager {
    pub fn new(retries: u32) -> Self {
        Self { retries }
    }
}

impl Default for DirectDownloadManager {
    fn default() -> Self {
        Self::new(3)
    }
}

impl DownloadManager for DirectDownloadManager {
    fn download(
        &self,
        request: ResourceRequest,
        metacard: &Metacard,
        retriever: &dyn ResourceRetriever,
    ) -> Result<ResourceResponse, CatalogError> {
        let mut attempt = 0;
        loop {
            match retriever.retrieve() {
                Ok(resource) => return Ok(ResourceResponse::new(request, resource)),
                // Lookups that cannot succeed on retry are returned straight away.
                Err(err @ CatalogError::ResourceNotFound(_))
                | Err(err @ CatalogError::ResourceNotSupported(_)) => return Err(err),
                Err(err) if attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        metacard = metacard.id().unwrap_or_default(),
                        attempt,
                        error = %err,
                        "resource download failed, retrying"
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Flaky {
        failures: Cell<u32>,
    }

    impl ResourceRetriever for Flaky {
        fn retrieve(&self) -> Result<Resource, CatalogError> {
            if self.failures.get() > 0 {
                self.failures.set(self.failures.get() - 1);
                return Err(CatalogError::Http("reset".to_string()));
            }
            Ok(Resource::new("a.txt", "text/plain", b"hi".to_vec()))
        }
    }

    #[test]
    fn direct_download_retries_transient_failures() {
        let retriever = Flaky {
            failures: Cell::new(2),
        };
        let response = DirectDownloadManager::new(2)
            .download(ResourceRequest::by_id("1"), &Metacard::with_id("1"), &retriever)
            .unwrap();
        assert_eq!(response.resource.size(), 2);
    }

    #[test]
    fn file_reader_stays_inside_its_roots() {
        let temp = tempfile::tempdir().unwrap();
        let allowed = temp.path().join("allowed");
        let outside = temp.path().join("outside");
        fs::create_dir_all(&allowed).unwrap();
        fs::create_dir_all(&outside).unwrap();
        fs::write(allowed.join("a.txt"), b"inside").unwrap();
        fs::write(outside.join("b.txt"), b"secret").unwrap();

        let mime_types: Arc<dyn MimeTypeMapper> =
            Arc::new(crate::mime::DefaultMimeTypeMapper::default());
        let reader = FileResourceReader::new(mime_types).with_roots([allowed.clone()]);
        let options = BTreeMap::new();

        let inside = Url::from_file_path(allowed.join("a.txt")).unwrap();
        assert_eq!(reader.retrieve(&inside, &options).unwrap().data, b"inside");

        let escaped = Url::from_file_path(outside.join("b.txt")).unwrap();
        assert!(matches!(
            reader.retrieve(&escaped, &options),
            Err(CatalogError::ResourceNotSupported(_))
        ));

        let dotted = Url::parse(&format!(
            "file://{}/../outside/b.txt",
            allowed.display()
        ))
        .unwrap();
        assert!(reader.retrieve(&dotted, &options).is_err());
    }

    #[test]
    fn direct_download_gives_up_after_retries() {
        let retriever = Flaky {
            failures: Cell::new(3),
        };
        let result = DirectDownloadManager::new(2).download(
            ResourceRequest::by_id("1"),
            &Metacard::with_id("1"),
            &retriever,
        );
        assert!(matches!(result, Err(CatalogError::Http(_))));
    }
}
