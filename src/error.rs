use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CatalogError {
    #[error("ingest failed: {0}")]
    Ingest(String),

    #[error("internal error during ingest: {0}")]
    InternalIngest(String),

    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("processing stopped: {0}")]
    StopProcessing(String),

    #[error("unsupported query: {0}")]
    UnsupportedQuery(String),

    #[error("federation failed: {0}")]
    Federation(String),

    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("resource not supported: {0}")]
    ResourceNotSupported(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("transform failed: {0}")]
    Transform(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("resource request failed: {0}")]
    Http(String),

    #[error("resource host returned status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("missing config file at {0}")]
    MissingConfig(PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),
}

impl CatalogError {
    /// Errors a caller can act on directly; everything else raised by a provider
    /// during ingest is reported as an internal fault.
    pub fn is_ingest_family(&self) -> bool {
        matches!(
            self,
            CatalogError::Ingest(_)
                | CatalogError::InternalIngest(_)
                | CatalogError::SourceUnavailable(_)
        )
    }

    pub(crate) fn into_ingest(self) -> CatalogError {
        match self {
            CatalogError::StopProcessing(message) => CatalogError::Ingest(message),
            err if err.is_ingest_family() => err,
            err => CatalogError::InternalIngest(err.to_string()),
        }
    }
}

/// Failure raised by a plugin stage.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PluginError {
    /// The plugin could not do its work; the chain carries on without it.
    #[error("plugin execution failed: {0}")]
    Execution(String),

    /// The plugin vetoes the whole operation.
    #[error("processing stopped: {0}")]
    StopProcessing(String),
}

impl From<PluginError> for CatalogError {
    fn from(value: PluginError) -> Self {
        match value {
            PluginError::Execution(message) => CatalogError::InternalIngest(message),
            PluginError::StopProcessing(message) => CatalogError::StopProcessing(message),
        }
    }
}
