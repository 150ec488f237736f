use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use crate::error::CatalogError;
use crate::framework::FrameworkProperties;
use crate::source::{CatalogProvider, Source, SourceDescriptor};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceInfoRequest {
    pub source_ids: BTreeSet<String>,
    pub enterprise: bool,
}

impl SourceInfoRequest {
    pub fn local() -> Self {
        Self::default()
    }

    pub fn enterprise() -> Self {
        Self {
            enterprise: true,
            ..Self::default()
        }
    }

    pub fn for_sources<I, S>(source_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            source_ids: source_ids.into_iter().map(Into::into).collect(),
            enterprise: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfoResponse {
    pub request: SourceInfoRequest,
    pub descriptors: BTreeSet<SourceDescriptor>,
}

/// Source availability and descriptors.
#[derive(Clone)]
pub struct SourceOperations {
    properties: Arc<FrameworkProperties>,
}

impl SourceOperations {
    pub fn new(properties: Arc<FrameworkProperties>) -> Self {
        Self { properties }
    }

    pub fn local_id(&self) -> &str {
        self.properties.local_id()
    }

    /// The local catalog provider, provided it is configured and available.
    pub(crate) fn local_provider(&self) -> Result<Arc<dyn CatalogProvider>, CatalogError> {
        match &self.properties.catalog_provider {
            Some(provider) if self.properties.source_poller.is_available(&**provider) => {
                Ok(provider.clone())
            }
            Some(_) => Err(CatalogError::SourceUnavailable(format!(
                "local provider for {} is not available",
                self.local_id()
            ))),
            None => Err(CatalogError::SourceUnavailable(
                "no local catalog provider configured".to_string(),
            )),
        }
    }

    /// Any source the framework knows by `source_id`.
    pub(crate) fn find_source(&self, source_id: &str) -> Option<Arc<dyn Source>> {
        if source_id == self.local_id() {
            return self
                .properties
                .catalog_provider
                .clone()
                .map(|provider| provider as Arc<dyn Source>);
        }
        self.properties
            .federated_sources
            .get(source_id)
            .cloned()
            .or_else(|| {
                self.properties
                    .catalog_stores
                    .get(source_id)
                    .map(|store| store.clone() as Arc<dyn Source>)
            })
            .or_else(|| {
                self.properties
                    .connected_sources
                    .iter()
                    .find(|source| source.id() == source_id)
                    .cloned()
            })
    }

    pub fn is_source_available(&self, source_id: &str) -> bool {
        let available = self
            .find_source(source_id)
            .is_some_and(|source| self.properties.source_poller.is_available(source.as_ref()));
        debug!(source = source_id, available, "checked source availability");
        available
    }

    pub fn source_info(
        &self,
        request: SourceInfoRequest,
    ) -> Result<SourceInfoResponse, CatalogError> {
        let descriptors = if self.properties.settings.fanout {
            BTreeSet::from([self.fanout_descriptor()])
        } else if request.enterprise {
            let mut descriptors = BTreeSet::from([self.local_descriptor()]);
            descriptors.extend(
                self.properties
                    .federated_sources
                    .values()
                    .map(|source| self.describe(source.as_ref(), source.id())),
            );
            descriptors
        } else if !request.source_ids.is_empty() {
            let mut descriptors = BTreeSet::new();
            let mut unknown = Vec::new();
            for id in &request.source_ids {
                if id == self.local_id() {
                    descriptors.insert(self.local_descriptor());
                } else if let Some(source) = self.properties.federated_sources.get(id) {
                    descriptors.insert(self.describe(source.as_ref(), id));
                } else {
                    unknown.push(id.as_str());
                }
            }
            if !unknown.is_empty() {
                return Err(CatalogError::SourceUnavailable(format!(
                    "unknown source ids: {}",
                    unknown.join(", ")
                )));
            }
            descriptors
        } else {
            BTreeSet::from([self.local_descriptor()])
        };
        Ok(SourceInfoResponse {
            request,
            descriptors,
        })
    }

    fn describe(&self, source: &dyn Source, id: &str) -> SourceDescriptor {
        SourceDescriptor {
            source_id: id.to_string(),
            available: self.properties.source_poller.is_available(source),
            version: source.version(),
            content_types: source.content_types(),
            last_available: self.properties.source_poller.last_available(source.id()),
        }
    }

    fn local_descriptor(&self) -> SourceDescriptor {
        match &self.properties.catalog_provider {
            Some(provider) => self.describe(&**provider, self.local_id()),
            None => SourceDescriptor {
                source_id: self.local_id().to_string(),
                available: false,
                version: None,
                content_types: BTreeSet::new(),
                last_available: None,
            },
        }
    }

    /// One descriptor standing for every source behind the local id.
    fn fanout_descriptor(&self) -> SourceDescriptor {
        let mut descriptor = self.local_descriptor();
        let remote = self
            .properties
            .federated_sources
            .values()
            .chain(self.properties.connected_sources.iter());
        for source in remote {
            let other = self.describe(source.as_ref(), source.id());
            descriptor.available |= other.available;
            descriptor.content_types.extend(other.content_types);
            descriptor.last_available = descriptor.last_available.max(other.last_available);
        }
        descriptor
    }
}
