use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use crate::error::CatalogError;
use crate::operation::{
    CreateRequest, CreateResponse, DeleteRequest, DeleteResponse, ProcessingDetail,
    ProcessingDetails, QueryRequest, QueryResponse, UpdateRequest, UpdateResponse,
};
use crate::policy::PolicyMap;
use crate::query::{Query, QueryResult, sort_results};
use crate::resource::Resource;

/// What a single source answered for a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceResponse {
    pub results: Vec<QueryResult>,
    pub hits: u64,
    pub processing_details: ProcessingDetails,
}

impl SourceResponse {
    pub fn new(results: Vec<QueryResult>, hits: u64) -> Self {
        Self {
            results,
            hits,
            processing_details: ProcessingDetails::new(),
        }
    }
}

/// Anything that can be queried.
pub trait Source: Send + Sync {
    fn id(&self) -> &str;

    fn is_available(&self) -> bool;

    fn query(&self, request: &QueryRequest) -> Result<SourceResponse, CatalogError>;

    fn version(&self) -> Option<String> {
        None
    }

    fn content_types(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }

    /// Claims a subject must hold to query this source; empty means open.
    fn security_attributes(&self) -> PolicyMap {
        PolicyMap::new()
    }

    fn retrieve_resource(
        &self,
        uri: &Url,
        _options: &BTreeMap<String, String>,
    ) -> Result<Resource, CatalogError> {
        Err(CatalogError::ResourceNotSupported(format!(
            "source {} cannot retrieve {uri}",
            self.id()
        )))
    }
}

/// A source that also accepts writes: the local catalog or a remote catalog store.
pub trait CatalogProvider: Source {
    fn create(&self, request: &CreateRequest) -> Result<CreateResponse, CatalogError>;

    fn update(&self, request: &UpdateRequest) -> Result<UpdateResponse, CatalogError>;

    fn delete(&self, request: &DeleteRequest) -> Result<DeleteResponse, CatalogError>;
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct SourceDescriptor {
    pub source_id: String,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub content_types: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_available: Option<DateTime<Utc>>,
}

/// Answers availability questions, usually from a cache kept fresh elsewhere.
pub trait SourcePoller: Send + Sync {
    fn is_available(&self, source: &dyn Source) -> bool;

    fn last_available(&self, _source_id: &str) -> Option<DateTime<Utc>> {
        None
    }
}

/// Asks the source every time.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectSourcePoller;

impl SourcePoller for DirectSourcePoller {
    fn is_available(&self, source: &dyn Source) -> bool {
        source.is_available()
    }
}

#[derive(Debug, Clone, Copy)]
struct PollEntry {
    available: bool,
    checked_at: Instant,
    last_available: Option<DateTime<Utc>>,
}

/// Remembers each source's availability for `ttl` before asking again.
#[derive(Debug)]
pub struct CachingSourcePoller {
    ttl: Duration,
    entries: Mutex<HashMap<String, PollEntry>>,
}

impl CachingSourcePoller {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn invalidate(&self, source_id: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(source_id);
        }
    }
}

impl SourcePoller for CachingSourcePoller {
    fn is_available(&self, source: &dyn Source) -> bool {
        let Ok(mut entries) = self.entries.lock() else {
            return source.is_available();
        };
        if let Some(entry) = entries.get(source.id()) {
            if entry.checked_at.elapsed() < self.ttl {
                return entry.available;
            }
        }
        let available = source.is_available();
        let previous = entries
            .get(source.id())
            .and_then(|entry| entry.last_available);
        debug!(source = source.id(), available, "polled source availability");
        entries.insert(
            source.id().to_string(),
            PollEntry {
                available,
                checked_at: Instant::now(),
                last_available: if available { Some(Utc::now()) } else { previous },
            },
        );
        available
    }

    fn last_available(&self, source_id: &str) -> Option<DateTime<Utc>> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(source_id).and_then(|entry| entry.last_available))
    }
}

/// Runs one query against several sources and combines the answers.
pub trait FederationStrategy: Send + Sync {
    fn federate(
        &self,
        sources: &[Arc<dyn Source>],
        request: QueryRequest,
    ) -> Result<QueryResponse, CatalogError>;
}

/// Queries sources one after another, then sorts and pages the combined results.
/// A failing source becomes a processing detail.
#[derive(Debug, Clone, Copy, Default)]
pub struct SortedFederationStrategy;

impl FederationStrategy for SortedFederationStrategy {
    fn federate(
        &self,
        sources: &[Arc<dyn Source>],
        request: QueryRequest,
    ) -> Result<QueryResponse, CatalogError> {
        let query = &request.query;
        // Each source must return everything up to the end of the requested page.
        let per_source = QueryRequest {
            query: Query {
                start_index: 1,
                page_size: if query.page_size == 0 {
                    0
                } else {
                    query.start_index.saturating_sub(1) + query.page_size
                },
                ..query.clone()
            },
            ..request.clone()
        };

        let mut results = Vec::new();
        let mut hits = 0;
        let mut details = ProcessingDetails::new();
        for source in sources {
            match source.query(&per_source) {
                Ok(response) => {
                    hits += response.hits;
                    details.extend(response.processing_details);
                    results.extend(response.results.into_iter().map(|mut result| {
                        if result.metacard.source_id().is_none() {
                            result.metacard.set_source_id(source.id());
                        }
                        result
                    }));
                }
                Err(err) => {
                    warn!(source = source.id(), error = %err, "source query failed");
                    details.insert(ProcessingDetail::from_error(source.id(), &err));
                }
            }
        }

        sort_results(&mut results, query.sort_by.as_ref());
        let page = query.page(results);
        let mut response = QueryResponse::new(request, page, hits);
        response.processing_details = details;
        Ok(response)
    }
}
