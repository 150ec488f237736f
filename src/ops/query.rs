use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{CatalogError, PluginError};
use crate::framework::FrameworkProperties;
use crate::metacard::{AttributeValue, Metacard};
use crate::operation::{
    OperationContext, ProcessingDetail, ProcessingDetails, QueryRequest, QueryResponse,
};
use crate::plugin::{collect_policy, run_chain};
use crate::query::{Filter, Query};
use crate::source::{CatalogProvider, Source, SourceResponse};
use crate::support::catalog_store::CatalogStoreSupport;
use crate::support::security::{may_read, stamp_item_policy};

/// The local catalog provider presented under the framework's id.
struct LocalSource {
    id: String,
    provider: Arc<dyn CatalogProvider>,
}

impl Source for LocalSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_available(&self) -> bool {
        self.provider.is_available()
    }

    fn query(&self, request: &QueryRequest) -> Result<SourceResponse, CatalogError> {
        self.provider.query(request)
    }

    fn version(&self) -> Option<String> {
        self.provider.version()
    }

    fn content_types(&self) -> BTreeSet<String> {
        self.provider.content_types()
    }
}

fn federation_error(err: PluginError) -> CatalogError {
    match err {
        PluginError::StopProcessing(message) | PluginError::Execution(message) => {
            CatalogError::Federation(message)
        }
    }
}

#[derive(Clone)]
pub struct QueryOperations {
    properties: Arc<FrameworkProperties>,
}

impl QueryOperations {
    pub fn new(properties: Arc<FrameworkProperties>) -> Self {
        Self { properties }
    }

    /// Runs a query through the plugin chains and the federation strategy.
    ///
    /// In fan-out mode results are reported under the local id unless
    /// `keep_source_ids` is set, which callers resolving resources need.
    pub fn query(
        &self,
        request: QueryRequest,
        keep_source_ids: bool,
    ) -> Result<QueryResponse, CatalogError> {
        let properties = &self.properties;
        let mut request = request;

        let policy = collect_policy("pre-query policy", &properties.policy_plugins, |plugin| {
            plugin.process_pre_query(&request.query, &request.context)
        })
        .map_err(federation_error)?;
        request.context.operation_policy.merge(&policy.operation_policy);

        let request = run_chain(
            "pre-query access",
            &properties.access_plugins,
            request,
            |plugin, request| plugin.process_pre_query(request),
        )
        .map_err(federation_error)?;
        let request = run_chain(
            "pre-query",
            &properties.pre_query,
            request,
            |plugin, request| plugin.process(request),
        )
        .map_err(federation_error)?;

        let mut response = self.federate(request)?;

        for result in &mut response.results {
            let policy = collect_policy("post-query policy", &properties.policy_plugins, |plugin| {
                plugin.process_post_query(result, &response.context)
            })
            .map_err(federation_error)?;
            stamp_item_policy(&mut result.metacard, &policy.item_policy);
            response.context.operation_policy.merge(&policy.operation_policy);
        }

        let response = run_chain(
            "post-query access",
            &properties.access_plugins,
            response,
            |plugin, response| plugin.process_post_query(response),
        )
        .map_err(federation_error)?;
        let mut response = run_chain(
            "post-query",
            &properties.post_query,
            response,
            |plugin, response| plugin.process(response),
        )
        .map_err(federation_error)?;

        if properties.settings.fanout && !keep_source_ids {
            let local_id = properties.local_id();
            for result in &mut response.results {
                result.metacard.set_source_id(local_id);
            }
        }
        Ok(response)
    }

    /// Picks the sources for `request`, drops the ones that are unavailable or
    /// closed to the subject, and hands the rest to the federation strategy.
    pub(crate) fn federate(&self, request: QueryRequest) -> Result<QueryResponse, CatalogError> {
        let mut details = ProcessingDetails::new();
        let candidates = self.select_sources(&request, &mut details);
        let local_id = self.properties.local_id();
        let sources: Vec<Arc<dyn Source>> = candidates
            .into_iter()
            .filter(|source| {
                if source.id() == local_id {
                    return true;
                }
                self.admit(source.as_ref(), &request.context, &mut details)
            })
            .collect();

        if sources.is_empty() {
            let reasons = details
                .iter()
                .map(|detail| detail.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(CatalogError::Federation(if reasons.is_empty() {
                "no sources available to query".to_string()
            } else {
                format!("no sources available to query: {reasons}")
            }));
        }

        debug!(
            sources = ?sources.iter().map(|source| source.id()).collect::<Vec<_>>(),
            "federating query"
        );
        let mut response = self
            .properties
            .federation_strategy
            .federate(&sources, request)?;
        response.processing_details.extend(details);
        Ok(response)
    }

    /// Metacards in the local catalog, and in any stores named, whose
    /// `attribute` equals one of `values`.
    pub(crate) fn lookup(
        &self,
        attribute: &str,
        values: &[AttributeValue],
        store_ids: &BTreeSet<String>,
        context: &OperationContext,
    ) -> Result<Vec<Metacard>, CatalogError> {
        let properties = &self.properties;
        let stores = CatalogStoreSupport::new(properties);
        let mut details = ProcessingDetails::new();
        let mut sources: Vec<Arc<dyn Source>> = Vec::new();
        if stores.is_local(store_ids) {
            if let Some(local) = self.local_source() {
                sources.push(local);
            }
        }
        sources.extend(
            stores
                .resolve(store_ids, &mut details)
                .into_iter()
                .map(|store| store as Arc<dyn Source>),
        );
        if sources.is_empty() {
            return Ok(Vec::new());
        }

        let filter = Filter::any_of(attribute, values.iter().cloned());
        let request = QueryRequest::new(Query::unpaged(filter))
            .with_source_ids(sources.iter().map(|source| source.id().to_string()))
            .with_context(context.clone());
        let response = properties.federation_strategy.federate(&sources, request)?;
        for detail in response.processing_details.iter().chain(details.iter()) {
            warn!(source = %detail.source_id, message = %detail.message, "lookup incomplete");
        }
        Ok(response
            .results
            .into_iter()
            .map(|result| result.metacard)
            .collect())
    }

    fn local_source(&self) -> Option<Arc<dyn Source>> {
        self.properties.catalog_provider.clone().map(|provider| {
            Arc::new(LocalSource {
                id: self.properties.local_id().to_string(),
                provider,
            }) as Arc<dyn Source>
        })
    }

    /// Fan-out turns local-only and default queries into enterprise ones,
    /// except for queries on blacklisted tags.
    fn is_fanout_enterprise(&self, request: &QueryRequest) -> bool {
        let settings = &self.properties.settings;
        if !settings.fanout {
            return false;
        }
        let targeted = request.targeted_ids();
        let local_only =
            targeted.is_empty() || (targeted.len() == 1 && targeted.contains(&settings.site_name));
        if !local_only {
            return false;
        }
        !request
            .query
            .filter
            .tag_values()
            .iter()
            .any(|tag| settings.fanout_tag_blacklist.contains(tag))
    }

    fn select_sources(
        &self,
        request: &QueryRequest,
        details: &mut ProcessingDetails,
    ) -> Vec<Arc<dyn Source>> {
        let properties = &self.properties;
        let local_id = properties.local_id();
        let targeted = request.targeted_ids();
        let mut sources = Vec::new();

        let targets_local_only =
            targeted.is_empty() || (targeted.len() == 1 && targeted.contains(local_id));
        let enterprise = request.enterprise || self.is_fanout_enterprise(request);
        let local_only = properties.settings.fanout && !enterprise && targets_local_only;

        if enterprise || local_only || targeted.is_empty() {
            match self.local_source() {
                Some(local) => sources.push(local),
                None => {
                    details.insert(ProcessingDetail::new(
                        local_id,
                        "no local catalog provider configured",
                    ));
                }
            }
            if local_only {
                return sources;
            }
            sources.extend(properties.connected_sources.iter().cloned());
            if enterprise {
                sources.extend(properties.federated_sources.values().cloned());
            }
            return sources;
        }

        for id in &targeted {
            if id == local_id {
                match self.local_source() {
                    Some(local) => sources.push(local),
                    None => {
                        details.insert(ProcessingDetail::new(
                            local_id,
                            "no local catalog provider configured",
                        ));
                    }
                }
            } else if let Some(source) = properties.federated_sources.get(id) {
                sources.push(source.clone());
            } else if let Some(store) = properties.catalog_stores.get(id) {
                sources.push(store.clone() as Arc<dyn Source>);
            } else {
                warn!(source = %id, "unknown source requested");
                details.insert(ProcessingDetail::new(id, format!("source {id} not found")));
            }
        }
        sources
    }

    fn admit(
        &self,
        source: &dyn Source,
        context: &OperationContext,
        details: &mut ProcessingDetails,
    ) -> bool {
        let id = source.id();
        if !self.properties.source_poller.is_available(source) {
            warn!(source = id, "source unavailable, skipping");
            details.insert(ProcessingDetail::new(id, format!("source {id} is unavailable")));
            return false;
        }
        let required = source.security_attributes();
        if !may_read(context, &required) {
            warn!(source = id, "subject not permitted to query source");
            details.insert(ProcessingDetail::new(
                id,
                format!("subject is not permitted to query source {id}"),
            ));
            return false;
        }
        true
    }
}
