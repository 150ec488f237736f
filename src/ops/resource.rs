use std::sync::Arc;

use tracing::debug;
use url::Url;

use crate::error::{CatalogError, PluginError};
use crate::framework::FrameworkProperties;
use crate::metacard::{self, AttributeValue, Metacard};
use crate::operation::{QueryRequest, ResourceRequest, ResourceResponse, ResourceSite};
use crate::ops::query::QueryOperations;
use crate::ops::source::SourceOperations;
use crate::plugin::{collect_policy, run_chain};
use crate::query::{Filter, Query};
use crate::resource::{LocalResourceRetriever, RemoteResourceRetriever};

fn not_supported(err: PluginError) -> CatalogError {
    match err {
        PluginError::StopProcessing(message) | PluginError::Execution(message) => {
            CatalogError::ResourceNotSupported(message)
        }
    }
}

#[derive(Clone)]
pub struct ResourceOperations {
    properties: Arc<FrameworkProperties>,
    sources: SourceOperations,
    queries: QueryOperations,
}

impl ResourceOperations {
    pub fn new(properties: Arc<FrameworkProperties>) -> Self {
        Self {
            sources: SourceOperations::new(properties.clone()),
            queries: QueryOperations::new(properties.clone()),
            properties,
        }
    }

    /// Finds the metacard a request points at and downloads its product.
    pub fn retrieve(&self, request: ResourceRequest) -> Result<ResourceResponse, CatalogError> {
        let properties = &self.properties;
        validate(&request)?;

        let mut request = request;
        let policy = collect_policy("pre-resource policy", &properties.policy_plugins, |plugin| {
            plugin.process_pre_resource(&request)
        })
        .map_err(not_supported)?;
        request.context.operation_policy.merge(&policy.operation_policy);
        let request = run_chain(
            "pre-resource access",
            &properties.access_plugins,
            request,
            |plugin, request| plugin.process_pre_resource(request),
        )
        .map_err(not_supported)?;
        let request = run_chain(
            "pre-resource",
            &properties.pre_resource,
            request,
            |plugin, request| plugin.process(request),
        )
        .map_err(not_supported)?;

        let metacard = self.resolve_metacard(&request)?;
        let uri = metacard
            .resource_uri()
            .ok_or_else(|| {
                CatalogError::ResourceNotFound(format!(
                    "metacard {} has no resource",
                    metacard.id().unwrap_or_default()
                ))
            })
            .and_then(|uri| {
                Url::parse(uri).map_err(|err| {
                    CatalogError::ResourceNotFound(format!("invalid resource uri {uri}: {err}"))
                })
            })?;

        let local_id = properties.local_id();
        let is_local = metacard
            .source_id()
            .is_none_or(|source_id| source_id.is_empty() || source_id == local_id);
        let options = request.options.clone();
        let response = if is_local {
            debug!(%uri, "retrieving local resource");
            let retriever = LocalResourceRetriever::new(&properties.resource_readers, uri, options);
            properties
                .download_manager
                .download(request, &metacard, &retriever)?
        } else {
            let source_id = metacard.source_id().unwrap_or_default();
            let source = self.sources.find_source(source_id).ok_or_else(|| {
                CatalogError::ResourceNotFound(format!("source {source_id} not found"))
            })?;
            debug!(%uri, source = source_id, "retrieving remote resource");
            let retriever = RemoteResourceRetriever::new(source, uri, options);
            properties
                .download_manager
                .download(request, &metacard, &retriever)?
        };

        let mut response = response;
        let policy = collect_policy("post-resource policy", &properties.policy_plugins, |plugin| {
            plugin.process_post_resource(&response, &metacard)
        })
        .map_err(not_supported)?;
        response.context.operation_policy.merge(&policy.operation_policy);
        let response = run_chain(
            "post-resource access",
            &properties.access_plugins,
            response,
            |plugin, response| plugin.process_post_resource(response, &metacard),
        )
        .map_err(not_supported)?;
        run_chain(
            "post-resource",
            &properties.post_resource,
            response,
            |plugin, response| plugin.process(response),
        )
        .map_err(not_supported)
    }

    /// Looks the metacard up where the request's site says, keeping the ids of
    /// the sources that answered.
    fn resolve_metacard(&self, request: &ResourceRequest) -> Result<Metacard, CatalogError> {
        let filter = Filter::equal(&request.attribute_name, request.value.clone())
            .and(Filter::equal(metacard::TAGS, metacard::DEFAULT_TAG));
        let query = Query::new(filter).with_page_size(1);
        let query_request = match &request.site {
            ResourceSite::Enterprise => QueryRequest::enterprise(query),
            ResourceSite::Local => {
                QueryRequest::new(query).with_source_ids([self.properties.local_id()])
            }
            ResourceSite::Source(source_id) => {
                QueryRequest::new(query).with_source_ids([source_id.as_str()])
            }
        }
        .with_context(request.context.clone());

        let response = self
            .queries
            .query(query_request, true)
            .map_err(|err| match err {
                CatalogError::ResourceNotSupported(_) => err,
                other => CatalogError::ResourceNotFound(other.to_string()),
            })?;
        response
            .results
            .into_iter()
            .next()
            .map(|result| result.metacard)
            .ok_or_else(|| {
                CatalogError::ResourceNotFound(format!(
                    "no metacard with {} = {}",
                    request.attribute_name, request.value
                ))
            })
    }
}

/// Only ids and resource URIs can address a resource.
fn validate(request: &ResourceRequest) -> Result<(), CatalogError> {
    match request.attribute_name.as_str() {
        metacard::ID => match &request.value {
            AttributeValue::String(id) if !id.is_empty() => Ok(()),
            other => Err(CatalogError::ResourceNotFound(format!(
                "resource id must be a string, got {other}"
            ))),
        },
        metacard::RESOURCE_URI => match request.value.as_str().map(Url::parse) {
            Some(Ok(_)) => Ok(()),
            _ => Err(CatalogError::ResourceNotFound(format!(
                "{} is not a valid resource uri",
                request.value
            ))),
        },
        other => Err(CatalogError::ResourceNotSupported(format!(
            "resources cannot be retrieved by {other}"
        ))),
    }
}
