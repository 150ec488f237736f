mod common;

use std::collections::BTreeSet;
use std::sync::Arc;

use assert_matches::assert_matches;
use catalog_ops::error::CatalogError;
use catalog_ops::policy::PolicyMap;
use catalog_ops::security::Subject;
use catalog_ops::source::{Source, SourceResponse};
use catalog_ops::framework::{CatalogFramework, FrameworkProperties};
use catalog_ops::metacard::{self, Metacard};
use catalog_ops::operation::{OperationContext, QueryRequest};
use catalog_ops::ops::source::SourceInfoRequest;
use catalog_ops::query::{Filter, Query, SortBy};

use common::{LOCAL, MemoryProvider, properties};

fn provider(id: &str, titles: &[&str]) -> Arc<MemoryProvider> {
    let provider = MemoryProvider::new(id);
    provider.seed(titles.iter().map(|title| {
        Metacard::with_id(&format!("{id}-{title}"))
            .with_attribute(metacard::TITLE, *title)
            .with_attribute(metacard::TAGS, metacard::DEFAULT_TAG)
    }));
    provider
}

/// A source only subjects holding `required` may query.
struct GuardedSource {
    inner: Arc<MemoryProvider>,
    required: PolicyMap,
}

impl Source for GuardedSource {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn is_available(&self) -> bool {
        true
    }

    fn query(&self, request: &QueryRequest) -> Result<SourceResponse, CatalogError> {
        self.inner.query(request)
    }

    fn security_attributes(&self) -> PolicyMap {
        self.required.clone()
    }
}

fn guarded() -> FrameworkProperties {
    let mut required = PolicyMap::new();
    required.insert("clearance", ["secret"]);
    properties(provider(LOCAL, &["alpha"])).with_federated_source(Arc::new(GuardedSource {
        inner: provider("vault", &["sealed"]),
        required,
    }))
}

fn federated() -> FrameworkProperties {
    properties(provider(LOCAL, &["alpha", "beta"]))
        .with_federated_source(provider("remote", &["gamma"]))
        .with_federated_source(MemoryProvider::unavailable("down"))
}

fn source_ids(response: &catalog_ops::operation::QueryResponse) -> BTreeSet<String> {
    response
        .results
        .iter()
        .filter_map(|result| result.metacard.source_id().map(str::to_string))
        .collect()
}

#[test]
fn default_query_stays_local() {
    let framework = CatalogFramework::new(federated());
    let response = framework
        .query(QueryRequest::new(Query::new(Filter::Include)))
        .unwrap();
    assert_eq!(response.hits, 2);
    assert_eq!(source_ids(&response), BTreeSet::from([LOCAL.to_string()]));
}

#[test]
fn enterprise_query_skips_unavailable_sources() {
    let framework = CatalogFramework::new(federated());
    let response = framework
        .query(QueryRequest::enterprise(
            Query::new(Filter::Include).with_sort(SortBy {
                attribute: metacard::TITLE.to_string(),
                ascending: true,
            }),
        ))
        .unwrap();
    assert_eq!(response.hits, 3);
    let titles = response
        .results
        .iter()
        .filter_map(|result| result.metacard.title())
        .collect::<Vec<_>>();
    assert_eq!(titles, vec!["alpha", "beta", "gamma"]);
    assert_eq!(response.processing_details.len(), 1);
    assert_eq!(response.processing_details.iter().next().unwrap().source_id, "down");
}

#[test]
fn targeted_query_reports_unknown_sources() {
    let framework = CatalogFramework::new(federated());
    let response = framework
        .query(QueryRequest::new(Query::new(Filter::like(metacard::TITLE, "g*"))).with_source_ids(["remote", "ghost"]))
        .unwrap();
    assert_eq!(response.hits, 1);
    assert_eq!(source_ids(&response), BTreeSet::from(["remote".to_string()]));
    assert!(
        response
            .processing_details
            .iter()
            .any(|detail| detail.source_id == "ghost")
    );
}

#[test]
fn query_with_no_reachable_source_fails() {
    let framework = CatalogFramework::new(federated());
    let result = framework.query(QueryRequest::new(Query::new(Filter::Include)).with_source_ids(["down"]));
    assert_matches!(result, Err(CatalogError::Federation(_)));
}

#[test]
fn fanout_reports_results_under_the_local_id() {
    let mut properties = federated();
    properties.settings.fanout = true;
    let framework = CatalogFramework::new(properties);

    let response = framework
        .query(QueryRequest::new(Query::new(Filter::Include)))
        .unwrap();
    assert_eq!(response.hits, 3);
    assert_eq!(source_ids(&response), BTreeSet::from([LOCAL.to_string()]));
}

#[test]
fn fanout_keeps_blacklisted_tags_local() {
    let mut properties = federated();
    properties.settings.fanout = true;
    properties
        .settings
        .fanout_tag_blacklist
        .insert(metacard::DEFAULT_TAG.to_string());
    let framework = CatalogFramework::new(properties);

    let response = framework
        .query(QueryRequest::new(Query::new(Filter::equal(
            metacard::TAGS,
            metacard::DEFAULT_TAG,
        ))))
        .unwrap();
    assert_eq!(response.hits, 2);
}

#[test]
fn source_info_describes_known_sources() {
    let framework = CatalogFramework::new(federated());

    let local = framework.source_info(SourceInfoRequest::local()).unwrap();
    assert_eq!(local.descriptors.len(), 1);
    assert_eq!(local.descriptors.iter().next().unwrap().source_id, LOCAL);

    let enterprise = framework.source_info(SourceInfoRequest::enterprise()).unwrap();
    let ids = enterprise
        .descriptors
        .iter()
        .map(|descriptor| (descriptor.source_id.as_str(), descriptor.available))
        .collect::<Vec<_>>();
    assert!(ids.contains(&("remote", true)));
    assert!(ids.contains(&("down", false)));

    assert_matches!(
        framework.source_info(SourceInfoRequest::for_sources(["ghost"])),
        Err(CatalogError::SourceUnavailable(_))
    );
    assert!(framework.is_source_available("remote"));
    assert!(!framework.is_source_available("down"));
}

#[test]
fn fanout_source_info_is_a_single_descriptor() {
    let mut properties = federated();
    properties.settings.fanout = true;
    let framework = CatalogFramework::new(properties);

    let response = framework.source_info(SourceInfoRequest::enterprise()).unwrap();
    assert_eq!(response.descriptors.len(), 1);
    let descriptor = response.descriptors.iter().next().unwrap();
    assert_eq!(descriptor.source_id, LOCAL);
    assert!(descriptor.available);
}

#[test]
fn guarded_source_is_skipped_without_claims() {
    let framework = CatalogFramework::new(guarded());
    let response = framework
        .query(QueryRequest::enterprise(Query::new(Filter::Include)).with_context(
            OperationContext::with_subject(Subject::new("visitor").with_claim("clearance", ["public"])),
        ))
        .unwrap();

    assert_eq!(source_ids(&response), BTreeSet::from([LOCAL.to_string()]));
    let details = response.processing_details.iter().collect::<Vec<_>>();
    assert_eq!(details.len(), 1);
    assert_eq!(details[0].source_id, "vault");
    assert!(details[0].message.contains("not permitted"));
}

#[test]
fn guarded_source_answers_subjects_holding_the_claims() {
    let framework = CatalogFramework::new(guarded());
    let response = framework
        .query(QueryRequest::enterprise(Query::new(Filter::Include)).with_context(
            OperationContext::with_subject(Subject::new("analyst").with_claim("clearance", ["secret"])),
        ))
        .unwrap();

    assert_eq!(
        source_ids(&response),
        BTreeSet::from([LOCAL.to_string(), "vault".to_string()])
    );
    assert!(response.processing_details.is_empty());
}
