//! Request and response carriers for every catalog operation, plus the typed
//! context that travels with them through the plugin chains.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::error::CatalogError;
use crate::metacard::{self, AttributeValue, Metacard};
use crate::policy::PolicyMap;
use crate::query::{Query, QueryResult};
use crate::resource::Resource;
use crate::security::Subject;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationType {
    Create,
    Update,
    Delete,
}

/// Snapshot of the operation being performed and the metacards as they were
/// before it, for plugins that keep history.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationTransaction {
    operation: OperationType,
    previous_state: Vec<Metacard>,
}

impl OperationTransaction {
    pub fn new(operation: OperationType, previous_state: Vec<Metacard>) -> Self {
        Self {
            operation,
            previous_state,
        }
    }

    pub fn operation(&self) -> OperationType {
        self.operation
    }

    pub fn previous_state(&self) -> &[Metacard] {
        &self.previous_state
    }
}

/// Cross-cutting data attached to a request or response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationContext {
    pub subject: Option<Subject>,
    pub operation_policy: PolicyMap,
    pub transaction: Option<OperationTransaction>,
    /// Temporary content files by metacard id, present while content is ingested.
    pub content_paths: BTreeMap<String, Vec<String>>,
    /// Attribute values forced onto metacards generated from uploaded content.
    pub attribute_overrides: BTreeMap<String, AttributeValue>,
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl OperationContext {
    pub fn with_subject(subject: Subject) -> Self {
        Self {
            subject: Some(subject),
            ..Self::default()
        }
    }

    /// Union with `other`; values already present here win for single-valued fields.
    pub fn merge(&mut self, other: &OperationContext) {
        if self.subject.is_none() {
            self.subject = other.subject.clone();
        }
        self.operation_policy.merge(&other.operation_policy);
        if self.transaction.is_none() {
            self.transaction = other.transaction.clone();
        }
        for (id, paths) in &other.content_paths {
            let entry = self.content_paths.entry(id.clone()).or_default();
            for path in paths {
                if !entry.contains(path) {
                    entry.push(path.clone());
                }
            }
        }
        for (key, value) in &other.attribute_overrides {
            self.attribute_overrides
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        for (key, value) in &other.extra {
            self.extra.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
}

/// A partial failure reported by one source or store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ProcessingDetail {
    pub source_id: String,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ProcessingDetail {
    pub fn new(source_id: &str, message: impl Into<String>) -> Self {
        Self {
            source_id: source_id.to_string(),
            message: message.into(),
            warnings: Vec::new(),
        }
    }

    pub fn from_error(source_id: &str, error: &CatalogError) -> Self {
        Self::new(source_id, error.to_string())
    }
}

pub type ProcessingDetails = BTreeSet<ProcessingDetail>;

#[derive(Debug, Clone, PartialEq)]
pub struct CreateRequest {
    pub metacards: Vec<Metacard>,
    pub store_ids: BTreeSet<String>,
    pub context: OperationContext,
}

impl CreateRequest {
    pub fn new(metacards: Vec<Metacard>) -> Self {
        Self {
            metacards,
            store_ids: BTreeSet::new(),
            context: OperationContext::default(),
        }
    }

    pub fn with_store_ids<I, S>(mut self, store_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.store_ids = store_ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_context(mut self, context: OperationContext) -> Self {
        self.context = context;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateResponse {
    pub request: CreateRequest,
    pub created: Vec<Metacard>,
    pub processing_details: ProcessingDetails,
    pub context: OperationContext,
}

impl CreateResponse {
    pub fn new(request: CreateRequest, created: Vec<Metacard>) -> Self {
        let context = request.context.clone();
        Self {
            request,
            created,
            processing_details: ProcessingDetails::new(),
            context,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    /// Attribute the update keys refer to; `id` unless updating by another attribute.
    pub attribute_name: String,
    pub updates: Vec<(AttributeValue, Metacard)>,
    pub store_ids: BTreeSet<String>,
    pub context: OperationContext,
}

impl UpdateRequest {
    pub fn new(attribute_name: &str, updates: Vec<(AttributeValue, Metacard)>) -> Self {
        Self {
            attribute_name: attribute_name.to_string(),
            updates,
            store_ids: BTreeSet::new(),
            context: OperationContext::default(),
        }
    }

    /// Keys every update by the id the metacard already carries.
    pub fn by_id(metacards: Vec<Metacard>) -> Self {
        let updates = metacards
            .into_iter()
            .map(|metacard| {
                let key = AttributeValue::from(metacard.id().unwrap_or_default());
                (key, metacard)
            })
            .collect();
        Self::new(metacard::ID, updates)
    }

    pub fn with_store_ids<I, S>(mut self, store_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.store_ids = store_ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_context(mut self, context: OperationContext) -> Self {
        self.context = context;
        self
    }

    pub fn is_keyed_by_id(&self) -> bool {
        self.attribute_name == metacard::ID
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub new: Metacard,
    pub old: Metacard,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateResponse {
    pub request: UpdateRequest,
    pub updated: Vec<Update>,
    pub processing_details: ProcessingDetails,
    pub context: OperationContext,
}

impl UpdateResponse {
    pub fn new(request: UpdateRequest, updated: Vec<Update>) -> Self {
        let context = request.context.clone();
        Self {
            request,
            updated,
            processing_details: ProcessingDetails::new(),
            context,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteRequest {
    pub attribute_name: String,
    pub values: Vec<AttributeValue>,
    pub store_ids: BTreeSet<String>,
    pub context: OperationContext,
}

impl DeleteRequest {
    pub fn new(attribute_name: &str, values: Vec<AttributeValue>) -> Self {
        Self {
            attribute_name: attribute_name.to_string(),
            values,
            store_ids: BTreeSet::new(),
            context: OperationContext::default(),
        }
    }

    pub fn by_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            metacard::ID,
            ids.into_iter()
                .map(|id| AttributeValue::String(id.into()))
                .collect(),
        )
    }

    pub fn with_store_ids<I, S>(mut self, store_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.store_ids = store_ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_context(mut self, context: OperationContext) -> Self {
        self.context = context;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteResponse {
    pub request: DeleteRequest,
    pub deleted: Vec<Metacard>,
    pub processing_details: ProcessingDetails,
    pub context: OperationContext,
}

impl DeleteResponse {
    pub fn new(request: DeleteRequest, deleted: Vec<Metacard>) -> Self {
        let context = request.context.clone();
        Self {
            request,
            deleted,
            processing_details: ProcessingDetails::new(),
            context,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub query: Query,
    pub source_ids: BTreeSet<String>,
    pub store_ids: BTreeSet<String>,
    /// Query every known source.
    pub enterprise: bool,
    pub context: OperationContext,
}

impl QueryRequest {
    pub fn new(query: Query) -> Self {
        Self {
            query,
            source_ids: BTreeSet::new(),
            store_ids: BTreeSet::new(),
            enterprise: false,
            context: OperationContext::default(),
        }
    }

    pub fn enterprise(query: Query) -> Self {
        Self {
            enterprise: true,
            ..Self::new(query)
        }
    }

    pub fn with_source_ids<I, S>(mut self, source_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.source_ids = source_ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_context(mut self, context: OperationContext) -> Self {
        self.context = context;
        self
    }

    pub fn targeted_ids(&self) -> BTreeSet<String> {
        self.source_ids.union(&self.store_ids).cloned().collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse {
    pub request: QueryRequest,
    pub results: Vec<QueryResult>,
    pub hits: u64,
    pub processing_details: ProcessingDetails,
    pub context: OperationContext,
}

impl QueryResponse {
    pub fn new(request: QueryRequest, results: Vec<QueryResult>, hits: u64) -> Self {
        let context = request.context.clone();
        Self {
            request,
            results,
            hits,
            processing_details: ProcessingDetails::new(),
            context,
        }
    }
}

/// Where a resource should be looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceSite {
    Local,
    Enterprise,
    Source(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRequest {
    /// `id` or `resource-uri`.
    pub attribute_name: String,
    pub value: AttributeValue,
    pub site: ResourceSite,
    pub options: BTreeMap<String, String>,
    pub context: OperationContext,
}

impl ResourceRequest {
    pub fn by_id(id: &str) -> Self {
        Self::new(metacard::ID, AttributeValue::from(id))
    }

    pub fn by_uri(uri: &url::Url) -> Self {
        Self::new(metacard::RESOURCE_URI, AttributeValue::from(uri.as_str()))
    }

    pub fn new(attribute_name: &str, value: AttributeValue) -> Self {
        Self {
            attribute_name: attribute_name.to_string(),
            value,
            site: ResourceSite::Local,
            options: BTreeMap::new(),
            context: OperationContext::default(),
        }
    }

    pub fn at(mut self, site: ResourceSite) -> Self {
        self.site = site;
        self
    }

    pub fn with_context(mut self, context: OperationContext) -> Self {
        self.context = context;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceResponse {
    pub request: ResourceRequest,
    pub resource: Resource,
    pub context: OperationContext,
}

impl ResourceResponse {
    pub fn new(request: ResourceRequest, resource: Resource) -> Self {
        let context = request.context.clone();
        Self {
            request,
            resource,
            context,
        }
    }
}
