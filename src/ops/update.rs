use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::content::ContentItem;
use crate::error::CatalogError;
use crate::framework::FrameworkProperties;
use crate::metacard::{self, AttributeValue, Metacard};
use crate::operation::{
    OperationContext, OperationTransaction, OperationType, ProcessingDetail, ProcessingDetails,
    UpdateRequest, UpdateResponse,
};
use crate::ops::query::QueryOperations;
use crate::ops::source::SourceOperations;
use crate::ops::{ensure_not_empty, ingest_error};
use crate::plugin::{collect_policy, run_best_effort, run_chain};
use crate::storage::{StorageProvider, UpdateStorageRequest, UpdateStorageResponse};
use crate::support::catalog_store::CatalogStoreSupport;
use crate::support::metacard::MetacardSupport;
use crate::support::security::stamp_item_policy;
use crate::support::storage::{self as storage_support, StorageSupport};

#[derive(Clone)]
pub struct UpdateOperations {
    properties: Arc<FrameworkProperties>,
    sources: SourceOperations,
    queries: QueryOperations,
}

impl UpdateOperations {
    pub fn new(properties: Arc<FrameworkProperties>) -> Self {
        Self {
            sources: SourceOperations::new(properties.clone()),
            queries: QueryOperations::new(properties.clone()),
            properties,
        }
    }

    pub fn update(&self, request: UpdateRequest) -> Result<UpdateResponse, CatalogError> {
        let properties = &self.properties;
        ensure_not_empty(&request.updates, "updates")?;
        if CatalogStoreSupport::new(properties).is_local(&request.store_ids) {
            self.sources.local_provider()?;
        }

        let mut request = if request.is_keyed_by_id() {
            request
        } else {
            self.rewrite_to_ids(request)?
        };
        for (key, metacard) in &mut request.updates {
            if let Some(id) = key.as_str() {
                metacard.set_id(id);
            }
        }

        let previous = self.populate_metacards(&request)?;
        let mut metacards: Vec<Metacard> = request
            .updates
            .iter()
            .map(|(_, metacard)| metacard.clone())
            .collect();
        MetacardSupport::new(properties).prepare_for_update(&mut metacards, &previous, Utc::now());
        for ((_, slot), prepared) in request.updates.iter_mut().zip(metacards) {
            *slot = prepared;
        }

        let request = self.apply_policy(request, &previous)?;
        let mut request = run_chain(
            "pre-update access",
            &properties.access_plugins,
            request,
            |plugin, request| plugin.process_pre_update(request, &previous),
        )
        .map_err(ingest_error)?;
        request.context.transaction = Some(OperationTransaction::new(
            OperationType::Update,
            previous.values().cloned().collect(),
        ));
        let request = run_chain(
            "pre-ingest",
            &properties.pre_ingest,
            request,
            |plugin, request| plugin.process_update(request),
        )
        .map_err(ingest_error)?;
        ensure_not_empty(&request.updates, "updates")?;

        debug!(count = request.updates.len(), "updating metacards");
        let response = self.dispatch(request)?;
        let response = match &properties.historian {
            Some(historian) => match historian.version_update(response.clone()) {
                Ok(versioned) => versioned,
                Err(err) => {
                    warn!(error = %err, "unable to version updated metacards");
                    response
                }
            },
            None => response,
        };
        Ok(run_best_effort(
            "post-ingest",
            &properties.post_ingest,
            response,
            |plugin, response| plugin.process_update(response),
        ))
    }

    /// Replaces the content of existing metacards, then updates the metacards
    /// generated from the new content.
    pub fn update_with_content(
        &self,
        content_items: Vec<ContentItem>,
        store_ids: BTreeSet<String>,
        context: OperationContext,
    ) -> Result<UpdateResponse, CatalogError> {
        let properties = &self.properties;
        storage_support::ensure_content(&content_items)?;
        let support = StorageSupport::new(properties);
        let storage = support.provider()?;

        let mut temp = support.temp_files()?;
        let items = MetacardSupport::new(properties).generate(
            content_items,
            &context.attribute_overrides,
            &mut temp,
            true,
        )?;
        let mut context = context;
        context.content_paths = temp.as_context_paths();

        let mut storage_request = UpdateStorageRequest::new(items).with_context(context);
        storage_request.store_ids = store_ids.clone();
        let transaction_id = storage_request.id.clone();
        let stored = match self.store_content(storage.as_ref(), storage_request) {
            Ok(stored) => stored,
            Err(err) => {
                storage_support::rollback(storage.as_ref(), &transaction_id);
                return Err(err);
            }
        };

        let history_key = properties
            .historian
            .as_ref()
            .and_then(|historian| match historian.version_storage(&stored) {
                Ok(key) => key.map(|key| (historian.clone(), key)),
                Err(err) => {
                    warn!(error = %err, "unable to version replaced content");
                    None
                }
            });
        if let Err(err) = storage_support::commit(storage.as_ref(), &transaction_id) {
            if let Some((historian, key)) = &history_key {
                if let Err(history_err) = historian.rollback(key) {
                    warn!(error = %history_err, "history rollback failed");
                }
            }
            return Err(err);
        }
        if let Some((historian, key)) = &history_key {
            if let Err(err) = historian.commit(key) {
                warn!(error = %err, "history commit failed");
            }
        }

        let metacards = stored
            .updated_items
            .iter()
            .filter_map(|item| item.metacard.clone())
            .collect();
        let request = UpdateRequest::by_id(metacards)
            .with_store_ids(store_ids)
            .with_context(stored.context);
        let response = self.update(request);
        drop(temp);
        response
    }

    fn store_content(
        &self,
        storage: &dyn StorageProvider,
        request: UpdateStorageRequest,
    ) -> Result<UpdateStorageResponse, CatalogError> {
        let properties = &self.properties;
        let request = run_chain(
            "pre-update storage",
            &properties.pre_update_storage,
            request,
            |plugin, request| plugin.process(request),
        )
        .map_err(ingest_error)?;
        let response = storage
            .update(&request)
            .map_err(CatalogError::into_ingest)?;
        run_chain(
            "post-update storage",
            &properties.post_update_storage,
            response,
            |plugin, response| plugin.process(response),
        )
        .map_err(ingest_error)
    }

    /// Re-keys an update made by some other attribute onto metacard ids.
    fn rewrite_to_ids(&self, request: UpdateRequest) -> Result<UpdateRequest, CatalogError> {
        let attribute = request.attribute_name.clone();
        let keys: Vec<AttributeValue> =
            request.updates.iter().map(|(key, _)| key.clone()).collect();
        let found = self
            .queries
            .lookup(&attribute, &keys, &request.store_ids, &request.context)
            .map_err(CatalogError::into_ingest)?;

        let mut updates = Vec::with_capacity(request.updates.len());
        for (key, mut metacard) in request.updates {
            let id = found
                .iter()
                .find(|candidate| {
                    candidate
                        .attribute(&attribute)
                        .is_some_and(|values| values.iter().any(|value| value.loosely_equals(&key)))
                })
                .and_then(Metacard::id)
                .ok_or_else(|| {
                    CatalogError::UnsupportedQuery(format!(
                        "no metacard found with {attribute} = {key}"
                    ))
                })?
                .to_string();
            metacard.set_id(&id);
            updates.push((AttributeValue::String(id), metacard));
        }
        Ok(UpdateRequest {
            attribute_name: metacard::ID.to_string(),
            updates,
            ..request
        })
    }

    /// Current versions of the metacards being replaced, keyed by id. Only
    /// fetched when a policy plugin needs them.
    fn populate_metacards(
        &self,
        request: &UpdateRequest,
    ) -> Result<BTreeMap<String, Metacard>, CatalogError> {
        if self.properties.policy_plugins.is_empty() {
            return Ok(BTreeMap::new());
        }
        let ids: Vec<AttributeValue> =
            request.updates.iter().map(|(key, _)| key.clone()).collect();
        let found = self
            .queries
            .lookup(metacard::ID, &ids, &request.store_ids, &request.context)
            .map_err(CatalogError::into_ingest)?;
        Ok(found
            .into_iter()
            .filter_map(|metacard| {
                let id = metacard.id()?.to_string();
                Some((id, metacard))
            })
            .collect())
    }

    fn apply_policy(
        &self,
        mut request: UpdateRequest,
        previous: &BTreeMap<String, Metacard>,
    ) -> Result<UpdateRequest, CatalogError> {
        let plugins = &self.properties.policy_plugins;
        if plugins.is_empty() {
            return Ok(request);
        }
        for (_, metacard) in &mut request.updates {
            let old = metacard.id().and_then(|id| previous.get(id));
            let policy = collect_policy("pre-update policy", plugins, |plugin| {
                plugin.process_pre_update(metacard, old, &request.context)
            })
            .map_err(ingest_error)?;
            stamp_item_policy(metacard, &policy.item_policy);
            request
                .context
                .operation_policy
                .merge(&policy.operation_policy);
        }
        Ok(request)
    }

    fn dispatch(&self, request: UpdateRequest) -> Result<UpdateResponse, CatalogError> {
        let stores = CatalogStoreSupport::new(&self.properties);
        let mut updated = Vec::new();
        let mut details = ProcessingDetails::new();
        let mut context = request.context.clone();

        if stores.is_local(&request.store_ids) {
            let provider = self.sources.local_provider()?;
            let response = provider
                .update(&request)
                .map_err(CatalogError::into_ingest)?;
            updated.extend(response.updated);
            details.extend(response.processing_details);
            context.merge(&response.context);
        }
        if stores.is_catalog_store_request(&request.store_ids) {
            for store in stores.resolve(&request.store_ids, &mut details) {
                match store.update(&request) {
                    Ok(response) => {
                        updated.extend(response.updated);
                        details.extend(response.processing_details);
                        context.merge(&response.context);
                    }
                    Err(err) => {
                        warn!(store = store.id(), error = %err, "catalog store update failed");
                        details.insert(ProcessingDetail::from_error(store.id(), &err));
                    }
                }
            }
        }

        let mut response = UpdateResponse::new(request, updated);
        response.processing_details = details;
        response.context = context;
        Ok(response)
    }
}
