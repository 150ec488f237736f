use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::content::ContentItem;
use crate::error::CatalogError;
use crate::framework::FrameworkProperties;
use crate::operation::{
    CreateRequest, CreateResponse, OperationContext, OperationTransaction, OperationType,
    ProcessingDetail, ProcessingDetails,
};
use crate::ops::source::SourceOperations;
use crate::ops::{ensure_not_empty, ingest_error};
use crate::plugin::{collect_policy, run_best_effort, run_chain};
use crate::storage::{CreateStorageRequest, CreateStorageResponse, StorageProvider};
use crate::support::catalog_store::CatalogStoreSupport;
use crate::support::metacard::MetacardSupport;
use crate::support::security::stamp_item_policy;
use crate::support::storage::{self as storage_support, StorageSupport};

#[derive(Clone)]
pub struct CreateOperations {
    properties: Arc<FrameworkProperties>,
    sources: SourceOperations,
}

impl CreateOperations {
    pub fn new(properties: Arc<FrameworkProperties>) -> Self {
        Self {
            sources: SourceOperations::new(properties.clone()),
            properties,
        }
    }

    pub fn create(&self, request: CreateRequest) -> Result<CreateResponse, CatalogError> {
        let properties = &self.properties;
        ensure_not_empty(&request.metacards, "metacards")?;
        if CatalogStoreSupport::new(properties).is_local(&request.store_ids) {
            self.sources.local_provider()?;
        }

        let mut request = request;
        MetacardSupport::new(properties).prepare_for_create(&mut request.metacards, Utc::now());
        let request = self.apply_policy(request)?;
        let mut request = run_chain(
            "pre-create access",
            &properties.access_plugins,
            request,
            |plugin, request| plugin.process_pre_create(request),
        )
        .map_err(ingest_error)?;
        request.context.transaction = Some(OperationTransaction::new(
            OperationType::Create,
            Vec::new(),
        ));
        let request = run_chain(
            "pre-ingest",
            &properties.pre_ingest,
            request,
            |plugin, request| plugin.process_create(request),
        )
        .map_err(ingest_error)?;
        ensure_not_empty(&request.metacards, "metacards")?;

        debug!(count = request.metacards.len(), "creating metacards");
        let response = self.dispatch(request)?;
        Ok(run_best_effort(
            "post-ingest",
            &properties.post_ingest,
            response,
            |plugin, response| plugin.process_create(response),
        ))
    }

    /// Stores `content_items`, commits them, then creates the metacards they
    /// describe. Storage is rolled back if anything fails before the commit.
    pub fn create_with_content(
        &self,
        content_items: Vec<ContentItem>,
        store_ids: BTreeSet<String>,
        context: OperationContext,
    ) -> Result<CreateResponse, CatalogError> {
        let properties = &self.properties;
        storage_support::ensure_content(&content_items)?;
        let support = StorageSupport::new(properties);
        let storage = support.provider()?;

        let mut temp = support.temp_files()?;
        let items = MetacardSupport::new(properties).generate(
            content_items,
            &context.attribute_overrides,
            &mut temp,
            false,
        )?;
        let mut context = context;
        context.content_paths = temp.as_context_paths();

        let mut storage_request = CreateStorageRequest::new(items).with_context(context);
        storage_request.store_ids = store_ids.clone();
        let transaction_id = storage_request.id.clone();
        let stored = match self.store_content(storage.as_ref(), storage_request) {
            Ok(stored) => stored,
            Err(err) => {
                storage_support::rollback(storage.as_ref(), &transaction_id);
                return Err(err);
            }
        };
        storage_support::commit(storage.as_ref(), &transaction_id)?;

        let metacards = stored
            .created_items
            .iter()
            .filter_map(|item| item.metacard.clone())
            .collect();
        let request = CreateRequest {
            metacards,
            store_ids,
            context: stored.context,
        };
        // `temp` stays alive until plugins have seen the content paths.
        let response = self.create(request);
        drop(temp);
        response
    }

    fn store_content(
        &self,
        storage: &dyn StorageProvider,
        request: CreateStorageRequest,
    ) -> Result<CreateStorageResponse, CatalogError> {
        let properties = &self.properties;
        let request = run_chain(
            "pre-create storage",
            &properties.pre_create_storage,
            request,
            |plugin, request| plugin.process(request),
        )
        .map_err(ingest_error)?;
        let response = storage
            .create(&request)
            .map_err(CatalogError::into_ingest)?;
        run_chain(
            "post-create storage",
            &properties.post_create_storage,
            response,
            |plugin, response| plugin.process(response),
        )
        .map_err(ingest_error)
    }

    /// Item policy onto each metacard, operation policy onto the context.
    fn apply_policy(&self, mut request: CreateRequest) -> Result<CreateRequest, CatalogError> {
        let plugins = &self.properties.policy_plugins;
        if plugins.is_empty() {
            return Ok(request);
        }
        for metacard in &mut request.metacards {
            let policy = collect_policy("pre-create policy", plugins, |plugin| {
                plugin.process_pre_create(metacard, &request.context)
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

    /// Hands the request to the local provider and every named store, then
    /// folds their answers into one response.
    fn dispatch(&self, request: CreateRequest) -> Result<CreateResponse, CatalogError> {
        let stores = CatalogStoreSupport::new(&self.properties);
        let mut created = Vec::new();
        let mut details = ProcessingDetails::new();
        let mut context = request.context.clone();

        if stores.is_local(&request.store_ids) {
            let provider = self.sources.local_provider()?;
            let response = provider
                .create(&request)
                .map_err(CatalogError::into_ingest)?;
            created.extend(response.created);
            details.extend(response.processing_details);
            context.merge(&response.context);
        }
        if stores.is_catalog_store_request(&request.store_ids) {
            for store in stores.resolve(&request.store_ids, &mut details) {
                match store.create(&request) {
                    Ok(response) => {
                        created.extend(response.created);
                        details.extend(response.processing_details);
                        context.merge(&response.context);
                    }
                    Err(err) => {
                        warn!(store = store.id(), error = %err, "catalog store create failed");
                        details.insert(ProcessingDetail::from_error(store.id(), &err));
                    }
                }
            }
        }

        let mut response = CreateResponse::new(request, created);
        response.processing_details = details;
        response.context = context;
        Ok(response)
    }
}
