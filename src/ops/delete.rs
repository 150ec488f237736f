use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::CatalogError;
use crate::framework::FrameworkProperties;
use crate::metacard::Metacard;
use crate::operation::{
    DeleteRequest, DeleteResponse, OperationTransaction, OperationType, ProcessingDetail,
    ProcessingDetails,
};
use crate::ops::query::QueryOperations;
use crate::ops::source::SourceOperations;
use crate::ops::{ensure_not_empty, ingest_error};
use crate::plugin::{collect_policy, run_best_effort, run_chain};
use crate::storage::{DeleteStorageRequest, StorageProvider};
use crate::support::catalog_store::CatalogStoreSupport;
use crate::support::storage as storage_support;

#[derive(Clone)]
pub struct DeleteOperations {
    properties: Arc<FrameworkProperties>,
    sources: SourceOperations,
    queries: QueryOperations,
}

impl DeleteOperations {
    pub fn new(properties: Arc<FrameworkProperties>) -> Self {
        Self {
            sources: SourceOperations::new(properties.clone()),
            queries: QueryOperations::new(properties.clone()),
            properties,
        }
    }

    /// Deletes the metacards whose `attribute_name` matches one of the request
    /// values, along with any stored content behind them.
    ///
    /// With policy plugins registered every key must resolve to a metacard
    /// before anything is deleted.
    pub fn delete(&self, request: DeleteRequest) -> Result<DeleteResponse, CatalogError> {
        let properties = &self.properties;
        ensure_not_empty(&request.values, "delete keys")?;
        if CatalogStoreSupport::new(properties).is_local(&request.store_ids) {
            self.sources.local_provider()?;
        }

        let storage = properties
            .storage_provider
            .clone()
            .filter(|storage| storage.is_available());
        let has_policy = !properties.policy_plugins.is_empty();
        let metacards = if has_policy || storage.is_some() {
            self.queries
                .lookup(
                    &request.attribute_name,
                    &request.values,
                    &request.store_ids,
                    &request.context,
                )
                .map_err(CatalogError::into_ingest)?
        } else {
            Vec::new()
        };
        if has_policy && metacards.len() < request.values.len() {
            return Err(CatalogError::Ingest(format!(
                "found {} of {} metacards to delete",
                metacards.len(),
                request.values.len()
            )));
        }

        let mut request = request;
        if has_policy {
            let policy = collect_policy("pre-delete policy", &properties.policy_plugins, |plugin| {
                plugin.process_pre_delete(&metacards, &request.context)
            })
            .map_err(ingest_error)?;
            request
                .context
                .operation_policy
                .merge(&policy.operation_policy);
        }
        let mut request = run_chain(
            "pre-delete access",
            &properties.access_plugins,
            request,
            |plugin, request| plugin.process_pre_delete(request),
        )
        .map_err(ingest_error)?;
        request.context.transaction = Some(OperationTransaction::new(
            OperationType::Delete,
            metacards.clone(),
        ));
        let request = run_chain(
            "pre-ingest",
            &properties.pre_ingest,
            request,
            |plugin, request| plugin.process_delete(request),
        )
        .map_err(ingest_error)?;
        ensure_not_empty(&request.values, "delete keys")?;

        let storage_transaction = match &storage {
            Some(storage) if !metacards.is_empty() => {
                Some(self.delete_content(storage.as_ref(), &request, metacards)?)
            }
            _ => None,
        };

        debug!(count = request.values.len(), "deleting metacards");
        let result = self.dispatch(request);
        if let (Some(storage), Some(transaction_id)) = (&storage, &storage_transaction) {
            storage_support::commit_or_rollback(storage.as_ref(), transaction_id, result.is_ok());
        }
        let response = result?;

        let response = match &properties.historian {
            Some(historian) => match historian.version_delete(response.clone()) {
                Ok(versioned) => versioned,
                Err(err) => {
                    warn!(error = %err, "unable to version deleted metacards");
                    response
                }
            },
            None => response,
        };
        let response = self.apply_post_policy(response);
        let response = run_chain(
            "post-delete access",
            &properties.access_plugins,
            response,
            |plugin, response| plugin.process_post_delete(response),
        )
        .map_err(ingest_error)?;
        Ok(run_best_effort(
            "post-ingest",
            &properties.post_ingest,
            response,
            |plugin, response| plugin.process_delete(response),
        ))
    }

    /// Removes stored content ahead of the metacards; returns the storage
    /// transaction to settle once the metacard delete has run.
    fn delete_content(
        &self,
        storage: &dyn StorageProvider,
        request: &DeleteRequest,
        metacards: Vec<Metacard>,
    ) -> Result<String, CatalogError> {
        let mut storage_request = DeleteStorageRequest::new(metacards);
        storage_request.context = request.context.clone();
        if let Err(err) = storage.delete(&storage_request) {
            storage_support::rollback(storage, &storage_request.id);
            return Err(CatalogError::InternalIngest(format!(
                "unable to delete stored content: {err}"
            )));
        }
        Ok(storage_request.id)
    }

    /// The delete has already happened, so policy failures are only logged.
    fn apply_post_policy(&self, mut response: DeleteResponse) -> DeleteResponse {
        let plugins = &self.properties.policy_plugins;
        for metacard in &response.deleted {
            match collect_policy("post-delete policy", plugins, |plugin| {
                plugin.process_post_delete(metacard, &response.context)
            }) {
                Ok(policy) => response
                    .context
                    .operation_policy
                    .merge(&policy.operation_policy),
                Err(err) => warn!(error = %err, "post-delete policy failed"),
            }
        }
        response
    }

    fn dispatch(&self, request: DeleteRequest) -> Result<DeleteResponse, CatalogError> {
        let stores = CatalogStoreSupport::new(&self.properties);
        let mut deleted = Vec::new();
        let mut details = ProcessingDetails::new();
        let mut context = request.context.clone();

        if stores.is_local(&request.store_ids) {
            let provider = self.sources.local_provider()?;
            let response = provider
                .delete(&request)
                .map_err(CatalogError::into_ingest)?;
            deleted.extend(response.deleted);
            details.extend(response.processing_details);
            context.merge(&response.context);
        }
        if stores.is_catalog_store_request(&request.store_ids) {
            for store in stores.resolve(&request.store_ids, &mut details) {
                match store.delete(&request) {
                    Ok(response) => {
                        deleted.extend(response.deleted);
                        details.extend(response.processing_details);
                        context.merge(&response.context);
                    }
                    Err(err) => {
                        warn!(store = store.id(), error = %err, "catalog store delete failed");
                        details.insert(ProcessingDetail::from_error(store.id(), &err));
                    }
                }
            }
        }

        let mut response = DeleteResponse::new(request, deleted);
        response.processing_details = details;
        response.context = context;
        Ok(response)
    }
}
