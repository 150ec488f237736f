//! Plugin traits invoked around every operation, and the fold that runs an
//! ordered chain of them.
//!
//! Every method has an identity default so an implementation only overrides the
//! stages it cares about.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::warn;

use crate::error::PluginError;
use crate::metacard::Metacard;
use crate::operation::{
    CreateRequest, CreateResponse, DeleteRequest, DeleteResponse, OperationContext, QueryRequest,
    QueryResponse, ResourceRequest, ResourceResponse, UpdateRequest, UpdateResponse,
};
use crate::policy::PolicyResponse;
use crate::query::{Query, QueryResult};
use crate::storage::{
    CreateStorageRequest, CreateStorageResponse, UpdateStorageRequest, UpdateStorageResponse,
};

pub trait PreIngestPlugin: Send + Sync {
    fn process_create(&self, request: CreateRequest) -> Result<CreateRequest, PluginError> {
        Ok(request)
    }

    fn process_update(&self, request: UpdateRequest) -> Result<UpdateRequest, PluginError> {
        Ok(request)
    }

    fn process_delete(&self, request: DeleteRequest) -> Result<DeleteRequest, PluginError> {
        Ok(request)
    }
}

pub trait PostIngestPlugin: Send + Sync {
    fn process_create(&self, response: CreateResponse) -> Result<CreateResponse, PluginError> {
        Ok(response)
    }

    fn process_update(&self, response: UpdateResponse) -> Result<UpdateResponse, PluginError> {
        Ok(response)
    }

    fn process_delete(&self, response: DeleteResponse) -> Result<DeleteResponse, PluginError> {
        Ok(response)
    }
}

pub trait PreQueryPlugin: Send + Sync {
    fn process(&self, request: QueryRequest) -> Result<QueryRequest, PluginError>;
}

pub trait PostQueryPlugin: Send + Sync {
    fn process(&self, response: QueryResponse) -> Result<QueryResponse, PluginError>;
}

pub trait PreResourcePlugin: Send + Sync {
    fn process(&self, request: ResourceRequest) -> Result<ResourceRequest, PluginError>;
}

pub trait PostResourcePlugin: Send + Sync {
    fn process(&self, response: ResourceResponse) -> Result<ResourceResponse, PluginError>;
}

pub trait PreCreateStoragePlugin: Send + Sync {
    fn process(&self, request: CreateStorageRequest) -> Result<CreateStorageRequest, PluginError>;
}

pub trait PostCreateStoragePlugin: Send + Sync {
    fn process(
        &self,
        response: CreateStorageResponse,
    ) -> Result<CreateStorageResponse, PluginError>;
}

pub trait PreUpdateStoragePlugin: Send + Sync {
    fn process(&self, request: UpdateStorageRequest) -> Result<UpdateStorageRequest, PluginError>;
}

pub trait PostUpdateStoragePlugin: Send + Sync {
    fn process(
        &self,
        response: UpdateStorageResponse,
    ) -> Result<UpdateStorageResponse, PluginError>;
}

/// Computes the security policy that applies to metacards and operations.
pub trait PolicyPlugin: Send + Sync {
    fn process_pre_create(
        &self,
        _metacard: &Metacard,
        _context: &OperationContext,
    ) -> Result<PolicyResponse, PluginError> {
        Ok(PolicyResponse::default())
    }

    fn process_pre_update(
        &self,
        _new: &Metacard,
        _old: Option<&Metacard>,
        _context: &OperationContext,
    ) -> Result<PolicyResponse, PluginError> {
        Ok(PolicyResponse::default())
    }

    fn process_pre_delete(
        &self,
        _metacards: &[Metacard],
        _context: &OperationContext,
    ) -> Result<PolicyResponse, PluginError> {
        Ok(PolicyResponse::default())
    }

    fn process_post_delete(
        &self,
        _metacard: &Metacard,
        _context: &OperationContext,
    ) -> Result<PolicyResponse, PluginError> {
        Ok(PolicyResponse::default())
    }

    fn process_pre_query(
        &self,
        _query: &Query,
        _context: &OperationContext,
    ) -> Result<PolicyResponse, PluginError> {
        Ok(PolicyResponse::default())
    }

    fn process_post_query(
        &self,
        _result: &QueryResult,
        _context: &OperationContext,
    ) -> Result<PolicyResponse, PluginError> {
        Ok(PolicyResponse::default())
    }

    fn process_pre_resource(
        &self,
        _request: &ResourceRequest,
    ) -> Result<PolicyResponse, PluginError> {
        Ok(PolicyResponse::default())
    }

    fn process_post_resource(
        &self,
        _response: &ResourceResponse,
        _metacard: &Metacard,
    ) -> Result<PolicyResponse, PluginError> {
        Ok(PolicyResponse::default())
    }
}

/// Decides whether an operation may proceed, and may rewrite it.
pub trait AccessPlugin: Send + Sync {
    fn process_pre_create(&self, request: CreateRequest) -> Result<CreateRequest, PluginError> {
        Ok(request)
    }

    fn process_pre_update(
        &self,
        request: UpdateRequest,
        _existing: &BTreeMap<String, Metacard>,
    ) -> Result<UpdateRequest, PluginError> {
        Ok(request)
    }

    fn process_pre_delete(&self, request: DeleteRequest) -> Result<DeleteRequest, PluginError> {
        Ok(request)
    }

    fn process_post_delete(&self, response: DeleteResponse) -> Result<DeleteResponse, PluginError> {
        Ok(response)
    }

    fn process_pre_query(&self, request: QueryRequest) -> Result<QueryRequest, PluginError> {
        Ok(request)
    }

    fn process_post_query(&self, response: QueryResponse) -> Result<QueryResponse, PluginError> {
        Ok(response)
    }

    fn process_pre_resource(
        &self,
        request: ResourceRequest,
    ) -> Result<ResourceRequest, PluginError> {
        Ok(request)
    }

    fn process_post_resource(
        &self,
        response: ResourceResponse,
        _metacard: &Metacard,
    ) -> Result<ResourceResponse, PluginError> {
        Ok(response)
    }
}

/// Runs `plugins` in registration order, threading the value through each.
///
/// An `Execution` failure keeps the value from before the failing plugin and moves
/// on, so one broken plugin cannot block the operation. `StopProcessing` ends the
/// chain and is returned to the caller.
pub(crate) fn run_chain<P, T, F>(
    stage: &str,
    plugins: &[Arc<P>],
    input: T,
    apply: F,
) -> Result<T, PluginError>
where
    P: ?Sized,
    T: Clone,
    F: Fn(&P, T) -> Result<T, PluginError>,
{
    plugins
        .iter()
        .enumerate()
        .try_fold(input, |current, (index, plugin)| {
            match apply(&**plugin, current.clone()) {
                Ok(next) => Ok(next),
                Err(PluginError::Execution(message)) => {
                    warn!(stage, plugin = index, error = %message, "plugin failed, skipping");
                    Ok(current)
                }
                Err(stop) => Err(stop),
            }
        })
}

/// Like [`run_chain`] but nothing aborts: used once the operation has already
/// been applied and can no longer be vetoed.
pub(crate) fn run_best_effort<P, T, F>(stage: &str, plugins: &[Arc<P>], input: T, apply: F) -> T
where
    P: ?Sized,
    T: Clone,
    F: Fn(&P, T) -> Result<T, PluginError>,
{
    plugins
        .iter()
        .enumerate()
        .fold(input, |current, (index, plugin)| {
            match apply(&**plugin, current.clone()) {
                Ok(next) => next,
                Err(err) => {
                    warn!(stage, plugin = index, error = %err, "plugin failed, skipping");
                    current
                }
            }
        })
}

/// Asks every policy plugin for its policy and unions the answers.
pub(crate) fn collect_policy<F>(
    stage: &str,
    plugins: &[Arc<dyn PolicyPlugin>],
    ask: F,
) -> Result<PolicyResponse, PluginError>
where
    F: Fn(&dyn PolicyPlugin) -> Result<PolicyResponse, PluginError>,
{
    let mut merged = PolicyResponse::default();
    for (index, plugin) in plugins.iter().enumerate() {
        match ask(&**plugin) {
            Ok(response) => {
                merged.item_policy.merge(&response.item_policy);
                merged.operation_policy.merge(&response.operation_policy);
            }
            Err(PluginError::Execution(message)) => {
                warn!(stage, plugin = index, error = %message, "policy plugin failed, skipping");
            }
            Err(stop) => return Err(stop),
        }
    }
    Ok(merged)
}
