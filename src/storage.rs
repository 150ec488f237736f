use std::collections::BTreeSet;

use crate::content::ContentItem;
use crate::error::CatalogError;
use crate::metacard::Metacard;
use crate::operation::OperationContext;

fn transaction_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateStorageRequest {
    /// Storage transaction id; commit and rollback refer to it.
    pub id: String,
    pub content_items: Vec<ContentItem>,
    pub store_ids: BTreeSet<String>,
    pub context: OperationContext,
}

impl CreateStorageRequest {
    pub fn new(content_items: Vec<ContentItem>) -> Self {
        Self {
            id: transaction_id(),
            content_items,
            store_ids: BTreeSet::new(),
            context: OperationContext::default(),
        }
    }

    pub fn with_context(mut self, context: OperationContext) -> Self {
        self.context = context;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateStorageResponse {
    pub request: CreateStorageRequest,
    pub created_items: Vec<ContentItem>,
    pub context: OperationContext,
}

impl CreateStorageResponse {
    pub fn new(request: CreateStorageRequest, created_items: Vec<ContentItem>) -> Self {
        let context = request.context.clone();
        Self {
            request,
            created_items,
            context,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStorageRequest {
    pub id: String,
    /// Items carry the id of the metacard whose content they replace.
    pub content_items: Vec<ContentItem>,
    pub store_ids: BTreeSet<String>,
    pub context: OperationContext,
}

impl UpdateStorageRequest {
    pub fn new(content_items: Vec<ContentItem>) -> Self {
        Self {
            id: transaction_id(),
            content_items,
            store_ids: BTreeSet::new(),
            context: OperationContext::default(),
        }
    }

    pub fn with_context(mut self, context: OperationContext) -> Self {
        self.context = context;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStorageResponse {
    pub request: UpdateStorageRequest,
    pub updated_items: Vec<ContentItem>,
    pub context: OperationContext,
}

impl UpdateStorageResponse {
    pub fn new(request: UpdateStorageRequest, updated_items: Vec<ContentItem>) -> Self {
        let context = request.context.clone();
        Self {
            request,
            updated_items,
            context,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStorageRequest {
    pub id: String,
    pub metacards: Vec<Metacard>,
    pub context: OperationContext,
}

impl DeleteStorageRequest {
    pub fn new(metacards: Vec<Metacard>) -> Self {
        Self {
            id: transaction_id(),
            metacards,
            context: OperationContext::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStorageResponse {
    pub request: DeleteStorageRequest,
    pub deleted_items: Vec<ContentItem>,
}

/// Holds product bytes. Changes made by `create`, `update` and `delete` stay
/// pending until `commit`; `rollback` discards them.
pub trait StorageProvider: Send + Sync {
    fn is_available(&self) -> bool {
        true
    }

    fn create(&self, request: &CreateStorageRequest) -> Result<CreateStorageResponse, CatalogError>;

    fn update(&self, request: &UpdateStorageRequest) -> Result<UpdateStorageResponse, CatalogError>;

    fn delete(&self, request: &DeleteStorageRequest) -> Result<DeleteStorageResponse, CatalogError>;

    /// Reads committed content by its `content:` URI.
    fn read(&self, uri: &str) -> Result<ContentItem, CatalogError>;

    fn commit(&self, transaction_id: &str) -> Result<(), CatalogError>;

    fn rollback(&self, transaction_id: &str) -> Result<(), CatalogError>;
}
