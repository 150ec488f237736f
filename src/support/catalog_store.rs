use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::warn;

use crate::framework::FrameworkProperties;
use crate::operation::{ProcessingDetail, ProcessingDetails};
use crate::source::CatalogProvider;

/// Decides where a write goes: the local provider, remote catalog stores, or both.
pub struct CatalogStoreSupport<'a> {
    properties: &'a FrameworkProperties,
}

impl<'a> CatalogStoreSupport<'a> {
    pub fn new(properties: &'a FrameworkProperties) -> Self {
        Self { properties }
    }

    /// No store ids, or the local id among them.
    pub fn is_local(&self, store_ids: &BTreeSet<String>) -> bool {
        store_ids.is_empty() || store_ids.contains(self.properties.local_id())
    }

    /// Some store other than the local catalog was named.
    pub fn is_catalog_store_request(&self, store_ids: &BTreeSet<String>) -> bool {
        !store_ids.is_empty()
            && !(store_ids.len() == 1 && store_ids.contains(self.properties.local_id()))
    }

    /// Stores named by `store_ids` that exist and are available, in id order.
    /// Anything else is recorded in `details`.
    pub fn resolve(
        &self,
        store_ids: &BTreeSet<String>,
        details: &mut ProcessingDetails,
    ) -> Vec<Arc<dyn CatalogProvider>> {
        let mut stores = Vec::new();
        for id in store_ids {
            if id == self.properties.local_id() {
                continue;
            }
            let Some(store) = self.properties.catalog_stores.get(id) else {
                warn!(store = %id, "catalog store not found");
                details.insert(ProcessingDetail::new(
                    id,
                    format!("catalog store {id} not found"),
                ));
                continue;
            };
            if !self.properties.source_poller.is_available(&**store) {
                warn!(store = %id, "catalog store unavailable");
                details.insert(ProcessingDetail::new(
                    id,
                    format!("catalog store {id} is unavailable"),
                ));
                continue;
            }
            stores.push(store.clone());
        }
        stores
    }
}
