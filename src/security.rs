use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::policy::PolicyMap;

pub const GUEST_NAME: &str = "guest";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
}

/// Permission to perform `action` against something guarded by `required`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValueCollectionPermission {
    pub action: Action,
    pub required: PolicyMap,
}

impl KeyValueCollectionPermission {
    pub fn new(action: Action, required: PolicyMap) -> Self {
        Self { action, required }
    }
}

/// The caller an operation runs on behalf of, with the attribute claims it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, BTreeSet<String>>,
}

impl Subject {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn guest() -> Self {
        Self::new(GUEST_NAME)
    }

    pub fn with_claim<I, S>(mut self, key: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes
            .entry(key.to_string())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    pub fn is_guest(&self) -> bool {
        self.name == GUEST_NAME
    }

    /// Every required value of every required key must be among the subject's
    /// claims for that key.
    pub fn is_permitted(&self, permission: &KeyValueCollectionPermission) -> bool {
        permission.required.iter().all(|(key, required)| {
            let held = self.attributes.get(key);
            required
                .iter()
                .all(|value| held.map(|held| held.contains(value)).unwrap_or(false))
        })
    }
}
