use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Attribute name to the set of values a subject must hold for that attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyMap(BTreeMap<String, BTreeSet<String>>);

impl PolicyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<I, S>(&mut self, key: &str, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0
            .entry(key.to_string())
            .or_default()
            .extend(values.into_iter().map(Into::into));
    }

    pub fn get(&self, key: &str) -> Option<&BTreeSet<String>> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.0.iter().map(|(key, values)| (key.as_str(), values))
    }

    /// Per-key union. Merging the same map twice leaves the result unchanged.
    pub fn merge(&mut self, other: &PolicyMap) {
        for (key, values) in &other.0 {
            self.0
                .entry(key.clone())
                .or_default()
                .extend(values.iter().cloned());
        }
    }

    pub fn merged(mut self, other: &PolicyMap) -> Self {
        self.merge(other);
        self
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(key, values)| {
                    (
                        key.clone(),
                        Value::Array(values.iter().cloned().map(Value::String).collect()),
                    )
                })
                .collect(),
        )
    }

    pub fn from_json(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let mut map = PolicyMap::new();
        for (key, values) in object {
            let values = values
                .as_array()?
                .iter()
                .map(|value| value.as_str().map(str::to_string))
                .collect::<Option<BTreeSet<_>>>()?;
            map.0.insert(key.clone(), values);
        }
        Some(map)
    }
}

impl<K, V> FromIterator<(K, V)> for PolicyMap
where
    K: Into<String>,
    V: IntoIterator,
    V::Item: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = PolicyMap::new();
        for (key, values) in iter {
            let key = key.into();
            map.insert(&key, values);
        }
        map
    }
}

/// Policy returned by a policy plugin for one stage of an operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyResponse {
    /// Stamped on the metacard the policy was computed for.
    pub item_policy: PolicyMap,
    /// Required of the subject for the operation as a whole.
    pub operation_policy: PolicyMap,
}

impl PolicyResponse {
    pub fn item(item_policy: PolicyMap) -> Self {
        Self {
            item_policy,
            operation_policy: PolicyMap::new(),
        }
    }

    pub fn operation(operation_policy: PolicyMap) -> Self {
        Self {
            item_policy: PolicyMap::new(),
            operation_policy,
        }
    }
}
