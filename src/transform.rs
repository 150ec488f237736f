use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::error::CatalogError;
use crate::metacard::{AttributeDescriptor, AttributeValue, Metacard};
use crate::mime::{JSON_MIME_TYPE, base_type};

/// Turns raw bytes of some mime type into a metacard. `Ok(None)` means the
/// transformer does not understand this input.
pub trait InputTransformer: Send + Sync {
    fn transform(&self, bytes: &[u8], id: &str) -> Result<Option<Metacard>, CatalogError>;
}

/// Input transformers keyed by the mime type they accept. A key may be exact
/// (`application/json`), a family (`image/*`) or `*/*`.
#[derive(Clone, Default)]
pub struct TransformerRegistry {
    entries: Vec<(String, Arc<dyn InputTransformer>)>,
}

impl TransformerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in JSON transformer.
    pub fn with_defaults() -> Self {
        Self::new().with(JSON_MIME_TYPE, Arc::new(JsonInputTransformer))
    }

    pub fn with(mut self, mime_type: &str, transformer: Arc<dyn InputTransformer>) -> Self {
        self.entries.push((base_type(mime_type), transformer));
        self
    }

    /// Exact matches first, then the family wildcard, then `*/*`, each in
    /// registration order.
    pub fn transformers_for(&self, mime_type: &str) -> Vec<Arc<dyn InputTransformer>> {
        let base = base_type(mime_type);
        let family = base
            .split_once('/')
            .map(|(family, _)| format!("{family}/*"))
            .unwrap_or_default();
        [base.as_str(), family.as_str(), "*/*"]
            .iter()
            .flat_map(|key| {
                self.entries
                    .iter()
                    .filter(move |(candidate, _)| candidate == key)
                    .map(|(_, transformer)| transformer.clone())
            })
            .collect()
    }

    /// First transformer to produce a metacard wins; failures move on to the next.
    pub fn transform(
        &self,
        mime_type: &str,
        bytes: &[u8],
        id: &str,
    ) -> Option<Metacard> {
        for transformer in self.transformers_for(mime_type) {
            match transformer.transform(bytes, id) {
                Ok(Some(metacard)) => return Some(metacard),
                Ok(None) => {}
                Err(err) => debug!(mime_type, error = %err, "input transformer failed"),
            }
        }
        None
    }
}

/// Maps the top-level fields of a JSON object onto metacard attributes.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonInputTransformer;

impl InputTransformer for JsonInputTransformer {
    fn transform(&self, bytes: &[u8], id: &str) -> Result<Option<Metacard>, CatalogError> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|err| CatalogError::Transform(err.to_string()))?;
        let Value::Object(fields) = value else {
            return Ok(None);
        };

        let mut metacard = Metacard::default();
        let mut extra = Vec::new();
        for (name, value) in fields {
            let values = json_values(value);
            if values.is_empty() {
                continue;
            }
            if metacard.metacard_type().descriptor(&name).is_none() {
                let mut descriptor = AttributeDescriptor::new(&name, values[0].format());
                descriptor.multi_valued = values.len() > 1;
                extra.push(descriptor);
            }
            metacard.set_values(&name, values);
        }
        let metacard_type = metacard.metacard_type().clone().with_descriptors(extra);
        metacard.set_metacard_type(metacard_type);
        if !id.is_empty() {
            metacard.set_id(id);
        }
        Ok(Some(metacard))
    }
}

fn json_values(value: Value) -> Vec<AttributeValue> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.into_iter().flat_map(json_values).collect(),
        scalar => vec![json_value(scalar)],
    }
}

fn json_value(value: Value) -> AttributeValue {
    match value {
        Value::String(text) => AttributeValue::String(text),
        Value::Bool(flag) => AttributeValue::Boolean(flag),
        Value::Number(number) => match number.as_i64() {
            Some(int) => AttributeValue::Long(int),
            None => AttributeValue::Double(number.as_f64().unwrap_or_default()),
        },
        other => AttributeValue::Object(other),
    }
}
