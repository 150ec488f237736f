use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::policy::PolicyMap;

pub const ID: &str = "id";
pub const TITLE: &str = "title";
pub const CREATED: &str = "created";
pub const MODIFIED: &str = "modified";
pub const METACARD_CREATED: &str = "metacard.created";
pub const METACARD_MODIFIED: &str = "metacard.modified";
pub const TAGS: &str = "metacard-tags";
pub const RESOURCE_URI: &str = "resource-uri";
pub const RESOURCE_SIZE: &str = "resource-size";
pub const RESOURCE_DOWNLOAD_URL: &str = "resource-download-url";
pub const MEDIA_TYPE: &str = "media.type";
pub const METADATA: &str = "metadata";
pub const CHECKSUM: &str = "checksum";
pub const SECURITY: &str = "security";

/// Tag given to metacards that describe a retrievable product.
pub const DEFAULT_TAG: &str = "resource";

pub const BASIC_TYPE_NAME: &str = "ddf.metacard";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeFormat {
    String,
    Integer,
    Float,
    Double,
    Short,
    Long,
    Date,
    Boolean,
    Binary,
    Object,
    Geometry,
    Xml,
}

impl fmt::Display for AttributeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttributeFormat::String => "string",
            AttributeFormat::Integer => "integer",
            AttributeFormat::Float => "float",
            AttributeFormat::Double => "double",
            AttributeFormat::Short => "short",
            AttributeFormat::Long => "long",
            AttributeFormat::Date => "date",
            AttributeFormat::Boolean => "boolean",
            AttributeFormat::Binary => "binary",
            AttributeFormat::Object => "object",
            AttributeFormat::Geometry => "geometry",
            AttributeFormat::Xml => "xml",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum AttributeValue {
    String(String),
    Integer(i32),
    Float(f32),
    Double(f64),
    Short(i16),
    Long(i64),
    Date(DateTime<Utc>),
    Boolean(bool),
    Binary(Vec<u8>),
    Object(serde_json::Value),
    Geometry(String),
    Xml(String),
}

impl AttributeValue {
    pub fn format(&self) -> AttributeFormat {
        match self {
            AttributeValue::String(_) => AttributeFormat::String,
            AttributeValue::Integer(_) => AttributeFormat::Integer,
            AttributeValue::Float(_) => AttributeFormat::Float,
            AttributeValue::Double(_) => AttributeFormat::Double,
            AttributeValue::Short(_) => AttributeFormat::Short,
            AttributeValue::Long(_) => AttributeFormat::Long,
            AttributeValue::Date(_) => AttributeFormat::Date,
            AttributeValue::Boolean(_) => AttributeFormat::Boolean,
            AttributeValue::Binary(_) => AttributeFormat::Binary,
            AttributeValue::Object(_) => AttributeFormat::Object,
            AttributeValue::Geometry(_) => AttributeFormat::Geometry,
            AttributeValue::Xml(_) => AttributeFormat::Xml,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(value)
            | AttributeValue::Geometry(value)
            | AttributeValue::Xml(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(value) => Some(i64::from(*value)),
            AttributeValue::Short(value) => Some(i64::from(*value)),
            AttributeValue::Long(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Float(value) => Some(f64::from(*value)),
            AttributeValue::Double(value) => Some(*value),
            other => other.as_i64().map(|value| value as f64),
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            AttributeValue::Date(value) => Some(*value),
            _ => None,
        }
    }

    /// Ordering used for sorting query results. Values of unrelated formats do
    /// not compare.
    pub fn compare(&self, other: &AttributeValue) -> Option<Ordering> {
        match (self, other) {
            (AttributeValue::Date(a), AttributeValue::Date(b)) => Some(a.cmp(b)),
            (AttributeValue::Boolean(a), AttributeValue::Boolean(b)) => Some(a.cmp(b)),
            (a, b) if a.as_str().is_some() && b.as_str().is_some() => {
                Some(a.as_str().cmp(&b.as_str()))
            }
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }

    /// Loose equality used by query filters: numbers compare numerically across
    /// widths, text compares exactly.
    pub fn loosely_equals(&self, other: &AttributeValue) -> bool {
        if self == other {
            return true;
        }
        match self.compare(other) {
            Some(Ordering::Equal) => self.format() != AttributeFormat::Object,
            _ => false,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::String(value)
            | AttributeValue::Geometry(value)
            | AttributeValue::Xml(value) => write!(f, "{value}"),
            AttributeValue::Integer(value) => write!(f, "{value}"),
            AttributeValue::Float(value) => write!(f, "{value}"),
            AttributeValue::Double(value) => write!(f, "{value}"),
            AttributeValue::Short(value) => write!(f, "{value}"),
            AttributeValue::Long(value) => write!(f, "{value}"),
            AttributeValue::Date(value) => write!(f, "{}", value.to_rfc3339()),
            AttributeValue::Boolean(value) => write!(f, "{value}"),
            AttributeValue::Binary(value) => write!(f, "<{} bytes>", value.len()),
            AttributeValue::Object(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Long(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Boolean(value)
    }
}

impl From<DateTime<Utc>> for AttributeValue {
    fn from(value: DateTime<Utc>) -> Self {
        AttributeValue::Date(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    pub name: String,
    pub format: AttributeFormat,
    #[serde(default)]
    pub multi_valued: bool,
    #[serde(default = "default_indexed")]
    pub indexed: bool,
}

fn default_indexed() -> bool {
    true
}

impl AttributeDescriptor {
    pub fn new(name: &str, format: AttributeFormat) -> Self {
        Self {
            name: name.to_string(),
            format,
            multi_valued: false,
            indexed: true,
        }
    }

    pub fn multi_valued(mut self) -> Self {
        self.multi_valued = true;
        self
    }
}

/// Schema of a metacard: its name and the attributes it may carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetacardType {
    name: String,
    descriptors: BTreeMap<String, AttributeDescriptor>,
}

impl MetacardType {
    pub fn new(name: &str, descriptors: impl IntoIterator<Item = AttributeDescriptor>) -> Self {
        Self {
            name: name.to_string(),
            descriptors: descriptors
                .into_iter()
                .map(|descriptor| (descriptor.name.clone(), descriptor))
                .collect(),
        }
    }

    pub fn basic() -> Self {
        use AttributeFormat as F;
        Self::new(
            BASIC_TYPE_NAME,
            [
                AttributeDescriptor::new(ID, F::String),
                AttributeDescriptor::new(TITLE, F::String),
                AttributeDescriptor::new(CREATED, F::Date),
                AttributeDescriptor::new(MODIFIED, F::Date),
                AttributeDescriptor::new(METACARD_CREATED, F::Date),
                AttributeDescriptor::new(METACARD_MODIFIED, F::Date),
                AttributeDescriptor::new(TAGS, F::String).multi_valued(),
                AttributeDescriptor::new(RESOURCE_URI, F::String),
                AttributeDescriptor::new(RESOURCE_SIZE, F::String),
                AttributeDescriptor::new(RESOURCE_DOWNLOAD_URL, F::String),
                AttributeDescriptor::new(MEDIA_TYPE, F::String),
                AttributeDescriptor::new(METADATA, F::Xml),
                AttributeDescriptor::new(CHECKSUM, F::String),
                AttributeDescriptor::new(SECURITY, F::Object),
            ],
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.descriptors.get(name)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &AttributeDescriptor> {
        self.descriptors.values()
    }

    /// Returns a copy of this type with `extra` added. Existing descriptors win.
    pub fn with_descriptors(mut self, extra: impl IntoIterator<Item = AttributeDescriptor>) -> Self {
        for descriptor in extra {
            self.descriptors
                .entry(descriptor.name.clone())
                .or_insert(descriptor);
        }
        self
    }
}

impl Default for MetacardType {
    fn default() -> Self {
        Self::basic()
    }
}

/// A catalog record: a typed, multi-valued attribute bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metacard {
    metacard_type: MetacardType,
    attributes: BTreeMap<String, Vec<AttributeValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_id: Option<String>,
}

impl Default for Metacard {
    fn default() -> Self {
        Self::new(MetacardType::basic())
    }
}

impl Metacard {
    pub fn new(metacard_type: MetacardType) -> Self {
        Self {
            metacard_type,
            attributes: BTreeMap::new(),
            source_id: None,
        }
    }

    pub fn with_id(id: &str) -> Self {
        Self::default().with_attribute(ID, id)
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<AttributeValue>) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.string(ID)
    }

    pub fn set_id(&mut self, id: &str) {
        self.set_attribute(ID, id);
    }

    pub fn title(&self) -> Option<&str> {
        self.string(TITLE)
    }

    pub fn metacard_type(&self) -> &MetacardType {
        &self.metacard_type
    }

    pub fn set_metacard_type(&mut self, metacard_type: MetacardType) {
        self.metacard_type = metacard_type;
    }

    pub fn source_id(&self) -> Option<&str> {
        self.source_id.as_deref()
    }

    pub fn set_source_id(&mut self, source_id: &str) {
        self.source_id = Some(source_id.to_string());
    }

    pub fn set_attribute(&mut self, name: &str, value: impl Into<AttributeValue>) {
        self.attributes.insert(name.to_string(), vec![value.into()]);
    }

    pub fn set_values(&mut self, name: &str, values: Vec<AttributeValue>) {
        if values.is_empty() {
            self.attributes.remove(name);
        } else {
            self.attributes.insert(name.to_string(), values);
        }
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<Vec<AttributeValue>> {
        self.attributes.remove(name)
    }

    pub fn attribute(&self, name: &str) -> Option<&[AttributeValue]> {
        self.attributes.get(name).map(Vec::as_slice)
    }

    pub fn first(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name).and_then(|values| values.first())
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        self.first(name).and_then(AttributeValue::as_str)
    }

    pub fn has_value(&self, name: &str) -> bool {
        self.attributes
            .get(name)
            .map(|values| !values.is_empty())
            .unwrap_or(false)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &[AttributeValue])> {
        self.attributes
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    pub fn tags(&self) -> Vec<&str> {
        self.attribute(TAGS)
            .map(|values| values.iter().filter_map(AttributeValue::as_str).collect())
            .unwrap_or_default()
    }

    pub fn resource_uri(&self) -> Option<&str> {
        self.string(RESOURCE_URI)
    }

    /// The item policy stamped on this metacard, if any.
    pub fn security(&self) -> Option<PolicyMap> {
        match self.first(SECURITY) {
            Some(AttributeValue::Object(value)) => PolicyMap::from_json(value),
            _ => None,
        }
    }

    pub fn set_security(&mut self, policy: &PolicyMap) {
        self.set_attribute(SECURITY, AttributeValue::Object(policy.to_json()));
    }
}
