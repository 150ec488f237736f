use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::content::{ContentData, ContentItem};
use crate::error::CatalogError;
use crate::framework::FrameworkProperties;
use crate::fs_util::TempContentFiles;
use crate::metacard::{
    self, AttributeDescriptor, AttributeValue, Metacard, MetacardType,
};
use crate::mime::detect_mime_type;

/// Extends metacard types with extra attribute descriptors.
pub trait AttributeInjector: Send + Sync {
    fn inject(&self, metacard_type: MetacardType) -> MetacardType;
}

/// Adds a fixed set of descriptors to every type, or only to the named types.
#[derive(Debug, Clone, Default)]
pub struct GlobalAttributeInjector {
    descriptors: Vec<AttributeDescriptor>,
    type_names: BTreeSet<String>,
}

impl GlobalAttributeInjector {
    pub fn new(descriptors: Vec<AttributeDescriptor>) -> Self {
        Self {
            descriptors,
            type_names: BTreeSet::new(),
        }
    }

    pub fn for_types<I, S>(mut self, type_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.type_names = type_names.into_iter().map(Into::into).collect();
        self
    }
}

impl AttributeInjector for GlobalAttributeInjector {
    fn inject(&self, metacard_type: MetacardType) -> MetacardType {
        if !self.type_names.is_empty() && !self.type_names.contains(metacard_type.name()) {
            return metacard_type;
        }
        metacard_type.with_descriptors(self.descriptors.iter().cloned())
    }
}

/// Values given to attributes a metacard arrives without. Type-specific values
/// take precedence over global ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefaultAttributeValues {
    global: BTreeMap<String, AttributeValue>,
    by_type: BTreeMap<String, BTreeMap<String, AttributeValue>>,
}

impl DefaultAttributeValues {
    pub fn set_global(&mut self, attribute: &str, value: impl Into<AttributeValue>) {
        self.global.insert(attribute.to_string(), value.into());
    }

    pub fn set_for_type(
        &mut self,
        metacard_type: &str,
        attribute: &str,
        value: impl Into<AttributeValue>,
    ) {
        self.by_type
            .entry(metacard_type.to_string())
            .or_default()
            .insert(attribute.to_string(), value.into());
    }

    pub fn default_for(&self, metacard_type: &str, attribute: &str) -> Option<&AttributeValue> {
        self.by_type
            .get(metacard_type)
            .and_then(|values| values.get(attribute))
            .or_else(|| self.global.get(attribute))
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.by_type.is_empty()
    }

    pub fn apply(&self, metacard: &mut Metacard) {
        let type_name = metacard.metacard_type().name().to_string();
        let attributes: BTreeSet<&String> = self
            .global
            .keys()
            .chain(self.by_type.get(&type_name).into_iter().flat_map(BTreeMap::keys))
            .collect();
        for attribute in attributes {
            if metacard.has_value(attribute) {
                continue;
            }
            if let Some(value) = self.default_for(&type_name, attribute) {
                metacard.set_attribute(attribute, value.clone());
            }
        }
    }
}

/// A fresh metacard id: a v4 uuid without dashes.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub struct MetacardSupport<'a> {
    properties: &'a FrameworkProperties,
}

impl<'a> MetacardSupport<'a> {
    pub fn new(properties: &'a FrameworkProperties) -> Self {
        Self { properties }
    }

    pub fn inject_attributes(&self, metacard: &mut Metacard) {
        if self.properties.attribute_injectors.is_empty() {
            return;
        }
        let injected = self
            .properties
            .attribute_injectors
            .iter()
            .fold(metacard.metacard_type().clone(), |metacard_type, injector| {
                injector.inject(metacard_type)
            });
        metacard.set_metacard_type(injected);
    }

    /// Ids, injected attributes, defaults, tags and timestamps for new metacards.
    pub fn prepare_for_create(&self, metacards: &mut [Metacard], now: DateTime<Utc>) {
        for metacard in metacards {
            if metacard.id().is_none_or(str::is_empty) {
                metacard.set_id(&new_id());
            }
            self.inject_attributes(metacard);
            self.properties.default_values.apply(metacard);
            set_default_tag(metacard);
            for name in [
                metacard::CREATED,
                metacard::MODIFIED,
                metacard::METACARD_CREATED,
                metacard::METACARD_MODIFIED,
            ] {
                if !metacard.has_value(name) {
                    metacard.set_attribute(name, now);
                }
            }
        }
    }

    /// Injected attributes, defaults and tags for replacement metacards, which
    /// keep the creation time of the metacard they replace.
    pub fn prepare_for_update(
        &self,
        metacards: &mut [Metacard],
        previous: &BTreeMap<String, Metacard>,
        now: DateTime<Utc>,
    ) {
        for metacard in metacards {
            self.inject_attributes(metacard);
            self.properties.default_values.apply(metacard);
            set_default_tag(metacard);
            let old = metacard.id().and_then(|id| previous.get(id));
            if let Some(created) = old.and_then(|old| old.first(metacard::METACARD_CREATED)) {
                metacard.set_attribute(metacard::METACARD_CREATED, created.clone());
            } else if !metacard.has_value(metacard::METACARD_CREATED) {
                metacard.set_attribute(metacard::METACARD_CREATED, now);
            }
            metacard.set_attribute(metacard::METACARD_MODIFIED, now);
            if !metacard.has_value(metacard::MODIFIED) {
                metacard.set_attribute(metacard::MODIFIED, now);
            }
        }
    }

    /// Copies each upload into `temp`, settles its mime type and attaches a
    /// metacard. Returned items point at their temporary copy.
    ///
    /// Qualified items are extra parts of a metacard described by another item
    /// and get no metacard of their own. With `require_ids`, every item must
    /// already name the metacard it belongs to.
    pub fn generate(
        &self,
        content_items: Vec<ContentItem>,
        overrides: &BTreeMap<String, AttributeValue>,
        temp: &mut TempContentFiles,
        require_ids: bool,
    ) -> Result<Vec<ContentItem>, CatalogError> {
        let mut prepared = Vec::with_capacity(content_items.len());
        for mut item in content_items {
            if item.id.is_empty() {
                if require_ids || item.qualifier.is_some() {
                    return Err(CatalogError::Ingest(format!(
                        "content item {} does not reference a metacard",
                        item.filename
                    )));
                }
                item.id = item
                    .metacard
                    .as_ref()
                    .and_then(Metacard::id)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(new_id);
            }

            let bytes = item.read_bytes()?;
            let path = temp.write(&item.id, &item.filename, &bytes)?;
            item.mime_type = detect_mime_type(
                self.properties.mime_types.as_ref(),
                &item.mime_type,
                &item.filename,
                &bytes,
            );
            item.size = bytes.len() as u64;
            item.data = ContentData::File(path);

            if item.qualifier.is_none() {
                let mut metacard = match item.metacard.take() {
                    Some(metacard) => metacard,
                    None => self.transform(&item, &bytes),
                };
                metacard.set_id(&item.id);
                for (attribute, value) in overrides {
                    metacard.set_attribute(attribute, value.clone());
                }
                if !metacard.has_value(metacard::RESOURCE_URI) {
                    metacard.set_attribute(metacard::RESOURCE_URI, item.uri());
                }
                if !metacard.has_value(metacard::RESOURCE_SIZE) {
                    metacard.set_attribute(metacard::RESOURCE_SIZE, item.size.to_string());
                }
                if !metacard.has_value(metacard::MEDIA_TYPE) {
                    metacard.set_attribute(metacard::MEDIA_TYPE, item.mime_type.as_str());
                }
                item.metacard = Some(metacard);
            }
            prepared.push(item);
        }
        Ok(prepared)
    }

    fn transform(&self, item: &ContentItem, bytes: &[u8]) -> Metacard {
        let transformed = self
            .properties
            .transformers
            .transform(&item.mime_type, bytes, &item.id);
        let mut metacard = transformed.unwrap_or_else(|| {
            debug!(
                id = %item.id,
                mime_type = %item.mime_type,
                "no transformer produced a metacard, using a default one"
            );
            Metacard::default()
        });
        if !metacard.has_value(metacard::TITLE) {
            metacard.set_attribute(metacard::TITLE, item.filename.as_str());
        }
        metacard
    }
}

fn set_default_tag(metacard: &mut Metacard) {
    if !metacard.has_value(metacard::TAGS) {
        metacard.set_attribute(metacard::TAGS, metacard::DEFAULT_TAG);
    }
}
