use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::framework::{DEFAULT_SITE_NAME, FrameworkProperties, FrameworkSettings};
use crate::metacard::AttributeValue;
use crate::providers::file_catalog::FileCatalogProvider;
use crate::providers::file_storage::FileSystemStorageProvider;
use crate::resource::{DirectDownloadManager, FileResourceReader, HttpResourceReader};
use crate::source::CachingSourcePoller;
use crate::store::{Store, default_data_root};
use crate::support::metacard::DefaultAttributeValues;

pub const DEFAULT_CONFIG_FILE: &str = "catalog.json";
pub const DEFAULT_DOWNLOAD_RETRIES: u32 = 3;
pub const DEFAULT_POLL_TTL_SECS: u64 = 60;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub site_name: Option<String>,
    #[serde(default)]
    pub fanout: bool,
    #[serde(default)]
    pub fanout_tag_blacklist: Vec<String>,
    #[serde(default)]
    pub storage_root: Option<String>,
    #[serde(default)]
    pub catalog_root: Option<String>,
    #[serde(default)]
    pub temp_dir: Option<String>,
    /// Directories `file:` resource URIs may point into, besides the storage root.
    #[serde(default)]
    pub resource_roots: Vec<String>,
    #[serde(default)]
    pub download_retries: Option<u32>,
    #[serde(default)]
    pub poll_ttl_secs: Option<u64>,
    #[serde(default)]
    pub default_values: Vec<DefaultValueEntry>,
}

/// `"attribute=value"` or an object naming the metacard type it applies to.
#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DefaultValueEntry {
    Shorthand(String),
    Detailed(DefaultValueObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DefaultValueObject {
    pub attribute: String,
    pub value: serde_json::Value,
    #[serde(default)]
    pub metacard_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub settings: FrameworkSettings,
    pub catalog_root: Utf8PathBuf,
    pub storage_root: Utf8PathBuf,
    pub resource_roots: Vec<Utf8PathBuf>,
    pub download_retries: u32,
    pub poll_ttl: Duration,
    pub default_values: DefaultAttributeValues,
}

impl ResolvedConfig {
    pub fn store(&self) -> Store {
        Store::new_with_paths(self.catalog_root.clone(), self.storage_root.clone())
    }

    /// Wires the file-backed providers and the configured collaborators.
    pub fn build_properties(&self) -> Result<FrameworkProperties, CatalogError> {
        let store = self.store();
        let mut properties = FrameworkProperties::new(self.settings.clone())
            .with_catalog_provider(Arc::new(FileCatalogProvider::new(
                &self.settings.site_name,
                store.clone(),
            )))
            .with_storage_provider(Arc::new(FileSystemStorageProvider::new(store)));
        properties.default_values = self.default_values.clone();
        properties.source_poller = Arc::new(CachingSourcePoller::new(self.poll_ttl));
        properties.download_manager = Arc::new(DirectDownloadManager::new(self.download_retries));
        let file_reader = FileResourceReader::new(properties.mime_types.clone()).with_roots(
            self.resource_roots
                .iter()
                .map(|root| root.clone().into_std_path_buf()),
        );
        properties
            .resource_readers
            .retain(|reader| !reader.schemes().iter().any(|scheme| scheme == "file"));
        properties.resource_readers.insert(0, Arc::new(file_reader));
        properties
            .resource_readers
            .push(Arc::new(HttpResourceReader::new()?));
        Ok(properties)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `catalog.json` in the working directory. Only an
    /// explicitly named file has to exist.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, CatalogError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if !config_path.exists() {
            return match path {
                Some(_) => Err(CatalogError::MissingConfig(config_path)),
                None => Self::resolve_config(Config::default()),
            };
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| CatalogError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| CatalogError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, CatalogError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let site_name = config
            .site_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_SITE_NAME.to_string());
        let settings = FrameworkSettings {
            site_name,
            fanout: config.fanout,
            fanout_tag_blacklist: config
                .fanout_tag_blacklist
                .into_iter()
                .collect::<BTreeSet<_>>(),
            temp_dir: config.temp_dir.map(Utf8PathBuf::from),
        };

        let (catalog_root, storage_root) = match (config.catalog_root, config.storage_root) {
            (Some(catalog), Some(storage)) => (Utf8PathBuf::from(catalog), Utf8PathBuf::from(storage)),
            (catalog, storage) => {
                let data_root = default_data_root()?;
                (
                    catalog.map_or_else(|| data_root.join("catalog"), Utf8PathBuf::from),
                    storage.map_or_else(|| data_root.join("content"), Utf8PathBuf::from),
                )
            }
        };

        let mut resource_roots = config
            .resource_roots
            .into_iter()
            .map(Utf8PathBuf::from)
            .collect::<Vec<_>>();
        resource_roots.push(storage_root.clone());

        let mut default_values = DefaultAttributeValues::default();
        for entry in config.default_values {
            match entry {
                DefaultValueEntry::Shorthand(value) => {
                    let (attribute, value) = parse_shorthand(&value)?;
                    default_values.set_global(attribute, value);
                }
                DefaultValueEntry::Detailed(obj) => {
                    if obj.attribute.trim().is_empty() {
                        return Err(CatalogError::ConfigParse(
                            "default value without attribute".to_string(),
                        ));
                    }
                    let value = json_to_attribute(obj.value)?;
                    match obj.metacard_type.as_deref() {
                        Some(metacard_type) => {
                            default_values.set_for_type(metacard_type, &obj.attribute, value)
                        }
                        None => default_values.set_global(&obj.attribute, value),
                    }
                }
            }
        }

        Ok(ResolvedConfig {
            schema_version,
            settings,
            catalog_root,
            storage_root,
            resource_roots,
            download_retries: config.download_retries.unwrap_or(DEFAULT_DOWNLOAD_RETRIES),
            poll_ttl: Duration::from_secs(config.poll_ttl_secs.unwrap_or(DEFAULT_POLL_TTL_SECS)),
            default_values,
        })
    }
}

fn parse_shorthand(value: &str) -> Result<(&str, &str), CatalogError> {
    match value.split_once('=') {
        Some((attribute, value)) if !attribute.trim().is_empty() => {
            Ok((attribute.trim(), value.trim()))
        }
        _ => Err(CatalogError::ConfigParse(format!(
            "default value must look like attribute=value, got {value:?}"
        ))),
    }
}

fn json_to_attribute(value: serde_json::Value) -> Result<AttributeValue, CatalogError> {
    use serde_json::Value;

    match value {
        Value::String(value) => Ok(AttributeValue::String(value)),
        Value::Bool(value) => Ok(AttributeValue::Boolean(value)),
        Value::Number(number) => match (number.as_i64(), number.as_f64()) {
            (Some(value), _) => Ok(AttributeValue::Long(value)),
            (None, Some(value)) => Ok(AttributeValue::Double(value)),
            _ => Err(CatalogError::ConfigParse(format!(
                "unsupported default value {number}"
            ))),
        },
        Value::Null => Err(CatalogError::ConfigParse(
            "default value must not be null".to_string(),
        )),
        other => Ok(AttributeValue::Object(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_default_value_shorthand() {
        let config = Config {
            catalog_root: Some("/tmp/c".to_string()),
            storage_root: Some("/tmp/s".to_string()),
            default_values: vec![DefaultValueEntry::Shorthand(
                "description = unknown".to_string(),
            )],
            ..Config::default()
        };

        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.schema_version, 1);
        assert_eq!(resolved.resource_roots, vec![Utf8PathBuf::from("/tmp/s")]);
        assert_eq!(resolved.settings.site_name, DEFAULT_SITE_NAME);
        assert_eq!(
            resolved.default_values.default_for("any", "description"),
            Some(&AttributeValue::from("unknown"))
        );
    }

    #[test]
    fn shorthand_needs_an_attribute() {
        let config = Config {
            catalog_root: Some("/tmp/c".to_string()),
            storage_root: Some("/tmp/s".to_string()),
            default_values: vec![DefaultValueEntry::Shorthand("=x".to_string())],
            ..Config::default()
        };
        assert!(matches!(
            ConfigLoader::resolve_config(config),
            Err(CatalogError::ConfigParse(_))
        ));
    }
}
