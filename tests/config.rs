use std::fs;

use assert_matches::assert_matches;
use catalog_ops::config::{Config, ConfigLoader, DefaultValueEntry, DefaultValueObject};
use catalog_ops::error::CatalogError;
use catalog_ops::metacard::AttributeValue;

#[test]
fn parse_config_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("catalog.json");
    fs::write(
        &path,
        r#"{
            "schema_version": 1,
            "site_name": "site-a",
            "fanout": true,
            "fanout_tag_blacklist": ["workspace"],
            "catalog_root": "/srv/catalog",
            "storage_root": "/srv/content",
            "download_retries": 5,
            "poll_ttl_secs": 10,
            "default_values": [
                "classification=U",
                { "attribute": "rank", "value": 3, "metacard_type": "ddf.metacard" }
            ]
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.settings.site_name, "site-a");
    assert!(resolved.settings.fanout);
    assert!(resolved.settings.fanout_tag_blacklist.contains("workspace"));
    assert_eq!(resolved.catalog_root.as_str(), "/srv/catalog");
    assert_eq!(resolved.download_retries, 5);
    assert_eq!(resolved.poll_ttl.as_secs(), 10);
    assert_eq!(
        resolved.default_values.default_for("other", "classification"),
        Some(&AttributeValue::from("U"))
    );
    assert_eq!(
        resolved.default_values.default_for("ddf.metacard", "rank"),
        Some(&AttributeValue::Long(3))
    );
    assert_eq!(resolved.default_values.default_for("other", "rank"), None);
}

#[test]
fn explicit_missing_config_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    assert_matches!(
        ConfigLoader::resolve(path.to_str()),
        Err(CatalogError::MissingConfig(_))
    );
}

#[test]
fn malformed_config_is_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("catalog.json");
    fs::write(&path, "{ not json").unwrap();
    assert_matches!(
        ConfigLoader::resolve(path.to_str()),
        Err(CatalogError::ConfigParse(_))
    );
}

#[test]
fn null_default_value_is_rejected() {
    let config = Config {
        catalog_root: Some("/srv/catalog".to_string()),
        storage_root: Some("/srv/content".to_string()),
        default_values: vec![DefaultValueEntry::Detailed(DefaultValueObject {
            attribute: "owner".to_string(),
            value: serde_json::Value::Null,
            metacard_type: None,
        })],
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(config),
        Err(CatalogError::ConfigParse(_))
    );
}
