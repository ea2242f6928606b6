use std::fs;
use std::time::Duration;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use resource_catalog::config::{Config, ConfigLoader};
use resource_catalog::error::CatalogError;

#[test]
fn paths_resolve_relative_to_config_file() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let config_path = root.join("catalog.json");
    fs::write(
        &config_path,
        r#"{
            "metadata_dir": "metadata",
            "language_names": "languages.yaml",
            "output_dir": "/srv/static",
            "probe_timeout_secs": 5,
            "registry": {"call_budget": 10, "cooldown_secs": 1}
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(Some(config_path.as_str())).unwrap();
    assert_eq!(resolved.records_dir, root.join("metadata/yaml"));
    assert_eq!(resolved.localizations_dir, root.join("metadata/localizations"));
    assert_eq!(
        resolved.language_names,
        Some(root.join("metadata/languages.yaml"))
    );
    assert_eq!(resolved.output_dir, Utf8PathBuf::from("/srv/static"));
    assert_eq!(resolved.probe_timeout, Duration::from_secs(5));
    assert_eq!(resolved.registry.call_budget, 10);
    assert_eq!(resolved.registry.cooldown(), Duration::from_secs(1));
    assert_eq!(resolved.registry.prefix, "10.23695");
}

#[test]
fn zero_call_budget_is_rejected() {
    let mut config = Config::default();
    config.registry.call_budget = 0;
    let err = ConfigLoader::resolve_config(config, camino::Utf8Path::new("")).unwrap_err();
    assert_matches!(err, CatalogError::InvalidConfig(_));
}

#[test]
fn empty_prefix_is_rejected() {
    let mut config = Config::default();
    config.registry.prefix = " ".to_string();
    let err = ConfigLoader::resolve_config(config, camino::Utf8Path::new("")).unwrap_err();
    assert_matches!(err, CatalogError::InvalidConfig(message) if message.contains("prefix"));
}

#[test]
fn malformed_config_is_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("catalog.json");
    fs::write(&path, "{ not json").unwrap();
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, CatalogError::ConfigParse(_));
}
