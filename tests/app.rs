use std::collections::BTreeMap;
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde_json::Value;

use resource_catalog::app::{App, BuildMode, BuildOptions};
use resource_catalog::config::{RegistryConfig, ResolvedConfig};
use resource_catalog::domain::ResourceId;
use resource_catalog::error::{CatalogError, IssueKind};
use resource_catalog::output::JsonOutput;
use resource_catalog::payload::{DoiAttributes, RelatedIdentifier};
use resource_catalog::probe::{DownloadInfo, DownloadProbe, NoProbe};
use resource_catalog::registry::{RegistryClient, RegistryDates};

#[derive(Clone, Default)]
struct CountingProbe {
    calls: Arc<Mutex<Vec<String>>>,
}

impl DownloadProbe for CountingProbe {
    fn probe(&self, url: &str) -> Result<DownloadInfo, CatalogError> {
        self.calls.lock().unwrap().push(url.to_string());
        Ok(DownloadInfo {
            size: Some(1024),
            last_modified: Some("2024-05-06".to_string()),
        })
    }
}

/// Builds never reach the registry.
struct UnusedRegistry;

impl RegistryClient for UnusedRegistry {
    fn check_available(&self) -> Result<(), CatalogError> {
        unreachable!()
    }

    fn find_by_alternate_id(&self, _id: &ResourceId) -> Result<Option<String>, CatalogError> {
        unreachable!()
    }

    fn fetch_dates(&self, _doi: &str) -> Result<RegistryDates, CatalogError> {
        unreachable!()
    }

    fn create(&self, _attributes: &DoiAttributes) -> Result<String, CatalogError> {
        unreachable!()
    }

    fn update(&self, _doi: &str, _attributes: &DoiAttributes) -> Result<(), CatalogError> {
        unreachable!()
    }

    fn replace_related(
        &self,
        _doi: &str,
        _related: &[RelatedIdentifier],
    ) -> Result<(), CatalogError> {
        unreachable!()
    }
}

fn workspace(files: &[(&str, &str)]) -> (tempfile::TempDir, ResolvedConfig) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let records_dir = root.join("metadata/yaml");
    for (relative, content) in files {
        let path = records_dir.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    let config = ResolvedConfig {
        records_dir,
        schema_file: root.join("metadata/schema/metadata.json"),
        localizations_dir: root.join("metadata/localizations"),
        language_names: None,
        output_dir: root.join("static"),
        probe_timeout: Duration::from_secs(1),
        registry: RegistryConfig::default(),
    };
    (temp, config)
}

fn snapshot(dir: &Utf8Path) -> BTreeMap<String, Vec<u8>> {
    fs::read_dir(dir)
        .unwrap()
        .map(|entry| {
            let entry = entry.unwrap();
            (
                entry.file_name().to_string_lossy().into_owned(),
                fs::read(entry.path()).unwrap(),
            )
        })
        .collect()
}

fn read_json(path: Utf8PathBuf) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

const TREE: &[(&str, &str)] = &[
    (
        "corpus/coll.yaml",
        "type: corpus\ncollection: true\nresources: [a, b]\nname:\n  eng: Collection\n",
    ),
    (
        "corpus/a.yaml",
        "type: corpus\nlanguage_codes: swe\ndownloads:\n  - url: https://example.org/a.zip\n",
    ),
    ("corpus/b.yaml", "type: corpus\ndescription:\n  eng: About b\n"),
    ("model/m.yaml", "type: model\nsuccessors: [m2]\n"),
    ("model/m2.yaml", "type: model\n"),
];

#[test]
fn offline_rebuild_is_byte_identical() {
    let (_temp, config) = workspace(TREE);
    let output_dir = config.output_dir.clone();
    let app = App::new(config, NoProbe, UnusedRegistry);
    let options = BuildOptions {
        offline: true,
        ..BuildOptions::default()
    };

    let first = app.build(options.clone(), &JsonOutput).unwrap();
    assert_eq!(first.mode, BuildMode::Full);
    assert_eq!(first.records, 5);
    assert_eq!(first.collections, 1);
    assert!(first.artifacts.is_complete());
    assert!(!first.report.has_errors());
    let before = snapshot(&output_dir);
    assert_eq!(before.len(), 7);

    app.build(options, &JsonOutput).unwrap();
    assert_eq!(snapshot(&output_dir), before);
}

#[test]
fn incremental_removal_cleans_back_references() {
    let (_temp, config) = workspace(TREE);
    let records_dir = config.records_dir.clone();
    let output_dir = config.output_dir.clone();
    let probe = CountingProbe::default();
    let app = App::new(config, probe.clone(), UnusedRegistry);

    app.build(BuildOptions::default(), &JsonOutput).unwrap();
    assert_eq!(probe.calls.lock().unwrap().len(), 1);
    let corpus = read_json(output_dir.join("corpus.json"));
    assert_eq!(corpus["b"]["in_collections"], serde_json::json!(["coll"]));
    assert_eq!(corpus["a"]["downloads"][0]["size"], 1024);

    fs::remove_file(records_dir.join("corpus/b.yaml")).unwrap();
    let result = app
        .build(
            BuildOptions {
                paths: vec!["corpus/b".parse().unwrap()],
                ..BuildOptions::default()
            },
            &JsonOutput,
        )
        .unwrap();

    assert_eq!(result.mode, BuildMode::Incremental);
    assert_eq!(result.removed, vec!["b".parse::<ResourceId>().unwrap()]);
    assert_eq!(result.report.count(IssueKind::DanglingReference), 1);
    // a was not in the change set, so its probe result is carried forward
    assert_eq!(probe.calls.lock().unwrap().len(), 1);

    let corpus = read_json(output_dir.join("corpus.json"));
    assert!(corpus.get("b").is_none());
    assert_eq!(corpus["coll"]["resources"], serde_json::json!(["a"]));
    assert_eq!(corpus["coll"]["size"]["resources"], 1);
    assert_eq!(corpus["a"]["downloads"][0]["last-modified"], "2024-05-06");
    let texts = read_json(output_dir.join("resource-texts.json"));
    assert!(texts.get("b").is_none());
}

#[test]
fn languages_are_resolved_in_build_output() {
    let (_temp, config) = workspace(TREE);
    let output_dir = config.output_dir.clone();
    let app = App::new(config, NoProbe, UnusedRegistry);
    app.build(
        BuildOptions {
            offline: true,
            ..BuildOptions::default()
        },
        &JsonOutput,
    )
    .unwrap();

    let corpus = read_json(output_dir.join("corpus.json"));
    assert_eq!(corpus["a"]["languages"][0]["code"], "swe");
    assert_eq!(corpus["a"]["languages"][0]["name"]["eng"], "Swedish");
    assert!(corpus["a"].get("language_codes").is_none());

    let models = read_json(output_dir.join("model.json"));
    assert_eq!(models["m2"]["obsoletes"], serde_json::json!(["m"]));
}

#[test]
fn validate_requires_schema_file() {
    let (_temp, config) = workspace(TREE);
    let app = App::new(config, NoProbe, UnusedRegistry);
    let err = app
        .build(
            BuildOptions {
                offline: true,
                validate: true,
                ..BuildOptions::default()
            },
            &JsonOutput,
        )
        .unwrap_err();
    assert!(matches!(err, CatalogError::SchemaLoad(_)));
}

#[test]
fn incremental_build_survives_malformed_previous_artifact() {
    let (_temp, config) = workspace(TREE);
    let output_dir = config.output_dir.clone();
    let app = App::new(config, NoProbe, UnusedRegistry);
    let offline = BuildOptions {
        offline: true,
        ..BuildOptions::default()
    };
    app.build(offline.clone(), &JsonOutput).unwrap();
    fs::write(output_dir.join("corpus.json"), "{ not json").unwrap();

    let result = app
        .build(
            BuildOptions {
                paths: vec!["corpus/b".parse().unwrap()],
                ..offline
            },
            &JsonOutput,
        )
        .unwrap();

    assert_eq!(result.mode, BuildMode::Incremental);
    assert!(result.artifacts.is_complete());
    let corpus = read_json(output_dir.join("corpus.json"));
    assert_eq!(corpus["b"]["in_collections"], serde_json::json!(["coll"]));
    assert!(corpus.get("a").is_some());
}
