use std::collections::BTreeMap;
use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use serde::{Serialize, Serializer};

use resource_catalog::domain::{ResourceId, ResourceType};
use resource_catalog::error::CatalogError;
use resource_catalog::graph::RelationGraph;
use resource_catalog::loader::LoadedRecord;
use resource_catalog::localize::{LanguageNames, Localizations};
use resource_catalog::normalize::Normalizer;
use resource_catalog::record;
use resource_catalog::store::{COLLECTION_FILE, DatasetStore, RESOURCE_TEXTS_FILE};

/// Serializes half an object, then fails.
struct FailsMidway;

impl Serialize for FailsMidway {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::{Error, SerializeMap};
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("partial", &1)?;
        Err(S::Error::custom("simulated failure"))
    }
}

fn temp_store() -> (tempfile::TempDir, DatasetStore) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().join("static")).unwrap();
    (temp, DatasetStore::new(root))
}

#[test]
fn failed_write_leaves_previous_artifact() {
    let (_temp, store) = temp_store();
    store
        .write_json_atomic("corpus.json", &BTreeMap::from([("kept", true)]))
        .unwrap();
    let before = fs::read(store.artifact_path("corpus.json")).unwrap();

    let err = store
        .write_json_atomic("corpus.json", &FailsMidway)
        .unwrap_err();
    assert_matches!(err, CatalogError::Serialization(_));

    let after = fs::read(store.artifact_path("corpus.json")).unwrap();
    assert_eq!(before, after);
    let files: Vec<_> = fs::read_dir(store.root())
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert_eq!(files, vec!["corpus.json"]);
}

#[test]
fn writes_selected_artifacts_and_reads_them_back() {
    let (_temp, store) = temp_store();
    let records: BTreeMap<ResourceId, LoadedRecord> = [
        ("coll", "type: corpus\ncollection: true\nresources: [a]\n"),
        ("a", "type: corpus\ndescription:\n  eng: Text\n"),
        ("saldo", "type: lexicon\n"),
    ]
    .into_iter()
    .map(|(id, yaml)| {
        let id: ResourceId = id.parse().unwrap();
        let loaded = LoadedRecord {
            id: id.clone(),
            path: Utf8PathBuf::from(format!("{id}.yaml")),
            record: record::from_yaml(yaml).unwrap(),
        };
        (id, loaded)
    })
    .collect();
    let graph = RelationGraph::build(records.iter().map(|(id, loaded)| (id, &loaded.record))).graph;
    let languages = LanguageNames::default();
    let localizations = Localizations::default();
    let catalog = Normalizer::new(&languages, &localizations, None).normalize_all(
        &records,
        &graph,
        &BTreeMap::new(),
    );

    let summary = store.write_catalog(&catalog, &[ResourceType::Corpus]);
    assert!(summary.is_complete());
    assert_eq!(
        summary.written,
        vec![RESOURCE_TEXTS_FILE, "corpus.json", COLLECTION_FILE]
    );
    assert!(!store.artifact_path("lexicon.json").as_std_path().exists());

    let dataset = store.read_dataset();
    let ids: Vec<_> = dataset.entries.keys().map(ResourceId::as_str).collect();
    assert_eq!(ids, vec!["a", "coll"]);
    assert_eq!(dataset.texts.len(), 1);

    let collection: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(store.artifact_path(COLLECTION_FILE)).unwrap())
            .unwrap();
    assert_eq!(collection["coll"]["size"]["resources"], 1);
}

#[test]
fn malformed_artifact_is_skipped_on_read() {
    let (_temp, store) = temp_store();
    store
        .write_json_atomic("lexicon.json", &BTreeMap::from([("saldo", true)]))
        .unwrap();
    fs::write(store.artifact_path("corpus.json"), "{\"a\": ").unwrap();
    fs::write(store.artifact_path(RESOURCE_TEXTS_FILE), "[1, 2]").unwrap();

    let dataset = store.read_dataset();
    let ids: Vec<_> = dataset.entries.keys().map(ResourceId::as_str).collect();
    assert_eq!(ids, vec!["saldo"]);
    assert!(dataset.texts.is_empty());
}
