use std::collections::{BTreeMap, BTreeSet};

use chrono::Local;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::domain::ResourceId;
use crate::error::{IssueKind, RecordIssue};
use crate::graph::RelationGraph;
use crate::loader::LoadedRecord;
use crate::localize::{LanguageNames, Localizations};
use crate::probe::DownloadProbe;
use crate::record::{Download, LangMap, Language, ResourceRecord};

pub const RESOURCE_COUNT_METRIC: &str = "resources";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub id: ResourceId,
    #[serde(flatten)]
    pub record: ResourceRecord,
    pub has_description: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub obsoletes: Vec<ResourceId>,
}

#[derive(Debug, Default)]
pub struct NormalizedCatalog {
    pub entries: BTreeMap<ResourceId, CatalogEntry>,
    pub texts: BTreeMap<ResourceId, LangMap>,
    pub issues: Vec<RecordIssue>,
}

impl NormalizedCatalog {
    pub fn collections(&self) -> BTreeMap<&ResourceId, &CatalogEntry> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.record.is_collection)
            .collect()
    }
}

pub struct Normalizer<'a> {
    languages: &'a LanguageNames,
    localizations: &'a Localizations,
    probe: Option<&'a dyn DownloadProbe>,
    today: String,
}

impl<'a> Normalizer<'a> {
    pub fn new(
        languages: &'a LanguageNames,
        localizations: &'a Localizations,
        probe: Option<&'a dyn DownloadProbe>,
    ) -> Self {
        Self {
            languages,
            localizations,
            probe,
            today: Local::now().format("%Y-%m-%d").to_string(),
        }
    }

    pub fn with_today(mut self, today: impl Into<String>) -> Self {
        self.today = today.into();
        self
    }

    pub fn normalize_all(
        &self,
        records: &BTreeMap<ResourceId, LoadedRecord>,
        graph: &RelationGraph,
        previous: &BTreeMap<ResourceId, Value>,
    ) -> NormalizedCatalog {
        let mut catalog = NormalizedCatalog::default();
        let mut ordered: Vec<&LoadedRecord> = records.values().collect();
        ordered.sort_by(|a, b| a.path.cmp(&b.path));
        for loaded in ordered {
            let id = &loaded.id;
            let (entry, text) =
                self.normalize(id, &loaded.record, graph, previous.get(id), &mut catalog.issues);
            if let Some(text) = text {
                catalog.texts.insert(id.clone(), text);
            }
            catalog.entries.insert(id.clone(), entry);
        }
        catalog
    }

    pub fn normalize(
        &self,
        id: &ResourceId,
        source: &ResourceRecord,
        graph: &RelationGraph,
        previous: Option<&Value>,
        issues: &mut Vec<RecordIssue>,
    ) -> (CatalogEntry, Option<LangMap>) {
        debug!(resource = %id, "normalizing");
        let mut record = source.clone();

        let text: LangMap = std::mem::take(&mut record.long_description)
            .into_iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .collect();
        let text = (!text.is_empty()).then_some(text);

        self.resolve_languages(id, &mut record);
        self.localizations.apply(&mut record);

        let carried = previous.map(previous_downloads).unwrap_or_default();
        for download in &mut record.downloads {
            self.fill_download(id, download, &carried, issues);
        }

        record.members = to_strings(graph.members(id));
        record.member_of = to_strings(graph.member_of(id));
        record.successors = to_strings(graph.obsoleted_by(id));
        if record.is_collection {
            record
                .size_metrics
                .insert(RESOURCE_COUNT_METRIC.to_string(), record.members.len() as u64);
        }

        let has_description = record
            .short_description
            .values()
            .any(|value| !value.trim().is_empty())
            || text.is_some();

        let entry = CatalogEntry {
            id: id.clone(),
            obsoletes: graph.obsoletes(id).into_iter().cloned().collect(),
            record,
            has_description,
        };
        (entry, text)
    }

    fn resolve_languages(&self, id: &ResourceId, record: &mut ResourceRecord) {
        let mut known: BTreeSet<String> = record
            .languages
            .iter()
            .map(|language| language.code.clone())
            .collect();
        for code in std::mem::take(&mut record.language_codes) {
            if known.contains(&code) {
                continue;
            }
            match self.languages.resolve(&code) {
                Some(name) => {
                    record.languages.push(Language {
                        code: code.clone(),
                        name,
                        extra: BTreeMap::new(),
                    });
                    known.insert(code);
                }
                None => error!(resource = %id, "could not find language code '{code}'"),
            }
        }
    }

    fn fill_download(
        &self,
        id: &ResourceId,
        download: &mut Download,
        carried: &BTreeMap<String, (Option<u64>, Option<String>)>,
        issues: &mut Vec<RecordIssue>,
    ) {
        if !download.needs_probe() {
            return;
        }
        let Some(url) = download.url.clone() else {
            return;
        };

        if let Some((size, last_modified)) = carried.get(&url) {
            download.size = *size;
            download.last_modified = last_modified.clone();
            return;
        }

        let Some(probe) = self.probe else {
            return;
        };
        match probe.probe(&url) {
            Ok(info) => {
                download.size = Some(info.size.unwrap_or(0));
                download.last_modified =
                    Some(info.last_modified.unwrap_or_else(|| self.today.clone()));
            }
            Err(err) => {
                let message = format!("could not get downloadable {url}: {err}");
                warn!(resource = %id, "{message}");
                issues.push(RecordIssue::new(IssueKind::ProbeFailure, id.as_str(), message));
                download.size = Some(0);
                download.last_modified = Some(self.today.clone());
            }
        }
    }
}

fn to_strings(ids: Vec<&ResourceId>) -> Vec<String> {
    ids.into_iter().map(|id| id.as_str().to_string()).collect()
}

fn previous_downloads(entry: &Value) -> BTreeMap<String, (Option<u64>, Option<String>)> {
    entry
        .get("downloads")
        .and_then(Value::as_array)
        .map(|downloads| {
            downloads
                .iter()
                .filter_map(|download| {
                    let url = download.get("url")?.as_str()?.to_string();
                    let size = download.get("size").and_then(Value::as_u64);
                    let last_modified = download
                        .get("last-modified")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    (size.is_some() || last_modified.is_some())
                        .then_some((url, (size, last_modified)))
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::error::CatalogError;
    use crate::probe::DownloadInfo;
    use crate::record;

    struct FixedProbe {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    impl DownloadProbe for FixedProbe {
        fn probe(&self, url: &str) -> Result<DownloadInfo, CatalogError> {
            self.calls.lock().unwrap().push(url.to_string());
            if self.fail {
                return Err(CatalogError::ProbeStatus {
                    status: 404,
                    message: url.to_string(),
                });
            }
            Ok(DownloadInfo {
                size: Some(42),
                last_modified: Some("2024-02-01".to_string()),
            })
        }
    }

    fn normalize_one(
        yaml: &str,
        probe: Option<&dyn DownloadProbe>,
    ) -> (CatalogEntry, Option<LangMap>, Vec<RecordIssue>) {
        let languages = LanguageNames::default();
        let localizations = Localizations::default();
        let normalizer =
            Normalizer::new(&languages, &localizations, probe).with_today("2025-01-01");
        let id: ResourceId = "res".parse().unwrap();
        let record = record::from_yaml(yaml).unwrap();
        let mut issues = Vec::new();
        let graph = RelationGraph::default();
        let (entry, text) = normalizer.normalize(&id, &record, &graph, None, &mut issues);
        (entry, text, issues)
    }

    #[test]
    fn moves_long_description_to_text_store() {
        let (entry, text, _) = normalize_one(
            "type: corpus\ndescription:\n  eng: Long text\n  swe: \"  \"\n",
            None,
        );
        assert!(entry.record.long_description.is_empty());
        assert_eq!(
            text.unwrap(),
            LangMap::from([("eng".to_string(), "Long text".to_string())])
        );
        assert!(entry.has_description);
    }

    #[test]
    fn merges_language_codes_without_duplicates() {
        let (entry, _, _) = normalize_one(
            "type: lexicon\nlanguage_codes: [swe, fin, nope]\n\
             languages:\n  - code: swe\n    name: {eng: Swedish, swe: svenska}\n",
            None,
        );
        let codes: Vec<_> = entry.record.languages.iter().map(|l| l.code.as_str()).collect();
        assert_eq!(codes, vec!["swe", "fin"]);
        assert!(entry.record.language_codes.is_empty());
        assert!(!entry.has_description);
    }

    #[test]
    fn probe_failure_falls_back_to_neutral_values() {
        let probe = FixedProbe {
            calls: Mutex::new(Vec::new()),
            fail: true,
        };
        let (entry, _, issues) = normalize_one(
            "type: corpus\ndownloads:\n  - url: https://example.org/a.zip\n\
             \x20 - url: https://example.org/b.zip\n    size: 7\n",
            Some(&probe),
        );
        assert_eq!(probe.calls.lock().unwrap().len(), 1);
        assert_eq!(entry.record.downloads[0].size, Some(0));
        assert_eq!(
            entry.record.downloads[0].last_modified.as_deref(),
            Some("2025-01-01")
        );
        assert_eq!(entry.record.downloads[1].size, Some(7));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::ProbeFailure);
    }

    #[test]
    fn previous_probe_results_are_reused() {
        let probe = FixedProbe {
            calls: Mutex::new(Vec::new()),
            fail: false,
        };
        let languages = LanguageNames::default();
        let localizations = Localizations::default();
        let normalizer = Normalizer::new(&languages, &localizations, Some(&probe));
        let id: ResourceId = "res".parse().unwrap();
        let record =
            record::from_yaml("type: corpus\ndownloads:\n  - url: https://example.org/a.zip\n")
                .unwrap();
        let previous = json!({"downloads": [
            {"url": "https://example.org/a.zip", "size": 9, "last-modified": "2020-01-01"}
        ]});
        let graph = RelationGraph::default();
        let mut issues = Vec::new();
        let (entry, _) = normalizer.normalize(&id, &record, &graph, Some(&previous), &mut issues);
        assert!(probe.calls.lock().unwrap().is_empty());
        assert_eq!(entry.record.downloads[0].size, Some(9));
    }
}
