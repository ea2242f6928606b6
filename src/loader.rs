use std::collections::BTreeMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, error, info};

use crate::domain::{ResourceId, ResourcePath};
use crate::error::{CatalogError, IssueKind, RecordIssue};
use crate::record::{self, ResourceRecord};
use crate::schema::SchemaValidator;

const RECORD_EXTENSION: &str = "yaml";

#[derive(Debug, Clone)]
pub struct LoadedRecord {
    pub id: ResourceId,
    pub path: Utf8PathBuf,
    pub record: ResourceRecord,
}

#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub records: BTreeMap<ResourceId, LoadedRecord>,
    pub unlisted: Vec<ResourceId>,
    pub issues: Vec<RecordIssue>,
}

#[derive(Debug, Default)]
pub struct SubsetOutcome {
    pub records: BTreeMap<ResourceId, LoadedRecord>,
    pub removed: Vec<ResourceId>,
    pub unlisted: Vec<ResourceId>,
    pub issues: Vec<RecordIssue>,
}

enum FileLoad {
    Listed(LoadedRecord),
    Unlisted(ResourceId),
}

pub struct RecordLoader {
    root: Utf8PathBuf,
    schema: Option<SchemaValidator>,
}

impl RecordLoader {
    pub fn new(root: Utf8PathBuf, schema: Option<SchemaValidator>) -> Self {
        Self { root, schema }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn load_all(&self) -> Result<LoadOutcome, CatalogError> {
        let files = list_record_files(&self.root)?;
        info!(count = files.len(), root = %self.root, "loading resource records");

        let mut outcome = LoadOutcome::default();
        for path in files {
            match self.load_file(&path) {
                Ok(FileLoad::Listed(loaded)) => {
                    if let Some(previous) = outcome.records.get(&loaded.id) {
                        let message = format!(
                            "duplicate resource id, already defined in {}; ignoring {}",
                            previous.path, loaded.path
                        );
                        error!(resource = %loaded.id, "{message}");
                        outcome.issues.push(RecordIssue::new(
                            IssueKind::LoadError,
                            loaded.id.as_str(),
                            message,
                        ));
                        continue;
                    }
                    outcome.records.insert(loaded.id.clone(), loaded);
                }
                Ok(FileLoad::Unlisted(id)) => outcome.unlisted.push(id),
                Err(issue) => outcome.issues.push(issue),
            }
        }
        Ok(outcome)
    }

    /// Load an explicit subset of `{type}/{id}` paths. A path without a source
    /// file is reported as removed rather than as an error.
    pub fn load_paths(&self, paths: &[ResourcePath]) -> SubsetOutcome {
        let mut sorted = paths.to_vec();
        sorted.sort();
        sorted.dedup();

        let mut outcome = SubsetOutcome::default();
        for resource_path in sorted {
            let path = self.root.join(resource_path.relative_file());
            if !path.as_std_path().is_file() {
                info!(resource = %resource_path.id, "source file absent, treating as removed");
                outcome.removed.push(resource_path.id);
                continue;
            }
            match self.load_file(&path) {
                Ok(FileLoad::Listed(loaded)) => {
                    outcome.records.insert(loaded.id.clone(), loaded);
                }
                Ok(FileLoad::Unlisted(id)) => outcome.unlisted.push(id),
                Err(issue) => outcome.issues.push(issue),
            }
        }
        outcome
    }

    fn load_file(&self, path: &Utf8Path) -> Result<FileLoad, RecordIssue> {
        let stem = path.file_stem().unwrap_or_default().to_string();
        debug!(path = %path, "processing record");

        let id: ResourceId = stem.parse().map_err(|err: CatalogError| {
            load_issue(IssueKind::LoadError, &stem, err.to_string())
        })?;

        let content = fs::read_to_string(path.as_std_path()).map_err(|err| {
            load_issue(IssueKind::LoadError, &stem, format!("read {path}: {err}"))
        })?;
        let mut raw = record::parse_yaml(&content)
            .map_err(|err| load_issue(IssueKind::LoadError, &stem, err.to_string()))?;

        if let Some(schema) = &self.schema {
            schema
                .check(&raw)
                .map_err(|message| load_issue(IssueKind::ValidationError, &stem, message))?;
        }

        record::migrate(&mut raw)
            .map_err(|err| load_issue(IssueKind::LoadError, &stem, err.to_string()))?;
        let record = record::from_value(raw)
            .map_err(|err| load_issue(IssueKind::LoadError, &stem, err.to_string()))?;

        if record.unlisted {
            debug!(resource = %id, "skipping unlisted record");
            return Ok(FileLoad::Unlisted(id));
        }

        Ok(FileLoad::Listed(LoadedRecord {
            id,
            path: path.to_path_buf(),
            record,
        }))
    }
}

fn load_issue(kind: IssueKind, resource: &str, message: String) -> RecordIssue {
    error!(resource, kind = kind.as_str(), "{message}");
    RecordIssue::new(kind, resource, message)
}

pub fn list_record_files(root: &Utf8Path) -> Result<Vec<Utf8PathBuf>, CatalogError> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = fs::read_dir(dir.as_std_path())
            .map_err(|err| CatalogError::SourceEnumeration(format!("{dir}: {err}")))?;
        for entry in entries {
            let entry =
                entry.map_err(|err| CatalogError::SourceEnumeration(format!("{dir}: {err}")))?;
            let path = Utf8PathBuf::from_path_buf(entry.path()).map_err(|path| {
                CatalogError::SourceEnumeration(format!("non-utf8 path {}", path.display()))
            })?;
            if path.is_dir() {
                stack.push(path);
            } else if path.extension() == Some(RECORD_EXTENSION) {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}
