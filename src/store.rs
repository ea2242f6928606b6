use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use serde_json::Value;
use tempfile::Builder;
use tracing::{debug, error, info, warn};

use crate::domain::{ResourceId, ResourceType};
use crate::error::CatalogError;
use crate::normalize::{CatalogEntry, NormalizedCatalog};
use crate::record::LangMap;

pub const RESOURCE_TEXTS_FILE: &str = "resource-texts.json";
pub const COLLECTION_FILE: &str = "collection.json";

#[derive(Debug, Clone, Default, Serialize)]
pub struct WriteSummary {
    pub written: Vec<String>,
    pub failed: Vec<FailedArtifact>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedArtifact {
    pub artifact: String,
    pub message: String,
}

impl WriteSummary {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    fn record(&mut self, artifact: String, result: Result<(), CatalogError>) {
        match result {
            Ok(()) => self.written.push(artifact),
            Err(err) => {
                error!(artifact = %artifact, "failed to write artifact: {err}");
                self.failed.push(FailedArtifact {
                    artifact,
                    message: err.to_string(),
                });
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub entries: BTreeMap<ResourceId, Value>,
    pub texts: BTreeMap<ResourceId, Value>,
}

#[derive(Debug, Clone)]
pub struct DatasetStore {
    root: Utf8PathBuf,
}

impl DatasetStore {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn artifact_path(&self, name: &str) -> Utf8PathBuf {
        self.root.join(name)
    }

    pub fn write_catalog(
        &self,
        catalog: &NormalizedCatalog,
        resource_types: &[ResourceType],
    ) -> WriteSummary {
        let mut summary = WriteSummary::default();

        let texts: BTreeMap<&ResourceId, &LangMap> = catalog.texts.iter().collect();
        summary.record(
            RESOURCE_TEXTS_FILE.to_string(),
            self.write_json_atomic(RESOURCE_TEXTS_FILE, &texts),
        );

        for resource_type in resource_types {
            let name = resource_type.artifact_name();
            let entries: BTreeMap<&ResourceId, &CatalogEntry> = catalog
                .entries
                .iter()
                .filter(|(_, entry)| entry.record.resource_type == *resource_type)
                .collect();
            let result = self.write_json_atomic(&name, &entries);
            summary.record(name, result);
        }

        summary.record(
            COLLECTION_FILE.to_string(),
            self.write_json_atomic(COLLECTION_FILE, &catalog.collections()),
        );

        info!(
            written = summary.written.len(),
            failed = summary.failed.len(),
            root = %self.root,
            "dataset written"
        );
        summary
    }

    /// Serialize into a temporary file next to the target, then rename it into
    /// place. The target is never truncated: on any failure the previous
    /// artifact stays as it was.
    pub fn write_json_atomic<T: Serialize + ?Sized>(
        &self,
        name: &str,
        value: &T,
    ) -> Result<(), CatalogError> {
        let path = self.artifact_path(name);
        let parent = path
            .parent()
            .ok_or_else(|| CatalogError::Filesystem(format!("invalid artifact path {path}")))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| CatalogError::Filesystem(err.to_string()))?;

        let temp = Builder::new()
            .prefix(&format!(".{name}"))
            .suffix(".new")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| CatalogError::Filesystem(err.to_string()))?;

        {
            let mut writer = BufWriter::new(temp.as_file());
            serde_json::to_writer_pretty(&mut writer, value)
                .map_err(|err| CatalogError::Serialization(format!("{name}: {err}")))?;
            writer
                .write_all(b"\n")
                .and_then(|_| writer.flush())
                .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        }
        temp.as_file()
            .sync_all()
            .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        debug!(path = %path, "artifact replaced");
        Ok(())
    }

    pub fn read_dataset(&self) -> Dataset {
        let mut dataset = Dataset::default();
        for resource_type in ResourceType::ALL {
            dataset
                .entries
                .extend(self.read_artifact_or_skip(&resource_type.artifact_name()));
        }
        dataset.texts = self.read_artifact_or_skip(RESOURCE_TEXTS_FILE);
        dataset
    }

    fn read_artifact_or_skip(&self, name: &str) -> BTreeMap<ResourceId, Value> {
        self.read_artifact(name).unwrap_or_else(|err| {
            warn!(artifact = name, "ignoring previous artifact: {err}");
            BTreeMap::new()
        })
    }

    fn read_artifact(&self, name: &str) -> Result<BTreeMap<ResourceId, Value>, CatalogError> {
        let path = self.artifact_path(name);
        if !path.as_std_path().is_file() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| CatalogError::Filesystem(format!("read {path}: {err}")))?;
        serde_json::from_str(&content)
            .map_err(|err| CatalogError::Serialization(format!("{path}: {err}")))
    }
}
