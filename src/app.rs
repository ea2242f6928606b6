use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::info;

use crate::config::ResolvedConfig;
use crate::domain::{ResourceId, ResourcePath, ResourceType};
use crate::error::CatalogError;
use crate::graph::RelationGraph;
use crate::loader::{LoadOutcome, RecordLoader};
use crate::localize::{LanguageNames, Localizations};
use crate::normalize::Normalizer;
use crate::pid::{PidSynchronizer, SyncContext, SyncOptions, SyncResult};
use crate::probe::DownloadProbe;
use crate::registry::RegistryClient;
use crate::report::RunReport;
use crate::schema::SchemaValidator;
use crate::store::{DatasetStore, WriteSummary};

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub offline: bool,
    pub validate: bool,
    pub resource_types: Vec<ResourceType>,
    pub paths: Vec<ResourcePath>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    Full,
    Incremental,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildResult {
    pub mode: BuildMode,
    pub records: usize,
    pub collections: usize,
    pub relations: usize,
    pub changed: Vec<ResourceId>,
    pub removed: Vec<ResourceId>,
    pub unlisted: Vec<ResourceId>,
    pub artifacts: WriteSummary,
    pub report: RunReport,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Clone)]
pub struct App<P: DownloadProbe, R: RegistryClient> {
    config: ResolvedConfig,
    probe: P,
    registry: R,
}

impl<P: DownloadProbe, R: RegistryClient> App<P, R> {
    pub fn new(config: ResolvedConfig, probe: P, registry: R) -> Self {
        Self {
            config,
            probe,
            registry,
        }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn build(
        &self,
        options: BuildOptions,
        sink: &dyn ProgressSink,
    ) -> Result<BuildResult, CatalogError> {
        let started = Instant::now();
        let mut report = RunReport::default();

        let schema = if options.validate {
            Some(SchemaValidator::load(&self.config.schema_file)?)
        } else {
            None
        };
        let loader = RecordLoader::new(self.config.records_dir.clone(), schema);

        sink.event(ProgressEvent {
            message: format!("phase=Load; reading records under {}", loader.root()),
            elapsed: None,
        });
        let LoadOutcome {
            records,
            unlisted,
            issues,
        } = loader.load_all()?;
        report.extend(issues);

        let store = DatasetStore::new(self.config.output_dir.clone());
        let mode = if options.paths.is_empty() {
            BuildMode::Full
        } else {
            BuildMode::Incremental
        };
        let mut changed = Vec::new();
        let mut removed = Vec::new();
        let mut previous = BTreeMap::new();
        if mode == BuildMode::Incremental {
            let subset = loader.load_paths(&options.paths);
            changed = subset.records.keys().cloned().collect();
            removed = subset.removed;
            let changed_ids: BTreeSet<&ResourceId> =
                options.paths.iter().map(|path| &path.id).collect();
            previous = store
                .read_dataset()
                .entries
                .into_iter()
                .filter(|(id, _)| !changed_ids.contains(id) && records.contains_key(id))
                .collect();
            info!(
                changed = changed.len(),
                removed = removed.len(),
                "incremental build"
            );
        }

        sink.event(ProgressEvent {
            message: format!("phase=Graph; relating {} records", records.len()),
            elapsed: Some(started.elapsed()),
        });
        let build = RelationGraph::build(records.iter().map(|(id, loaded)| (id, &loaded.record)));
        report.extend(build.dangling.iter().map(|dangling| dangling.to_issue()));
        let graph = build.graph;

        sink.event(ProgressEvent {
            message: if options.offline {
                "phase=Normalize; offline, skipping download probes".to_string()
            } else {
                "phase=Normalize; probing downloads".to_string()
            },
            elapsed: Some(started.elapsed()),
        });
        let languages = LanguageNames::load(self.config.language_names.as_deref())?;
        let localizations = Localizations::load(&self.config.localizations_dir)?;
        let probe: Option<&dyn DownloadProbe> = if options.offline {
            None
        } else {
            Some(&self.probe)
        };
        let normalizer = Normalizer::new(&languages, &localizations, probe);
        let mut catalog = normalizer.normalize_all(&records, &graph, &previous);
        report.extend(std::mem::take(&mut catalog.issues));

        sink.event(ProgressEvent {
            message: format!("phase=Write; writing dataset to {}", store.root()),
            elapsed: Some(started.elapsed()),
        });
        let resource_types = if options.resource_types.is_empty() {
            ResourceType::ALL.to_vec()
        } else {
            options.resource_types
        };
        let artifacts = store.write_catalog(&catalog, &resource_types);

        sink.event(ProgressEvent {
            message: "phase=Done; build finished".to_string(),
            elapsed: Some(started.elapsed()),
        });
        Ok(BuildResult {
            mode,
            records: catalog.entries.len(),
            collections: graph.collections().len(),
            relations: graph.edge_count(),
            changed,
            removed,
            unlisted,
            artifacts,
            report,
        })
    }

    pub fn sync_pids(
        &self,
        options: SyncOptions,
        paths: &[ResourcePath],
        sink: &dyn ProgressSink,
    ) -> Result<SyncResult, CatalogError> {
        let started = Instant::now();
        let loader = RecordLoader::new(self.config.records_dir.clone(), None);

        sink.event(ProgressEvent {
            message: format!("phase=Load; reading records under {}", loader.root()),
            elapsed: None,
        });
        let outcome = loader.load_all()?;
        let build = RelationGraph::build(
            outcome
                .records
                .iter()
                .map(|(id, loaded)| (id, &loaded.record)),
        );

        let scope: Option<BTreeSet<ResourceId>> = if paths.is_empty() {
            None
        } else {
            Some(paths.iter().map(|path| path.id.clone()).collect())
        };

        sink.event(ProgressEvent {
            message: "phase=Sync; synchronizing identifiers".to_string(),
            elapsed: Some(started.elapsed()),
        });
        let synchronizer = PidSynchronizer::new(
            &self.registry,
            &self.config.registry,
            options,
            SyncContext::from_config(&self.config.registry),
        );
        let mut result = synchronizer.run(&outcome.records, &build.graph, scope.as_ref())?;

        let mut report = RunReport::default();
        report.extend(outcome.issues);
        report.extend(build.dangling.iter().map(|dangling| dangling.to_issue()));
        report.extend(result.report.errors.drain(..));
        report.extend(result.report.warnings.drain(..));
        result.report = report;

        sink.event(ProgressEvent {
            message: format!("phase=Done; {} registry calls", result.calls),
            elapsed: Some(started.elapsed()),
        });
        Ok(result)
    }
}
