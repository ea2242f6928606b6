use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::thread;
use std::time::Duration;

use camino::Utf8Path;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::RegistryConfig;
use crate::domain::{Classification, RelationKind, ResourceId};
use crate::error::{CatalogError, IssueKind, RecordIssue};
use crate::graph::RelationGraph;
use crate::loader::LoadedRecord;
use crate::payload::{PayloadBuilder, PayloadDates, RelatedIdentifier};
use crate::registry::RegistryClient;
use crate::report::RunReport;

pub const IDENTIFIER_KEY: &str = "doi";

const MAX_RETRIES: u32 = 3;
const BASE_RETRY_DELAY_MS: u64 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    pub dry_run: bool,
    pub no_update: bool,
    pub include_analyses: bool,
    pub force_update: bool,
    /// Treat a record without an `updated` date as newer than the registry.
    pub update_when_undated: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            no_update: false,
            include_analyses: false,
            force_update: false,
            update_when_undated: true,
        }
    }
}

/// Call budget of one run. Counts every outbound request, retries included;
/// once the budget is spent the next request waits out the cooldown first.
#[derive(Debug, Clone)]
pub struct SyncContext {
    budget: u32,
    cooldown: Duration,
    retry_delay: Duration,
    window_calls: u32,
    total_calls: u32,
    cooldowns: u32,
}

impl SyncContext {
    pub fn new(budget: u32, cooldown: Duration) -> Self {
        Self {
            budget: budget.max(1),
            cooldown,
            retry_delay: Duration::from_millis(BASE_RETRY_DELAY_MS),
            window_calls: 0,
            total_calls: 0,
            cooldowns: 0,
        }
    }

    pub fn from_config(config: &RegistryConfig) -> Self {
        Self::new(config.call_budget, config.cooldown())
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    fn before_call(&mut self) {
        if self.window_calls >= self.budget {
            info!(
                calls = self.window_calls,
                cooldown_secs = self.cooldown.as_secs(),
                "registry call budget spent, cooling down"
            );
            thread::sleep(self.cooldown);
            self.window_calls = 0;
            self.cooldowns += 1;
        }
        self.window_calls += 1;
        self.total_calls += 1;
    }

    pub fn total_calls(&self) -> u32 {
        self.total_calls
    }

    pub fn cooldowns(&self) -> u32 {
        self.cooldowns
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignAction {
    Found,
    Created,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignedId {
    pub resource: ResourceId,
    pub doi: String,
    pub action: AssignAction,
    pub written_back: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncResult {
    pub dry_run: bool,
    pub assigned: Vec<AssignedId>,
    pub updated: Vec<ResourceId>,
    pub skipped: Vec<ResourceId>,
    pub relations_pushed: Vec<ResourceId>,
    pub calls: u32,
    pub cooldowns: u32,
    pub report: RunReport,
}

pub struct PidSynchronizer<'a, R: RegistryClient> {
    registry: &'a R,
    payloads: PayloadBuilder<'a>,
    options: SyncOptions,
    context: SyncContext,
}

impl<'a, R: RegistryClient> PidSynchronizer<'a, R> {
    pub fn new(
        registry: &'a R,
        config: &'a RegistryConfig,
        options: SyncOptions,
        context: SyncContext,
    ) -> Self {
        Self {
            registry,
            payloads: PayloadBuilder::new(config),
            options,
            context,
        }
    }

    fn call<T>(
        &mut self,
        mut request: impl FnMut(&R) -> Result<T, CatalogError>,
    ) -> Result<T, CatalogError> {
        let mut attempt = 0;
        loop {
            self.context.before_call();
            match request(self.registry) {
                Err(err) if attempt < MAX_RETRIES && err.is_retryable() => {
                    attempt += 1;
                    warn!(attempt, "registry call failed, retrying: {err}");
                    thread::sleep(self.context.retry_delay * attempt);
                }
                outcome => return outcome,
            }
        }
    }

    fn is_eligible(&self, loaded: &LoadedRecord) -> bool {
        self.options.include_analyses || loaded.record.resource_type.is_dataset()
    }

    pub fn run(
        mut self,
        records: &BTreeMap<ResourceId, LoadedRecord>,
        graph: &RelationGraph,
        scope: Option<&BTreeSet<ResourceId>>,
    ) -> Result<SyncResult, CatalogError> {
        let mut result = SyncResult {
            dry_run: self.options.dry_run,
            ..SyncResult::default()
        };

        self.call(|registry| registry.check_available())?;

        let mut dois: BTreeMap<ResourceId, String> = records
            .iter()
            .filter_map(|(id, loaded)| {
                let doi = loaded.record.external_id.as_ref()?;
                Some((id.clone(), doi.clone()))
            })
            .collect();

        let mut eligible: Vec<&LoadedRecord> = records
            .values()
            .filter(|loaded| self.is_eligible(loaded))
            .collect();
        eligible.sort_by(|a, b| a.path.cmp(&b.path));

        info!(
            eligible = eligible.len(),
            dry_run = self.options.dry_run,
            "assigning identifiers"
        );
        for &loaded in &eligible {
            let id = &loaded.id;
            if scope.is_some_and(|scope| !scope.contains(id)) {
                continue;
            }
            let outcome = match &loaded.record.external_id {
                None => self.assign(loaded, &mut result).map(|doi| {
                    if let Some(doi) = doi {
                        dois.insert(id.clone(), doi);
                    }
                }),
                Some(doi) if !self.options.no_update => self.refresh(loaded, doi, &mut result),
                Some(_) => Ok(()),
            };
            if let Err(err) = outcome {
                if err.is_registry_unavailable() {
                    error!(resource = %id, "registry unavailable, aborting: {err}");
                    return Err(err);
                }
                record_failure(&mut result.report, IssueKind::RegistryCallFailure, id, &err);
            }
        }

        if !self.options.no_update {
            let touched = match scope {
                // scoped records that lost every relation still need an empty push
                Some(scope) => {
                    let mut touched = graph.touched_by(scope);
                    touched.extend(scope.iter().cloned());
                    touched
                }
                None => graph.nodes().cloned().collect(),
            };
            let pushes: Vec<&LoadedRecord> = eligible
                .iter()
                .copied()
                .filter(|loaded| touched.contains(&loaded.id))
                .collect();
            info!(touched = pushes.len(), "pushing related identifiers");
            for loaded in pushes {
                let id = &loaded.id;
                if let Err(err) = self.push_relations(id, records, graph, &dois, &mut result) {
                    if err.is_registry_unavailable() {
                        error!(resource = %id, "registry unavailable, aborting: {err}");
                        return Err(err);
                    }
                    record_failure(&mut result.report, IssueKind::RegistryCallFailure, id, &err);
                }
            }
        }

        result.calls = self.context.total_calls();
        result.cooldowns = self.context.cooldowns();
        Ok(result)
    }

    fn assign(
        &mut self,
        loaded: &LoadedRecord,
        result: &mut SyncResult,
    ) -> Result<Option<String>, CatalogError> {
        let id = &loaded.id;
        let (doi, action) = match self.call(|registry| registry.find_by_alternate_id(id))? {
            Some(doi) => (doi, AssignAction::Found),
            None if self.options.dry_run => {
                info!(resource = %id, "dry run, not creating identifier");
                return Ok(None);
            }
            None => {
                let attributes = self.payloads.create(id, &loaded.record);
                let doi = self.call(|registry| registry.create(&attributes))?;
                (doi, AssignAction::Created)
            }
        };
        info!(resource = %id, doi = %doi, action = ?action, "identifier assigned");

        let mut written_back = false;
        if !self.options.dry_run {
            match append_identifier(&loaded.path, &doi) {
                Ok(()) => written_back = true,
                Err(err) => {
                    record_failure(&mut result.report, IssueKind::WriteBackFailure, id, &err)
                }
            }
        }
        result.assigned.push(AssignedId {
            resource: id.clone(),
            doi: doi.clone(),
            action,
            written_back,
        });
        Ok(Some(doi))
    }

    fn refresh(
        &mut self,
        loaded: &LoadedRecord,
        doi: &str,
        result: &mut SyncResult,
    ) -> Result<(), CatalogError> {
        let id = &loaded.id;
        let record = &loaded.record;
        let stored = self.call(|registry| registry.fetch_dates(doi))?;

        let stale = self.options.force_update
            || match record.updated_at.as_deref() {
                None => self.options.update_when_undated,
                Some(source) => stored.updated.as_deref().unwrap_or_default() < source,
            };
        if !stale {
            debug!(resource = %id, "registry copy is current");
            result.skipped.push(id.clone());
            return Ok(());
        }

        let dates = PayloadDates {
            created: record.created_at.clone().or(stored.created),
            updated: record.updated_at.clone().or(stored.updated),
            registry_publication_year: stored.publication_year,
        };
        let attributes = self.payloads.attributes(id, record, &dates);
        if self.options.dry_run {
            info!(resource = %id, doi, "dry run, not updating registry record");
        } else {
            self.call(|registry| registry.update(doi, &attributes))?;
            info!(resource = %id, doi, "registry record updated");
        }
        result.updated.push(id.clone());
        Ok(())
    }

    fn push_relations(
        &mut self,
        id: &ResourceId,
        records: &BTreeMap<ResourceId, LoadedRecord>,
        graph: &RelationGraph,
        dois: &BTreeMap<ResourceId, String>,
        result: &mut SyncResult,
    ) -> Result<(), CatalogError> {
        let Some(doi) = dois.get(id) else {
            debug!(resource = %id, "no identifier yet, skipping relations");
            return Ok(());
        };

        let mut related = Vec::new();
        for kind in RelationKind::ALL {
            for target in graph.related(id, kind) {
                let (Some(target_doi), Some(target)) = (dois.get(target), records.get(target))
                else {
                    warn!(resource = %id, related = %target, "related resource has no identifier");
                    continue;
                };
                let classification =
                    Classification::of(target.record.resource_type, target.record.is_collection);
                related.push(RelatedIdentifier::doi(kind, classification, target_doi));
            }
        }

        if self.options.dry_run {
            info!(resource = %id, count = related.len(), "dry run, not pushing relations");
        } else {
            self.call(|registry| registry.replace_related(doi, &related))?;
            debug!(resource = %id, count = related.len(), "relations replaced");
        }
        result.relations_pushed.push(id.clone());
        Ok(())
    }
}

fn record_failure(report: &mut RunReport, kind: IssueKind, id: &ResourceId, err: &CatalogError) {
    error!(resource = %id, kind = kind.as_str(), "{err}");
    report.push(RecordIssue::new(kind, id.as_str(), err.to_string()));
}

/// Append `doi: <value>` to a source record, adding the missing line break
/// first when the file does not end with one. Existing content is untouched.
pub fn append_identifier(path: &Utf8Path, doi: &str) -> Result<(), CatalogError> {
    let content = fs::read(path.as_std_path())
        .map_err(|err| CatalogError::Filesystem(format!("read {path}: {err}")))?;
    let separator = match content.last() {
        Some(b'\n') | None => "",
        Some(_) => "\n",
    };
    let mut file = OpenOptions::new()
        .append(true)
        .open(path.as_std_path())
        .map_err(|err| CatalogError::Filesystem(format!("open {path}: {err}")))?;
    file.write_all(format!("{separator}{IDENTIFIER_KEY}: {doi}\n").as_bytes())
        .and_then(|_| file.sync_all())
        .map_err(|err| CatalogError::Filesystem(format!("write {path}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_adds_missing_newline() {
        let temp = tempfile::tempdir().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(temp.path().join("a.yaml")).unwrap();
        fs::write(&path, "type: corpus").unwrap();
        append_identifier(&path, "10.1/a").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "type: corpus\ndoi: 10.1/a\n");

        fs::write(&path, "type: corpus\n").unwrap();
        append_identifier(&path, "10.1/b").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "type: corpus\ndoi: 10.1/b\n");
    }

    #[test]
    fn budget_triggers_cooldown() {
        let mut context = SyncContext::new(2, Duration::ZERO);
        for _ in 0..5 {
            context.before_call();
        }
        assert_eq!(context.total_calls(), 5);
        assert_eq!(context.cooldowns(), 2);
    }
}
