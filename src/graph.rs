use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tracing::warn;

use crate::domain::{RelationKind, ResourceId};
use crate::error::{IssueKind, RecordIssue};
use crate::record::ResourceRecord;

pub type Adjacency = BTreeMap<RelationKind, BTreeSet<ResourceId>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DanglingReason {
    Missing,
    NotACollection,
    SelfReference,
    InvalidId,
}

impl fmt::Display for DanglingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DanglingReason::Missing => "missing",
            DanglingReason::NotACollection => "not a collection",
            DanglingReason::SelfReference => "self reference",
            DanglingReason::InvalidId => "invalid id",
        };
        write!(f, "{text}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingReference {
    pub resource: ResourceId,
    pub references: Vec<(RelationKind, String, DanglingReason)>,
}

impl DanglingReference {
    pub fn message(&self) -> String {
        let listed = self
            .references
            .iter()
            .map(|(kind, target, reason)| format!("{target} ({kind}, {reason})"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "'{}' declares relations that cannot be resolved and were removed: {listed}",
            self.resource
        )
    }

    pub fn to_issue(&self) -> RecordIssue {
        RecordIssue::new(
            IssueKind::DanglingReference,
            self.resource.as_str(),
            self.message(),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationGraph {
    edges: BTreeMap<ResourceId, Adjacency>,
}

#[derive(Debug, Clone)]
pub struct GraphBuild {
    pub graph: RelationGraph,
    pub dangling: Vec<DanglingReference>,
}

impl RelationGraph {
    pub fn build<'a, I>(records: I) -> GraphBuild
    where
        I: IntoIterator<Item = (&'a ResourceId, &'a ResourceRecord)>,
    {
        let records: BTreeMap<&ResourceId, &ResourceRecord> = records.into_iter().collect();
        let mut graph = RelationGraph::default();
        let mut dangling = Vec::new();

        for (&id, record) in &records {
            if record.is_collection {
                graph.ensure_bucket(id, RelationKind::HasPart);
            }

            let declared = record
                .members
                .iter()
                .map(|target| (RelationKind::HasPart, target))
                .chain(
                    record
                        .member_of
                        .iter()
                        .map(|target| (RelationKind::IsPartOf, target)),
                )
                .chain(
                    record
                        .successors
                        .iter()
                        .map(|target| (RelationKind::IsObsoletedBy, target)),
                );

            let mut bad = Vec::new();
            for (kind, target) in declared {
                // Only collections may declare members.
                let resolved = if kind == RelationKind::HasPart && !record.is_collection {
                    Err(DanglingReason::NotACollection)
                } else {
                    resolve(&records, id, target, kind == RelationKind::IsPartOf)
                };
                match resolved {
                    Ok(target_id) => graph.add_pair(id, kind, &target_id),
                    Err(reason) => bad.push((kind, target.clone(), reason)),
                }
            }

            if !bad.is_empty() {
                let reference = DanglingReference {
                    resource: id.clone(),
                    references: bad,
                };
                warn!(resource = %id, "{}", reference.message());
                dangling.push(reference);
            }
        }

        GraphBuild { graph, dangling }
    }

    fn ensure_bucket(&mut self, id: &ResourceId, kind: RelationKind) {
        self.edges
            .entry(id.clone())
            .or_default()
            .entry(kind)
            .or_default();
    }

    fn add_pair(&mut self, source: &ResourceId, kind: RelationKind, target: &ResourceId) {
        self.edges
            .entry(source.clone())
            .or_default()
            .entry(kind)
            .or_default()
            .insert(target.clone());
        self.edges
            .entry(target.clone())
            .or_default()
            .entry(kind.inverse())
            .or_default()
            .insert(source.clone());
    }

    pub fn related(&self, id: &ResourceId, kind: RelationKind) -> Vec<&ResourceId> {
        self.edges
            .get(id)
            .and_then(|adjacency| adjacency.get(&kind))
            .map(|targets| targets.iter().collect())
            .unwrap_or_default()
    }

    pub fn members(&self, id: &ResourceId) -> Vec<&ResourceId> {
        self.related(id, RelationKind::HasPart)
    }

    pub fn member_of(&self, id: &ResourceId) -> Vec<&ResourceId> {
        self.related(id, RelationKind::IsPartOf)
    }

    pub fn obsoletes(&self, id: &ResourceId) -> Vec<&ResourceId> {
        self.related(id, RelationKind::Obsoletes)
    }

    pub fn obsoleted_by(&self, id: &ResourceId) -> Vec<&ResourceId> {
        self.related(id, RelationKind::IsObsoletedBy)
    }

    pub fn edges_of(&self, id: &ResourceId) -> Option<&Adjacency> {
        self.edges.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ResourceId> {
        self.edges.keys()
    }

    pub fn collections(&self) -> Vec<&ResourceId> {
        self.edges
            .iter()
            .filter(|(_, adjacency)| adjacency.contains_key(&RelationKind::HasPart))
            .map(|(id, _)| id)
            .collect()
    }

    /// The given ids plus every resource directly related to one of them;
    /// limited to resources present in the graph.
    pub fn touched_by<'a, I>(&self, ids: I) -> BTreeSet<ResourceId>
    where
        I: IntoIterator<Item = &'a ResourceId>,
    {
        let mut touched = BTreeSet::new();
        for id in ids {
            let Some(adjacency) = self.edges.get(id) else {
                continue;
            };
            touched.insert(id.clone());
            for targets in adjacency.values() {
                touched.extend(targets.iter().cloned());
            }
        }
        touched
    }

    pub fn edge_count(&self) -> usize {
        self.edges
            .values()
            .flat_map(|adjacency| adjacency.values())
            .map(BTreeSet::len)
            .sum()
    }
}

fn resolve(
    records: &BTreeMap<&ResourceId, &ResourceRecord>,
    source: &ResourceId,
    target: &str,
    must_be_collection: bool,
) -> Result<ResourceId, DanglingReason> {
    let target_id: ResourceId = target.parse().map_err(|_| DanglingReason::InvalidId)?;
    if &target_id == source {
        return Err(DanglingReason::SelfReference);
    }
    match records.get(&target_id) {
        None => Err(DanglingReason::Missing),
        Some(other) if must_be_collection && !other.is_collection => {
            Err(DanglingReason::NotACollection)
        }
        Some(_) => Ok(target_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    fn records(docs: &[(&str, &str)]) -> BTreeMap<ResourceId, ResourceRecord> {
        docs.iter()
            .map(|(id, yaml)| (id.parse().unwrap(), record::from_yaml(yaml).unwrap()))
            .collect()
    }

    #[test]
    fn graph_is_closed_under_inverse() {
        let records = records(&[
            ("coll", "type: corpus\ncollection: true\nresources: [a, b]\n"),
            ("a", "type: corpus\nsuccessors: [b]\n"),
            ("b", "type: corpus\nin_collections: [coll]\n"),
        ]);
        let build = RelationGraph::build(&records);
        assert!(build.dangling.is_empty());
        let graph = build.graph;
        for source in graph.nodes() {
            for (kind, targets) in graph.edges_of(source).unwrap() {
                for target in targets {
                    assert!(
                        graph.related(target, kind.inverse()).contains(&source),
                        "{source} {kind} {target} has no inverse"
                    );
                }
            }
        }
        assert_eq!(graph.edge_count(), 6);
    }

    #[test]
    fn self_reference_is_pruned() {
        let records = records(&[("a", "type: model\nsuccessors: [a]\n")]);
        let build = RelationGraph::build(&records);
        assert_eq!(build.dangling.len(), 1);
        assert_eq!(build.dangling[0].references[0].2, DanglingReason::SelfReference);
        assert!(build.graph.obsoleted_by(&"a".parse().unwrap()).is_empty());
    }
}
