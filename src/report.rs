use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{IssueKind, RecordIssue, Severity};

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub errors: Vec<RecordIssue>,
    pub warnings: Vec<RecordIssue>,
    pub counts: BTreeMap<IssueKind, usize>,
}

impl RunReport {
    pub fn push(&mut self, issue: RecordIssue) {
        *self.counts.entry(issue.kind).or_default() += 1;
        match issue.kind.severity() {
            Severity::Error => self.errors.push(issue),
            Severity::Warning => self.warnings.push(issue),
        }
    }

    pub fn extend<I: IntoIterator<Item = RecordIssue>>(&mut self, issues: I) {
        for issue in issues {
            self.push(issue);
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn count(&self, kind: IssueKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn issues_for<'a>(&'a self, resource: &'a str) -> impl Iterator<Item = &'a RecordIssue> {
        self.errors
            .iter()
            .chain(&self.warnings)
            .filter(move |issue| issue.resource.as_deref() == Some(resource))
    }
}
