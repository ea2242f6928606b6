use std::fmt;
use std::path::PathBuf;

use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CatalogError {
    #[error("invalid resource id: {0}")]
    InvalidResourceId(String),

    #[error("invalid resource type: {0}")]
    InvalidResourceType(String),

    #[error("invalid resource path (expected <type>/<id>): {0}")]
    InvalidResourcePath(String),

    #[error("missing config file catalog.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cannot enumerate resource records under {0}")]
    SourceEnumeration(String),

    #[error("failed to load schema: {0}")]
    SchemaLoad(String),

    #[error("failed to parse record: {0}")]
    RecordParse(String),

    #[error("unsupported record schema version {found} (supported: {supported})")]
    UnsupportedSchemaVersion { found: u64, supported: u32 },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("download probe failed: {0}")]
    ProbeHttp(String),

    #[error("download probe returned status {status}: {message}")]
    ProbeStatus { status: u16, message: String },

    #[error("registry request failed: {0}")]
    RegistryHttp(String),

    #[error("registry returned status {status}: {message}")]
    RegistryStatus { status: u16, message: String },

    #[error("registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("unexpected registry response: {0}")]
    RegistryResponse(String),

    #[error("missing registry credentials for {0}")]
    MissingCredentials(String),
}

impl CatalogError {
    pub fn is_registry_unavailable(&self) -> bool {
        matches!(
            self,
            CatalogError::RegistryUnavailable(_) | CatalogError::MissingCredentials(_)
        )
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            CatalogError::RegistryStatus { status, .. } => {
                matches!(status, 429 | 500 | 502 | 503 | 504)
            }
            CatalogError::RegistryUnavailable(_) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    LoadError,
    ValidationError,
    DanglingReference,
    ProbeFailure,
    RegistryCallFailure,
    WriteBackFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl IssueKind {
    pub fn severity(self) -> Severity {
        match self {
            IssueKind::DanglingReference | IssueKind::ProbeFailure => Severity::Warning,
            IssueKind::LoadError
            | IssueKind::ValidationError
            | IssueKind::RegistryCallFailure
            | IssueKind::WriteBackFailure => Severity::Error,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IssueKind::LoadError => "load_error",
            IssueKind::ValidationError => "validation_error",
            IssueKind::DanglingReference => "dangling_reference",
            IssueKind::ProbeFailure => "probe_failure",
            IssueKind::RegistryCallFailure => "registry_call_failure",
            IssueKind::WriteBackFailure => "write_back_failure",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordIssue {
    pub kind: IssueKind,
    pub resource: Option<String>,
    pub message: String,
}

impl RecordIssue {
    pub fn new(kind: IssueKind, resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            resource: Some(resource.into()),
            message: message.into(),
        }
    }

    pub fn unattributed(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            resource: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for RecordIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.resource {
            Some(resource) => write!(f, "[{}] {resource}: {}", self.kind.as_str(), self.message),
            None => write!(f, "[{}] {}", self.kind.as_str(), self.message),
        }
    }
}
