use std::fmt;
use std::str::FromStr;

use camino::Utf8PathBuf;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId(String);

impl ResourceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ResourceId {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let is_valid = !value.is_empty()
            && value
                .chars()
                .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' || ch == '-');
        if !is_valid {
            return Err(CatalogError::InvalidResourceId(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }
}

impl TryFrom<String> for ResourceId {
    type Error = CatalogError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResourceId> for String {
    fn from(value: ResourceId) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Corpus,
    Lexicon,
    Model,
    Analysis,
    Utility,
}

impl ResourceType {
    pub const ALL: [ResourceType; 5] = [
        ResourceType::Corpus,
        ResourceType::Lexicon,
        ResourceType::Model,
        ResourceType::Analysis,
        ResourceType::Utility,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Corpus => "corpus",
            ResourceType::Lexicon => "lexicon",
            ResourceType::Model => "model",
            ResourceType::Analysis => "analysis",
            ResourceType::Utility => "utility",
        }
    }

    pub fn is_dataset(self) -> bool {
        !matches!(self, ResourceType::Analysis | ResourceType::Utility)
    }

    pub fn artifact_name(self) -> String {
        format!("{}.json", self.as_str())
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "corpus" => Ok(ResourceType::Corpus),
            "lexicon" => Ok(ResourceType::Lexicon),
            "model" => Ok(ResourceType::Model),
            "analysis" => Ok(ResourceType::Analysis),
            "utility" => Ok(ResourceType::Utility),
            _ => Err(CatalogError::InvalidResourceType(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    HasPart,
    IsPartOf,
    Obsoletes,
    IsObsoletedBy,
}

impl RelationKind {
    pub const ALL: [RelationKind; 4] = [
        RelationKind::HasPart,
        RelationKind::IsPartOf,
        RelationKind::Obsoletes,
        RelationKind::IsObsoletedBy,
    ];

    pub fn inverse(self) -> RelationKind {
        match self {
            RelationKind::HasPart => RelationKind::IsPartOf,
            RelationKind::IsPartOf => RelationKind::HasPart,
            RelationKind::Obsoletes => RelationKind::IsObsoletedBy,
            RelationKind::IsObsoletedBy => RelationKind::Obsoletes,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RelationKind::HasPart => "HasPart",
            RelationKind::IsPartOf => "IsPartOf",
            RelationKind::Obsoletes => "Obsoletes",
            RelationKind::IsObsoletedBy => "IsObsoletedBy",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    Dataset,
    Workflow,
    Collection,
}

impl Classification {
    pub fn of(resource_type: ResourceType, is_collection: bool) -> Self {
        if is_collection {
            Classification::Collection
        } else if resource_type.is_dataset() {
            Classification::Dataset
        } else {
            Classification::Workflow
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Classification::Dataset => "Dataset",
            Classification::Workflow => "Workflow",
            Classification::Collection => "Collection",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourcePath {
    pub resource_type: ResourceType,
    pub id: ResourceId,
}

impl ResourcePath {
    pub fn relative_file(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(self.resource_type.as_str()).join(format!("{}.yaml", self.id))
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_type, self.id)
    }
}

impl FromStr for ResourcePath {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim().trim_end_matches(".yaml");
        let (kind, rest) = trimmed
            .split_once('/')
            .ok_or_else(|| CatalogError::InvalidResourcePath(value.to_string()))?;
        if rest.contains('/') {
            return Err(CatalogError::InvalidResourcePath(value.to_string()));
        }
        Ok(Self {
            resource_type: kind
                .parse()
                .map_err(|_| CatalogError::InvalidResourcePath(value.to_string()))?,
            id: rest.parse()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_resource_id_valid() {
        let id: ResourceId = "sbx_saldo-2".parse().unwrap();
        assert_eq!(id.as_str(), "sbx_saldo-2");
    }

    #[test]
    fn parse_resource_id_invalid() {
        let err = "Saldo".parse::<ResourceId>().unwrap_err();
        assert_matches!(err, CatalogError::InvalidResourceId(_));
        assert!("".parse::<ResourceId>().is_err());
    }

    #[test]
    fn classification_prefers_collection() {
        assert_eq!(
            Classification::of(ResourceType::Analysis, true),
            Classification::Collection
        );
        assert_eq!(
            Classification::of(ResourceType::Utility, false),
            Classification::Workflow
        );
        assert_eq!(
            Classification::of(ResourceType::Lexicon, false),
            Classification::Dataset
        );
    }
}
