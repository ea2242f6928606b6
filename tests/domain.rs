use assert_matches::assert_matches;

use resource_catalog::domain::{Classification, RelationKind, ResourcePath, ResourceType};
use resource_catalog::error::CatalogError;

#[test]
fn parse_resource_path() {
    let path: ResourcePath = "lexicon/saldo".parse().unwrap();
    assert_eq!(path.resource_type, ResourceType::Lexicon);
    assert_eq!(path.id.as_str(), "saldo");
    assert_eq!(path.relative_file().as_str(), "lexicon/saldo.yaml");
    assert_eq!(path.to_string(), "lexicon/saldo");
}

#[test]
fn parse_resource_path_with_extension() {
    let path: ResourcePath = "corpus/attasidor.yaml".parse().unwrap();
    assert_eq!(path.id.as_str(), "attasidor");
}

#[test]
fn parse_resource_path_invalid() {
    assert_matches!(
        "saldo".parse::<ResourcePath>(),
        Err(CatalogError::InvalidResourcePath(_))
    );
    assert_matches!(
        "dictionary/saldo".parse::<ResourcePath>(),
        Err(CatalogError::InvalidResourcePath(_))
    );
    assert_matches!(
        "lexicon/a/b".parse::<ResourcePath>(),
        Err(CatalogError::InvalidResourcePath(_))
    );
    assert_matches!(
        "lexicon/Saldo".parse::<ResourcePath>(),
        Err(CatalogError::InvalidResourceId(_))
    );
}

#[test]
fn inverse_is_an_involution() {
    for kind in RelationKind::ALL {
        assert_ne!(kind.inverse(), kind);
        assert_eq!(kind.inverse().inverse(), kind);
    }
    assert_eq!(RelationKind::HasPart.inverse(), RelationKind::IsPartOf);
    assert_eq!(RelationKind::Obsoletes.inverse(), RelationKind::IsObsoletedBy);
}

#[test]
fn resource_type_grouping() {
    let datasets: Vec<_> = ResourceType::ALL
        .into_iter()
        .filter(|kind| kind.is_dataset())
        .collect();
    assert_eq!(
        datasets,
        vec![ResourceType::Corpus, ResourceType::Lexicon, ResourceType::Model]
    );
    assert_eq!(ResourceType::Analysis.artifact_name(), "analysis.json");
    assert_eq!(
        Classification::of(ResourceType::Corpus, true).as_str(),
        "Collection"
    );
}
