use std::sync::LazyLock;

use chrono::{Datelike, Local};
use pulldown_cmark::{Event, Parser, TagEnd};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::config::RegistryConfig;
use crate::domain::{Classification, RelationKind, ResourceId};
use crate::record::ResourceRecord;

pub const ALTERNATE_ID_TYPE: &str = "slug";
pub const LICENSE_OTHER: &str = "LicenseRef-Other";
const LICENSE_SCHEME_URI: &str = "https://spdx.org/licenses/";
const LICENSE_SCHEME: &str = "SPDX";
const ROR_SCHEME_URI: &str = "https://ror.org/";
const LANG_ENG: &str = "en";
const LANG_SWE: &str = "sv";
const LANG_MULTIPLE: &str = "mul";
const EXAMPLE_HEADING_SWE: &str = "Exempel (in English)";
const EXAMPLE_HEADING_ENG: &str = "Example";

static BLANK_LINES: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\n\s*\n").ok());

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DoiDocument<A> {
    pub data: DoiData<A>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DoiData<A> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub attributes: A,
}

impl<A> DoiDocument<A> {
    pub fn new(attributes: A) -> Self {
        Self {
            data: DoiData {
                kind: "dois",
                attributes,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoiAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    pub url: String,
    pub creators: Vec<Creator>,
    pub titles: Vec<Title>,
    pub publisher: Publisher,
    pub publication_year: String,
    pub subjects: Vec<Subject>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dates: Vec<DateEntry>,
    pub language: String,
    pub types: Types,
    pub alternate_identifiers: Vec<AlternateIdentifier>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sizes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rights_list: Vec<Rights>,
    pub descriptions: Vec<Description>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Creator {
    pub name: String,
    pub name_type: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub name_identifiers: Vec<NameIdentifier>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NameIdentifier {
    #[serde(rename = "schemeURI")]
    pub scheme_uri: String,
    pub name_identifier: String,
    pub name_identifier_scheme: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Title {
    pub lang: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Publisher {
    pub name: String,
    pub publisher_identifier: String,
    pub publisher_identifier_scheme: String,
    #[serde(rename = "schemeURI")]
    pub scheme_uri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub subject: String,
    pub subject_scheme: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification_code: Option<String>,
    #[serde(rename = "schemeURI", skip_serializing_if = "Option::is_none")]
    pub scheme_uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateEntry {
    pub date: String,
    pub date_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Types {
    pub resource_type: String,
    pub resource_type_general: Classification,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlternateIdentifier {
    pub alternate_identifier_type: String,
    pub alternate_identifier: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rights {
    pub rights: String,
    pub lang: String,
    #[serde(rename = "schemeURI")]
    pub scheme_uri: String,
    pub rights_identifier_scheme: String,
    pub rights_identifier: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Description {
    pub lang: String,
    pub description: String,
    pub description_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedIdentifier {
    pub related_identifier_type: String,
    pub relation_type: RelationKind,
    pub resource_type_general: Classification,
    pub related_identifier: String,
}

impl RelatedIdentifier {
    pub fn doi(relation: RelationKind, classification: Classification, doi: &str) -> Self {
        Self {
            related_identifier_type: "DOI".to_string(),
            relation_type: relation,
            resource_type_general: classification,
            related_identifier: doi.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationAttributes {
    pub related_identifiers: Vec<RelatedIdentifier>,
}

/// Dates that end up in the payload: the record's own dates take precedence
/// over what the registry already stores.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayloadDates {
    pub created: Option<String>,
    pub updated: Option<String>,
    pub registry_publication_year: Option<String>,
}

pub struct PayloadBuilder<'a> {
    config: &'a RegistryConfig,
}

impl<'a> PayloadBuilder<'a> {
    pub fn new(config: &'a RegistryConfig) -> Self {
        Self { config }
    }

    pub fn target_url(&self, id: &ResourceId, record: &ResourceRecord) -> String {
        let prefix = if record.resource_type.is_dataset() {
            &self.config.dataset_target_prefix
        } else {
            &self.config.workflow_target_prefix
        };
        format!("{prefix}{id}")
    }

    pub fn create(&self, id: &ResourceId, record: &ResourceRecord) -> DoiAttributes {
        let dates = PayloadDates {
            created: record.created_at.clone(),
            updated: record.updated_at.clone(),
            registry_publication_year: None,
        };
        let mut attributes = self.attributes(id, record, &dates);
        attributes.event = Some("publish".to_string());
        attributes.prefix = Some(self.config.prefix.clone());
        attributes
    }

    pub fn attributes(
        &self,
        id: &ResourceId,
        record: &ResourceRecord,
        dates: &PayloadDates,
    ) -> DoiAttributes {
        let is_dataset = record.resource_type.is_dataset();

        let publication_year = dates
            .created
            .as_deref()
            .and_then(|created| created.get(..4))
            .map(str::to_string)
            .or_else(|| dates.registry_publication_year.clone())
            .unwrap_or_else(|| Local::now().year().to_string());

        let mut date_entries = Vec::new();
        if let Some(created) = &dates.created {
            date_entries.push(DateEntry {
                date: created.clone(),
                date_type: "Created".to_string(),
            });
        }
        if let Some(updated) = &dates.updated {
            date_entries.push(DateEntry {
                date: updated.clone(),
                date_type: "Updated".to_string(),
            });
        }

        let sizes = if is_dataset && !record.size_metrics.is_empty() {
            vec![
                record
                    .size_metrics
                    .iter()
                    .map(|(key, value)| format!("{key}: {value}"))
                    .collect::<Vec<_>>()
                    .join(". "),
            ]
        } else {
            Vec::new()
        };

        DoiAttributes {
            event: None,
            prefix: None,
            url: self.target_url(id, record),
            creators: self.creators(record),
            titles: vec![
                Title {
                    lang: LANG_SWE.to_string(),
                    title: lang_value(&record.name, "swe").unwrap_or(id.as_str()).to_string(),
                },
                Title {
                    lang: LANG_ENG.to_string(),
                    title: lang_value(&record.name, "eng").unwrap_or(id.as_str()).to_string(),
                },
            ],
            publisher: Publisher {
                name: self.config.publisher_name.clone(),
                publisher_identifier: self.config.publisher_ror.clone(),
                publisher_identifier_scheme: "ROR".to_string(),
                scheme_uri: ROR_SCHEME_URI.to_string(),
            },
            publication_year,
            subjects: self.subjects(record),
            dates: date_entries,
            language: language_code(&record.language_codes),
            types: Types {
                resource_type: record.resource_type.as_str().to_string(),
                resource_type_general: Classification::of(
                    record.resource_type,
                    record.is_collection,
                ),
            },
            alternate_identifiers: vec![AlternateIdentifier {
                alternate_identifier_type: ALTERNATE_ID_TYPE.to_string(),
                alternate_identifier: id.as_str().to_string(),
            }],
            sizes,
            rights_list: rights_list(record),
            descriptions: descriptions(record),
        }
    }

    fn creators(&self, record: &ResourceRecord) -> Vec<Creator> {
        let people = record.extra_strings("creators");
        if !people.is_empty() {
            return people
                .into_iter()
                .map(|name| Creator {
                    name,
                    name_type: "Personal".to_string(),
                    name_identifiers: Vec::new(),
                })
                .collect();
        }
        vec![Creator {
            name: self.config.publisher_name.clone(),
            name_type: "Organizational".to_string(),
            name_identifiers: vec![NameIdentifier {
                scheme_uri: ROR_SCHEME_URI.to_string(),
                name_identifier: self.config.publisher_ror.clone(),
                name_identifier_scheme: "ROR".to_string(),
            }],
        }]
    }

    fn subjects(&self, record: &ResourceRecord) -> Vec<Subject> {
        let mut subjects = vec![Subject {
            subject: "Language Technology (Computational Linguistics)".to_string(),
            subject_scheme: "Standard för svensk indelning av forskningsämnen 2011".to_string(),
            classification_code: Some("10208".to_string()),
            scheme_uri: Some(
                "https://www.scb.se/dokumentation/klassifikationer-och-standarder/standard-for-svensk-indelning-av-forskningsamnen"
                    .to_string(),
            ),
        }];
        subjects.extend(record.extra_strings("keywords").into_iter().map(|keyword| Subject {
            subject: keyword,
            subject_scheme: "keyword".to_string(),
            classification_code: None,
            scheme_uri: None,
        }));
        subjects
    }
}

fn lang_value<'r>(map: &'r crate::record::LangMap, lang: &str) -> Option<&'r str> {
    map.get(lang)
        .map(String::as_str)
        .filter(|value| !value.trim().is_empty())
}

pub fn language_code(codes: &[String]) -> String {
    match codes {
        [] => String::new(),
        [single] => single.clone(),
        _ => LANG_MULTIPLE.to_string(),
    }
}

fn license_rights(license: &str, license_other: Option<&str>) -> Rights {
    let text = if license == LICENSE_OTHER {
        license_other.unwrap_or_default()
    } else {
        license
    };
    Rights {
        rights: text.to_string(),
        lang: LANG_ENG.to_string(),
        scheme_uri: LICENSE_SCHEME_URI.to_string(),
        rights_identifier_scheme: LICENSE_SCHEME.to_string(),
        rights_identifier: license.to_string(),
    }
}

fn license_of(item: &Value) -> Option<Rights> {
    let license = item.get("license")?.as_str()?;
    Some(license_rights(
        license,
        item.get("license_other").and_then(Value::as_str),
    ))
}

/// Datasets take their rights from the downloads; workflows from their own
/// license plus the licenses of the tools and models they use.
pub fn rights_list(record: &ResourceRecord) -> Vec<Rights> {
    if record.resource_type.is_dataset() {
        return record
            .downloads
            .iter()
            .filter_map(|download| {
                let license = download.license.as_deref()?;
                Some(license_rights(license, download.license_other.as_deref()))
            })
            .collect();
    }

    let mut rights = Vec::new();
    if let Some(license) = record.extra_str("license") {
        rights.push(license_rights(license, record.extra_str("license_other")));
    }
    for key in ["tools", "models"] {
        if let Some(items) = record.extra.get(key).and_then(Value::as_array) {
            rights.extend(items.iter().filter_map(license_of));
        }
    }
    rights
}

pub fn descriptions(record: &ResourceRecord) -> Vec<Description> {
    let is_dataset = record.resource_type.is_dataset();
    let long_swe = lang_value(&record.long_description, "swe");
    let long_eng = lang_value(&record.long_description, "eng");
    let example = record.extra_str("example").map(clean_markdown);

    let swedish = long_swe
        .or(long_eng)
        .or_else(|| lang_value(&record.short_description, "swe"));
    let english = long_eng.or_else(|| lang_value(&record.short_description, "eng"));

    let mut descriptions = Vec::new();
    for (lang, text, heading) in [
        (LANG_SWE, swedish, EXAMPLE_HEADING_SWE),
        (LANG_ENG, english, EXAMPLE_HEADING_ENG),
    ] {
        let Some(text) = text else {
            continue;
        };
        let mut description = clean_markdown(text);
        if !is_dataset {
            description.push('\n');
            description.push_str(heading);
            description.push('\n');
            description.push_str(example.as_deref().unwrap_or_default());
        }
        descriptions.push(Description {
            lang: lang.to_string(),
            description: description.trim().to_string(),
            description_type: "Abstract".to_string(),
        });
    }
    descriptions
}

pub fn clean_markdown(markdown: &str) -> String {
    let mut text = String::new();
    for event in Parser::new(markdown) {
        match event {
            Event::Text(value) | Event::Code(value) => text.push_str(&value),
            Event::SoftBreak | Event::HardBreak => text.push('\n'),
            Event::End(TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::CodeBlock) => {
                text.push_str("\n\n");
            }
            Event::End(TagEnd::Item) => text.push('\n'),
            _ => {}
        }
    }
    let text = match BLANK_LINES.as_ref() {
        Some(blank_lines) => blank_lines.replace_all(&text, "\n\n").into_owned(),
        None => text,
    };
    text.trim().to_string()
}
