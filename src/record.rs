use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::ResourceType;
use crate::error::CatalogError;

pub const SUPPORTED_SCHEMA_VERSION: u32 = 1;

pub type LangMap = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    #[serde(rename = "collection", default, skip_serializing_if = "is_false")]
    pub is_collection: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub unlisted: bool,
    #[serde(default, skip_serializing_if = "LangMap::is_empty")]
    pub name: LangMap,
    #[serde(default, skip_serializing_if = "LangMap::is_empty")]
    pub short_description: LangMap,
    #[serde(rename = "description", default, skip_serializing_if = "LangMap::is_empty")]
    pub long_description: LangMap,
    #[serde(rename = "size", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub size_metrics: BTreeMap<String, u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub language_codes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<Language>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub downloads: Vec<Download>,
    #[serde(rename = "resources", default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
    #[serde(rename = "in_collections", default, skip_serializing_if = "Vec::is_empty")]
    pub member_of: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub successors: Vec<String>,
    #[serde(rename = "doi", default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(rename = "created", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(rename = "updated", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ResourceRecord {
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn extra_strings(&self, key: &str) -> Vec<String> {
        self.extra
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Language {
    pub code: String,
    #[serde(default, skip_serializing_if = "LangMap::is_empty")]
    pub name: LangMap,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Download {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(rename = "last-modified", default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_other: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Download {
    pub fn needs_probe(&self) -> bool {
        self.url.as_deref().is_some_and(|url| !url.is_empty())
            && self.size.is_none()
            && self.last_modified.is_none()
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

pub fn parse_yaml(content: &str) -> Result<Value, CatalogError> {
    let value: Value =
        serde_yaml::from_str(content).map_err(|err| CatalogError::RecordParse(err.to_string()))?;
    if !value.is_object() {
        return Err(CatalogError::RecordParse(
            "record is not a mapping".to_string(),
        ));
    }
    Ok(value)
}

pub fn migrate(raw: &mut Value) -> Result<(), CatalogError> {
    let Some(map) = raw.as_object_mut() else {
        return Err(CatalogError::RecordParse(
            "record is not a mapping".to_string(),
        ));
    };

    if let Some(version) = map.remove("schema_version") {
        let found = version
            .as_u64()
            .or_else(|| version.as_str().and_then(|value| value.trim().parse().ok()))
            .ok_or_else(|| {
                CatalogError::RecordParse(format!("invalid schema_version: {version}"))
            })?;
        if found > u64::from(SUPPORTED_SCHEMA_VERSION) {
            return Err(CatalogError::UnsupportedSchemaVersion {
                found,
                supported: SUPPORTED_SCHEMA_VERSION,
            });
        }
    }

    // Derived keys are owned by the pipeline, never by the source.
    for key in ["id", "has_description", "obsoletes"] {
        map.remove(key);
    }

    for key in ["resources", "in_collections", "successors", "language_codes"] {
        wrap_scalar_list(map, key);
    }
    for key in ["collection", "unlisted"] {
        coerce_bool(map, key);
    }
    // Blank values count as absent, so `doi: ""` means no identifier yet.
    for key in ["created", "updated", "doi"] {
        coerce_text(map, key);
    }

    if let Some(Value::Object(size)) = map.get_mut("size") {
        for value in size.values_mut() {
            *value = Value::from(coerce_count(value));
        }
    }

    if let Some(Value::Array(downloads)) = map.get_mut("downloads") {
        for download in downloads.iter_mut().filter_map(Value::as_object_mut) {
            if let Some(size) = download.get_mut("size") {
                *size = Value::from(coerce_count(size));
            }
        }
    }

    Ok(())
}

fn coerce_count(value: &Value) -> u64 {
    match value {
        Value::Number(number) => number.as_u64().unwrap_or(0),
        Value::String(text) => text.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn wrap_scalar_list(map: &mut Map<String, Value>, key: &str) {
    match map.get(key) {
        Some(Value::String(single)) => {
            let single = single.clone();
            map.insert(key.to_string(), Value::Array(vec![Value::String(single)]));
        }
        Some(Value::Null) => {
            map.remove(key);
        }
        _ => {}
    }
}

fn coerce_bool(map: &mut Map<String, Value>, key: &str) {
    let replacement = match map.get(key) {
        Some(Value::String(text)) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(Value::Bool(true)),
            "false" | "no" | "" => Some(Value::Bool(false)),
            _ => None,
        },
        Some(Value::Null) => Some(Value::Bool(false)),
        _ => None,
    };
    if let Some(value) = replacement {
        map.insert(key.to_string(), value);
    }
}

fn coerce_text(map: &mut Map<String, Value>, key: &str) {
    match map.get(key) {
        Some(Value::Null) => {
            map.remove(key);
        }
        Some(Value::Number(number)) => {
            let text = number.to_string();
            map.insert(key.to_string(), Value::String(text));
        }
        Some(Value::String(text)) if text.trim().is_empty() => {
            map.remove(key);
        }
        _ => {}
    }
}

pub fn from_yaml(content: &str) -> Result<ResourceRecord, CatalogError> {
    let mut raw = parse_yaml(content)?;
    migrate(&mut raw)?;
    from_value(raw)
}

pub fn from_value(raw: Value) -> Result<ResourceRecord, CatalogError> {
    serde_json::from_value(raw).map_err(|err| CatalogError::RecordParse(err.to_string()))
}
