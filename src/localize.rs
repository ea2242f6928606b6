use std::collections::BTreeMap;
use std::fs;

use camino::Utf8Path;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::CatalogError;
use crate::loader::list_record_files;
use crate::record::{LangMap, ResourceRecord};

#[derive(Debug, Clone, Default)]
pub struct Localizations {
    tables: BTreeMap<String, BTreeMap<String, String>>,
}

impl Localizations {
    pub fn load(dir: &Utf8Path) -> Result<Self, CatalogError> {
        let mut tables = BTreeMap::new();
        if !dir.as_std_path().is_dir() {
            debug!(dir = %dir, "no localization directory");
            return Ok(Self { tables });
        }
        for path in list_record_files(dir)? {
            let Some(name) = path.file_stem() else {
                continue;
            };
            let content = fs::read_to_string(path.as_std_path())
                .map_err(|err| CatalogError::Filesystem(format!("read {path}: {err}")))?;
            match serde_yaml::from_str::<BTreeMap<String, Value>>(&content) {
                Ok(entries) => {
                    let table = entries
                        .into_iter()
                        .filter_map(|(key, value)| match value {
                            Value::String(text) => Some((key, text)),
                            _ => None,
                        })
                        .collect();
                    tables.insert(name.to_string(), table);
                }
                Err(err) => warn!(path = %path, "ignoring malformed localization table: {err}"),
            }
        }
        Ok(Self { tables })
    }

    pub fn from_tables(tables: BTreeMap<String, BTreeMap<String, String>>) -> Self {
        Self { tables }
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn apply(&self, record: &mut ResourceRecord) {
        for (field, table) in &self.tables {
            let Some(Value::String(key)) = record.extra.get(field) else {
                continue;
            };
            let translated = table.get(key).unwrap_or(key);
            let resolved = json!({"eng": key, "swe": translated});
            record.extra.insert(field.clone(), resolved);
        }
    }
}

/// English names come from ISO 639-3; Swedish names from an optional table
/// mapping English name to Swedish name.
#[derive(Debug, Clone, Default)]
pub struct LanguageNames {
    swedish: BTreeMap<String, String>,
}

impl LanguageNames {
    pub fn load(path: Option<&Utf8Path>) -> Result<Self, CatalogError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| CatalogError::Filesystem(format!("read {path}: {err}")))?;
        let swedish = serde_yaml::from_str(&content)
            .map_err(|err| CatalogError::ConfigParse(format!("{path}: {err}")))?;
        Ok(Self { swedish })
    }

    pub fn from_table(swedish: BTreeMap<String, String>) -> Self {
        Self { swedish }
    }

    pub fn resolve(&self, code: &str) -> Option<LangMap> {
        let english = isolang::Language::from_639_3(code)?.to_name();
        let swedish = self
            .swedish
            .get(english)
            .map(String::as_str)
            .unwrap_or(english)
            .to_lowercase();
        Some(LangMap::from([
            ("eng".to_string(), english.to_string()),
            ("swe".to_string(), swedish),
        ]))
    }
}
