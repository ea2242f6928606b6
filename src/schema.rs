use std::fs;

use camino::Utf8Path;
use jsonschema::Validator;
use serde_json::Value;

use crate::error::CatalogError;

pub struct SchemaValidator {
    validator: Validator,
}

impl SchemaValidator {
    pub fn load(path: &Utf8Path) -> Result<Self, CatalogError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| CatalogError::SchemaLoad(format!("read {path}: {err}")))?;
        let schema: Value = serde_json::from_str(&content)
            .map_err(|err| CatalogError::SchemaLoad(format!("parse {path}: {err}")))?;
        Self::from_value(&schema)
    }

    pub fn from_value(schema: &Value) -> Result<Self, CatalogError> {
        let validator = jsonschema::validator_for(schema)
            .map_err(|err| CatalogError::SchemaLoad(err.to_string()))?;
        Ok(Self { validator })
    }

    pub fn check(&self, instance: &Value) -> Result<(), String> {
        let messages = self
            .validator
            .iter_errors(instance)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        if messages.is_empty() {
            Ok(())
        } else {
            Err(messages.join("; "))
        }
    }
}
