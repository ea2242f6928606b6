use std::fs;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

pub const DEFAULT_CONFIG_FILE: &str = "catalog.json";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub metadata_dir: String,
    pub records_dir: String,
    pub schema_file: String,
    pub localizations_dir: String,
    pub language_names: Option<String>,
    pub output_dir: String,
    pub probe_timeout_secs: u64,
    pub registry: RegistryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            metadata_dir: "../metadata".to_string(),
            records_dir: "yaml".to_string(),
            schema_file: "schema/metadata.json".to_string(),
            localizations_dir: "localizations".to_string(),
            language_names: None,
            output_dir: "static".to_string(),
            probe_timeout_secs: 30,
            registry: RegistryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub api_url: String,
    pub client_id: String,
    pub prefix: String,
    pub publisher_name: String,
    pub publisher_ror: String,
    pub dataset_target_prefix: String,
    pub workflow_target_prefix: String,
    pub netrc_machine: String,
    pub call_budget: u32,
    pub cooldown_secs: u64,
    pub timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.datacite.org/dois".to_string(),
            client_id: "SND.SPRKB".to_string(),
            prefix: "10.23695".to_string(),
            publisher_name: "Språkbanken Text".to_string(),
            publisher_ror: "https://ror.org/03xfh2n14".to_string(),
            dataset_target_prefix: "https://spraakbanken.gu.se/resurser/".to_string(),
            workflow_target_prefix: "https://spraakbanken.gu.se/analyser/".to_string(),
            netrc_machine: "datacite.org".to_string(),
            call_budget: 298,
            cooldown_secs: 300,
            timeout_secs: 60,
        }
    }
}

impl RegistryConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub records_dir: Utf8PathBuf,
    pub schema_file: Utf8PathBuf,
    pub localizations_dir: Utf8PathBuf,
    pub language_names: Option<Utf8PathBuf>,
    pub output_dir: Utf8PathBuf,
    pub probe_timeout: Duration,
    pub registry: RegistryConfig,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, CatalogError> {
        let config_path = Utf8PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));

        if path.is_none() && !config_path.as_std_path().exists() {
            return Err(CatalogError::MissingConfig);
        }

        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|_| CatalogError::ConfigRead(config_path.clone().into_std_path_buf()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| CatalogError::ConfigParse(err.to_string()))?;

        let base = config_path
            .parent()
            .map(Utf8Path::to_path_buf)
            .unwrap_or_default();
        Self::resolve_config(config, &base)
    }

    pub fn resolve_config(config: Config, base: &Utf8Path) -> Result<ResolvedConfig, CatalogError> {
        let registry = config.registry;
        if registry.call_budget == 0 {
            return Err(CatalogError::InvalidConfig(
                "registry.call_budget must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("registry.api_url", &registry.api_url),
            ("registry.client_id", &registry.client_id),
            ("registry.prefix", &registry.prefix),
        ] {
            if value.trim().is_empty() {
                return Err(CatalogError::InvalidConfig(format!("{name} must not be empty")));
            }
        }

        let metadata_dir = join(base, &config.metadata_dir);
        Ok(ResolvedConfig {
            records_dir: join(&metadata_dir, &config.records_dir),
            schema_file: join(&metadata_dir, &config.schema_file),
            localizations_dir: join(&metadata_dir, &config.localizations_dir),
            language_names: config
                .language_names
                .as_deref()
                .map(|path| join(&metadata_dir, path)),
            output_dir: join(base, &config.output_dir),
            probe_timeout: Duration::from_secs(config.probe_timeout_secs),
            registry,
        })
    }
}

fn join(base: &Utf8Path, path: &str) -> Utf8PathBuf {
    let path = Utf8Path::new(path);
    if path.is_absolute() || base.as_str().is_empty() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve_under_metadata_dir() {
        let resolved = ConfigLoader::resolve_config(Config::default(), Utf8Path::new("")).unwrap();
        assert_eq!(resolved.records_dir, Utf8PathBuf::from("../metadata/yaml"));
        assert_eq!(
            resolved.schema_file,
            Utf8PathBuf::from("../metadata/schema/metadata.json")
        );
        assert_eq!(resolved.output_dir, Utf8PathBuf::from("static"));
        assert_eq!(resolved.registry.call_budget, 298);
    }
}
