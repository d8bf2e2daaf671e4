use std::path::Path;

use dbctl_common::{Error, Result};
use tracing::{debug, info};

use crate::model::AppConfig;

pub const ENV_CONNECTOR: &str = "DBCTL_CONNECTOR";
pub const ENV_CONNECTION_STRING: &str = "DBCTL_CONNECTION_STRING";
pub const ENV_APPLIED_BY: &str = "DBCTL_APPLIED_BY";

/// Loads `AppConfig` from an optional YAML/TOML file, then environment
/// variables (a `.env` file in the working directory is honoured).
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load(path: Option<&Path>) -> Result<AppConfig> {
        if dotenvy::dotenv().is_ok() {
            debug!("loaded environment from .env");
        }

        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => AppConfig::default(),
        };

        Ok(Self::apply_overrides(config, |key| std::env::var(key).ok()))
    }

    pub fn from_file(path: &Path) -> Result<AppConfig> {
        let contents = std::fs::read_to_string(path)?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let config = match ext {
            "yml" | "yaml" => serde_yaml::from_str(&contents)
                .map_err(|e| Error::Configuration(format!("YAML parse error: {e}")))?,
            "toml" => toml::from_str(&contents)
                .map_err(|e| Error::Configuration(format!("TOML parse error: {e}")))?,
            other => {
                return Err(Error::Configuration(format!(
                    "unsupported config extension: {other}"
                )));
            }
        };

        info!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Replace fields with non-empty values returned by `lookup`.
    pub fn apply_overrides(
        mut config: AppConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> AppConfig {
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(connector) = value(ENV_CONNECTOR) {
            config.connector = connector;
        }
        if let Some(connection_string) = value(ENV_CONNECTION_STRING) {
            config.connection_string = connection_string;
        }
        if let Some(applied_by) = value(ENV_APPLIED_BY) {
            config.applied_by = Some(applied_by);
        }
        config
    }
}
