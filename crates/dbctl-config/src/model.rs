use dbctl_common::{Error, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONNECTOR: &str = "SQLite";

/// Settings needed to drive one migration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Registered connector name, matched case-insensitively.
    pub connector: String,
    pub connection_string: String,
    /// Recorded as `AppliedBy`; falls back to the login name.
    pub applied_by: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            connector: DEFAULT_CONNECTOR.to_string(),
            connection_string: String::new(),
            applied_by: None,
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.connector.trim().is_empty() {
            return Err(Error::Configuration("connector cannot be empty".into()));
        }
        if self.connection_string.trim().is_empty() {
            return Err(Error::Configuration(
                "connection_string is required (config file, DBCTL_CONNECTION_STRING or --connection-string)"
                    .into(),
            ));
        }
        Ok(())
    }

    pub fn applied_by(&self) -> String {
        let present = |s: &String| !s.trim().is_empty();
        self.applied_by
            .clone()
            .filter(present)
            .or_else(|| std::env::var("USER").ok().filter(present))
            .or_else(|| std::env::var("USERNAME").ok().filter(present))
            .unwrap_or_else(|| "unknown".to_string())
    }
}
