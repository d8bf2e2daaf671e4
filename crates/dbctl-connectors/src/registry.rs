use std::collections::BTreeMap;
use std::sync::{OnceLock, RwLock};

use dbctl_common::{Error, Result};
use tracing::debug;

use crate::traits::{Connector, ConnectorMetadata};

/// Builds a fresh, unconfigured connector instance.
pub type ConnectorFactory = fn() -> Box<dyn Connector>;

/// Name-keyed table of available connectors, filled by explicit
/// registration calls at startup. Lookups ignore case.
#[derive(Default)]
pub struct ConnectorRegistry {
    connectors: BTreeMap<String, (ConnectorMetadata, ConnectorFactory)>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        metadata: ConnectorMetadata,
        factory: ConnectorFactory,
    ) -> Result<()> {
        if metadata.name.trim().is_empty() {
            return Err(Error::Configuration("connector name cannot be empty".into()));
        }

        let key = metadata.name.to_lowercase();
        if self.connectors.contains_key(&key) {
            return Err(Error::Configuration(format!(
                "connector '{}' is already registered",
                metadata.name
            )));
        }

        debug!(
            "registered connector {} {} ({})",
            metadata.name, metadata.version, metadata.description
        );
        self.connectors.insert(key, (metadata, factory));
        Ok(())
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn Connector>> {
        self.connectors
            .get(&name.to_lowercase())
            .map(|(_, factory)| factory())
            .ok_or_else(|| Error::Configuration(format!("unknown connector '{name}'")))
    }

    pub fn metadata(&self, name: &str) -> Option<ConnectorMetadata> {
        self.connectors
            .get(&name.to_lowercase())
            .map(|(metadata, _)| *metadata)
    }

    /// Registered connectors ordered by name.
    pub fn list(&self) -> Vec<ConnectorMetadata> {
        self.connectors.values().map(|(metadata, _)| *metadata).collect()
    }
}

/// The process-wide registry.
pub fn registry() -> &'static RwLock<ConnectorRegistry> {
    static REGISTRY: OnceLock<RwLock<ConnectorRegistry>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(ConnectorRegistry::new()))
}
