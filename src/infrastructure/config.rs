use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::domain::{errors::ConfigError, registry::BrokerRegistry, services::MessageRoutingService};

pub const SEED_ENV: &str = "TRIBUTARY_RANDOM_SEED";
pub const LOG_ENV: &str = "TRIBUTARY_LOG";

/// Broker settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Seed for random partition allocation; entropy when unset
    pub random_seed: Option<u64>,
    /// env_logger filter directives, e.g. `info` or `tributary=debug`
    pub log_filter: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            random_seed: None,
            log_filter: "info".to_string(),
        }
    }
}

impl BrokerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Defaults overridden by `TRIBUTARY_RANDOM_SEED` and `TRIBUTARY_LOG`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(seed) = lookup(SEED_ENV) {
            config.random_seed = Some(seed.trim().parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                key: SEED_ENV.to_string(),
                value: seed.clone(),
            })?);
        }
        if let Some(filter) = lookup(LOG_ENV) {
            config.log_filter = filter;
        }
        Ok(config)
    }

    pub fn router(&self) -> MessageRoutingService {
        match self.random_seed {
            Some(seed) => MessageRoutingService::with_seed(seed),
            None => MessageRoutingService::new(),
        }
    }

    pub fn build_registry(&self) -> BrokerRegistry {
        BrokerRegistry::with_router(self.router())
    }
}
