use std::env;
use std::time::Duration;

use log::{debug, info};

use crate::error::ConfigError;

const DEFAULT_NAME: &str = "Pinecil";
const DEFAULT_MODEL: &str = "Pinecil v2";
const DEFAULT_TIMEOUT_SECS: u64 = 40;
const DEFAULT_SUMMARY_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// BLE address of the tracked iron
    pub address: String,
    pub name: String,
    /// Model shown when the advertisement does not carry one
    pub model: String,
    /// Bound for connecting and for every device call
    pub timeout: Duration,
    /// How often the binary logs a summary
    pub summary_interval: Duration,
}

impl SessionConfig {
    /// Configuration with defaults for everything but the address
    pub fn for_address(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: DEFAULT_NAME.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            summary_interval: Duration::from_secs(DEFAULT_SUMMARY_SECS),
        }
    }

    pub fn new() -> Result<Self, ConfigError> {
        // Load environment variables
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let address = lookup("PINECIL_ADDRESS")
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .ok_or(ConfigError::Missing("PINECIL_ADDRESS"))?;

        let mut config = Self::for_address(address);

        if let Some(name) = lookup("PINECIL_NAME").filter(|n| !n.trim().is_empty()) {
            config.name = name.trim().to_string();
        }
        if let Some(model) = lookup("PINECIL_MODEL").filter(|m| !m.trim().is_empty()) {
            config.model = model.trim().to_string();
        }
        if let Some(secs) = parse_secs(&lookup, "PINECIL_TIMEOUT_SECS")? {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_secs(&lookup, "PINECIL_SUMMARY_SECS")? {
            config.summary_interval = Duration::from_secs(secs);
        }

        info!("Tracking {} ({}) at {}", config.name, config.model, config.address);
        debug!(
            "Device timeout {:?}, summary every {:?}",
            config.timeout, config.summary_interval
        );

        Ok(config)
    }
}

fn parse_secs<F>(lookup: &F, key: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => match value.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => Ok(Some(secs)),
            _ => Err(ConfigError::Invalid { key, value }),
        },
    }
}
