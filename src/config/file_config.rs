use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub database_url: Option<String>,
    pub timezone: Option<String>,
    pub environment: Option<String>,
    pub hostname: Option<String>,
    pub cooldown_secs: Option<u64>,

    // Feature configs
    pub retry: Option<RetryConfig>,
    pub notifications: Option<NotificationsConfig>,
    pub jobs: Option<BTreeMap<String, JobFileConfig>>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub attempts: Option<u32>,
    pub min_timeout_ms: Option<u64>,
    pub max_timeout_ms: Option<u64>,
    pub backoff_multiplier: Option<f64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct NotificationsConfig {
    pub enabled: Option<bool>,
    pub recipients: Option<Vec<String>>,
}

/// A `[jobs.<name>]` table.
///
/// An empty `cron` disables the job without removing it from the file.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct JobFileConfig {
    pub cron: Option<String>,
    pub command: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
