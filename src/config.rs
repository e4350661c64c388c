use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Complete relay configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub log: LogConfig,
    pub deriver: DeriverConfig,
    pub broadcast: BroadcastConfig,
    pub aggregation: AggregationConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level or `EnvFilter` directive
    pub level: String,
    /// Enable JSON logging
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeriverConfig {
    /// Deadline of a single collaborator call in seconds, 0 disables it
    pub query_timeout_secs: u64,
    /// Ceiling on concurrent external voting power queries
    pub max_external_concurrency: usize,
    /// Number of derived validator sets kept in memory
    pub cache_epochs: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Per-subscriber buffer
    pub buffer_size: usize,
    /// Maximum subscribers per hub, 0 for unlimited
    pub max_subscribers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Epochs of signing requests kept behind the current one
    pub retain_epochs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds a committer may start before its slot
    pub grace_period_secs: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Default for DeriverConfig {
    fn default() -> Self {
        Self {
            query_timeout_secs: 30,
            max_external_concurrency: relay_valset::MAX_EXTERNAL_CONCURRENCY,
            cache_epochs: 8,
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            buffer_size: relay_broadcast::DEFAULT_BUFFER_SIZE,
            max_subscribers: 100,
        }
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self { retain_epochs: 4 }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 10,
        }
    }
}

impl DeriverConfig {
    pub fn query_timeout(&self) -> Option<Duration> {
        (self.query_timeout_secs > 0).then(|| Duration::from_secs(self.query_timeout_secs))
    }
}

impl RelayConfig {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;

        let config: RelayConfig =
            toml::from_str(&content).context("Failed to parse configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, content).context("Failed to write configuration file")?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.broadcast.buffer_size == 0 {
            anyhow::bail!("broadcast.buffer_size must be greater than 0");
        }

        if self.deriver.max_external_concurrency == 0 {
            anyhow::bail!("deriver.max_external_concurrency must be greater than 0");
        }

        if self.deriver.cache_epochs == 0 {
            anyhow::bail!("deriver.cache_epochs must be greater than 0");
        }

        Ok(())
    }
}
