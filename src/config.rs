//! Configuration loading and management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::stage::StageRegistry;
use crate::{Error, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Job service connection
    #[serde(default)]
    pub service: ServiceConfig,

    /// Polling behaviour
    #[serde(default)]
    pub polling: PollingConfig,

    /// Known processing stages, in order (empty = built-in stages)
    #[serde(default)]
    pub stages: Vec<StageConfig>,
}

impl Config {
    /// Load configuration from file or default locations
    ///
    /// Values are not validated here; apply overrides first, then call
    /// [`Config::validate`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(PathBuf::from).or_else(|| {
            // Try .arbiter/config.toml in current directory
            let local = PathBuf::from(".arbiter/config.toml");
            if local.exists() {
                return Some(local);
            }

            // Try ~/.arbiter/config.toml
            dirs::home_dir().map(|h| h.join(".arbiter/config.toml"))
        });

        let config = match config_path {
            Some(p) if p.exists() => {
                let content = std::fs::read_to_string(&p)?;
                Self::parse(&content)?
            }
            Some(p) if path.is_some() => {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )))
            }
            _ => Config::default(),
        };

        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        reqwest::Url::parse(&self.service.base_url).map_err(|e| {
            Error::Config(format!(
                "Invalid service URL {}: {}",
                self.service.base_url, e
            ))
        })?;

        if self.polling.interval.is_zero() {
            return Err(Error::Config("Polling interval must be positive".to_string()));
        }

        if self.stages.iter().any(|s| s.name.is_empty()) {
            return Err(Error::Config("Stage names must not be empty".to_string()));
        }

        Ok(())
    }

    /// Override the service URL (command line / environment)
    pub fn with_service_url(mut self, url: Option<String>) -> Self {
        if let Some(url) = url {
            self.service.base_url = url;
        }
        self
    }

    /// Override the polling interval
    pub fn with_interval(mut self, interval: Option<Duration>) -> Self {
        if let Some(interval) = interval {
            self.polling.interval = interval;
        }
        self
    }

    /// Stage registry described by this configuration
    pub fn stage_registry(&self) -> StageRegistry {
        StageRegistry::from_config(&self.stages)
    }
}

/// Job service connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the analysis service
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout
    #[serde(default = "default_request_timeout", with = "humantime_duration")]
    pub request_timeout: Duration,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Polling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay between status queries
    #[serde(default = "default_interval", with = "humantime_duration")]
    pub interval: Duration,
}

fn default_interval() -> Duration {
    Duration::from_secs(2)
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
        }
    }
}

/// One configured stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Name as it appears in the service's stage label
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Write the default configuration to `.arbiter/config.toml`
pub fn init(force: bool) -> Result<PathBuf> {
    let dir = PathBuf::from(".arbiter");
    init_in(&dir, force)
}

/// Write the default configuration into `dir`
pub fn init_in(dir: &Path, force: bool) -> Result<PathBuf> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
    }

    let config_path = dir.join("config.toml");
    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "{} already exists, use --force to overwrite",
            config_path.display()
        )));
    }

    let mut config = Config::default();
    config.stages = StageRegistry::default()
        .stages()
        .iter()
        .map(|s| StageConfig {
            name: s.name.clone(),
            description: Some(s.description.clone()),
        })
        .collect();

    let content =
        toml::to_string_pretty(&config).map_err(|e| Error::Config(e.to_string()))?;
    std::fs::write(&config_path, content)?;

    Ok(config_path)
}

// Serde adapter for Duration using humantime ("2s", "1m 30s")
mod humantime_duration {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
