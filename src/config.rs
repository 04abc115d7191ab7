// src/config.rs
// SERVER CONFIGURATION
// Precedence: environment > TOML file > defaults. `.env` is folded into the environment first.

use std::path::Path;
use std::str::FromStr;

use secrecy::SecretString;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{FocusGroupError, Result};

pub const CONFIG_PATH_ENV: &str = "FOCUS_PANEL_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "focus_panel.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("expected 'pretty' or 'json', got '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bind_host: String,
    pub bind_port: u16,
    /// `mock` or a registered provider name (`groq`, `deepseek`, `openrouter`, ...).
    pub provider: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// Falls back to the provider's own env var when unset.
    pub api_key: Option<SecretString>,
    pub requests_per_second: u32,
    pub circuit_failure_threshold: u32,
    pub circuit_recovery_secs: u64,
    pub request_timeout_secs: Option<u64>,
    pub default_seed: u64,
    pub log_format: LogFormat,
    /// Finished jobs older than this are evicted from the job store; `0` keeps them forever.
    pub job_retention_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_host: "127.0.0.1".to_string(),
            bind_port: 8080,
            provider: "mock".to_string(),
            model: None,
            base_url: None,
            api_key: None,
            requests_per_second: 4,
            circuit_failure_threshold: 5,
            circuit_recovery_secs: 30,
            request_timeout_secs: None,
            default_seed: 42,
            log_format: LogFormat::Pretty,
            job_retention_secs: 3600,
        }
    }
}

impl AppConfig {
    /// Loads `.env`, the TOML file named by `FOCUS_PANEL_CONFIG` (if it exists), then env overrides.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let path = optional_env(CONFIG_PATH_ENV)?.unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
        let mut config = if Path::new(&path).exists() {
            info!("CONFIG: Reading {}", path);
            Self::from_file(&path)?
        } else {
            debug!("CONFIG: No config file at {}, using defaults", path);
            Self::default()
        };
        config.apply_env()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| FocusGroupError::Config(format!("config file: {e}")))
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(host) = optional_env("FOCUS_PANEL_HOST")? {
            self.bind_host = host;
        }
        self.bind_port = parse_optional_env("FOCUS_PANEL_PORT", self.bind_port)?;
        if let Some(provider) = optional_env("FOCUS_PANEL_PROVIDER")? {
            self.provider = provider;
        }
        if let Some(model) = optional_env("FOCUS_PANEL_MODEL")? {
            self.model = Some(model);
        }
        self.default_seed = parse_optional_env("FOCUS_PANEL_SEED", self.default_seed)?;
        self.log_format = parse_optional_env("FOCUS_PANEL_LOG_FORMAT", self.log_format)?;
        Ok(())
    }

    pub fn bind_addr(&self) -> (String, u16) {
        (self.bind_host.clone(), self.bind_port)
    }
}

/// Unset and empty both read as `None`.
fn optional_env(key: &str) -> Result<Option<String>> {
    match std::env::var(key) {
        Ok(val) if val.trim().is_empty() => Ok(None),
        Ok(val) => Ok(Some(val)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(FocusGroupError::Config(format!("failed to read {key}: {e}"))),
    }
}

fn parse_optional_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    optional_env(key)?
        .map(|s| {
            s.trim()
                .parse()
                .map_err(|e| FocusGroupError::Config(format!("invalid value for {key}: {e}")))
        })
        .transpose()
        .map(|opt| opt.unwrap_or(default))
}
