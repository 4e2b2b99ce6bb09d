// src/config/mod.rs
//! Application configuration: one TOML or JSON document plus env overrides.
//!
//! Lookup order:
//! 1) $FREIGHT_CONFIG_PATH
//! 2) config/freight.toml
//! 3) config/freight.json
//! 4) built-in defaults

pub mod classifier;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use classifier::ClassifierConfig;

pub const ENV_CONFIG_PATH: &str = "FREIGHT_CONFIG_PATH";
pub const ENV_BIND_ADDR: &str = "BIND_ADDR";
pub const ENV_STORE_PATH: &str = "STORE_PATH";
pub const ENV_CHANNEL_URL: &str = "CHANNEL_URL";
pub const ENV_CLASSIFIER_ENDPOINT: &str = "CLASSIFIER_ENDPOINT";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("state/records.json"),
        }
    }
}

/// Upper bound for every channel timer; larger values are clamped.
pub const MAX_CHANNEL_TIMER_SECS: u64 = 7 * 24 * 3600;

fn default_heartbeat_interval_secs() -> u64 {
    30
}
fn default_liveness_timeout_secs() -> u64 {
    45
}
fn default_backoff_base_ms() -> u64 {
    1_000
}
fn default_backoff_cap_ms() -> u64 {
    10_000
}
fn default_jitter_ms() -> u64 {
    1_000
}

/// Live feed settings. Without `url` the channel manager is not started.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_liveness_timeout_secs")]
    pub liveness_timeout_secs: u64,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
    /// Absent = retry forever (delay stays capped).
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: None,
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            liveness_timeout_secs: default_liveness_timeout_secs(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            jitter_ms: default_jitter_ms(),
            max_retries: None,
        }
    }
}

impl ChannelConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_secs(self.liveness_timeout_secs)
    }

    fn sanitize(&mut self) {
        if self.heartbeat_interval_secs == 0 {
            self.heartbeat_interval_secs = default_heartbeat_interval_secs();
        }
        if self.liveness_timeout_secs == 0 {
            self.liveness_timeout_secs = default_liveness_timeout_secs();
        }
        if self.backoff_base_ms == 0 {
            self.backoff_base_ms = default_backoff_base_ms();
        }
        let max_ms = MAX_CHANNEL_TIMER_SECS * 1000;
        self.heartbeat_interval_secs = self.heartbeat_interval_secs.min(MAX_CHANNEL_TIMER_SECS);
        self.liveness_timeout_secs = self.liveness_timeout_secs.min(MAX_CHANNEL_TIMER_SECS);
        self.backoff_base_ms = self.backoff_base_ms.min(max_ms);
        self.backoff_cap_ms = self.backoff_cap_ms.min(max_ms);
        self.jitter_ms = self.jitter_ms.min(max_ms);
        if self.backoff_cap_ms < self.backoff_base_ms {
            self.backoff_cap_ms = self.backoff_base_ms;
        }
        if self.url.as_deref().is_some_and(|u| u.trim().is_empty()) {
            self.url = None;
        }
    }
}

impl AppConfig {
    /// Load from an explicit path. Format by extension, falling back to sniffing.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg = parse_config(&content, &ext)?;
        cfg.finish()
    }

    /// Env var + fallbacks, then env overrides.
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            return Self::load_from(&pb);
        }
        for candidate in ["config/freight.toml", "config/freight.json"] {
            let pb = PathBuf::from(candidate);
            if pb.exists() {
                return Self::load_from(&pb);
            }
        }
        AppConfig::default().finish()
    }

    fn finish(mut self) -> Result<Self> {
        self.apply_env_overrides();
        self.channel.sanitize();
        self.classifier = self.classifier.resolve()?;
        Ok(self)
    }

    fn apply_env_overrides(&mut self) {
        let var = |k: &str| std::env::var(k).ok().filter(|v| !v.trim().is_empty());
        if let Some(v) = var(ENV_BIND_ADDR) {
            self.server.bind = v;
        }
        if let Some(v) = var(ENV_STORE_PATH) {
            self.store.path = PathBuf::from(v);
        }
        if let Some(v) = var(ENV_CHANNEL_URL) {
            self.channel.url = Some(v);
        }
        if let Some(v) = var(ENV_CLASSIFIER_ENDPOINT) {
            self.classifier.endpoint = v;
        }
    }
}

fn parse_config(s: &str, hint_ext: &str) -> Result<AppConfig> {
    match hint_ext {
        "toml" => toml::from_str(s).context("parsing TOML config"),
        "json" => serde_json::from_str(s).context("parsing JSON config"),
        _ => serde_json::from_str(s)
            .or_else(|_| toml::from_str(s))
            .map_err(|_| anyhow!("unsupported config format")),
    }
}
