// src/config/classifier.rs
use serde::{Deserialize, Serialize};
use std::env;

pub const ENV_CLASSIFIER_API_KEY: &str = "CLASSIFIER_API_KEY";

fn default_endpoint() -> String {
    "http://127.0.0.1:7860/predict".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_connect_timeout_secs() -> u64 {
    4
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Empty = no auth header. "ENV" means: read from CLASSIFIER_API_KEY.
    #[serde(default)]
    pub api_key: String,
    /// Inference is slow; the default request timeout is generous.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_enabled() -> bool {
    true
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            endpoint: default_endpoint(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl ClassifierConfig {
    /// Resolve "ENV" key indirection and repair zero timeouts.
    pub fn resolve(mut self) -> anyhow::Result<Self> {
        if self.api_key.trim().eq_ignore_ascii_case("env") {
            self.api_key = env::var(ENV_CLASSIFIER_API_KEY)
                .map_err(|_| anyhow::anyhow!("Missing {ENV_CLASSIFIER_API_KEY} env var"))?;
        }
        if self.timeout_secs == 0 {
            self.timeout_secs = default_timeout_secs();
        }
        if self.connect_timeout_secs == 0 {
            self.connect_timeout_secs = default_connect_timeout_secs();
        }
        Ok(self)
    }
}
