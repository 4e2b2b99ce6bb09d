//! Classifier client: sends raw message text to the inference service and
//! returns its response untouched. Interpreting the response shape is the
//! envelope adapter's job, not this module's.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ClassifierConfig;
use crate::error::TransportError;

pub const ENV_TEST_MODE: &str = "CLASSIFIER_TEST_MODE";

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Value, TransportError>;
    /// Short name for logs.
    fn name(&self) -> &'static str;
}

pub type DynClassifier = Arc<dyn Classifier>;

/// Factory.
///
/// * `CLASSIFIER_TEST_MODE=mock` gives a deterministic mock.
/// * `enabled = false` gives a client that refuses every call.
/// * Otherwise the HTTP client for `endpoint`.
pub fn build_classifier(cfg: &ClassifierConfig) -> Result<DynClassifier, TransportError> {
    if std::env::var(ENV_TEST_MODE).map(|v| v == "mock").unwrap_or(false) {
        return Ok(Arc::new(MockClassifier::default()));
    }
    if !cfg.enabled {
        return Ok(Arc::new(DisabledClassifier));
    }
    Ok(Arc::new(HttpClassifier::new(cfg)?))
}

// ------------------------------------------------------------
// HTTP
// ------------------------------------------------------------

pub struct HttpClassifier {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    data: [&'a str; 1],
}

impl HttpClassifier {
    pub fn new(cfg: &ClassifierConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("freight-board/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            endpoint: cfg.endpoint.clone(),
            api_key: cfg.api_key.clone(),
        })
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, text: &str) -> Result<Value, TransportError> {
        if text.trim().is_empty() {
            return Err(TransportError::EmptyInput);
        }

        let mut req = self
            .http
            .post(&self.endpoint)
            .json(&PredictRequest { data: [text] });
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            tracing::warn!(target: "classifier", status = status.as_u16(), "classifier returned non-success");
            return Err(TransportError::Status(status.as_u16()));
        }
        Ok(resp.json::<Value>().await?)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

// ------------------------------------------------------------
// Mock / disabled
// ------------------------------------------------------------

/// Returns the same response for every non-empty input.
pub struct MockClassifier {
    pub fixed: Value,
}

impl MockClassifier {
    pub fn new(fixed: Value) -> Self {
        Self { fixed }
    }
}

impl Default for MockClassifier {
    fn default() -> Self {
        Self::new(Value::String(
            "Mesaj Tipi: CARGO_SEEKING_TRANSPORT\nYükleme Yeri: Mersin\nBoşaltma Yeri: Ankara".to_string(),
        ))
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    async fn classify(&self, text: &str) -> Result<Value, TransportError> {
        if text.trim().is_empty() {
            return Err(TransportError::EmptyInput);
        }
        Ok(self.fixed.clone())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

pub struct DisabledClassifier;

#[async_trait]
impl Classifier for DisabledClassifier {
    async fn classify(&self, _text: &str) -> Result<Value, TransportError> {
        Err(TransportError::Disabled)
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}
