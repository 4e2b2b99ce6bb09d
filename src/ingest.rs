// src/ingest.rs
//! Ingestion coordinator. Manual submissions and live-feed events both land
//! here: parse, merge into the shared store, count what happened.

use metrics::{counter, describe_counter, describe_gauge};
use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::error::ParseFailure;
use crate::parse::{ClassificationParser, Envelope};
use crate::record::Record;
use crate::store::{MergeOutcome, RecordStore};

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_messages_total", "Classifier outputs handed to the parser.");
        describe_counter!(
            "ingest_quarantined_total",
            "Parsed records with UNKNOWN category (not stored)."
        );
        describe_counter!(
            "ingest_parse_failures_total",
            "Inputs rejected because they were not text."
        );
        describe_counter!("store_merges_total", "Store merge outcomes.");
        describe_counter!("store_persist_errors_total", "Failed durable writes.");
        describe_counter!("channel_reconnects_total", "Scheduled live-feed reconnects.");
        describe_counter!("channel_frame_errors_total", "Live-feed frames that failed to decode.");
        describe_counter!(
            "channel_liveness_timeouts_total",
            "Connections force-closed for missing liveness acks."
        );
        describe_gauge!(
            "channel_state",
            "0=connecting 1=connected 2=disconnected 3=failed"
        );
        describe_gauge!("store_records", "Records per visible collection.");
    });
}

/// Where a classifier output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestPath {
    /// Text submitted by a user, classified on request.
    Manual,
    /// Classifier output posted as-is.
    Direct,
    /// Live-feed event.
    Stream,
}

impl IngestPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestPath::Manual => "manual",
            IngestPath::Direct => "direct",
            IngestPath::Stream => "stream",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub merge: MergeOutcome,
    pub record: Record,
}

pub struct Ingestor {
    parser: ClassificationParser,
    store: Arc<RecordStore>,
}

impl Ingestor {
    pub fn new(store: Arc<RecordStore>) -> Self {
        ensure_metrics_described();
        Self {
            parser: ClassificationParser::new(),
            store,
        }
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    pub fn ingest_envelope(&self, env: &Envelope, path: IngestPath) -> IngestOutcome {
        counter!("ingest_messages_total", "path" => path.as_str()).increment(1);
        let record = self.parser.parse_envelope(env);
        self.merge(record, path, &env.text)
    }

    /// Any accepted response shape (bare string or envelope object).
    pub fn ingest_value(&self, raw: &Value, path: IngestPath) -> Result<IngestOutcome, ParseFailure> {
        match crate::parse::envelope::from_value(raw) {
            Ok(env) => Ok(self.ingest_envelope(&env, path)),
            Err(e) => {
                counter!("ingest_parse_failures_total", "path" => path.as_str()).increment(1);
                tracing::warn!(target: "ingest", path = path.as_str(), error = %e, "classifier output rejected");
                Err(e)
            }
        }
    }

    /// Raw request body: JSON (string or envelope) or plain UTF-8 text.
    pub fn ingest_bytes(&self, raw: &[u8], path: IngestPath) -> Result<IngestOutcome, ParseFailure> {
        match crate::parse::envelope::from_bytes(raw) {
            Ok(env) => Ok(self.ingest_envelope(&env, path)),
            Err(e) => {
                counter!("ingest_parse_failures_total", "path" => path.as_str()).increment(1);
                tracing::warn!(target: "ingest", path = path.as_str(), error = %e, "raw input rejected");
                Err(e)
            }
        }
    }

    fn merge(&self, record: Record, path: IngestPath, text: &str) -> IngestOutcome {
        let merge = self.store.merge(record.clone());
        match merge {
            MergeOutcome::Quarantined => {
                counter!("ingest_quarantined_total", "path" => path.as_str()).increment(1);
                // Never log raw text (contact details); only a fingerprint.
                tracing::info!(
                    target: "ingest",
                    path = path.as_str(),
                    fingerprint = %fingerprint(text),
                    "no recognizable listing; record quarantined"
                );
            }
            MergeOutcome::Inserted(cat) | MergeOutcome::Replaced(cat) => {
                tracing::info!(
                    target: "ingest",
                    path = path.as_str(),
                    id = %record.id,
                    category = %cat,
                    outcome = merge.as_str(),
                    "record merged"
                );
            }
        }
        IngestOutcome { merge, record }
    }
}

/// Short SHA-256 prefix of `text`, for correlating log lines without content.
pub fn fingerprint(text: &str) -> String {
    use sha2::{Digest, Sha256};
    use std::fmt::Write as _;
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Category;
    use serde_json::json;

    #[test]
    fn fingerprint_is_stable_and_short() {
        assert_eq!(fingerprint("abc"), fingerprint("abc"));
        assert_eq!(fingerprint("abc").len(), 12);
        assert_ne!(fingerprint("abc"), fingerprint("abd"));
    }

    #[test]
    fn value_path_merges_and_rejects_null() {
        let ing = Ingestor::new(Arc::new(RecordStore::in_memory()));
        let out = ing
            .ingest_value(&json!({"data": ["Mesaj Tipi: TRANSPORT_SEEKING_CARGO"]}), IngestPath::Direct)
            .unwrap();
        assert_eq!(out.merge, MergeOutcome::Inserted(Category::TransportSeekingCargo));
        assert!(ing.ingest_value(&Value::Null, IngestPath::Direct).is_err());
        assert_eq!(ing.store().len(Category::TransportSeekingCargo), 1);
    }
}
