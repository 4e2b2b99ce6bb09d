// src/parse/mod.rs
//! Classification parser: classifier output -> `Record`.
//!
//! Shared by the manual submission path and the live feed. Natural-language
//! irregularities degrade to an UNKNOWN record; only input that is not text
//! at all produces a `ParseFailure`.

pub mod envelope;
pub mod extractor;
pub mod labels;
pub mod normalizer;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::ParseFailure;
use crate::record::{IdGenerator, Record, RecordId};
pub use envelope::Envelope;
pub use extractor::{extract, Extraction, FieldMap};
pub use labels::Field;

/// Parser with its own id source. Cheap to share behind an `Arc`.
#[derive(Debug, Default)]
pub struct ClassificationParser {
    ids: IdGenerator,
}

impl ClassificationParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse plain classifier text. Infallible by policy.
    pub fn parse_text(&self, text: &str, source_ts: Option<DateTime<Utc>>) -> Record {
        self.parse_envelope(&Envelope {
            text: text.to_string(),
            timestamp: source_ts,
            id: None,
        })
    }

    /// Parse an already-normalized envelope. An envelope id wins over a generated one.
    pub fn parse_envelope(&self, env: &Envelope) -> Record {
        let now = Utc::now();
        let timestamp = env.timestamp.unwrap_or(now);
        let id = env.id.map(RecordId).unwrap_or_else(|| self.ids.next_id(now));
        let extraction = extract(&env.text);
        if !extraction.structured_block_found {
            tracing::debug!(target: "parse", %id, "no structured block in classifier output");
        }
        normalizer::normalize(&extraction.fields, id, timestamp)
    }

    /// Parse any accepted response shape. `source_ts` is used only when the
    /// envelope itself carries no timestamp.
    pub fn parse(&self, raw: &Value, source_ts: Option<DateTime<Utc>>) -> Result<Record, ParseFailure> {
        let mut env = envelope::from_value(raw)?;
        if env.timestamp.is_none() {
            env.timestamp = source_ts;
        }
        Ok(self.parse_envelope(&env))
    }

    /// Parse raw bytes (a request body or a binary frame).
    pub fn parse_bytes(&self, raw: &[u8], source_ts: Option<DateTime<Utc>>) -> Result<Record, ParseFailure> {
        let mut env = envelope::from_bytes(raw)?;
        if env.timestamp.is_none() {
            env.timestamp = source_ts;
        }
        Ok(self.parse_envelope(&env))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Category, UNSPECIFIED};
    use serde_json::json;

    #[test]
    fn parse_text_prefers_source_timestamp() {
        let p = ClassificationParser::new();
        let ts = DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z").unwrap().with_timezone(&Utc);
        let r = p.parse_text("Mesaj Tipi: TRANSPORT_SEEKING_CARGO", Some(ts));
        assert_eq!(r.timestamp, ts);
        assert_eq!(r.category, Category::TransportSeekingCargo);
    }

    #[test]
    fn envelope_id_is_reused() {
        let p = ClassificationParser::new();
        let r = p
            .parse(&json!({"classification": "Mesaj Tipi: CARGO_SEEKING_TRANSPORT", "id": 7}), None)
            .unwrap();
        assert_eq!(r.id, RecordId(7));
    }

    #[test]
    fn prose_never_fails() {
        let p = ClassificationParser::new();
        let r = p.parse(&json!("Merhaba, bugün hava çok güzel."), None).unwrap();
        assert_eq!(r.category, Category::Unknown);
        assert_eq!(r.loading_location, UNSPECIFIED);
    }

    #[test]
    fn null_is_the_only_kind_of_failure() {
        let p = ClassificationParser::new();
        assert_eq!(p.parse(&Value::Null, None), Err(ParseFailure::Null));
    }
}
