// src/channel/protocol.rs
//! Wire format of the live feed. Both directions are JSON objects with a
//! `"type"` discriminator.
//!
//! Inbound:  `{"type":"new_classification","classification":"...","timestamp":"...","id":7}`
//!           (payload may also sit under `"data"`), `{"type":"pong"}`
//! Outbound: `{"type":"ping","ts":<unix millis>}`

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::error::FrameError;
use crate::parse::envelope::{self, Envelope};

const CLASSIFICATION_TAGS: &[&str] = &["new_classification", "classification", "NEW_CLASSIFICATION"];
const ACK_TAGS: &[&str] = &["pong", "heartbeat_ack", "PONG"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Classification(Envelope),
    LivenessAck,
    /// Unrecognized tag; ignored by the manager.
    Ignored(String),
}

#[derive(Debug, Serialize)]
struct Probe {
    #[serde(rename = "type")]
    kind: &'static str,
    ts: i64,
}

/// Liveness probe payload.
pub fn probe_message() -> String {
    let p = Probe {
        kind: "ping",
        ts: Utc::now().timestamp_millis(),
    };
    serde_json::to_string(&p).unwrap_or_else(|_| r#"{"type":"ping"}"#.to_string())
}

pub fn decode_frame(text: &str) -> Result<InboundFrame, FrameError> {
    let v: Value = serde_json::from_str(text)?;
    let tag = v
        .get("type")
        .and_then(Value::as_str)
        .ok_or(FrameError::MissingType)?;

    if ACK_TAGS.contains(&tag) {
        return Ok(InboundFrame::LivenessAck);
    }
    if !CLASSIFICATION_TAGS.contains(&tag) {
        return Ok(InboundFrame::Ignored(tag.to_string()));
    }

    // Frame-level timestamp/id win over anything nested in the payload.
    let env = envelope::from_value(&v)?;
    Ok(InboundFrame::Classification(env))
}
