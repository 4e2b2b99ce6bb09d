//! Error types shared across the ingestion pipeline.
//!
//! Parsing irregularities never show up here: they degrade to an UNKNOWN
//! record inside the parser. What remains is input that is not text at all,
//! transport failures, frame decoding problems and durable-write failures.

use thiserror::Error;

/// Input could not be treated as text, so no record can be produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    /// JSON `null` (or an absent body) where classifier text was expected.
    #[error("classifier output is null")]
    Null,

    /// A JSON value of a non-text kind (number, bool, array without strings, ...).
    #[error("classifier output is not text: {0}")]
    NotText(&'static str),

    /// An envelope object with none of the known text fields.
    #[error("envelope has no text field")]
    MissingText,

    /// Raw bytes that are not valid UTF-8.
    #[error("classifier output is not valid UTF-8")]
    InvalidUtf8,
}

/// Request/response or streaming failures. Reported as status, never fatal.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("classifier is disabled")]
    Disabled,

    #[error("empty submission")]
    EmptyInput,

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("classifier returned HTTP {0}")]
    Status(u16),

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("connection closed")]
    Closed,
}

/// Durable-write or load failure. The in-memory store stays authoritative.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store document is malformed: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("store backend unavailable: {0}")]
    Unavailable(String),
}

/// A streaming frame that could not be decoded. The channel stays open.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("frame is not JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame has no \"type\" discriminator")]
    MissingType,

    #[error("classification frame rejected: {0}")]
    Payload(#[from] ParseFailure),
}
