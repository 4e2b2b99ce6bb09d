// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod channel;
pub mod classifier;
pub mod config;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod parse;
pub mod record;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::ingest::{IngestOutcome, IngestPath, Ingestor};
pub use crate::parse::ClassificationParser;
pub use crate::record::{Category, Record, RecordId, UNSPECIFIED};
pub use crate::store::{MergeOutcome, RecordStore};
