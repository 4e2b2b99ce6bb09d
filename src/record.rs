// src/record.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Placeholder for any field the classifier did not provide.
pub const UNSPECIFIED: &str = "UNSPECIFIED";

/// Which listing board a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    CargoSeekingTransport,
    TransportSeekingCargo,
    Unknown,
}

impl Category {
    pub const CARGO_TOKEN: &'static str = "CARGO_SEEKING_TRANSPORT";
    pub const TRANSPORT_TOKEN: &'static str = "TRANSPORT_SEEKING_CARGO";

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::CargoSeekingTransport => Self::CARGO_TOKEN,
            Category::TransportSeekingCargo => Self::TRANSPORT_TOKEN,
            Category::Unknown => "UNKNOWN",
        }
    }

    /// True for the two categories that have a visible collection.
    pub fn is_listed(&self) -> bool {
        !matches!(self, Category::Unknown)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    /// Accepts the wire tokens plus the kebab/lowercase forms used in URLs.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim().to_ascii_uppercase().replace('-', "_");
        match t.as_str() {
            Self::CARGO_TOKEN => Ok(Category::CargoSeekingTransport),
            Self::TRANSPORT_TOKEN => Ok(Category::TransportSeekingCargo),
            "UNKNOWN" => Ok(Category::Unknown),
            _ => Err(format!("unknown category: {s}")),
        }
    }
}

/// Record identifier. Time-based (unix millis) unless the source supplies one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out strictly increasing millisecond ids, so two records produced in
/// the same millisecond never collide.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self, now: DateTime<Utc>) -> RecordId {
        let candidate = now.timestamp_millis().max(0) as u64;
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = candidate.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return RecordId(next),
                Err(actual) => prev = actual,
            }
        }
    }
}

/// One structured listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: RecordId,
    pub category: Category,
    pub timestamp: DateTime<Utc>,
    pub loading_location: String,
    pub unloading_location: String,
    pub cargo_type: String,
    pub vehicle_type: String,
    pub amount: String,
    pub price: String,
    pub date: String,
    pub contact: String,
    pub extra_info: String,
}

impl Record {
    /// All-sentinel record; what the normalizer yields for degraded input.
    pub fn unspecified(id: RecordId, category: Category, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            category,
            timestamp,
            loading_location: UNSPECIFIED.to_string(),
            unloading_location: UNSPECIFIED.to_string(),
            cargo_type: UNSPECIFIED.to_string(),
            vehicle_type: UNSPECIFIED.to_string(),
            amount: UNSPECIFIED.to_string(),
            price: UNSPECIFIED.to_string(),
            date: UNSPECIFIED.to_string(),
            contact: UNSPECIFIED.to_string(),
            extra_info: UNSPECIFIED.to_string(),
        }
    }
}
