//! Candidate and discovered-item models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// How an item entered the store.
///
/// The backfill pipeline only ever writes `Backfill`; the other tags exist
/// because the store is shared with ingestion paths outside this crate and
/// the uniqueness contract holds across all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMethod {
    Backfill,
    Feed,
    Manual,
}

impl DiscoveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Backfill => "backfill",
            Self::Feed => "feed",
            Self::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "backfill" => Some(Self::Backfill),
            "feed" => Some(Self::Feed),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// An item yielded by a source adapter before it is known to be new or not.
///
/// Ephemeral: either promoted to a [`DiscoveredItem`] or discarded.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub source_slug: String,

    /// Item URL as the source published it; canonicalized at promotion
    pub url: String,

    /// Best-effort, source-supplied modification date
    pub last_modified: Option<NaiveDate>,

    /// Adapter-specific metadata bag
    pub metadata: serde_json::Value,
}

/// Durable record of a uniquely known item.
///
/// `(source_slug, canonical_key)` is unique across the entire store,
/// regardless of run or discovery method. Rows are never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredItem {
    pub id: String,
    pub source_slug: String,
    pub canonical_key: String,
    pub discovery_method: DiscoveryMethod,
    /// Owning run; `None` for non-backfill discovery
    pub run_id: Option<i64>,
    pub discovered_at: DateTime<Utc>,
}

impl DiscoveredItem {
    /// Deterministic identifier for a natural key.
    pub fn item_id(source_slug: &str, canonical_key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source_slug.as_bytes());
        hasher.update(b":");
        hasher.update(canonical_key.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Build the backfill record for a canonical key first sighted now.
    pub fn backfill(source_slug: &str, canonical_key: String, run_id: Option<i64>) -> Self {
        Self {
            id: Self::item_id(source_slug, &canonical_key),
            source_slug: source_slug.to_string(),
            canonical_key,
            discovery_method: DiscoveryMethod::Backfill,
            run_id,
            discovered_at: Utc::now(),
        }
    }
}
