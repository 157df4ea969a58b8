// src/queue.rs

//! Downstream ingestion queue.
//!
//! Newly discovered items are handed to an external ingestion collaborator.
//! Its processing semantics are out of scope here; this module only defines
//! the handoff contract and the file-backed spool implementation.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::models::DiscoveredItem;

/// Failure handing an item downstream.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("queue unavailable: {0}")]
    Unavailable(String),
}

/// Contract for the downstream ingestion collaborator.
///
/// A rejected enqueue does not un-discover an item; the orchestrator records
/// it as a skip and moves on.
#[async_trait]
pub trait IngestQueue: Send + Sync {
    async fn enqueue(&self, item: &DiscoveredItem) -> Result<(), QueueError>;
}

/// File-backed spool: one JSON line per item, one file per source.
///
/// The ingestion worker that drains the spool is a separate process.
pub struct SpoolQueue {
    dir: PathBuf,
}

impl SpoolQueue {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn spool_path(&self, source_slug: &str) -> PathBuf {
        self.dir.join(format!("{source_slug}.ndjson"))
    }
}

#[async_trait]
impl IngestQueue for SpoolQueue {
    async fn enqueue(&self, item: &DiscoveredItem) -> Result<(), QueueError> {
        let mut line = serde_json::to_string(item)
            .map_err(|e| QueueError::Unavailable(e.to_string()))?;
        line.push('\n');

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| QueueError::Unavailable(e.to_string()))?;

        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(self.spool_path(&item.source_slug))
            .await
            .map_err(|e| QueueError::Unavailable(e.to_string()))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| QueueError::Unavailable(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| QueueError::Unavailable(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_spool_appends_one_line_per_item() {
        let tmp = TempDir::new().unwrap();
        let queue = SpoolQueue::new(tmp.path());

        let a = DiscoveredItem::backfill("gazette", "https://g.test/1".to_string(), Some(1));
        let b = DiscoveredItem::backfill("gazette", "https://g.test/2".to_string(), Some(1));
        queue.enqueue(&a).await.unwrap();
        queue.enqueue(&b).await.unwrap();

        let content = std::fs::read_to_string(tmp.path().join("gazette.ndjson")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: DiscoveredItem = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.canonical_key, "https://g.test/1");
    }

    #[tokio::test]
    async fn test_spool_separates_sources() {
        let tmp = TempDir::new().unwrap();
        let queue = SpoolQueue::new(tmp.path());

        let a = DiscoveredItem::backfill("gazette", "https://g.test/1".to_string(), None);
        let b = DiscoveredItem::backfill("diario", "https://d.test/1".to_string(), None);
        queue.enqueue(&a).await.unwrap();
        queue.enqueue(&b).await.unwrap();

        assert!(tmp.path().join("gazette.ndjson").exists());
        assert!(tmp.path().join("diario.ndjson").exists());
    }
}
