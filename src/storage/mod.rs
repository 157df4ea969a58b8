// src/storage/mod.rs

//! Durable run and item persistence.
//!
//! The store is the idempotency authority: uniqueness of
//! `(source_slug, canonical_key)` is enforced at the storage layer, so two
//! overlapping runs against the same source stay correct without any
//! cross-process lock.

pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::models::{DiscoveredItem, Run, RunCounters, RunParams, RunStatus};

/// Status snapshot read back at a checkpoint.
#[derive(Debug, Clone, Copy)]
pub struct RunControl {
    pub status: RunStatus,
    pub cancel_requested: bool,
}

impl RunControl {
    /// True when the orchestrator must halt at this checkpoint: either the
    /// cooperative marker is set or an operator flipped the status directly.
    pub fn should_cancel(&self) -> bool {
        self.cancel_requested || self.status == RunStatus::Cancelled
    }
}

/// Durable registry of runs and discovered items.
pub trait DiscoveryStore: Send + Sync {
    /// Persist a new `Pending` run, returning its identifier.
    fn create_run(&self, source_slug: &str, params: &RunParams) -> Result<i64>;

    /// Transition `Pending → Running`, stamping the start time.
    fn mark_running(&self, run_id: i64) -> Result<()>;

    /// Flush counters and cursor, then read back the cancellation state.
    ///
    /// Counters are written even when the run was cancelled out from under
    /// us: they reflect items actually persisted, so the stored totals stay
    /// consistent with the item table.
    fn checkpoint(
        &self,
        run_id: i64,
        counters: &RunCounters,
        cursor: Option<&str>,
    ) -> Result<RunControl>;

    /// Transition to a terminal status. Never overwrites a status that is
    /// already terminal; in that case only counters and the finish time are
    /// recorded.
    fn finish(
        &self,
        run_id: i64,
        status: RunStatus,
        counters: &RunCounters,
        last_error: Option<&str>,
    ) -> Result<()>;

    /// Set the operator-issued pending-cancel marker. Returns `false` when
    /// the run is already terminal.
    fn request_cancel(&self, run_id: i64) -> Result<bool>;

    fn get_run(&self, run_id: i64) -> Result<Option<Run>>;

    /// Most recent runs, newest first.
    fn recent_runs(&self, limit: usize) -> Result<Vec<Run>>;

    /// Pre-flight duplicate check for a natural key.
    fn item_exists(&self, source_slug: &str, canonical_key: &str) -> Result<bool>;

    /// Idempotent insert. `Ok(false)` is the duplicate-key signal: the
    /// unique pair already exists, and callers must treat it exactly like a
    /// pre-flight `item_exists` hit.
    fn insert_item(&self, item: &DiscoveredItem) -> Result<bool>;

    /// Number of known items for a source.
    fn item_count(&self, source_slug: &str) -> Result<u64>;
}
