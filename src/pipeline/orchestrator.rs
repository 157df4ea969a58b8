// src/pipeline/orchestrator.rs

//! Run orchestration.
//!
//! Drives a source adapter through its pages, applies the date filter,
//! consults the idempotency store, promotes new candidates, and observes
//! cooperative cancellation at a checkpoint after every processed candidate.
//! Processing within one run is strictly sequential: the rate limiter
//! already serializes network calls, so serializing local work costs no
//! throughput and removes interleaving bugs.

use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;

use super::rate_limit::RateLimiter;
use crate::error::{AppError, Result};
use crate::models::{
    Candidate, DiscoveredItem, RetryConfig, Run, RunParams, RunReport, RunStatus, SkipReason,
};
use crate::queue::IngestQueue;
use crate::services::{Page, RegisteredSource, SourceRegistry};
use crate::storage::DiscoveryStore;
use crate::utils::url::canonicalize;

/// How the page loop ended.
enum LoopEnd {
    /// Source exhausted, or the discovery cap was reached (both are success)
    Completed,
    /// Cancellation observed at a checkpoint
    Cancelled,
    /// Non-recoverable failure; retries were already exhausted
    Failed(AppError),
}

/// Per-candidate outcome inside the page loop.
enum Processed {
    Continue,
    CapReached,
}

/// Drives one run of the discovery pipeline.
pub struct Orchestrator<'a> {
    store: &'a dyn DiscoveryStore,
    registry: &'a SourceRegistry,
    queue: &'a dyn IngestQueue,
    retry: RetryConfig,
    /// Kill-switch state, captured once at construction and immutable for
    /// the life of every run this orchestrator executes.
    writes_enabled: bool,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        store: &'a dyn DiscoveryStore,
        registry: &'a SourceRegistry,
        queue: &'a dyn IngestQueue,
        retry: RetryConfig,
        writes_enabled: bool,
    ) -> Self {
        Self {
            store,
            registry,
            queue,
            retry,
            writes_enabled,
        }
    }

    /// Execute one run against the given source.
    ///
    /// Returns the final run record for every terminal state, including
    /// `Failed`; `Err` is reserved for pre-flight configuration errors and
    /// store failures that prevent running at all.
    pub async fn execute(&self, source_slug: &str, params: RunParams) -> Result<RunReport> {
        // Safety gate first, before source lookup and before any network or
        // store activity.
        if !params.dry_run && !self.writes_enabled {
            return Err(AppError::KillSwitchDisabled);
        }
        params.validate()?;
        let source = self.registry.get(source_slug)?;

        let mut run = Run::new(source_slug, params);
        if !run.params.dry_run {
            run.id = Some(self.store.create_run(source_slug, &run.params)?);
        }
        if let Some(id) = run.id {
            self.store.mark_running(id)?;
        }
        run.status = RunStatus::Running;
        run.started_at = Some(Utc::now());

        log::info!(
            "run {} against '{}' started{}",
            run.id.map_or_else(|| "-".to_string(), |id| id.to_string()),
            source_slug,
            if run.params.dry_run { " (dry run)" } else { "" }
        );

        let end = self.run_loop(&mut run, source).await;
        let status = match end {
            LoopEnd::Completed => RunStatus::Completed,
            LoopEnd::Cancelled => RunStatus::Cancelled,
            LoopEnd::Failed(e) => {
                log::error!("run against '{}' failed: {}", source_slug, e);
                run.last_error = Some(e.to_string());
                RunStatus::Failed
            }
        };
        run.status = status;
        run.finished_at = Some(Utc::now());

        if let Some(id) = run.id {
            self.store
                .finish(id, status, &run.counters, run.last_error.as_deref())?;
        }

        log::info!(
            "run against '{}' finished: {} ({} discovered, {} queued, {} skipped, {} errored)",
            source_slug,
            status.as_str(),
            run.counters.discovered,
            run.counters.queued,
            run.counters.skipped,
            run.counters.errored
        );
        Ok(RunReport { run })
    }

    async fn run_loop(&self, run: &mut Run, source: &RegisteredSource) -> LoopEnd {
        // Keys promoted by this run. In a real run the store insert would
        // catch a same-run repeat anyway; in a dry run this shadow is what
        // keeps the preview identical to what a real run would report.
        let mut seen_this_run: HashSet<String> = HashSet::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = match self.fetch_page(source, cursor.as_deref(), run).await {
                Ok(page) => page,
                Err(e) => return LoopEnd::Failed(e),
            };

            if page.malformed > 0 {
                run.counters.errored += page.malformed as u64;
                log::warn!(
                    "{}: {} malformed rows on page {}",
                    run.source_slug,
                    page.malformed,
                    cursor.as_deref().unwrap_or("first")
                );
            }

            for candidate in &page.candidates {
                match self.process_candidate(run, candidate, &mut seen_this_run).await {
                    Ok(Processed::Continue) => {}
                    // A reached cap is success, not failure.
                    Ok(Processed::CapReached) => return LoopEnd::Completed,
                    Err(e) => return LoopEnd::Failed(e),
                }

                // Checkpoint: after each fully processed candidate, before
                // the next network call. One status read per iteration.
                if let Some(id) = run.id {
                    match self.store.checkpoint(id, &run.counters, cursor.as_deref()) {
                        Ok(control) if control.should_cancel() => return LoopEnd::Cancelled,
                        Ok(_) => {}
                        Err(e) => return LoopEnd::Failed(e),
                    }
                }
            }

            if page.done || page.next_cursor.is_none() {
                return LoopEnd::Completed;
            }
            cursor = page.next_cursor;
            run.cursor = cursor.clone();
        }
    }

    /// Fetch one page with bounded retries.
    ///
    /// The rate limiter runs before every attempt (each attempt is a network
    /// call against the source); failed attempts additionally back off
    /// exponentially with jitter before the next one.
    async fn fetch_page(
        &self,
        source: &RegisteredSource,
        cursor: Option<&str>,
        run: &Run,
    ) -> Result<Page> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            RateLimiter::wait(&source.policy).await;

            match source.adapter.next_page(cursor).await {
                Ok(page) => return Ok(page),
                Err(e) if attempt < self.retry.max_attempts => {
                    let backoff = self.backoff_delay(attempt);
                    log::warn!(
                        "page fetch failed for '{}' (attempt {}/{}): {}; retrying in {:?}",
                        run.source_slug,
                        attempt,
                        self.retry.max_attempts,
                        e,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    return Err(AppError::fetch(
                        &run.source_slug,
                        format!("retries exhausted after {attempt} attempts: {e}"),
                    ));
                }
            }
        }
    }

    /// Exponential backoff with jitter for the given 1-based attempt,
    /// capped at 30 seconds.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(6);
        let base = self
            .retry
            .base_backoff_ms
            .saturating_mul(1u64 << exp)
            .min(30_000);
        let jitter = if base == 0 {
            0
        } else {
            rand::rng().random_range(0..=250)
        };
        Duration::from_millis(base + jitter)
    }

    /// Apply the per-candidate algorithm, in order, short-circuiting on the
    /// first match: date filter, duplicate check, cap, promote.
    async fn process_candidate(
        &self,
        run: &mut Run,
        candidate: &Candidate,
        seen_this_run: &mut HashSet<String>,
    ) -> Result<Processed> {
        let key = canonicalize(&candidate.url);

        if !run.params.in_range(candidate.last_modified) {
            run.counters.record_skip(SkipReason::OutOfRange);
            return Ok(Processed::Continue);
        }

        if seen_this_run.contains(&key) || self.store.item_exists(&run.source_slug, &key)? {
            run.counters.record_skip(SkipReason::Duplicate);
            return Ok(Processed::Continue);
        }

        if run.params.cap_reached(run.counters.discovered) {
            return Ok(Processed::CapReached);
        }

        let item = DiscoveredItem::backfill(&run.source_slug, key.clone(), run.id);
        if !run.params.dry_run {
            // Losing the insert race to an overlapping run is the same as a
            // pre-flight hit: a duplicate skip, never a failure.
            if !self.store.insert_item(&item)? {
                run.counters.record_skip(SkipReason::Duplicate);
                return Ok(Processed::Continue);
            }
        }
        seen_this_run.insert(key);
        run.counters.discovered += 1;

        if run.params.dry_run {
            // No handoff in a dry run; count what would have been queued.
            run.counters.queued += 1;
        } else {
            match self.queue.enqueue(&item).await {
                Ok(()) => run.counters.queued += 1,
                Err(e) => {
                    log::warn!("queue rejected {}: {}", item.canonical_key, e);
                    run.counters.record_skip(SkipReason::QueueRejected);
                }
            }
        }
        Ok(Processed::Continue)
    }
}
