//! Run lifecycle: status state machine, parameters, and counters.

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{AppError, Result};

/// Lifecycle state of a run.
///
/// `Pending → Running → {Completed | Cancelled | Failed}`; no transition
/// leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

/// Operator-supplied parameters for one run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunParams {
    /// Cap on newly discovered items; `None` means unlimited
    pub max_items: Option<u32>,

    /// Inclusive lower bound on candidate last-modified date
    pub date_from: Option<NaiveDate>,

    /// Inclusive upper bound on candidate last-modified date
    pub date_to: Option<NaiveDate>,

    /// Check everything, write nothing
    pub dry_run: bool,
}

impl RunParams {
    /// Validate parameter combinations before a run is created.
    pub fn validate(&self) -> Result<()> {
        if self.max_items == Some(0) {
            return Err(AppError::config("max_items must be a positive integer"));
        }
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if from > to {
                return Err(AppError::InvalidDateRange { from, to });
            }
        }
        Ok(())
    }

    /// Inclusive date-range test. Candidates with an unknown date pass.
    pub fn in_range(&self, date: Option<NaiveDate>) -> bool {
        let Some(date) = date else { return true };
        if self.date_from.is_some_and(|from| date < from) {
            return false;
        }
        if self.date_to.is_some_and(|to| date > to) {
            return false;
        }
        true
    }

    /// Whether the discovery cap has been reached.
    pub fn cap_reached(&self, discovered: u64) -> bool {
        self.max_items.is_some_and(|cap| discovered >= u64::from(cap))
    }
}

/// Why a candidate was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    OutOfRange,
    Duplicate,
    QueueRejected,
}

/// Progress counters for a run. Monotonically non-decreasing.
///
/// Only the four totals are persisted; the per-reason breakdown feeds the
/// final report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub discovered: u64,
    pub queued: u64,
    pub skipped: u64,
    pub errored: u64,
    pub out_of_range: u64,
    pub duplicate: u64,
    pub queue_rejected: u64,
}

impl RunCounters {
    pub fn record_skip(&mut self, reason: SkipReason) {
        self.skipped += 1;
        match reason {
            SkipReason::OutOfRange => self.out_of_range += 1,
            SkipReason::Duplicate => self.duplicate += 1,
            SkipReason::QueueRejected => self.queue_rejected += 1,
        }
    }
}

/// One invocation of the pipeline against one source.
#[derive(Debug, Clone)]
pub struct Run {
    /// Store identifier; `None` until persisted (dry runs never are)
    pub id: Option<i64>,
    pub source_slug: String,
    pub status: RunStatus,
    pub params: RunParams,
    pub counters: RunCounters,
    /// Last page cursor written at a checkpoint, for post-mortems
    pub cursor: Option<String>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Run {
    pub fn new(source_slug: impl Into<String>, params: RunParams) -> Self {
        Self {
            id: None,
            source_slug: source_slug.into(),
            status: RunStatus::Pending,
            params,
            counters: RunCounters::default(),
            cursor: None,
            last_error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }
}

/// Final result handed back to the CLI shell.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run: Run,
}

impl RunReport {
    /// Process exit code for the terminal state. A reached cap and a
    /// cooperative cancellation are both success.
    pub fn exit_code(&self) -> i32 {
        match self.run.status {
            RunStatus::Failed => 1,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            RunStatus::Pending,
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Cancelled,
            RunStatus::Failed,
        ] {
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RunStatus::parse("bogus"), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
    }

    #[test]
    fn test_params_reject_zero_cap() {
        let params = RunParams {
            max_items: Some(0),
            ..RunParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_params_reject_inverted_range() {
        let params = RunParams {
            date_from: Some(date("2025-01-01")),
            date_to: Some(date("2024-01-01")),
            ..RunParams::default()
        };
        assert!(matches!(
            params.validate(),
            Err(AppError::InvalidDateRange { .. })
        ));
    }

    #[test]
    fn test_in_range_is_inclusive() {
        let params = RunParams {
            date_from: Some(date("2024-01-01")),
            date_to: Some(date("2024-12-31")),
            ..RunParams::default()
        };
        assert!(params.in_range(Some(date("2024-01-01"))));
        assert!(params.in_range(Some(date("2024-12-31"))));
        assert!(!params.in_range(Some(date("2023-12-31"))));
        assert!(!params.in_range(Some(date("2025-01-01"))));
        // Unknown dates pass through
        assert!(params.in_range(None));
    }

    #[test]
    fn test_half_open_bounds() {
        let from_only = RunParams {
            date_from: Some(date("2024-06-01")),
            ..RunParams::default()
        };
        assert!(from_only.in_range(Some(date("2030-01-01"))));
        assert!(!from_only.in_range(Some(date("2024-05-31"))));

        let to_only = RunParams {
            date_to: Some(date("2024-06-01")),
            ..RunParams::default()
        };
        assert!(to_only.in_range(Some(date("1990-01-01"))));
        assert!(!to_only.in_range(Some(date("2024-06-02"))));
    }

    #[test]
    fn test_cap_reached() {
        let params = RunParams {
            max_items: Some(3),
            ..RunParams::default()
        };
        assert!(!params.cap_reached(2));
        assert!(params.cap_reached(3));
        assert!(RunParams::default().cap_reached(u64::MAX) == false);
    }

    #[test]
    fn test_skip_breakdown_sums_to_total() {
        let mut counters = RunCounters::default();
        counters.record_skip(SkipReason::OutOfRange);
        counters.record_skip(SkipReason::Duplicate);
        counters.record_skip(SkipReason::Duplicate);
        counters.record_skip(SkipReason::QueueRejected);
        assert_eq!(counters.skipped, 4);
        assert_eq!(
            counters.out_of_range + counters.duplicate + counters.queue_rejected,
            counters.skipped
        );
    }

    #[test]
    fn test_report_exit_code() {
        let mut run = Run::new("demo", RunParams::default());
        run.status = RunStatus::Completed;
        assert_eq!(RunReport { run: run.clone() }.exit_code(), 0);
        run.status = RunStatus::Cancelled;
        assert_eq!(RunReport { run: run.clone() }.exit_code(), 0);
        run.status = RunStatus::Failed;
        assert_eq!(RunReport { run }.exit_code(), 1);
    }
}
