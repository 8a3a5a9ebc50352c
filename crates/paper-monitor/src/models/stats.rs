//! Per-run statistics handed to downstream delivery.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// How a single source fetch ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchStatus {
    /// Every in-window record was retrieved.
    Complete,
    /// The result cap was hit; some in-window records may be missing.
    Truncated {
        /// Cap that was reached.
        cap: usize,
    },
    /// Nothing to fetch (no categories configured).
    Skipped,
    /// The fetch failed and contributed no papers.
    Failed {
        /// What went wrong.
        reason: String,
    },
}

impl FetchStatus {
    /// Create a failed status.
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed { reason: reason.into() }
    }

    /// Returns true if the source failed.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Returns true if the result may be missing in-window records.
    #[must_use]
    pub const fn is_truncated(&self) -> bool {
        matches!(self, Self::Truncated { .. })
    }
}

/// Statistics for one source in one run.
#[derive(Debug, Clone, Serialize)]
pub struct SourceStats {
    /// Source tag.
    pub name: String,
    /// Papers the source returned.
    pub fetched: usize,
    /// Papers from this source judged relevant.
    pub relevant: usize,
    /// Window start (inclusive).
    pub window_start: DateTime<Utc>,
    /// Window end (inclusive).
    pub window_end: DateTime<Utc>,
    /// Window length in days.
    pub window_days: i64,
    /// How the fetch ended.
    pub status: FetchStatus,
}

/// Statistics for a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    /// Per-source statistics, in fetch order.
    pub sources: Vec<SourceStats>,
    /// Papers fetched across all sources.
    pub total_fetched: usize,
    /// Papers judged relevant.
    pub total_relevant: usize,
    /// Wall-clock duration of the run.
    pub run_duration_secs: f64,
    /// Relevance method that ran.
    pub checking_method: String,
    /// When the run finished.
    pub run_completed_time: DateTime<Utc>,
}

impl RunStats {
    /// Sources whose fetch failed.
    pub fn failed_sources(&self) -> impl Iterator<Item = &SourceStats> {
        self.sources.iter().filter(|s| s.status.is_failure())
    }
}
