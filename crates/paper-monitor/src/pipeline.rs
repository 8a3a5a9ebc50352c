//! Pipeline orchestrator.
//!
//! Fetches every configured source one after another, isolates per-source
//! failures, runs the single configured relevance strategy over the result
//! and assembles run statistics.

use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::RelevanceResult;
use crate::models::{Paper, RunStats, SourceStats};
use crate::pacing::SharedSleeper;
use crate::relevance::{RelevanceStrategy, SourceBatch};
use crate::sources::{PaperSource, Source, TimeWindow};

/// Relevant papers plus statistics for one run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Papers judged relevant, in fetch order.
    pub relevant: Vec<Paper>,
    /// Run statistics.
    pub stats: RunStats,
}

/// Sources plus one relevance strategy.
pub struct Pipeline {
    sources: Vec<Box<dyn PaperSource>>,
    strategy: RelevanceStrategy,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.sources.iter().map(|s| s.name()).collect();
        f.debug_struct("Pipeline")
            .field("sources", &names)
            .field("method", &self.strategy.method())
            .finish()
    }
}

impl Pipeline {
    /// Create a pipeline from explicit parts.
    #[must_use]
    pub fn new(sources: Vec<Box<dyn PaperSource>>, strategy: RelevanceStrategy) -> Self {
        Self { sources, strategy }
    }

    /// Build the active sources and the configured relevance strategy.
    ///
    /// A source whose client cannot be built is left out with an error log.
    ///
    /// # Errors
    ///
    /// Returns error if the relevance strategy cannot be constructed.
    pub async fn from_config(config: &Config, sleeper: SharedSleeper) -> RelevanceResult<Self> {
        let mut sources: Vec<Box<dyn PaperSource>> = Vec::new();
        for name in config.active_sources() {
            match Source::from_config(name, config, sleeper.clone()) {
                Ok(source) => sources.push(Box::new(source)),
                Err(e) => error!(source = %name, error = %e, "Failed to build source"),
            }
        }
        if sources.is_empty() {
            warn!("No active sources configured");
        }

        let strategy = RelevanceStrategy::from_config(config, sleeper).await?;
        Ok(Self::new(sources, strategy))
    }

    /// Run once with windows ending at `now`.
    pub async fn run(&self, now: DateTime<Utc>) -> RunReport {
        let started = Instant::now();
        let mut stats = Vec::with_capacity(self.sources.len());
        let mut batches = Vec::with_capacity(self.sources.len());

        for source in &self.sources {
            let days = source.fetch_window_days();
            let window = TimeWindow::ending_at(now, days);
            info!(source = %source.name(), start = %window.start, end = %window.end, days, "Fetching papers");

            let outcome = source.fetch(&window).await;
            match &outcome.status {
                status if status.is_failure() => {
                    error!(source = %source.name(), ?status, "Source failed, continuing with the next one");
                }
                status if status.is_truncated() => {
                    warn!(source = %source.name(), fetched = outcome.papers.len(), "Source result may be truncated");
                }
                _ => info!(source = %source.name(), fetched = outcome.papers.len(), "Source fetched"),
            }

            stats.push(SourceStats {
                name: source.tag().to_string(),
                fetched: outcome.papers.len(),
                relevant: 0,
                window_start: window.start,
                window_end: window.end,
                window_days: days,
                status: outcome.status,
            });
            batches.push(SourceBatch { source: source.name(), papers: outcome.papers });
        }

        let total_fetched: usize = stats.iter().map(|s| s.fetched).sum();
        let kept = if total_fetched == 0 {
            info!("No papers fetched, skipping relevance filtering");
            Vec::new()
        } else {
            self.strategy.filter(batches).await
        };

        let mut relevant = Vec::new();
        for (entry, batch) in stats.iter_mut().zip(kept) {
            entry.relevant = batch.papers.len();
            relevant.extend(batch.papers);
        }

        let stats = RunStats {
            total_fetched,
            total_relevant: relevant.len(),
            sources: stats,
            run_duration_secs: started.elapsed().as_secs_f64(),
            checking_method: self.strategy.method().as_str().to_string(),
            run_completed_time: Utc::now(),
        };
        info!(
            fetched = stats.total_fetched,
            relevant = stats.total_relevant,
            method = %stats.checking_method,
            duration_secs = stats.run_duration_secs,
            "Run finished"
        );

        RunReport { relevant, stats }
    }
}
