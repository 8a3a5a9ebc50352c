//! Source strategies: one per catalog.
//!
//! Each strategy turns a [`TimeWindow`] into a [`FetchOutcome`]. Fetching never
//! returns an error; transport and decode failures are logged and reported
//! through [`FetchStatus::Failed`] with no papers attached.

mod arxiv;
mod rxiv;

pub use arxiv::{ArxivFeed, ArxivSource, build_search_query, parse_arxiv_feed};
pub use rxiv::{RxivServer, RxivSource};

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::client::{HttpClient, RetryMode};
use crate::config::{Config, SourceName};
use crate::error::ClientResult;
use crate::models::{FetchStatus, Paper};
use crate::pacing::SharedSleeper;

/// Inclusive time window `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    /// Window start (inclusive).
    pub start: DateTime<Utc>,
    /// Window end (inclusive).
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Create a window; a reversed pair is swapped.
    #[must_use]
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        if start <= end { Self { start, end } } else { Self { start: end, end: start } }
    }

    /// Window of `days` days ending at `end`, clamped to the earliest
    /// representable instant.
    #[must_use]
    pub fn ending_at(end: DateTime<Utc>, days: i64) -> Self {
        let start = Duration::try_days(days)
            .and_then(|span| end.checked_sub_signed(span))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self::new(start, end)
    }

    /// Whether `instant` lies inside the window.
    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }

    /// Whether `day` overlaps the window at day granularity.
    #[must_use]
    pub fn contains_day(&self, day: NaiveDate) -> bool {
        self.start.date_naive() <= day && day <= self.end.date_naive()
    }
}

/// Papers from one fetch call plus how the call ended.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Unique papers, in arrival order.
    pub papers: Vec<Paper>,
    /// Completion status.
    pub status: FetchStatus,
}

impl FetchOutcome {
    /// All in-window records retrieved.
    #[must_use]
    pub const fn complete(papers: Vec<Paper>) -> Self {
        Self { papers, status: FetchStatus::Complete }
    }

    /// Cap hit; records may be missing.
    #[must_use]
    pub const fn truncated(papers: Vec<Paper>, cap: usize) -> Self {
        Self { papers, status: FetchStatus::Truncated { cap } }
    }

    /// Nothing requested.
    #[must_use]
    pub const fn skipped() -> Self {
        Self { papers: Vec::new(), status: FetchStatus::Skipped }
    }

    /// Fetch failed; no papers.
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self { papers: Vec::new(), status: FetchStatus::failed(reason) }
    }
}

/// A catalog the pipeline can fetch from.
#[async_trait::async_trait]
pub trait PaperSource: Send + Sync {
    /// Configured source name.
    fn name(&self) -> SourceName;

    /// Tag stored on produced papers.
    fn tag(&self) -> &'static str;

    /// Days of history fetched per run.
    fn fetch_window_days(&self) -> i64;

    /// Fetch every paper in `window`, each once.
    async fn fetch(&self, window: &TimeWindow) -> FetchOutcome;
}

/// The closed set of source strategies.
#[derive(Debug)]
pub enum Source {
    /// Query-window strategy.
    Arxiv(ArxivSource),
    /// Cursor-pagination strategy.
    Rxiv(RxivSource),
}

impl Source {
    /// Build the strategy for `name` from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn from_config(name: SourceName, config: &Config, sleeper: SharedSleeper) -> ClientResult<Self> {
        let client = HttpClient::new(&config.http, RetryMode::Transient, None)?;
        let window_days = config.fetch_window_days(name);
        Ok(match name {
            SourceName::Arxiv => Self::Arxiv(ArxivSource::new(&config.sources.arxiv, window_days, client)),
            SourceName::Biorxiv => Self::Rxiv(RxivSource::new(
                name,
                &config.sources.biorxiv,
                window_days,
                client,
                sleeper,
            )),
            SourceName::Medrxiv => Self::Rxiv(RxivSource::new(
                name,
                &config.sources.medrxiv,
                window_days,
                client,
                sleeper,
            )),
        })
    }
}

#[async_trait::async_trait]
impl PaperSource for Source {
    fn name(&self) -> SourceName {
        match self {
            Self::Arxiv(s) => s.name(),
            Self::Rxiv(s) => s.name(),
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            Self::Arxiv(s) => s.tag(),
            Self::Rxiv(s) => s.tag(),
        }
    }

    fn fetch_window_days(&self) -> i64 {
        match self {
            Self::Arxiv(s) => s.fetch_window_days(),
            Self::Rxiv(s) => s.fetch_window_days(),
        }
    }

    async fn fetch(&self, window: &TimeWindow) -> FetchOutcome {
        match self {
            Self::Arxiv(s) => s.fetch(window).await,
            Self::Rxiv(s) => s.fetch(window).await,
        }
    }
}
