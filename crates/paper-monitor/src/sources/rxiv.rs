//! bioRxiv/medRxiv cursor-pagination source.
//!
//! The details endpoint serves a date range a page at a time:
//! `{base}/details/{server}/{start}/{end}/{cursor}/json`. The first entry of
//! `messages` carries the cursor, page count and total; `collection` holds the
//! records. Counters may arrive as numbers or numeric strings.

use std::collections::HashSet;
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::{FetchOutcome, PaperSource, TimeWindow};
use crate::client::HttpClient;
use crate::config::{RxivConfig, SourceName, defaults};
use crate::models::Paper;
use crate::pacing::SharedSleeper;

/// Which preprint server the endpoint is asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxivServer {
    /// bioRxiv
    Biorxiv,
    /// medRxiv
    Medrxiv,
}

impl RxivServer {
    /// Server for a settings section, honoring a `server` override.
    ///
    /// An unrecognized override falls back to the section's own server.
    #[must_use]
    pub fn resolve(section: SourceName, server: Option<&str>) -> Self {
        let default = match section {
            SourceName::Medrxiv => Self::Medrxiv,
            _ => Self::Biorxiv,
        };
        match server.map(|s| s.trim().to_lowercase()) {
            None => default,
            Some(s) if s == "biorxiv" => Self::Biorxiv,
            Some(s) if s == "medrxiv" => Self::Medrxiv,
            Some(other) => {
                warn!(server = %other, fallback = default.as_str(), "Invalid rxiv server, using fallback");
                default
            }
        }
    }

    /// Path segment and paper source tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Biorxiv => "biorxiv",
            Self::Medrxiv => "medrxiv",
        }
    }
}

/// bioRxiv/medRxiv source.
#[derive(Debug)]
pub struct RxivSource {
    name: SourceName,
    client: HttpClient,
    base_url: String,
    server: RxivServer,
    categories: Vec<String>,
    page_size: usize,
    max_results: Option<usize>,
    page_delay: Duration,
    fetch_window_days: i64,
    sleeper: SharedSleeper,
}

impl RxivSource {
    /// Configure the source from its settings section.
    #[must_use]
    pub fn new(
        name: SourceName,
        config: &RxivConfig,
        fetch_window_days: i64,
        client: HttpClient,
        sleeper: SharedSleeper,
    ) -> Self {
        let page_size = if config.page_size == 0 {
            warn!(source = %name, "page_size is 0, using default");
            defaults::RXIV_PAGE_SIZE
        } else {
            config.page_size
        };

        Self {
            name,
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            server: RxivServer::resolve(name, config.server.as_deref()),
            categories: config
                .categories
                .iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
            page_size,
            max_results: config.max_total_results.filter(|cap| *cap > 0),
            page_delay: Duration::from_millis(config.page_delay_ms),
            fetch_window_days,
            sleeper,
        }
    }

    /// The server this source queries.
    #[must_use]
    pub const fn server(&self) -> RxivServer {
        self.server
    }

    fn page_url(&self, window: &TimeWindow, cursor: u64) -> String {
        format!(
            "{}/details/{}/{}/{}/{}/json",
            self.base_url,
            self.server.as_str(),
            window.start.format("%Y-%m-%d"),
            window.end.format("%Y-%m-%d"),
            cursor
        )
    }

    /// `category` query value: names joined by `;`, spaces as underscores.
    fn category_params(&self) -> Vec<(String, String)> {
        if self.categories.is_empty() {
            return Vec::new();
        }
        let joined = self.categories.iter().map(|c| c.replace(' ', "_")).collect::<Vec<_>>().join(";");
        vec![("category".to_string(), joined)]
    }
}

#[async_trait::async_trait]
impl PaperSource for RxivSource {
    fn name(&self) -> SourceName {
        self.name
    }

    fn tag(&self) -> &'static str {
        self.server.as_str()
    }

    fn fetch_window_days(&self) -> i64 {
        self.fetch_window_days
    }

    async fn fetch(&self, window: &TimeWindow) -> FetchOutcome {
        let params = self.category_params();
        let mut pagination = Pagination::new(self.page_size, self.max_results);
        let mut pages = 0usize;

        let reason = loop {
            let url = self.page_url(window, pagination.cursor);
            let page: DetailsPage = match self.client.get_json(&url, &params).await {
                Ok(page) => page,
                Err(e) => {
                    error!(
                        server = self.server.as_str(),
                        cursor = pagination.cursor,
                        error = %e,
                        retryable = e.is_retryable(),
                        "Page fetch failed"
                    );
                    return FetchOutcome::failed(e.to_string());
                }
            };
            pages += 1;

            if let Some(reason) = pagination.absorb(page, window, self.server) {
                break reason;
            }
            self.sleeper.sleep(self.page_delay).await;
        };

        info!(
            server = self.server.as_str(),
            pages,
            accepted = pagination.accepted.len(),
            ?reason,
            "Pagination finished"
        );

        match (reason, self.max_results) {
            (StopReason::CapReached, Some(cap)) => {
                warn!(server = self.server.as_str(), cap, "Result cap reached; some papers may be missing");
                FetchOutcome::truncated(pagination.accepted, cap)
            }
            _ => FetchOutcome::complete(pagination.accepted),
        }
    }
}

/// Why pagination stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    /// A page held no records.
    EmptyPage,
    /// A page held fewer records than the page size.
    ShortPage,
    /// The next cursor would not advance.
    CursorStalled,
    /// Unique records seen reached the declared total.
    TotalReached,
    /// Accepted papers reached the result cap.
    CapReached,
}

/// Loop-local pagination state, threaded through each page.
#[derive(Debug)]
struct Pagination {
    cursor: u64,
    page_size: usize,
    cap: Option<usize>,
    total: Option<u64>,
    seen: HashSet<String>,
    accepted: Vec<Paper>,
}

impl Pagination {
    fn new(page_size: usize, cap: Option<usize>) -> Self {
        Self { cursor: 0, page_size, cap, total: None, seen: HashSet::new(), accepted: Vec::new() }
    }

    /// Fold one page into the state; returns why to stop, or `None` to fetch the next page.
    fn absorb(&mut self, page: DetailsPage, window: &TimeWindow, server: RxivServer) -> Option<StopReason> {
        let message = page.message();
        if self.total.is_none() {
            self.total = message.total;
            debug!(total = ?self.total, "Declared total");
        }

        let received = page.collection.len();
        if received == 0 {
            return Some(StopReason::EmptyPage);
        }

        for (index, raw) in page.collection.into_iter().enumerate() {
            let item: RxivItem = match serde_json::from_value(raw) {
                Ok(item) => item,
                Err(e) => {
                    debug!(error = %e, "Skipping malformed record");
                    continue;
                }
            };
            let Some(doi) = item.doi.as_deref().map(str::trim).filter(|d| !d.is_empty()) else {
                debug!("Skipping record without DOI");
                continue;
            };
            let doi = doi.to_string();
            if !self.seen.insert(doi.clone()) {
                continue;
            }
            if let Some(paper) = item.into_paper(doi, server, window) {
                self.accepted.push(paper);
                if self.cap.is_some_and(|cap| self.accepted.len() >= cap) {
                    let exhausted = if index + 1 == received { self.exhausted(received) } else { None };
                    return Some(exhausted.unwrap_or(StopReason::CapReached));
                }
            }
        }

        let next = message.cursor.unwrap_or(self.cursor) + message.count.unwrap_or(received as u64);
        if next <= self.cursor && received >= self.page_size {
            return Some(StopReason::CursorStalled);
        }
        if let Some(reason) = self.exhausted(received) {
            return Some(reason);
        }

        self.cursor = next;
        None
    }

    /// Whether the server has nothing left after a fully read page of `received` records.
    fn exhausted(&self, received: usize) -> Option<StopReason> {
        if received < self.page_size {
            Some(StopReason::ShortPage)
        } else if self.total.is_some_and(|total| self.seen.len() as u64 >= total) {
            Some(StopReason::TotalReached)
        } else {
            None
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct DetailsPage {
    #[serde(default)]
    messages: Vec<Value>,
    #[serde(default)]
    collection: Vec<Value>,
}

impl DetailsPage {
    fn message(&self) -> PageMessage {
        self.messages
            .first()
            .and_then(|m| serde_json::from_value(m.clone()).ok())
            .unwrap_or_default()
    }
}

#[derive(Debug, Default, Deserialize)]
struct PageMessage {
    #[serde(default, deserialize_with = "lenient_u64")]
    cursor: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    count: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    total: Option<u64>,
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }))
}

#[derive(Debug, Deserialize)]
struct RxivItem {
    doi: Option<String>,
    title: Option<String>,
    authors: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    date: Option<String>,
    category: Option<String>,
}

impl RxivItem {
    fn into_paper(self, doi: String, server: RxivServer, window: &TimeWindow) -> Option<Paper> {
        let raw_date = self.date.unwrap_or_default();
        let Ok(date) = NaiveDate::parse_from_str(raw_date.trim(), "%Y-%m-%d") else {
            debug!(%doi, date = %raw_date, "Skipping record with unparseable date");
            return None;
        };
        if !window.contains_day(date) {
            return None;
        }
        let timestamp = date.and_hms_opt(0, 0, 0)?.and_utc();

        let authors = self
            .authors
            .unwrap_or_default()
            .split(';')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(String::from)
            .collect();
        let url = format!("https://www.{}.org/content/{doi}", server.as_str());
        let categories = self.category.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());

        Some(
            Paper::new(doi, self.title.unwrap_or_default().trim(), server.as_str(), timestamp)
                .with_abstract(self.abstract_text.unwrap_or_default().trim())
                .with_authors(authors)
                .with_url(url)
                .with_categories(categories),
        )
    }
}
