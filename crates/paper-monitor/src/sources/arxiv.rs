//! arXiv query-window source.
//!
//! One Atom request per run: categories are OR-ed together, the window goes
//! into a `lastUpdatedDate` range, and the response is capped at
//! `max_total_results`. The Atom feed is parsed with `feed-rs`.

use std::collections::HashSet;

use feed_rs::model::Entry;
use tracing::{debug, error, info, warn};

use super::{FetchOutcome, PaperSource, TimeWindow};
use crate::client::HttpClient;
use crate::config::{ArxivConfig, SourceName, defaults};
use crate::error::{ClientError, ClientResult};
use crate::models::Paper;

const DATE_RANGE_FORMAT: &str = "%Y%m%d%H%M";

/// arXiv source.
#[derive(Debug)]
pub struct ArxivSource {
    client: HttpClient,
    base_url: String,
    categories: Vec<String>,
    max_results: usize,
    fetch_window_days: i64,
}

impl ArxivSource {
    /// Configure the source from its settings section.
    #[must_use]
    pub fn new(config: &ArxivConfig, fetch_window_days: i64, client: HttpClient) -> Self {
        let max_results = if config.max_total_results == 0 {
            warn!("arXiv max_total_results is 0, using default");
            defaults::ARXIV_MAX_RESULTS
        } else {
            config.max_total_results
        };

        let categories: Vec<String> = config
            .categories
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();

        Self { client, base_url: config.base_url.clone(), categories, max_results, fetch_window_days }
    }

    async fn request(&self, window: &TimeWindow) -> ClientResult<ArxivFeed> {
        let params = vec![
            ("search_query".to_string(), build_search_query(&self.categories, window)),
            ("start".to_string(), "0".to_string()),
            ("max_results".to_string(), self.max_results.to_string()),
            ("sortBy".to_string(), "lastUpdatedDate".to_string()),
            ("sortOrder".to_string(), "descending".to_string()),
        ];
        debug!(query = %params[0].1, max_results = self.max_results, "Querying arXiv");

        let body = self.client.get_text(&self.base_url, &params).await?;
        parse_arxiv_feed(&body)
    }
}

#[async_trait::async_trait]
impl PaperSource for ArxivSource {
    fn name(&self) -> SourceName {
        SourceName::Arxiv
    }

    fn tag(&self) -> &'static str {
        SourceName::Arxiv.as_str()
    }

    fn fetch_window_days(&self) -> i64 {
        self.fetch_window_days
    }

    async fn fetch(&self, window: &TimeWindow) -> FetchOutcome {
        if self.categories.is_empty() {
            warn!("No arXiv categories configured, skipping fetch");
            return FetchOutcome::skipped();
        }

        let feed = match self.request(window).await {
            Ok(feed) => feed,
            Err(e) => {
                error!(error = %e, retryable = e.is_retryable(), "arXiv fetch failed");
                return FetchOutcome::failed(e.to_string());
            }
        };

        let returned = feed.entry_count;
        let papers = select_in_window(feed.papers, window);
        info!(returned, kept = papers.len(), "arXiv fetch finished");

        if returned >= self.max_results {
            warn!(
                cap = self.max_results,
                "arXiv returned the maximum number of results; some papers may be missing"
            );
            FetchOutcome::truncated(papers, self.max_results)
        } else {
            FetchOutcome::complete(papers)
        }
    }
}

/// Build the `search_query` value for `categories` over `window`.
#[must_use]
pub fn build_search_query(categories: &[String], window: &TimeWindow) -> String {
    let cats = categories.iter().map(|c| format!("cat:{c}")).collect::<Vec<_>>().join(" OR ");
    format!(
        "({cats}) AND lastUpdatedDate:[{} TO {}]",
        window.start.format(DATE_RANGE_FORMAT),
        window.end.format(DATE_RANGE_FORMAT)
    )
}

/// A parsed arXiv response.
#[derive(Debug, Clone)]
pub struct ArxivFeed {
    /// Normalized papers, in feed order.
    pub papers: Vec<Paper>,
    /// Entries the API returned, including ones that were skipped.
    pub entry_count: usize,
}

/// Parse an arXiv Atom response into papers, in feed order.
///
/// Entries without an update instant are skipped but still counted in
/// [`ArxivFeed::entry_count`]. An arXiv error entry fails the whole response.
///
/// # Errors
///
/// Returns error if the body is not a feed or the API reported an error.
pub fn parse_arxiv_feed(body: &str) -> ClientResult<ArxivFeed> {
    let feed = feed_rs::parser::parse(body.as_bytes())?;
    let entry_count = feed.entries.len();

    let mut papers = Vec::with_capacity(entry_count);
    for entry in feed.entries {
        if entry.id.contains("/api/errors") {
            let message = entry.summary.map(|s| s.content).unwrap_or_default();
            return Err(ClientError::bad_request(collapse_whitespace(&message)));
        }
        papers.extend(entry_to_paper(entry));
    }
    Ok(ArxivFeed { papers, entry_count })
}

fn entry_to_paper(entry: Entry) -> Option<Paper> {
    let Some(updated) = entry.updated else {
        warn!(id = %entry.id, "arXiv entry has no update time, skipping");
        return None;
    };

    let id = short_id(&entry.id);
    let title = entry.title.map(|t| collapse_whitespace(&t.content)).unwrap_or_default();
    let summary = entry.summary.map(|s| collapse_whitespace(&s.content)).unwrap_or_default();
    let authors = entry.authors.into_iter().map(|p| p.name.trim().to_string()).collect();
    let url = abs_url(&entry.id, &entry.links);
    let categories = entry.categories.into_iter().map(|c| c.term);

    Some(
        Paper::new(id, title, SourceName::Arxiv.as_str(), updated)
            .with_abstract(summary)
            .with_authors(authors)
            .with_url(url)
            .with_categories(categories),
    )
}

/// Short id with version, e.g. `2401.00001v1` from `http://arxiv.org/abs/2401.00001v1`.
fn short_id(entry_id: &str) -> String {
    entry_id.rsplit_once("/abs/").map_or(entry_id, |(_, id)| id).trim().to_string()
}

fn abs_url(entry_id: &str, links: &[feed_rs::model::Link]) -> String {
    if entry_id.starts_with("http") {
        return entry_id.to_string();
    }
    links
        .iter()
        .find(|l| l.rel.as_deref() == Some("alternate"))
        .or_else(|| links.first())
        .map(|l| l.href.clone())
        .unwrap_or_default()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn select_in_window(records: Vec<Paper>, window: &TimeWindow) -> Vec<Paper> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|p| window.contains(p.timestamp()))
        .filter(|p| seen.insert(p.id().to_string()))
        .collect()
}
