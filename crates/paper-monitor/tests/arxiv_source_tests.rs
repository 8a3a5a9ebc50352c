//! Mock-based tests for the arXiv query-window source.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use paper_monitor::config::{Config, SourceName};
use paper_monitor::models::FetchStatus;
use paper_monitor::pacing::RecordingSleeper;
use paper_monitor::sources::{PaperSource, Source, TimeWindow};

fn entry(id: &str, updated: &str, title: &str) -> String {
    format!(
        r#"  <entry>
    <id>http://arxiv.org/abs/{id}</id>
    <updated>{updated}</updated>
    <published>{updated}</published>
    <title>{title}</title>
    <summary>Abstract of {title}.</summary>
    <author><name>Ada Lovelace</name></author>
    <link href="http://arxiv.org/abs/{id}" rel="alternate" type="text/html"/>
    <category term="cs.LG" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
"#
    )
}

fn feed(entries: &[String]) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>arXiv Query</title>
  <id>http://arxiv.org/api/query</id>
  <updated>2024-01-02T00:00:00Z</updated>
{}</feed>"#,
        entries.concat()
    )
}

fn window() -> TimeWindow {
    TimeWindow::new(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
    )
}

fn arxiv_source(config: &Config) -> Source {
    Source::from_config(SourceName::Arxiv, config, Arc::new(RecordingSleeper::new())).unwrap()
}

fn config_with_categories(server: &MockServer, categories: &[&str]) -> Config {
    let mut config = Config::for_testing(&server.uri());
    config.sources.arxiv.categories = categories.iter().map(|c| (*c).to_string()).collect();
    config
}

#[tokio::test]
async fn test_versions_are_distinct_and_window_enforced() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/query"))
        .respond_with(ResponseTemplate::new(200).set_body_string(feed(&[
            entry("2401.00001v2", "2024-01-01T12:00:00Z", "X second version"),
            entry("2401.00001v1", "2024-01-01T10:00:00Z", "X first version"),
            entry("2312.09999v1", "2023-12-30T10:00:00Z", "Y outside"),
        ])))
        .mount(&mock_server)
        .await;

    let source = arxiv_source(&config_with_categories(&mock_server, &["cs.LG"]));
    let outcome = source.fetch(&window()).await;

    assert_eq!(outcome.status, FetchStatus::Complete);
    let ids: Vec<&str> = outcome.papers.iter().map(|p| p.id()).collect();
    assert_eq!(ids, ["2401.00001v2", "2401.00001v1"]);
    assert!(outcome.papers.iter().all(|p| window().contains(p.timestamp())));
}

#[tokio::test]
async fn test_query_parameters() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/query"))
        .and(query_param(
            "search_query",
            "(cat:cs.AI OR cat:cs.LG) AND lastUpdatedDate:[202401010000 TO 202401020000]",
        ))
        .and(query_param("start", "0"))
        .and(query_param("max_results", "500"))
        .and(query_param("sortBy", "lastUpdatedDate"))
        .and(query_param("sortOrder", "descending"))
        .respond_with(ResponseTemplate::new(200).set_body_string(feed(&[])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let source = arxiv_source(&config_with_categories(&mock_server, &["cs.AI", "cs.LG"]));
    let outcome = source.fetch(&window()).await;

    assert_eq!(outcome.status, FetchStatus::Complete);
    assert!(outcome.papers.is_empty());
}

#[tokio::test]
async fn test_duplicate_ids_first_occurrence_wins() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/query"))
        .respond_with(ResponseTemplate::new(200).set_body_string(feed(&[
            entry("2401.00002v1", "2024-01-01T12:00:00Z", "First copy"),
            entry("2401.00002v1", "2024-01-01T11:00:00Z", "Second copy"),
        ])))
        .mount(&mock_server)
        .await;

    let source = arxiv_source(&config_with_categories(&mock_server, &["cs.LG"]));
    let outcome = source.fetch(&window()).await;

    assert_eq!(outcome.papers.len(), 1);
    assert_eq!(outcome.papers[0].title(), "First copy");
}

#[tokio::test]
async fn test_cap_reached_is_reported_as_truncation() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/query"))
        .and(query_param("max_results", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(feed(&[
            entry("2401.00003v1", "2024-01-01T12:00:00Z", "A"),
            entry("2401.00004v1", "2024-01-01T11:00:00Z", "B"),
        ])))
        .mount(&mock_server)
        .await;

    let mut config = config_with_categories(&mock_server, &["cs.LG"]);
    config.sources.arxiv.max_total_results = 2;
    let outcome = arxiv_source(&config).fetch(&window()).await;

    assert_eq!(outcome.status, FetchStatus::Truncated { cap: 2 });
    assert_eq!(outcome.papers.len(), 2);
}

#[tokio::test]
async fn test_cap_counts_entries_skipped_during_parsing() {
    let mock_server = MockServer::start().await;
    let undated = r#"  <entry>
    <id>http://arxiv.org/abs/2401.00005v1</id>
    <title>Undated</title>
    <summary>No timestamps.</summary>
  </entry>
"#
    .to_string();

    Mock::given(method("GET"))
        .and(path("/api/query"))
        .respond_with(ResponseTemplate::new(200).set_body_string(feed(&[
            entry("2401.00003v1", "2024-01-01T12:00:00Z", "A"),
            undated,
        ])))
        .mount(&mock_server)
        .await;

    let mut config = config_with_categories(&mock_server, &["cs.LG"]);
    config.sources.arxiv.max_total_results = 2;
    let outcome = arxiv_source(&config).fetch(&window()).await;

    assert_eq!(outcome.status, FetchStatus::Truncated { cap: 2 });
    assert_eq!(outcome.papers.len(), 1);
    assert_eq!(outcome.papers[0].id(), "2401.00003v1");
}

#[tokio::test]
async fn test_no_categories_issues_no_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(feed(&[])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let source = arxiv_source(&config_with_categories(&mock_server, &[]));
    let outcome = source.fetch(&window()).await;

    assert_eq!(outcome.status, FetchStatus::Skipped);
    assert!(outcome.papers.is_empty());
}

#[tokio::test]
async fn test_server_error_yields_failed_empty_outcome() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/query"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&mock_server)
        .await;

    let source = arxiv_source(&config_with_categories(&mock_server, &["cs.LG"]));
    let outcome = source.fetch(&window()).await;

    assert!(outcome.status.is_failure());
    assert!(outcome.papers.is_empty());
}

#[tokio::test]
async fn test_garbage_body_yields_failed_outcome() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/query"))
        .respond_with(ResponseTemplate::new(200).set_body_string("definitely not xml"))
        .mount(&mock_server)
        .await;

    let source = arxiv_source(&config_with_categories(&mock_server, &["cs.LG"]));
    let outcome = source.fetch(&window()).await;

    assert!(outcome.status.is_failure());
    assert!(outcome.papers.is_empty());
}
