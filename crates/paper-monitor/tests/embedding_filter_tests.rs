//! Tests for the embedding-similarity relevance filter.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use paper_monitor::config::Config;
use paper_monitor::error::{RelevanceError, RelevanceResult};
use paper_monitor::models::{Paper, Relevance};
use paper_monitor::relevance::{Embedder, EmbeddingFilter, OpenAiEmbedder};

/// Looks texts up in a fixed table; unknown texts fail the whole call.
#[derive(Debug, Default)]
struct TableEmbedder {
    vectors: HashMap<String, Vec<f32>>,
}

impl TableEmbedder {
    fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }
}

#[async_trait::async_trait]
impl Embedder for TableEmbedder {
    async fn embed(&self, texts: &[String]) -> RelevanceResult<Vec<Vec<f32>>> {
        texts
            .iter()
            .map(|t| self.vectors.get(t).cloned().ok_or_else(|| RelevanceError::embedding(format!("unknown text: {t}"))))
            .collect()
    }
}

fn paper(id: &str, abs: Option<&str>) -> Paper {
    let paper = Paper::new(id, format!("Title {id}"), "arxiv", Utc::now());
    match abs {
        Some(text) => paper.with_abstract(text),
        None => paper,
    }
}

fn targets() -> Vec<String> {
    vec!["target one".to_string(), "target two".to_string()]
}

fn scenario_embedder() -> TableEmbedder {
    TableEmbedder::default()
        .with("target one", vec![1.0, 0.0, 0.0])
        .with("target two", vec![0.0, 1.0, 0.0])
        .with("close to two", vec![0.1, 0.75, 0.4275_f32.sqrt()])
        .with("far from both", vec![0.0, 0.0, 1.0])
}

#[tokio::test]
async fn test_best_target_and_score_are_recorded() {
    let filter = EmbeddingFilter::configure(Box::new(scenario_embedder()), 0.3, targets()).await;
    assert!(filter.is_ready());

    let kept = filter.filter(vec![paper("a", Some("close to two")), paper("b", Some("far from both"))]).await;

    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].id(), "a");
    match kept[0].relevance() {
        Some(Relevance::SimilarityMatch { similarity_score, matched_target }) => {
            assert!((similarity_score - 0.75).abs() < 1e-5);
            assert_eq!(matched_target, "target two");
        }
        other => panic!("expected similarity annotation, got {other:?}"),
    }
}

#[tokio::test]
async fn test_threshold_is_inclusive_lower_bound() {
    let embedder = TableEmbedder::default().with("target", vec![1.0, 0.0]).with("exact", vec![1.0, 0.0]);
    let filter = EmbeddingFilter::configure(Box::new(embedder), 1.0, vec!["target".to_string()]).await;

    let kept = filter.filter(vec![paper("a", Some("exact"))]).await;
    assert_eq!(kept.len(), 1);
}

#[tokio::test]
async fn test_papers_without_abstract_are_skipped() {
    let filter = EmbeddingFilter::configure(Box::new(scenario_embedder()), 0.0, targets()).await;

    let kept = filter.filter(vec![paper("a", None), paper("b", Some("close to two"))]).await;
    let ids: Vec<&str> = kept.iter().map(|p| p.id()).collect();
    assert_eq!(ids, ["b"]);
}

#[tokio::test]
async fn test_abstract_encoding_failure_degrades_to_empty() {
    let filter = EmbeddingFilter::configure(Box::new(scenario_embedder()), 0.0, targets()).await;

    let kept = filter.filter(vec![paper("a", Some("not in the table"))]).await;
    assert!(kept.is_empty());
}

#[tokio::test]
async fn test_target_encoding_failure_disables_filter() {
    let filter = EmbeddingFilter::configure(Box::new(TableEmbedder::default()), 0.0, targets()).await;
    assert!(!filter.is_ready());

    let kept = filter.filter(vec![paper("a", Some("close to two"))]).await;
    assert!(kept.is_empty());
}

#[tokio::test]
async fn test_empty_targets_fall_back_to_default() {
    let embedder = TableEmbedder::default().with("scientific research papers", vec![1.0]);
    let filter = EmbeddingFilter::configure(Box::new(embedder), 0.5, vec!["  ".to_string()]).await;

    assert!(filter.is_ready());
    assert_eq!(filter.targets(), ["scientific research papers"]);
}

#[tokio::test]
async fn test_openai_embedder_batches_and_orders_by_index() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({"input": ["first", "second"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [
                {"object": "embedding", "index": 1, "embedding": [0.0, 1.0]},
                {"object": "embedding", "index": 0, "embedding": [1.0, 0.0]},
            ],
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(body_partial_json(json!({"input": ["third"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"index": 0, "embedding": [0.5, 0.5]}],
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = Config::for_testing(&mock_server.uri());
    config.relevance.embedding.batch_size = 2;
    let embedder =
        OpenAiEmbedder::new(&config.relevance.embedding, &config.http, config.embedding_api_key.as_deref()).unwrap();

    let texts = vec!["first".to_string(), "second".to_string(), "third".to_string()];
    let vectors = embedder.embed(&texts).await.unwrap();
    assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]]);
}

#[tokio::test]
async fn test_openai_embedder_error_status_is_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model overloaded"))
        .mount(&mock_server)
        .await;

    let config = Config::for_testing(&mock_server.uri());
    let embedder = OpenAiEmbedder::new(&config.relevance.embedding, &config.http, None).unwrap();

    let result = embedder.embed(&["text".to_string()]).await;
    assert!(matches!(result, Err(RelevanceError::Client(_))));
}
