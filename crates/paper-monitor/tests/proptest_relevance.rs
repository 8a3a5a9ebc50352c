//! Property-based tests for relevance strategies.

use std::sync::Arc;

use chrono::Utc;
use proptest::prelude::*;
use serde_json::json;

use paper_monitor::config::ClassifierConfig;
use paper_monitor::error::ClientResult;
use paper_monitor::models::{Paper, Relevance};
use paper_monitor::pacing::RecordingSleeper;
use paper_monitor::relevance::{BatchClassifier, ChatBackend, ChatRequest, KeywordFilter};

/// Answers every request with a fixed number of items, some malformed.
#[derive(Debug)]
struct FixedReplyBackend {
    items: usize,
    malformed_every: usize,
}

#[async_trait::async_trait]
impl ChatBackend for FixedReplyBackend {
    async fn complete(&self, _request: &ChatRequest) -> ClientResult<String> {
        let items: Vec<serde_json::Value> = (0..self.items)
            .map(|i| {
                if self.malformed_every > 0 && i % self.malformed_every == 0 {
                    json!({"is_relevant": "maybe"})
                } else {
                    json!({"is_relevant": true, "confidence": 0.9, "explanation": "ok"})
                }
            })
            .collect();
        Ok(serde_json::Value::Array(items).to_string())
    }
}

fn classifier(items: usize, malformed_every: usize, batch_size: i64) -> BatchClassifier {
    let config = ClassifierConfig {
        batch_size,
        batch_delay_seconds: 0.0,
        rate_limit_backoff_seconds: 0.0,
        ..Default::default()
    };
    BatchClassifier::new(
        Box::new(FixedReplyBackend { items, malformed_every }),
        &config,
        Arc::new(RecordingSleeper::new()),
    )
}

proptest! {
    /// A paper is kept iff some keyword occurs in its text; the annotation lists exactly those keywords.
    #[test]
    fn keyword_annotation_matches_substring_subset(
        keywords in proptest::collection::vec("[a-d]{1,3}", 1..5),
        title in "[a-d ]{0,20}",
        abs in "[a-d ]{0,40}",
    ) {
        let filter = KeywordFilter::new(&keywords);
        let paper = Paper::new("p", title.clone(), "arxiv", Utc::now()).with_abstract(abs.clone());
        let text = paper.search_text();
        let expected: Vec<String> = filter
            .keywords()
            .iter()
            .filter(|k| text.contains(k.as_str()))
            .cloned()
            .collect();

        let kept = filter.filter(vec![paper]).unwrap();
        if expected.is_empty() {
            prop_assert!(kept.is_empty());
        } else {
            prop_assert_eq!(kept.len(), 1);
            let Some(Relevance::KeywordMatch { matched_keywords }) = kept[0].relevance() else {
                return Err(TestCaseError::fail("missing keyword annotation"));
            };
            prop_assert_eq!(matched_keywords, &expected);
        }
    }

    /// classify returns one verdict per abstract whatever the response length.
    #[test]
    fn classifier_emits_one_verdict_per_abstract(
        abstracts in 0usize..40,
        reply_items in 0usize..15,
        malformed_every in 0usize..4,
        batch_size in -2i64..12,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let classifier = classifier(reply_items, malformed_every, batch_size);
        let inputs: Vec<String> = (0..abstracts).map(|i| format!("abstract {i}")).collect();

        let verdicts = runtime.block_on(classifier.classify(&inputs, "relevant?"));
        prop_assert_eq!(verdicts.len(), abstracts);
    }
}
