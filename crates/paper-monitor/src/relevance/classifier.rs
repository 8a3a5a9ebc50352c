//! Batch remote classifier.
//!
//! Abstracts are sent in consecutive chunks; each chunk asks the model for a
//! JSON array with one verdict per abstract. Whatever happens to a chunk, it
//! contributes exactly one verdict per abstract, in order:
//!
//! ```text
//! PENDING -> SENT -> { PARSED | RATE_LIMITED | OVERSIZED | TRANSPORT_ERROR | MALFORMED } -> VERDICTS_EMITTED
//! ```
//!
//! Every terminal state other than `PARSED` emits error verdicts for the whole
//! chunk. `PARSED` pads or truncates to the chunk size and isolates invalid
//! items.

use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use super::chat::{ChatBackend, ChatRequest};
use crate::config::ClassifierConfig;
use crate::error::ClientError;
use crate::models::{Paper, Relevance};
use crate::pacing::SharedSleeper;

/// Completion tokens budgeted per abstract.
pub const TOKENS_PER_ABSTRACT: u32 = 150;

/// Explanation attached to padding verdicts.
pub const SIZE_MISMATCH_EXPLANATION: &str = "LLM response size mismatch.";

/// Explanation attached to oversized-chunk verdicts.
pub const OVERSIZED_EXPLANATION: &str = "Error: Request too large for model. Reduce batch_size.";

/// Why a verdict is error-flavored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictFault {
    /// Response array was shorter than the chunk.
    SizeMismatch,
    /// Array item missing a key or holding the wrong type.
    InvalidItem,
    /// Provider signalled a rate limit.
    RateLimited,
    /// Request was too large for the model.
    Oversized,
    /// Network or provider error.
    Transport,
    /// Response content was not the expected JSON.
    Malformed,
}

/// Classifier output for one abstract.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    /// Model says relevant.
    pub is_relevant: bool,
    /// Model confidence, nominally in `[0, 1]`.
    pub confidence: f64,
    /// Short justification, or what went wrong.
    pub explanation: String,
    /// Set when this verdict stands in for a missing or unusable answer.
    pub fault: Option<VerdictFault>,
}

impl Verdict {
    /// A well-formed model answer.
    #[must_use]
    pub fn answer(is_relevant: bool, confidence: f64, explanation: impl Into<String>) -> Self {
        Self { is_relevant, confidence, explanation: explanation.into(), fault: None }
    }

    /// An error verdict: not relevant, zero confidence.
    #[must_use]
    pub fn error(fault: VerdictFault, explanation: impl Into<String>) -> Self {
        Self { is_relevant: false, confidence: 0.0, explanation: explanation.into(), fault: Some(fault) }
    }

    /// Returns true if this verdict is error-flavored.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.fault.is_some()
    }
}

/// Terminal state of one chunk.
#[derive(Debug)]
enum ChunkOutcome {
    Parsed(Vec<Verdict>),
    RateLimited(Option<Duration>),
    Oversized,
    TransportError(String),
    Malformed(String),
}

impl ChunkOutcome {
    fn from_error(err: ClientError) -> Self {
        match err {
            err @ ClientError::RateLimited { .. } => Self::RateLimited(err.retry_after()),
            ClientError::PayloadTooLarge { .. } => Self::Oversized,
            ClientError::Parse(e) => Self::Malformed(e.to_string()),
            ClientError::Shape(message) => Self::Malformed(message),
            other => Self::TransportError(other.to_string()),
        }
    }

    /// Emit exactly `size` verdicts.
    fn into_verdicts(self, size: usize) -> Vec<Verdict> {
        match self {
            Self::Parsed(verdicts) => verdicts,
            Self::RateLimited(_) => {
                vec![Verdict::error(VerdictFault::RateLimited, "Error: API rate limit hit."); size]
            }
            Self::Oversized => vec![Verdict::error(VerdictFault::Oversized, OVERSIZED_EXPLANATION); size],
            Self::TransportError(message) => {
                vec![Verdict::error(VerdictFault::Transport, format!("Error: API error ({message})")); size]
            }
            Self::Malformed(message) => vec![
                Verdict::error(
                    VerdictFault::Malformed,
                    format!("Error: Failed to parse/validate batch response ({message})")
                );
                size
            ],
        }
    }
}

/// Batch classifier relevance filter.
#[derive(Debug)]
pub struct BatchClassifier {
    backend: Box<dyn ChatBackend>,
    batch_size: usize,
    batch_delay: Duration,
    rate_limit_backoff: Duration,
    prompt: String,
    confidence_threshold: f64,
    sleeper: SharedSleeper,
}

impl BatchClassifier {
    /// Configure the classifier over `backend`.
    #[must_use]
    pub fn new(backend: Box<dyn ChatBackend>, config: &ClassifierConfig, sleeper: SharedSleeper) -> Self {
        let classifier = Self {
            backend,
            batch_size: config.effective_batch_size(),
            batch_delay: config.batch_delay(),
            rate_limit_backoff: config.rate_limit_backoff(),
            prompt: config.prompt.clone(),
            confidence_threshold: config.confidence_threshold,
            sleeper,
        };
        info!(
            batch_size = classifier.batch_size,
            batch_delay = ?classifier.batch_delay,
            "Batch classifier configured"
        );
        classifier
    }

    /// Abstracts per request.
    #[must_use]
    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// One verdict per abstract, in input order.
    pub async fn classify(&self, abstracts: &[String], prompt: &str) -> Vec<Verdict> {
        if abstracts.is_empty() {
            return Vec::new();
        }

        let chunks: Vec<&[String]> = abstracts.chunks(self.batch_size).collect();
        let total_chunks = chunks.len();
        info!(abstracts = abstracts.len(), chunks = total_chunks, "Classifying abstracts");

        let mut verdicts = Vec::with_capacity(abstracts.len());
        for (index, chunk) in chunks.into_iter().enumerate() {
            let number = index + 1;
            debug!(chunk = number, total = total_chunks, size = chunk.len(), "Sending chunk");

            let outcome = self.send_chunk(chunk, prompt).await;
            let backoff = match &outcome {
                ChunkOutcome::RateLimited(hint) => {
                    Some(hint.map_or(self.rate_limit_backoff, |h| h.max(self.rate_limit_backoff)))
                }
                _ => None,
            };
            log_outcome(number, &outcome);
            verdicts.extend(outcome.into_verdicts(chunk.len()));

            if number < total_chunks {
                if let Some(backoff) = backoff {
                    warn!(chunk = number, ?backoff, "Rate limited, backing off");
                    self.sleeper.sleep(backoff).await;
                } else {
                    self.sleeper.sleep(self.batch_delay).await;
                }
            }
        }

        if verdicts.len() != abstracts.len() {
            error!(expected = abstracts.len(), got = verdicts.len(), "Verdict count mismatch");
        }
        verdicts
    }

    async fn send_chunk(&self, chunk: &[String], prompt: &str) -> ChunkOutcome {
        let request = ChatRequest {
            system: system_prompt(chunk.len()),
            user: user_message(chunk, prompt),
            max_tokens: TOKENS_PER_ABSTRACT.saturating_mul(u32::try_from(chunk.len()).unwrap_or(u32::MAX)),
        };

        match self.backend.complete(&request).await {
            Ok(content) => parse_chunk_response(&content, chunk.len()),
            Err(e) => ChunkOutcome::from_error(e),
        }
    }

    /// Keep papers with a relevant verdict at or above the confidence threshold.
    ///
    /// Papers without an abstract are not sent and are never relevant.
    pub async fn filter(&self, papers: Vec<Paper>) -> Vec<Paper> {
        let tagged = papers.into_iter().map(|p| ((), p)).collect();
        self.select(tagged).await.into_iter().map(|(_, p)| p).collect()
    }

    /// [`Self::filter`] over papers carrying a caller-defined tag, which is
    /// returned untouched alongside each kept paper.
    pub async fn select<T>(&self, papers: Vec<(T, Paper)>) -> Vec<(T, Paper)> {
        let total = papers.len();
        let candidates: Vec<(T, Paper)> = papers.into_iter().filter(|(_, p)| p.abstract_text().is_some()).collect();
        if candidates.len() < total {
            debug!(skipped = total - candidates.len(), "Skipping papers without abstract");
        }
        if candidates.is_empty() {
            return Vec::new();
        }

        let abstracts: Vec<String> =
            candidates.iter().map(|(_, p)| p.abstract_text().unwrap_or_default().to_string()).collect();
        let verdicts = self.classify(&abstracts, &self.prompt).await;

        let errors = verdicts.iter().filter(|v| v.is_error()).count();
        if errors > 0 {
            warn!(errors, total = verdicts.len(), "Some abstracts received error verdicts");
        }

        let relevant: Vec<(T, Paper)> = candidates
            .into_iter()
            .zip(verdicts)
            .filter(|(_, v)| v.is_relevant && !v.is_error() && v.confidence >= self.confidence_threshold)
            .map(|((tag, mut paper), v)| {
                paper.annotate(Relevance::ClassifierVerdict { confidence: v.confidence, explanation: v.explanation });
                (tag, paper)
            })
            .collect();

        info!(total, relevant = relevant.len(), "Classifier filtering finished");
        relevant
    }
}

fn log_outcome(chunk: usize, outcome: &ChunkOutcome) {
    match outcome {
        ChunkOutcome::Parsed(verdicts) => {
            let invalid = verdicts.iter().filter(|v| v.is_error()).count();
            debug!(chunk, invalid, "Chunk parsed");
        }
        ChunkOutcome::RateLimited(hint) => error!(chunk, retry_after = ?hint, "Chunk rate limited"),
        ChunkOutcome::Oversized => {
            error!(chunk, "Chunk too large for model; decrease batch_size in the classifier settings");
        }
        ChunkOutcome::TransportError(message) => error!(chunk, error = %message, "Chunk request failed"),
        ChunkOutcome::Malformed(message) => error!(chunk, error = %message, "Chunk response malformed"),
    }
}

/// Instructions demanding a JSON array of exactly `count` verdict objects.
#[must_use]
pub fn system_prompt(count: usize) -> String {
    format!(
        "You are an expert research assistant assessing paper relevance for multiple abstracts. \
         Based on the provided abstracts and relevance prompt, determine if each paper is relevant. \
         Respond ONLY with a single JSON array where each element corresponds to an abstract in the input order. \
         The array must contain exactly {count} elements. \
         Each element in the array must be a JSON object with three keys: \
         'is_relevant' (boolean: true if relevant, false otherwise), \
         'confidence' (float: your confidence level from 0.0 to 1.0, e.g., 0.85), and \
         'explanation' (string: a brief justification for your decision, max 50 words)."
    )
}

/// Numbered abstracts under the relevance prompt.
#[must_use]
pub fn user_message(abstracts: &[String], prompt: &str) -> String {
    let mut message = format!("Relevance Prompt for all abstracts below: {prompt}\n\n---\n");
    for (i, text) in abstracts.iter().enumerate() {
        message.push_str(&format!("Abstract {}:\n{text}\n\n---\n", i + 1));
    }
    message
}

fn parse_chunk_response(content: &str, size: usize) -> ChunkOutcome {
    let value: Value = match serde_json::from_str(content) {
        Ok(value) => value,
        Err(e) => return ChunkOutcome::Malformed(e.to_string()),
    };
    let Some(items) = extract_items(value) else {
        return ChunkOutcome::Malformed("response was not a JSON array or an object wrapping one".to_string());
    };

    let received = items.len();
    let mut verdicts: Vec<Verdict> = items.into_iter().take(size).map(parse_item).collect();
    if received != size {
        warn!(received, expected = size, "Response size does not match chunk size, padding with errors");
        verdicts.resize_with(size, || Verdict::error(VerdictFault::SizeMismatch, SIZE_MISMATCH_EXPLANATION));
    }
    ChunkOutcome::Parsed(verdicts)
}

/// The verdict array: bare, under `abstracts`, under a sole key, or a lone verdict object.
fn extract_items(value: Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(mut map) => {
            if let Some(Value::Array(items)) = map.remove("abstracts") {
                return Some(items);
            }
            if map.contains_key("is_relevant") {
                return Some(vec![Value::Object(map)]);
            }
            sole_array(map)
        }
        _ => None,
    }
}

fn sole_array(map: Map<String, Value>) -> Option<Vec<Value>> {
    if map.len() != 1 {
        return None;
    }
    match map.into_iter().next() {
        Some((_, Value::Array(items))) => Some(items),
        _ => None,
    }
}

fn parse_item(item: Value) -> Verdict {
    let Value::Object(map) = item else {
        warn!("Expected object in verdict array");
        return Verdict::error(VerdictFault::InvalidItem, "Invalid item type in LLM response array.");
    };

    let Some(is_relevant) = map.get("is_relevant").and_then(Value::as_bool) else {
        return invalid_item("is_relevant");
    };
    let Some(confidence) = map.get("confidence").and_then(Value::as_f64) else {
        return invalid_item("confidence");
    };
    let explanation = match map.get("explanation") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => return invalid_item("explanation"),
    };

    Verdict::answer(is_relevant, confidence, explanation)
}

fn invalid_item(field: &str) -> Verdict {
    warn!(field, "Invalid verdict item");
    Verdict::error(
        VerdictFault::InvalidItem,
        format!("Invalid item structure in LLM response array (bad or missing '{field}')."),
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn verdicts(outcome: ChunkOutcome, size: usize) -> Vec<Verdict> {
        outcome.into_verdicts(size)
    }

    #[test]
    fn test_bare_array_parses() {
        let content = json!([
            {"is_relevant": true, "confidence": 0.9, "explanation": "on topic"},
            {"is_relevant": false, "confidence": 0.2, "explanation": "off topic"}
        ])
        .to_string();
        let v = verdicts(parse_chunk_response(&content, 2), 2);
        assert_eq!(v[0], Verdict::answer(true, 0.9, "on topic"));
        assert_eq!(v[1], Verdict::answer(false, 0.2, "off topic"));
    }

    #[test]
    fn test_abstracts_wrapper_parses() {
        let content = json!({"abstracts": [{"is_relevant": true, "confidence": 1, "explanation": "x"}]}).to_string();
        let v = verdicts(parse_chunk_response(&content, 1), 1);
        assert!(!v[0].is_error());
        assert!((v[0].confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_any_single_key_wrapper_parses() {
        let content = json!({"results": [{"is_relevant": false, "confidence": 0.5, "explanation": "y"}]}).to_string();
        let v = verdicts(parse_chunk_response(&content, 1), 1);
        assert!(!v[0].is_error());
    }

    #[test]
    fn test_lone_verdict_object_parses() {
        let content = json!({"is_relevant": true, "confidence": 0.8, "explanation": "z"}).to_string();
        let v = verdicts(parse_chunk_response(&content, 1), 1);
        assert_eq!(v[0], Verdict::answer(true, 0.8, "z"));
    }

    #[test]
    fn test_short_array_is_padded() {
        let content = json!([{"is_relevant": true, "confidence": 0.9, "explanation": "a"}]).to_string();
        let v = verdicts(parse_chunk_response(&content, 3), 3);
        assert_eq!(v.len(), 3);
        assert!(!v[0].is_error());
        assert_eq!(v[1].fault, Some(VerdictFault::SizeMismatch));
        assert_eq!(v[2].explanation, SIZE_MISMATCH_EXPLANATION);
    }

    #[test]
    fn test_long_array_is_truncated() {
        let item = json!({"is_relevant": true, "confidence": 0.9, "explanation": "a"});
        let content = json!([item, item, item]).to_string();
        let v = verdicts(parse_chunk_response(&content, 2), 2);
        assert_eq!(v.len(), 2);
    }

    #[test]
    fn test_invalid_item_is_isolated() {
        let content = json!([
            {"is_relevant": "yes", "confidence": 0.9, "explanation": "a"},
            {"is_relevant": true, "confidence": 0.9, "explanation": "b"},
            "not an object"
        ])
        .to_string();
        let v = verdicts(parse_chunk_response(&content, 3), 3);
        assert_eq!(v[0].fault, Some(VerdictFault::InvalidItem));
        assert!(!v[1].is_error());
        assert_eq!(v[2].fault, Some(VerdictFault::InvalidItem));
    }

    #[test]
    fn test_non_json_is_malformed() {
        let v = verdicts(parse_chunk_response("sure, here you go", 2), 2);
        assert_eq!(v.len(), 2);
        assert!(v.iter().all(|x| x.fault == Some(VerdictFault::Malformed)));
    }

    #[test]
    fn test_wrapper_with_many_keys_is_malformed() {
        let content = json!({"a": [], "b": []}).to_string();
        assert!(matches!(parse_chunk_response(&content, 1), ChunkOutcome::Malformed(_)));
    }

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            ChunkOutcome::from_error(ClientError::rate_limited(Some(5))),
            ChunkOutcome::RateLimited(Some(_))
        ));
        assert!(matches!(
            ChunkOutcome::from_error(ClientError::payload_too_large("big")),
            ChunkOutcome::Oversized
        ));
        assert!(matches!(
            ChunkOutcome::from_error(ClientError::server(502, "bad gateway")),
            ChunkOutcome::TransportError(_)
        ));
        assert!(matches!(ChunkOutcome::from_error(ClientError::shape("empty")), ChunkOutcome::Malformed(_)));
    }

    #[test]
    fn test_oversized_explanation_names_remedy() {
        let v = verdicts(ChunkOutcome::Oversized, 2);
        assert!(v.iter().all(|x| x.explanation.contains("Reduce batch_size")));
    }

    #[test]
    fn test_prompts_mention_count_and_numbering() {
        assert!(system_prompt(7).contains("exactly 7 elements"));
        let message = user_message(&["first".to_string(), "second".to_string()], "About graphs?");
        assert!(message.starts_with("Relevance Prompt for all abstracts below: About graphs?"));
        assert!(message.contains("Abstract 2:\nsecond"));
    }
}
