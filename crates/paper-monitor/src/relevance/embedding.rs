//! Embedding-similarity relevance filter.
//!
//! Target texts are embedded once at configuration time. Each abstract is
//! compared against every target by cosine similarity; a paper is kept when
//! its best score reaches the threshold.

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::client::{HttpClient, RetryMode};
use crate::config::{EmbeddingConfig, HttpConfig, defaults};
use crate::error::{ClientResult, RelevanceError, RelevanceResult};
use crate::models::{Paper, Relevance};

/// Turns texts into vectors, one per input, in input order.
#[async_trait::async_trait]
pub trait Embedder: Send + Sync + std::fmt::Debug {
    /// Embed `texts`.
    async fn embed(&self, texts: &[String]) -> RelevanceResult<Vec<Vec<f32>>>;
}

/// Embedder backed by an OpenAI-compatible `/embeddings` endpoint.
#[derive(Debug)]
pub struct OpenAiEmbedder {
    client: HttpClient,
    base_url: String,
    model: String,
    batch_size: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

impl OpenAiEmbedder {
    /// Create an embedder from its settings section.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn new(config: &EmbeddingConfig, http: &HttpConfig, api_key: Option<&str>) -> ClientResult<Self> {
        let client = HttpClient::new(http, RetryMode::Never, api_key.filter(|k| !k.is_empty()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            batch_size: if config.batch_size == 0 { defaults::EMBEDDING_BATCH_SIZE } else { config.batch_size },
        })
    }

    async fn embed_chunk(&self, texts: &[String]) -> RelevanceResult<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let body = json!({ "model": self.model, "input": texts });

        let mut response: EmbeddingResponse = self.client.post_json(&url, &body).await?;
        if response.data.len() != texts.len() {
            return Err(RelevanceError::embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                response.data.len()
            )));
        }
        response.data.sort_by_key(|d| d.index);
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait::async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> RelevanceResult<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            debug!(model = %self.model, size = chunk.len(), "Embedding batch");
            vectors.extend(self.embed_chunk(chunk).await?);
        }
        Ok(vectors)
    }
}

/// Cosine similarity; zero for mismatched, empty or zero-length vectors.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

/// Best target for `vector`: index and score. Ties keep the earlier target.
#[must_use]
pub fn best_match(vector: &[f32], targets: &[Vec<f32>]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (index, target) in targets.iter().enumerate() {
        let score = cosine_similarity(vector, target);
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((index, score));
        }
    }
    best
}

/// Embedding-similarity relevance filter.
#[derive(Debug)]
pub struct EmbeddingFilter {
    embedder: Box<dyn Embedder>,
    threshold: f32,
    targets: Vec<String>,
    target_vectors: Option<Vec<Vec<f32>>>,
}

impl EmbeddingFilter {
    /// Embed the target texts and keep the vectors for later calls.
    ///
    /// If the targets cannot be embedded the filter is still built, but every
    /// `filter` call yields no papers.
    pub async fn configure(embedder: Box<dyn Embedder>, threshold: f32, targets: Vec<String>) -> Self {
        let mut targets: Vec<String> =
            targets.into_iter().map(|t| t.trim().to_string()).filter(|t| !t.is_empty()).collect();
        if targets.is_empty() {
            warn!("No embedding target texts configured, using default");
            targets.push(defaults::TARGET_TEXT.to_string());
        }

        let target_vectors = match embedder.embed(&targets).await {
            Ok(vectors) if vectors.len() == targets.len() => {
                info!(targets = targets.len(), threshold, "Embedding targets ready");
                Some(vectors)
            }
            Ok(vectors) => {
                error!(expected = targets.len(), got = vectors.len(), "Embedding model returned wrong number of target vectors");
                None
            }
            Err(e) => {
                error!(error = %e, "Failed to embed target texts; embedding filter disabled for this run");
                None
            }
        };

        Self { embedder, threshold, targets, target_vectors }
    }

    /// Returns true if the target vectors are available.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.target_vectors.is_some()
    }

    /// Target texts, in configuration order.
    #[must_use]
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Keep papers whose best target similarity reaches the threshold.
    ///
    /// Papers without an abstract are skipped. A model failure yields no
    /// papers.
    pub async fn filter(&self, papers: Vec<Paper>) -> Vec<Paper> {
        let tagged = papers.into_iter().map(|p| ((), p)).collect();
        self.select(tagged).await.into_iter().map(|(_, p)| p).collect()
    }

    /// [`Self::filter`] over papers carrying a caller-defined tag, which is
    /// returned untouched alongside each kept paper.
    pub async fn select<T>(&self, papers: Vec<(T, Paper)>) -> Vec<(T, Paper)> {
        let Some(target_vectors) = &self.target_vectors else {
            error!("Embedding model unavailable; no papers judged relevant");
            return Vec::new();
        };

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
        let vectors = match self.embedder.embed(&abstracts).await {
            Ok(vectors) if vectors.len() == abstracts.len() => vectors,
            Ok(vectors) => {
                error!(expected = abstracts.len(), got = vectors.len(), "Embedding model returned wrong number of vectors");
                return Vec::new();
            }
            Err(e) => {
                error!(error = %e, "Failed to embed abstracts; no papers judged relevant");
                return Vec::new();
            }
        };

        let mut relevant = Vec::new();
        for ((tag, mut paper), vector) in candidates.into_iter().zip(vectors) {
            let Some((index, score)) = best_match(&vector, target_vectors) else {
                continue;
            };
            if score >= self.threshold {
                paper.annotate(Relevance::SimilarityMatch {
                    similarity_score: score,
                    matched_target: self.targets[index].clone(),
                });
                relevant.push((tag, paper));
            }
        }

        if relevant.is_empty() {
            info!(threshold = self.threshold, "No papers met the similarity threshold");
        } else {
            info!(total, relevant = relevant.len(), "Embedding filtering finished");
        }
        relevant
    }
}
