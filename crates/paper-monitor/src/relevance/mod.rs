//! Relevance strategies.
//!
//! Exactly one strategy runs per invocation. Keyword matching works per
//! source; the embedding and classifier strategies see the merged list so
//! their batches span sources.

mod chat;
mod classifier;
mod embedding;
mod keyword;

pub use chat::{ChatBackend, ChatClient, ChatRequest};
pub use classifier::{
    BatchClassifier, OVERSIZED_EXPLANATION, SIZE_MISMATCH_EXPLANATION, Verdict, VerdictFault, system_prompt,
    user_message,
};
pub use embedding::{Embedder, EmbeddingFilter, OpenAiEmbedder, best_match, cosine_similarity};
pub use keyword::{KeywordFilter, KeywordRouting};

use tracing::info;

use crate::config::{Config, RelevanceMethod, SourceName};
use crate::error::RelevanceResult;
use crate::models::Paper;
use crate::pacing::SharedSleeper;

/// Papers fetched by one source.
#[derive(Debug, Clone)]
pub struct SourceBatch {
    /// Source that produced the papers.
    pub source: SourceName,
    /// Fetched papers.
    pub papers: Vec<Paper>,
}

/// The configured relevance strategy.
#[derive(Debug)]
pub enum RelevanceStrategy {
    /// Per-source keyword matching.
    Keyword(KeywordRouting),
    /// Embedding similarity against target texts.
    Embedding(EmbeddingFilter),
    /// Batch remote classifier.
    Classifier(BatchClassifier),
    /// Every paper is relevant.
    PassThrough,
}

impl RelevanceStrategy {
    /// Build the strategy selected by `run.relevance_method`.
    ///
    /// # Errors
    ///
    /// Returns error if the classifier has no API key or an HTTP client
    /// cannot be created.
    pub async fn from_config(config: &Config, sleeper: SharedSleeper) -> RelevanceResult<Self> {
        let strategy = match config.run.relevance_method {
            RelevanceMethod::Keyword => Self::Keyword(KeywordRouting::from_config(config)),
            RelevanceMethod::Embedding => {
                let section = &config.relevance.embedding;
                let embedder = OpenAiEmbedder::new(section, &config.http, config.embedding_api_key.as_deref())?;
                let filter = EmbeddingFilter::configure(
                    Box::new(embedder),
                    section.similarity_threshold,
                    section.target_texts.clone().into_vec(),
                )
                .await;
                Self::Embedding(filter)
            }
            RelevanceMethod::Classifier => {
                let section = &config.relevance.classifier;
                let backend = ChatClient::new(section, &config.http, config.classifier_api_key.as_deref())?;
                Self::Classifier(BatchClassifier::new(Box::new(backend), section, sleeper))
            }
            RelevanceMethod::None => Self::PassThrough,
        };
        info!(method = strategy.method().as_str(), "Relevance strategy ready");
        Ok(strategy)
    }

    /// Method reported in run statistics.
    #[must_use]
    pub const fn method(&self) -> RelevanceMethod {
        match self {
            Self::Keyword(_) => RelevanceMethod::Keyword,
            Self::Embedding(_) => RelevanceMethod::Embedding,
            Self::Classifier(_) => RelevanceMethod::Classifier,
            Self::PassThrough => RelevanceMethod::None,
        }
    }

    /// Reduce each fetched batch to its relevant papers.
    ///
    /// One batch comes back per input batch, in input order, each keeping
    /// fetch order.
    pub async fn filter(&self, batches: Vec<SourceBatch>) -> Vec<SourceBatch> {
        match self {
            Self::Keyword(routing) => batches
                .into_iter()
                .map(|b| SourceBatch { source: b.source, papers: routing.apply(b.source, b.papers) })
                .collect(),
            Self::Embedding(filter) => {
                let (sources, tagged) = merge(batches);
                split(sources, filter.select(tagged).await)
            }
            Self::Classifier(classifier) => {
                let (sources, tagged) = merge(batches);
                split(sources, classifier.select(tagged).await)
            }
            Self::PassThrough => batches,
        }
    }
}

/// Flatten batches, tagging each paper with the position of its batch.
fn merge(batches: Vec<SourceBatch>) -> (Vec<SourceName>, Vec<(usize, Paper)>) {
    let sources = batches.iter().map(|b| b.source).collect();
    let tagged = batches
        .into_iter()
        .enumerate()
        .flat_map(|(i, b)| b.papers.into_iter().map(move |p| (i, p)))
        .collect();
    (sources, tagged)
}

fn split(sources: Vec<SourceName>, kept: Vec<(usize, Paper)>) -> Vec<SourceBatch> {
    let mut batches: Vec<SourceBatch> =
        sources.into_iter().map(|source| SourceBatch { source, papers: Vec::new() }).collect();
    for (i, paper) in kept {
        if let Some(batch) = batches.get_mut(i) {
            batch.papers.push(paper);
        }
    }
    batches
}
