//! Paper record produced by sources and annotated by relevance strategies.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a relevance strategy kept a paper.
///
/// Only the strategy that ran in a given invocation sets this, so a paper
/// carries at most one kind of annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Relevance {
    /// Keyword filter: the configured keywords found in title or abstract.
    KeywordMatch {
        /// Matched keywords, in configuration order.
        matched_keywords: Vec<String>,
    },

    /// Embedding filter: best cosine similarity over the target texts.
    SimilarityMatch {
        /// Maximum similarity across targets.
        similarity_score: f32,
        /// Target text that produced the maximum.
        matched_target: String,
    },

    /// Batch classifier verdict.
    ClassifierVerdict {
        /// Model confidence in `[0, 1]`.
        confidence: f64,
        /// Model's short justification.
        explanation: String,
    },
}

/// A catalog entry.
///
/// Fields are fixed once a source builds the record; only the relevance
/// annotation can be attached afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    id: String,
    title: String,
    #[serde(default)]
    r#abstract: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
    url: String,
    timestamp: DateTime<Utc>,
    source: String,
    #[serde(default)]
    categories: BTreeSet<String>,
    #[serde(default)]
    relevance: Option<Relevance>,
}

impl Paper {
    /// Create a paper with the required fields.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        source: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            r#abstract: None,
            authors: Vec::new(),
            url: String::new(),
            timestamp,
            source: source.into(),
            categories: BTreeSet::new(),
            relevance: None,
        }
    }

    /// Set the abstract; blank text is stored as absent.
    #[must_use]
    pub fn with_abstract(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.r#abstract = if text.trim().is_empty() { None } else { Some(text) };
        self
    }

    /// Set the author list.
    #[must_use]
    pub fn with_authors(mut self, authors: Vec<String>) -> Self {
        self.authors = authors;
        self
    }

    /// Set the canonical link.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the catalog topic tags.
    #[must_use]
    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    /// Catalog id (includes the version suffix for versioned catalogs).
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Paper title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Abstract, if the catalog provided a non-blank one.
    #[must_use]
    pub fn abstract_text(&self) -> Option<&str> {
        self.r#abstract.as_deref()
    }

    /// Author display names, in catalog order.
    #[must_use]
    pub fn authors(&self) -> &[String] {
        &self.authors
    }

    /// Canonical link to the record.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Catalog "last updated" instant.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Tag of the source that produced the paper.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Catalog topic tags.
    #[must_use]
    pub const fn categories(&self) -> &BTreeSet<String> {
        &self.categories
    }

    /// Annotation set by the relevance strategy, if any.
    #[must_use]
    pub const fn relevance(&self) -> Option<&Relevance> {
        self.relevance.as_ref()
    }

    /// Attach the relevance strategy's annotation, replacing any previous one.
    pub fn annotate(&mut self, relevance: Relevance) {
        self.relevance = Some(relevance);
    }

    /// Lower-cased title and abstract joined by a space.
    #[must_use]
    pub fn search_text(&self) -> String {
        let mut text = self.title.to_lowercase();
        text.push(' ');
        if let Some(abs) = &self.r#abstract {
            text.push_str(&abs.to_lowercase());
        }
        text
    }
}
