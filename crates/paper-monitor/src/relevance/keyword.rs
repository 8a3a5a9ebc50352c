//! Substring keyword matching over title and abstract.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::config::{Config, EmptyKeywordPolicy, SourceName};
use crate::error::{RelevanceError, RelevanceResult};
use crate::models::{Paper, Relevance};

/// Keyword relevance filter.
#[derive(Debug, Clone, Default)]
pub struct KeywordFilter {
    keywords: Vec<String>,
}

impl KeywordFilter {
    /// Store `keywords` lower-cased; blank entries are dropped.
    #[must_use]
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keywords }
    }

    /// Returns true if no keywords are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// Configured keywords, lower-cased.
    #[must_use]
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Keywords found in the paper's lower-cased title and abstract, in configuration order.
    #[must_use]
    pub fn matches(&self, paper: &Paper) -> Vec<String> {
        let text = paper.search_text();
        self.keywords.iter().filter(|k| text.contains(k.as_str())).cloned().collect()
    }

    /// Keep papers matching at least one keyword, annotated with the matches.
    ///
    /// # Errors
    ///
    /// Returns [`RelevanceError::NoKeywords`] when no keywords are configured;
    /// the caller decides what an empty list means.
    pub fn filter(&self, papers: Vec<Paper>) -> RelevanceResult<Vec<Paper>> {
        if self.is_empty() {
            return Err(RelevanceError::NoKeywords);
        }

        let total = papers.len();
        let relevant: Vec<Paper> = papers
            .into_iter()
            .filter_map(|mut paper| {
                let matched = self.matches(&paper);
                if matched.is_empty() {
                    return None;
                }
                debug!(id = paper.id(), ?matched, "Keyword match");
                paper.annotate(Relevance::KeywordMatch { matched_keywords: matched });
                Some(paper)
            })
            .collect();

        info!(total, relevant = relevant.len(), "Keyword filtering finished");
        Ok(relevant)
    }
}

/// Keyword filters per source, plus what to do when a source has none.
#[derive(Debug, Clone)]
pub struct KeywordRouting {
    filters: HashMap<SourceName, KeywordFilter>,
    policy: EmptyKeywordPolicy,
}

impl KeywordRouting {
    /// Create routing from explicit filters.
    #[must_use]
    pub fn new(filters: HashMap<SourceName, KeywordFilter>, policy: EmptyKeywordPolicy) -> Self {
        Self { filters, policy }
    }

    /// Each source's own keywords, or the global list when it has none.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let filters = [SourceName::Arxiv, SourceName::Biorxiv, SourceName::Medrxiv]
            .into_iter()
            .map(|name| (name, KeywordFilter::new(config.keywords_for(name))))
            .collect();
        Self::new(filters, config.run.empty_keywords)
    }

    /// Apply `source`'s filter to its papers.
    ///
    /// A source without keywords is resolved by the empty-keyword policy.
    #[must_use]
    pub fn apply(&self, source: SourceName, papers: Vec<Paper>) -> Vec<Paper> {
        match self.filters.get(&source) {
            Some(filter) if !filter.is_empty() => filter.filter(papers).unwrap_or_default(),
            _ => match self.policy {
                EmptyKeywordPolicy::PassAll => {
                    warn!(%source, papers = papers.len(), "No keywords for source, passing all papers");
                    papers
                }
                EmptyKeywordPolicy::RejectAll => {
                    warn!(%source, papers = papers.len(), "No keywords for source, skipping its papers");
                    Vec::new()
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn paper(title: &str, abs: &str) -> Paper {
        Paper::new("id", title, "arxiv", Utc::now()).with_abstract(abs)
    }

    #[test]
    fn test_keywords_are_lowercased_and_trimmed() {
        let filter = KeywordFilter::new(["  Diffusion ", "", "GAN"]);
        assert_eq!(filter.keywords(), ["diffusion", "gan"]);
    }

    #[test]
    fn test_empty_keywords_is_distinct_error() {
        let filter = KeywordFilter::new(Vec::<String>::new());
        let result = filter.filter(vec![paper("anything", "")]);
        assert!(matches!(result, Err(RelevanceError::NoKeywords)));
    }

    #[test]
    fn test_matches_report_every_hit() {
        let filter = KeywordFilter::new(["graph", "neural", "quantum"]);
        let p = paper("Graph Neural Networks", "message passing");
        assert_eq!(filter.matches(&p), ["graph", "neural"]);
    }

    #[test]
    fn test_match_in_abstract_only() {
        let filter = KeywordFilter::new(["protein"]);
        let kept = filter.filter(vec![paper("Folding", "Protein structure prediction")]).unwrap();
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_routing_applies_empty_policy() {
        let filters = HashMap::from([
            (SourceName::Arxiv, KeywordFilter::new(["graph"])),
            (SourceName::Biorxiv, KeywordFilter::default()),
        ]);
        let papers = || vec![paper("Graph theory", ""), paper("Cell biology", "")];

        let reject = KeywordRouting::new(filters.clone(), EmptyKeywordPolicy::RejectAll);
        assert_eq!(reject.apply(SourceName::Arxiv, papers()).len(), 1);
        assert!(reject.apply(SourceName::Biorxiv, papers()).is_empty());
        assert!(reject.apply(SourceName::Medrxiv, papers()).is_empty());

        let pass = KeywordRouting::new(filters, EmptyKeywordPolicy::PassAll);
        assert_eq!(pass.apply(SourceName::Biorxiv, papers()).len(), 2);
    }

    #[test]
    fn test_routing_falls_back_to_global_keywords() {
        let mut config = Config::default();
        config.relevance.keyword.keywords = vec!["cell".to_string()];
        config.sources.arxiv.keywords = vec!["graph".to_string()];
        let routing = KeywordRouting::from_config(&config);

        let kept = routing.apply(SourceName::Biorxiv, vec![paper("Cell biology", ""), paper("Graph theory", "")]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].title(), "Cell biology");
    }
}
