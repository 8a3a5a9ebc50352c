//! Downstream delivery of a run's results.

use std::path::PathBuf;

use serde::Serialize;
use tracing::info;

use crate::error::DeliveryError;
use crate::models::{Paper, RunStats};

/// Something that consumes the relevant papers and run statistics.
#[async_trait::async_trait]
pub trait Delivery: Send + Sync {
    /// Hand over one run's output.
    async fn deliver(&self, papers: &[Paper], stats: &RunStats) -> Result<(), DeliveryError>;
}

#[derive(Serialize)]
struct Output<'a> {
    papers: &'a [Paper],
    stats: &'a RunStats,
}

/// Writes `{ "papers": [...], "stats": {...} }` as pretty JSON.
#[derive(Debug, Clone)]
pub struct JsonFileDelivery {
    path: PathBuf,
}

impl JsonFileDelivery {
    /// Deliver to `path`, replacing any existing file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Output path.
    #[must_use]
    pub const fn path(&self) -> &PathBuf {
        &self.path
    }
}

/// Render the output document.
///
/// # Errors
///
/// Returns error if serialization fails.
pub fn render_json(papers: &[Paper], stats: &RunStats) -> Result<String, DeliveryError> {
    Ok(serde_json::to_string_pretty(&Output { papers, stats })?)
}

#[async_trait::async_trait]
impl Delivery for JsonFileDelivery {
    async fn deliver(&self, papers: &[Paper], stats: &RunStats) -> Result<(), DeliveryError> {
        let body = render_json(papers, stats)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| DeliveryError::Write { path: parent.to_path_buf(), source })?;
        }
        tokio::fs::write(&self.path, body)
            .await
            .map_err(|source| DeliveryError::Write { path: self.path.clone(), source })?;

        info!(path = %self.path.display(), papers = papers.len(), "Results written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::models::Relevance;

    fn stats() -> RunStats {
        RunStats {
            sources: Vec::new(),
            total_fetched: 1,
            total_relevant: 1,
            run_duration_secs: 0.5,
            checking_method: "keyword".to_string(),
            run_completed_time: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_render_json_shape() {
        let mut paper = Paper::new("2401.00001v1", "T", "arxiv", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        paper.annotate(Relevance::KeywordMatch { matched_keywords: vec!["t".into()] });

        let value: serde_json::Value = serde_json::from_str(&render_json(&[paper], &stats()).unwrap()).unwrap();
        assert_eq!(value["papers"][0]["id"], "2401.00001v1");
        assert_eq!(value["papers"][0]["relevance"]["method"], "keyword_match");
        assert_eq!(value["stats"]["checking_method"], "keyword");
    }

    #[tokio::test]
    async fn test_json_file_delivery_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("papers.json");
        JsonFileDelivery::new(&path).deliver(&[], &stats()).await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"papers\": []"));
    }
}
