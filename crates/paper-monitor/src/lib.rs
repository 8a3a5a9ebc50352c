//! Paper Monitor
//!
//! Pulls newly published preprint metadata from arXiv and bioRxiv/medRxiv,
//! narrows it to the papers a user cares about, and hands the survivors to a
//! delivery sink.
//!
//! # Features
//!
//! - **Two fetch strategies**: one windowed Atom query (arXiv) and cursor
//!   pagination (bioRxiv/medRxiv), both deduplicated per fetch
//! - **Three relevance strategies**: keyword match, embedding similarity,
//!   batch remote classifier with backoff and response validation
//! - **Failure-tolerant**: a failing source or model degrades to an empty
//!   result and is reported in the run statistics
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use paper_monitor::{Config, Pipeline, pacing::tokio_sleeper};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(Path::new("config.toml"))?;
//!     let pipeline = Pipeline::from_config(&config, tokio_sleeper()).await?;
//!
//!     let report = pipeline.run(chrono::Utc::now()).await;
//!     println!("{} relevant papers", report.relevant.len());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod delivery;
pub mod error;
pub mod models;
pub mod pacing;
pub mod pipeline;
pub mod relevance;
pub mod sources;

pub use config::Config;
pub use error::{ClientError, ConfigError, DeliveryError, RelevanceError};
pub use models::{Paper, Relevance, RunStats};
pub use pipeline::{Pipeline, RunReport};
