//! Data models shared by sources, relevance strategies and delivery.
//!
//! Every model derives `Serialize` so run results can be handed to downstream
//! writers unchanged.

mod paper;
mod stats;

pub use paper::{Paper, Relevance};
pub use stats::{FetchStatus, RunStats, SourceStats};
