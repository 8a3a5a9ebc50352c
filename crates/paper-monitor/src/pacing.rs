//! Injectable delays used for cooperative rate limiting.
//!
//! The classifier and the paginated sources pause between remote calls. They
//! do so through [`Sleeper`] so tests can observe the requested waits instead
//! of spending wall-clock time.

use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Something that can wait for a duration.
#[async_trait::async_trait]
pub trait Sleeper: Send + Sync + std::fmt::Debug {
    /// Wait for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait::async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Records requested waits and returns immediately.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    calls: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits requested so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<Duration> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(duration);
        }
    }
}

/// Shared handle to a sleeper.
pub type SharedSleeper = Arc<dyn Sleeper>;

/// Default sleeper for production use.
#[must_use]
pub fn tokio_sleeper() -> SharedSleeper {
    Arc::new(TokioSleeper)
}
