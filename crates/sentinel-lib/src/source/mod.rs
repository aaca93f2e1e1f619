//! Ingestion interface
//!
//! The storage backend is reached through [`MetricSource`]. The
//! [`IngestionLoop`] polls it and feeds aligned rows into the monitor.

mod poller;

pub use poller::{IngestTarget, IngestionConfig, IngestionLoop, PollStats};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::Sample;
use crate::throttle::{Clock, SystemClock};

/// Read access to stored time series
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Samples of one channel recorded within the last `duration`, oldest first
    async fn fetch_recent_window(
        &self,
        entity_id: &str,
        channel: &str,
        duration: Duration,
    ) -> Result<Vec<Sample>>;
}

/// In-process source, used by tests and by the agent when no backend is set
pub struct InMemorySource {
    series: RwLock<HashMap<(String, String), Vec<Sample>>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemorySource {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl InMemorySource {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Record a sample, keeping each series ordered by timestamp
    pub async fn record(&self, entity_id: &str, channel: &str, sample: Sample) {
        let mut series = self.series.write().await;
        let samples = series
            .entry((entity_id.to_string(), channel.to_string()))
            .or_default();
        let pos = samples.partition_point(|s| s.timestamp <= sample.timestamp);
        samples.insert(pos, sample);
    }

    pub async fn len(&self, entity_id: &str, channel: &str) -> usize {
        self.series
            .read()
            .await
            .get(&(entity_id.to_string(), channel.to_string()))
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl MetricSource for InMemorySource {
    async fn fetch_recent_window(
        &self,
        entity_id: &str,
        channel: &str,
        duration: Duration,
    ) -> Result<Vec<Sample>> {
        let cutoff = self.clock.now().timestamp() - duration.as_secs() as i64;
        let series = self.series.read().await;
        Ok(series
            .get(&(entity_id.to_string(), channel.to_string()))
            .map(|samples| {
                samples
                    .iter()
                    .filter(|s| s.timestamp >= cutoff)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }
}
