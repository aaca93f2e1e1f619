//! Periodic ingestion from a [`MetricSource`]
//!
//! Each cycle fetches the recent window of every field of every configured
//! `(host, measurement)` target, keeps the timestamps present in all fields
//! and ingests the rows newer than the last one already ingested.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, Instant};
use tracing::{debug, info, warn};

use super::MetricSource;
use crate::health::{components, HealthRegistry};
use crate::models::Alert;
use crate::monitor::{entity_id, Monitor};

/// A measurement of one host to poll
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IngestTarget {
    pub host: String,
    pub measurement: String,
}

impl IngestTarget {
    pub fn new(host: impl Into<String>, measurement: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            measurement: measurement.into(),
        }
    }

    pub fn entity_id(&self) -> String {
        entity_id(&self.host, &self.measurement)
    }
}

/// Configuration for the ingestion loop
#[derive(Debug, Clone)]
pub struct IngestionConfig {
    /// Time between polling cycles
    pub interval: Duration,
    /// How far back each fetch reaches
    pub lookback: Duration,
    pub targets: Vec<IngestTarget>,
    /// Capacity of the alert channel
    pub buffer_size: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            lookback: Duration::from_secs(60 * 60),
            targets: Vec::new(),
            buffer_size: 256,
        }
    }
}

/// Counters for one polling cycle
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PollStats {
    pub rows_ingested: usize,
    pub rows_rejected: usize,
    pub fetch_errors: usize,
    pub alerts: usize,
}

/// Polls a metric source and feeds the monitor
pub struct IngestionLoop {
    source: Arc<dyn MetricSource>,
    monitor: Arc<Monitor>,
    config: IngestionConfig,
    alert_tx: mpsc::Sender<Alert>,
    last_seen: HashMap<IngestTarget, i64>,
    health: Option<HealthRegistry>,
}

impl IngestionLoop {
    pub fn new(
        source: Arc<dyn MetricSource>,
        monitor: Arc<Monitor>,
        config: IngestionConfig,
    ) -> (Self, mpsc::Receiver<Alert>) {
        let (alert_tx, alert_rx) = mpsc::channel(config.buffer_size.max(1));
        let ingestion = Self {
            source,
            monitor,
            config,
            alert_tx,
            last_seen: HashMap::new(),
            health: None,
        };
        (ingestion, alert_rx)
    }

    /// Report cycle outcomes under the `ingestion` health component
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Run until the shutdown signal fires
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            targets = self.config.targets.len(),
            "Starting ingestion loop"
        );

        let mut ticker = interval(self.config.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let start = Instant::now();
                    let stats = self.poll_once().await;
                    debug!(
                        ingested = stats.rows_ingested,
                        rejected = stats.rows_rejected,
                        fetch_errors = stats.fetch_errors,
                        alerts = stats.alerts,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Ingestion cycle complete"
                    );
                }
                _ = shutdown.recv() => {
                    info!("Shutting down ingestion loop");
                    break;
                }
            }
        }
    }

    /// Run one polling cycle over every target
    pub async fn poll_once(&mut self) -> PollStats {
        let mut stats = PollStats::default();
        let targets = self.config.targets.clone();

        for target in &targets {
            match self.poll_target(target, &mut stats).await {
                Ok(()) => {}
                Err(e) => {
                    stats.fetch_errors += 1;
                    warn!(
                        entity = %target.entity_id(),
                        error = %format!("{:#}", e),
                        "Failed to poll target"
                    );
                }
            }
        }

        if let Some(health) = &self.health {
            if stats.fetch_errors == 0 {
                health.set_healthy(components::INGESTION).await;
            } else if stats.fetch_errors == targets.len() {
                health
                    .set_unhealthy(components::INGESTION, "every target failed to poll")
                    .await;
            } else {
                health
                    .set_degraded(
                        components::INGESTION,
                        format!("{} of {} targets failed", stats.fetch_errors, targets.len()),
                    )
                    .await;
            }
        }

        stats
    }

    async fn poll_target(&mut self, target: &IngestTarget, stats: &mut PollStats) -> Result<()> {
        let entity = target.entity_id();
        let fields = self.monitor.schema().get(&target.measurement)?.fields;

        let mut rows: BTreeMap<i64, HashMap<String, f64>> = BTreeMap::new();
        for field in fields {
            let samples = self
                .source
                .fetch_recent_window(&entity, field, self.config.lookback)
                .await
                .with_context(|| format!("fetching {}.{}", entity, field))?;
            for sample in samples {
                rows.entry(sample.timestamp)
                    .or_default()
                    .insert(field.to_string(), sample.value);
            }
        }

        let last_seen = self.last_seen.get(target).copied();
        let fresh: Vec<(i64, HashMap<String, f64>)> = rows
            .into_iter()
            .filter(|(ts, row)| {
                row.len() == fields.len() && last_seen.map_or(true, |last| *ts > last)
            })
            .collect();
        let Some(newest) = fresh.last().map(|(ts, _)| *ts) else {
            return Ok(());
        };
        // Rejected rows are not retried
        self.last_seen.insert(target.clone(), newest);

        // Profile updates are CPU-bound; keep them off the async workers
        let monitor = Arc::clone(&self.monitor);
        let (host, measurement) = (target.host.clone(), target.measurement.clone());
        let outcomes = tokio::task::spawn_blocking(move || {
            fresh
                .into_iter()
                .map(|(timestamp, row)| {
                    monitor.ingest_measurement(&host, &measurement, timestamp, &row)
                })
                .collect::<Vec<_>>()
        })
        .await
        .with_context(|| format!("ingesting rows of {}", entity))?;

        for outcome in outcomes {
            match outcome {
                Ok(outcome) => {
                    stats.rows_ingested += 1;
                    for alert in outcome.alerts {
                        stats.alerts += 1;
                        if let Err(e) = self.alert_tx.send(alert).await {
                            warn!(error = %e, "Failed to forward alert");
                        }
                    }
                }
                // Already logged by the monitor
                Err(_) => stats.rows_rejected += 1,
            }
        }

        Ok(())
    }
}
