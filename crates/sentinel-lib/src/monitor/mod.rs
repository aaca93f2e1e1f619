//! Per-entity monitoring
//!
//! The [`Monitor`] owns the state of every monitored entity. Different
//! entities are processed in parallel; each entity has a single writer at a
//! time, and its throttle timestamps change under the same lock as the
//! decision to run.

mod config;
mod entity;

pub use config::{MonitorConfig, DEFAULT_PROFILE_CAPACITY, DEFAULT_RETENTION, DEFAULT_WINDOW_SIZE};
pub use entity::{CheckStatus, EntityState, IngestOutcome};

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::anomaly::{AnomalyScorer, JointProfile, ScoreOutcome};
use crate::error::{DetectorError, DetectorResult};
use crate::models::{Alert, AnomalyEvent, Discord, EntitySnapshot};
use crate::observability::{SentinelMetrics, StructuredLogger};
use crate::predictor::{ForecastWindow, Forecaster, LoadPredictor, TrendForecaster};
use crate::schema::SchemaRegistry;
use crate::throttle::{Clock, SystemClock};

/// Registry of monitored entities and the detection pipeline around them
pub struct Monitor {
    config: MonitorConfig,
    scorer: AnomalyScorer,
    predictor: LoadPredictor,
    schema: SchemaRegistry,
    clock: Arc<dyn Clock>,
    anomaly_cooldown: chrono::Duration,
    prediction_cooldown: chrono::Duration,
    entities: DashMap<String, Arc<Mutex<EntityState>>>,
    metrics: SentinelMetrics,
    logger: StructuredLogger,
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("config", &self.config)
            .field("predictor", &self.predictor)
            .field("entities", &self.entities.len())
            .finish()
    }
}

impl Monitor {
    /// Create a monitor with the trend forecaster and the system clock
    pub fn new(config: MonitorConfig) -> DetectorResult<Self> {
        config.validate()?;

        let scorer = AnomalyScorer::new(config.trailing_window, config.threshold_k)?;
        let predictor = LoadPredictor::new(
            Arc::new(TrendForecaster::default()),
            config.forecast_horizon,
            config.load_threshold,
        );
        let anomaly_cooldown = chrono::Duration::from_std(config.anomaly_cooldown)
            .map_err(|_| DetectorError::invalid("anomaly cooldown out of range"))?;
        let prediction_cooldown = chrono::Duration::from_std(config.prediction_cooldown)
            .map_err(|_| DetectorError::invalid("prediction cooldown out of range"))?;

        Ok(Self {
            config,
            scorer,
            predictor,
            schema: SchemaRegistry::default(),
            clock: Arc::new(SystemClock),
            anomaly_cooldown,
            prediction_cooldown,
            entities: DashMap::new(),
            metrics: SentinelMetrics::new(),
            logger: StructuredLogger::new("local"),
        })
    }

    pub fn with_forecaster(mut self, forecaster: Arc<dyn Forecaster>) -> Self {
        self.predictor = LoadPredictor::new(
            forecaster,
            self.config.forecast_horizon,
            self.config.load_threshold,
        );
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_schema(mut self, schema: SchemaRegistry) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    pub fn forecaster_name(&self) -> &str {
        self.predictor.forecaster_name()
    }

    /// Ingest one row of channel values for `entity_id`.
    ///
    /// Structural errors reject the whole row before any state changes.
    /// Warm-up and throttling are reported through [`CheckStatus`].
    pub fn ingest(
        &self,
        entity_id: &str,
        timestamp: i64,
        values: &BTreeMap<String, f64>,
    ) -> DetectorResult<IngestOutcome> {
        let result = self.ingest_row(entity_id, timestamp, values);
        if let Err(e) = &result {
            self.metrics.inc_samples_rejected(e);
            self.logger.log_sample_rejected(entity_id, e);
        }
        result
    }

    /// Shape a raw measurement row and ingest it as entity `host/measurement`
    pub fn ingest_measurement(
        &self,
        host: &str,
        measurement: &str,
        timestamp: i64,
        fields: &HashMap<String, f64>,
    ) -> DetectorResult<IngestOutcome> {
        let entity_id = entity_id(host, measurement);
        let values = self.schema.shape(measurement, fields).map_err(|e| {
            self.metrics.inc_samples_rejected(&e);
            self.logger.log_sample_rejected(&entity_id, &e);
            e
        })?;
        self.ingest(&entity_id, timestamp, &values)
    }

    fn ingest_row(
        &self,
        entity_id: &str,
        timestamp: i64,
        values: &BTreeMap<String, f64>,
    ) -> DetectorResult<IngestOutcome> {
        if entity_id.is_empty() {
            return Err(DetectorError::invalid("entity id must not be empty"));
        }
        if values.is_empty() {
            return Err(DetectorError::invalid("row carries no channel values"));
        }
        if let Some((name, &value)) = values.iter().find(|(_, v)| !v.is_finite() || **v < 0.0) {
            return Err(DetectorError::MalformedSample {
                channel: name.clone(),
                timestamp,
                value,
            });
        }

        let entry = self.entry_or_create(entity_id);
        let mut state = lock(&entry, entity_id)?;

        state.validate_row(timestamp, values)?;
        state.append_row(timestamp, values)?;
        self.metrics.inc_samples_ingested();

        let profile_status = self.advance_profiles(&mut state);
        state.refresh_joint()?;

        let mut alerts = Vec::new();
        let now = self.clock.now();

        let anomaly_status = match profile_status {
            Some(status) => status,
            None => self.check_anomaly(&mut state, timestamp, now, &mut alerts),
        };
        let prediction_status = self.check_prediction(&mut state, timestamp, now, &mut alerts);

        Ok(IngestOutcome {
            alerts,
            anomaly_status,
            prediction_status,
        })
    }

    /// Build, extend or rebuild the streaming profiles of `state`.
    ///
    /// Returns a status when profiles are not available for scoring. A failed
    /// build is retried only after [`MonitorConfig::rebuild_backoff_rows`] more
    /// rows, and streaming profiles that outgrow
    /// [`MonitorConfig::series_limit`] are dropped.
    fn advance_profiles(&self, state: &mut EntityState) -> Option<CheckStatus> {
        let w = self.config.window_size;
        let budget = &self.config.recompute_budget;

        if state.profiles.is_none() {
            let need = self.config.warmup_samples();
            let have = state.samples();
            if have < need {
                return Some(CheckStatus::WarmingUp { have, need });
            }
            if !state.rebuild_due() {
                return Some(CheckStatus::Skipped {
                    reason: format!(
                        "profile build deferred for {} more rows",
                        state.rebuild_backoff_remaining()
                    ),
                });
            }
            return match self.rebuild(state, w, budget) {
                Ok(()) => None,
                Err(e) => {
                    state.defer_rebuild(self.config.rebuild_backoff_rows());
                    Some(CheckStatus::Skipped {
                        reason: e.to_string(),
                    })
                }
            };
        }

        let start = Instant::now();
        if let Err(e) = state.update_profiles() {
            self.logger.log_recompute_skipped(state.entity_id(), &e);
            return Some(CheckStatus::Skipped {
                reason: e.to_string(),
            });
        }
        self.metrics
            .observe_update_latency(start.elapsed().as_secs_f64());

        if state.series_len() > self.config.profile_capacity && state.rebuild_due() {
            // A failed rebuild keeps the current profiles in service
            if let Err(e) = self.rebuild(state, w, budget) {
                state.defer_rebuild(self.config.rebuild_backoff_rows());
                debug!(entity = %state.entity_id(), error = %e, "Keeping oversized profiles");
            }
        }

        let limit = self.config.series_limit();
        if state.series_len() > limit {
            warn!(
                entity = %state.entity_id(),
                series_len = state.series_len(),
                limit,
                "Dropping streaming profiles after repeated rebuild failures"
            );
            state.drop_profiles();
            return Some(CheckStatus::Skipped {
                reason: format!("streaming profile exceeded {} samples", limit),
            });
        }
        None
    }

    /// Replace every channel profile with a fresh build from the buffers
    fn rebuild(
        &self,
        state: &mut EntityState,
        window: usize,
        budget: &crate::anomaly::ComputeBudget,
    ) -> DetectorResult<()> {
        let start = Instant::now();
        match state.build_profiles(window, budget) {
            Ok(profiles) => {
                self.metrics
                    .observe_recompute_latency(start.elapsed().as_secs_f64());
                info!(
                    entity = %state.entity_id(),
                    channels = profiles.len(),
                    samples = state.samples(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Built matrix profiles"
                );
                state.profiles = Some(profiles);
                Ok(())
            }
            Err(e) => {
                if matches!(e, DetectorError::ComputeTimeout { .. }) {
                    self.metrics.inc_recompute_timeouts();
                }
                self.logger.log_recompute_skipped(state.entity_id(), &e);
                Err(e)
            }
        }
    }

    fn check_anomaly(
        &self,
        state: &mut EntityState,
        timestamp: i64,
        now: chrono::DateTime<chrono::Utc>,
        alerts: &mut Vec<Alert>,
    ) -> CheckStatus {
        let Some(profile_len) = state.joint().map(JointProfile::len) else {
            return CheckStatus::WarmingUp {
                have: state.samples(),
                need: self.config.warmup_samples(),
            };
        };
        if profile_len < self.scorer.trailing_window() {
            return CheckStatus::WarmingUp {
                have: profile_len,
                need: self.scorer.trailing_window(),
            };
        }
        if let Err(status) = state.acquire_anomaly_check(now) {
            return status;
        }

        let Some(joint) = state.joint() else {
            return CheckStatus::Clear;
        };
        let Some(outcome) = self.scorer.detect(joint.distances()) else {
            return CheckStatus::Clear;
        };

        let event = AnomalyEvent {
            entity_id: state.entity_id().to_string(),
            timestamp,
            triggering_channels: self.triggering_channels(state, joint),
            score: outcome.score,
            threshold: outcome.threshold,
        };
        self.metrics.inc_anomalies_detected();
        self.logger.log_anomaly(&event);
        alerts.push(Alert::Anomaly(event));
        CheckStatus::Alerted
    }

    /// Channels whose own profile fails the gate, or the channel that
    /// supplied the last joint minimum when none does on its own
    fn triggering_channels(&self, state: &EntityState, joint: &JointProfile) -> Vec<String> {
        let names = state.channel_names();
        let individually: Vec<String> = state
            .profiles()
            .unwrap_or_default()
            .iter()
            .zip(&names)
            .filter(|(p, _)| {
                self.scorer
                    .evaluate(p.profile().distances())
                    .is_some_and(|o: ScoreOutcome| o.is_anomalous())
            })
            .map(|(_, name)| name.clone())
            .collect();

        if !individually.is_empty() {
            return individually;
        }
        joint
            .sources()
            .last()
            .and_then(|&idx| names.get(idx).cloned())
            .into_iter()
            .collect()
    }

    fn check_prediction(
        &self,
        state: &mut EntityState,
        timestamp: i64,
        now: chrono::DateTime<chrono::Utc>,
        alerts: &mut Vec<Alert>,
    ) -> CheckStatus {
        let need = self.config.warmup_samples();
        let have = state.samples();
        if have < need {
            return CheckStatus::WarmingUp { have, need };
        }
        if let Err(status) = state.acquire_prediction_check(now) {
            return status;
        }

        let window = match state.forecast_window() {
            Ok(window) => window,
            Err(e) => return CheckStatus::Failed { reason: e.to_string() },
        };

        match self.predictor.check(state.entity_id(), &window, timestamp) {
            Ok(Some(forecast)) => {
                self.metrics.inc_load_alerts();
                self.logger.log_load_increase(&forecast);
                alerts.push(Alert::LoadIncrease(forecast));
                CheckStatus::Alerted
            }
            Ok(None) => CheckStatus::Clear,
            Err(e) => {
                self.metrics.inc_forecast_errors();
                warn!(
                    entity = %state.entity_id(),
                    forecaster = self.predictor.forecaster_name(),
                    error = %e,
                    "Forecast failed"
                );
                CheckStatus::Failed {
                    reason: format!("{:#}", e),
                }
            }
        }
    }

    /// Top-K discords of the entity's joint profile
    pub fn top_discords(&self, entity_id: &str, k: usize) -> DetectorResult<Vec<Discord>> {
        let entry = self.entry(entity_id)?;
        let state = lock(&entry, entity_id)?;
        let joint = state.joint().ok_or(DetectorError::InsufficientHistory {
            have: state.samples(),
            need: self.config.warmup_samples(),
        })?;
        let discords = joint.top_discords(k)?;
        Ok(state.annotate(discords))
    }

    pub fn snapshot(&self, entity_id: &str) -> DetectorResult<EntitySnapshot> {
        let entry = self.entry(entity_id)?;
        let state = lock(&entry, entity_id)?;
        Ok(state.snapshot(self.config.window_size))
    }

    /// Aligned history of every channel of the entity
    pub fn forecast_window(&self, entity_id: &str) -> DetectorResult<ForecastWindow> {
        let entry = self.entry(entity_id)?;
        let state = lock(&entry, entity_id)?;
        state.forecast_window()
    }

    /// Drop all state held for the entity
    pub fn evict(&self, entity_id: &str) -> DetectorResult<()> {
        self.entities
            .remove(entity_id)
            .ok_or_else(|| DetectorError::UnknownEntity(entity_id.to_string()))?;
        self.metrics
            .set_entities_monitored(self.entities.len() as i64);
        info!(entity = %entity_id, "Evicted entity state");
        Ok(())
    }

    pub fn entity_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entities.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    fn entry(&self, entity_id: &str) -> DetectorResult<Arc<Mutex<EntityState>>> {
        self.entities
            .get(entity_id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| DetectorError::UnknownEntity(entity_id.to_string()))
    }

    fn entry_or_create(&self, entity_id: &str) -> Arc<Mutex<EntityState>> {
        if let Some(existing) = self.entities.get(entity_id) {
            return Arc::clone(existing.value());
        }
        let entry = self
            .entities
            .entry(entity_id.to_string())
            .or_insert_with(|| {
                debug!(entity = %entity_id, "Creating entity state");
                Arc::new(Mutex::new(EntityState::new(
                    entity_id,
                    self.config.retention,
                    self.anomaly_cooldown,
                    self.prediction_cooldown,
                )))
            })
            .clone();
        self.metrics
            .set_entities_monitored(self.entities.len() as i64);
        entry
    }
}

/// Entity identifier for a measurement of a host
pub fn entity_id(host: &str, measurement: &str) -> String {
    format!("{}/{}", host, measurement)
}

fn lock<'a>(
    entry: &'a Arc<Mutex<EntityState>>,
    entity_id: &str,
) -> DetectorResult<MutexGuard<'a, EntityState>> {
    entry
        .lock()
        .map_err(|_| DetectorError::StatePoisoned(entity_id.to_string()))
}
