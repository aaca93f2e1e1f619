//! Forecast-driven load alerts

use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Result};
use tracing::{debug, warn};

use super::{ForecastWindow, Forecaster};
use crate::models::LoadForecast;

/// Default number of future steps requested from the forecaster
pub const DEFAULT_FORECAST_HORIZON: usize = 12;

/// Default load threshold, in the units of the ingested channels
pub const DEFAULT_LOAD_THRESHOLD: f64 = 90.0;

/// Forecasts above this many milliseconds are logged as slow
const SLOW_FORECAST_MS: u128 = 500;

/// Runs a forecaster and decides whether a load alert is due
#[derive(Clone)]
pub struct LoadPredictor {
    forecaster: Arc<dyn Forecaster>,
    horizon: usize,
    threshold: f64,
}

impl std::fmt::Debug for LoadPredictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadPredictor")
            .field("forecaster", &self.forecaster.name())
            .field("horizon", &self.horizon)
            .field("threshold", &self.threshold)
            .finish()
    }
}

impl LoadPredictor {
    pub fn new(forecaster: Arc<dyn Forecaster>, horizon: usize, threshold: f64) -> Self {
        Self {
            forecaster,
            horizon: horizon.max(1),
            threshold,
        }
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn forecaster_name(&self) -> &str {
        self.forecaster.name()
    }

    /// Forecast `window` and return the highest predicted value if it
    /// exceeds the threshold.
    ///
    /// # Arguments
    /// * `entity_id` - Entity the window belongs to
    /// * `window` - Aligned history of every channel of the entity
    /// * `timestamp` - Timestamp of the sample that triggered the check
    pub fn check(
        &self,
        entity_id: &str,
        window: &ForecastWindow,
        timestamp: i64,
    ) -> Result<Option<LoadForecast>> {
        let start = Instant::now();
        let forecast = self.forecaster.forecast(window, self.horizon)?;

        let elapsed = start.elapsed().as_millis();
        if elapsed > SLOW_FORECAST_MS {
            warn!(
                entity = %entity_id,
                forecaster = self.forecaster.name(),
                elapsed_ms = elapsed as u64,
                "Slow forecast"
            );
        }

        if forecast.len() != window.channels().len() {
            bail!(
                "Forecaster returned {} channels, expected {}",
                forecast.len(),
                window.channels().len()
            );
        }

        let mut peak: Option<(usize, f64)> = None;
        for (channel, values) in forecast.iter().enumerate() {
            if values.is_empty() || values.len() > self.horizon {
                bail!(
                    "Forecaster returned {} values for channel '{}', expected 1..={}",
                    values.len(),
                    window.channels()[channel],
                    self.horizon
                );
            }
            if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
                bail!(
                    "Forecaster returned non-finite value {} for channel '{}'",
                    bad,
                    window.channels()[channel]
                );
            }
            let channel_peak = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if peak.map_or(true, |(_, p)| channel_peak > p) {
                peak = Some((channel, channel_peak));
            }
        }

        let Some((channel, peak_value)) = peak else {
            return Ok(None);
        };

        debug!(
            entity = %entity_id,
            channel = %window.channels()[channel],
            peak_value,
            threshold = self.threshold,
            "Forecast evaluated"
        );

        if peak_value <= self.threshold {
            return Ok(None);
        }

        Ok(Some(LoadForecast {
            entity_id: entity_id.to_string(),
            timestamp,
            channel: window.channels()[channel].clone(),
            peak_value,
            threshold: self.threshold,
            horizon: self.horizon,
        }))
    }
}
