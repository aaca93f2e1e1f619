//! Engine configuration

use std::time::Duration;

use crate::anomaly::{ComputeBudget, DEFAULT_THRESHOLD_K, DEFAULT_TRAILING_WINDOW, MIN_WINDOW};
use crate::error::{DetectorError, DetectorResult};
use crate::predictor::{DEFAULT_FORECAST_HORIZON, DEFAULT_LOAD_THRESHOLD};
use crate::throttle::{DEFAULT_ANOMALY_COOLDOWN_MINS, DEFAULT_PREDICTION_COOLDOWN_MINS};

/// Default subsequence length
pub const DEFAULT_WINDOW_SIZE: usize = 40;

/// Default number of samples retained per channel
pub const DEFAULT_RETENTION: usize = 2000;

/// Default streaming series length that triggers a rebuild from the buffers
pub const DEFAULT_PROFILE_CAPACITY: usize = 4000;

/// Configuration for the [`super::Monitor`]
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Subsequence length `w`, fixed for the lifetime of the monitor
    pub window_size: usize,
    /// Number of trailing profile entries the anomaly gate looks at
    pub trailing_window: usize,
    /// Standard deviations above the trailing mean that count as anomalous
    pub threshold_k: f64,
    /// Samples kept per channel buffer
    pub retention: usize,
    /// Streaming series length past which profiles are rebuilt from the buffers
    pub profile_capacity: usize,
    pub anomaly_cooldown: Duration,
    pub prediction_cooldown: Duration,
    /// Number of future steps requested from the forecaster
    pub forecast_horizon: usize,
    /// Predicted value above which a load alert is raised
    pub load_threshold: f64,
    /// Limits for from-scratch profile builds
    pub recompute_budget: ComputeBudget,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            trailing_window: DEFAULT_TRAILING_WINDOW,
            threshold_k: DEFAULT_THRESHOLD_K,
            retention: DEFAULT_RETENTION,
            profile_capacity: DEFAULT_PROFILE_CAPACITY,
            anomaly_cooldown: Duration::from_secs(DEFAULT_ANOMALY_COOLDOWN_MINS as u64 * 60),
            prediction_cooldown: Duration::from_secs(DEFAULT_PREDICTION_COOLDOWN_MINS as u64 * 60),
            forecast_horizon: DEFAULT_FORECAST_HORIZON,
            load_threshold: DEFAULT_LOAD_THRESHOLD,
            recompute_budget: ComputeBudget::default(),
        }
    }
}

impl MonitorConfig {
    /// Samples a channel needs before its first profile can be built
    pub fn warmup_samples(&self) -> usize {
        2 * self.window_size
    }

    /// Rows to wait after a failed profile build before trying again
    pub fn rebuild_backoff_rows(&self) -> usize {
        self.window_size
    }

    /// Streaming series length at which profiles are dropped when rebuilds
    /// keep failing
    pub fn series_limit(&self) -> usize {
        2 * self.profile_capacity
    }

    pub fn validate(&self) -> DetectorResult<()> {
        if self.window_size < MIN_WINDOW {
            return Err(DetectorError::invalid(format!(
                "window_size must be at least {}, got {}",
                MIN_WINDOW, self.window_size
            )));
        }
        if self.trailing_window < 2 {
            return Err(DetectorError::invalid("trailing_window must be at least 2"));
        }
        if !self.threshold_k.is_finite() || self.threshold_k <= 0.0 {
            return Err(DetectorError::invalid("threshold_k must be positive"));
        }
        if self.retention < self.warmup_samples() {
            return Err(DetectorError::invalid(format!(
                "retention {} cannot hold the {} samples needed for a profile",
                self.retention,
                self.warmup_samples()
            )));
        }
        if self.retention > self.recompute_budget.max_samples {
            return Err(DetectorError::invalid(format!(
                "retention {} exceeds the recompute budget of {} samples",
                self.retention, self.recompute_budget.max_samples
            )));
        }
        if self.profile_capacity <= self.retention {
            return Err(DetectorError::invalid(format!(
                "profile_capacity {} must exceed retention {}",
                self.profile_capacity, self.retention
            )));
        }
        if self.forecast_horizon == 0 {
            return Err(DetectorError::invalid("forecast_horizon must be at least 1"));
        }
        if !self.load_threshold.is_finite() {
            return Err(DetectorError::invalid("load_threshold must be finite"));
        }
        chrono::Duration::from_std(self.anomaly_cooldown)
            .and(chrono::Duration::from_std(self.prediction_cooldown))
            .map_err(|_| DetectorError::invalid("cooldown out of range"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = MonitorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.window_size, 40);
        assert_eq!(config.warmup_samples(), 80);
        assert_eq!(config.anomaly_cooldown, Duration::from_secs(600));
        assert_eq!(config.prediction_cooldown, Duration::from_secs(1800));
        assert_eq!(config.load_threshold, 90.0);
        assert!(config.retention <= config.recompute_budget.max_samples);
        assert_eq!(config.series_limit(), 8000);
    }

    #[test]
    fn test_rejects_bad_values() {
        let cases = [
            MonitorConfig {
                window_size: 3,
                ..Default::default()
            },
            MonitorConfig {
                threshold_k: 0.0,
                ..Default::default()
            },
            MonitorConfig {
                retention: 50,
                ..Default::default()
            },
            MonitorConfig {
                profile_capacity: 2000,
                ..Default::default()
            },
            MonitorConfig {
                recompute_budget: ComputeBudget::new(Duration::from_secs(2), 1000),
                ..Default::default()
            },
            MonitorConfig {
                forecast_horizon: 0,
                ..Default::default()
            },
            MonitorConfig {
                anomaly_cooldown: Duration::MAX,
                ..Default::default()
            },
        ];
        for config in cases {
            assert!(
                matches!(config.validate(), Err(DetectorError::InvalidArgument(_))),
                "{config:?}"
            );
        }
    }
}
