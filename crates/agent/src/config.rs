//! Agent configuration

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use sentinel_lib::anomaly::ComputeBudget;
use sentinel_lib::monitor::{
    MonitorConfig, DEFAULT_PROFILE_CAPACITY, DEFAULT_RETENTION, DEFAULT_WINDOW_SIZE,
};

/// Agent configuration
///
/// Read from `SENTINEL_*` environment variables and an optional
/// `sentinel.toml` in the working directory; environment wins.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Node label attached to alerts and logs
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// HTTP port for ingestion, queries, health and metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_window_size")]
    pub window_size: usize,

    #[serde(default = "default_trailing_window")]
    pub trailing_window: usize,

    #[serde(default = "default_threshold_k")]
    pub threshold_k: f64,

    /// Samples kept per channel
    #[serde(default = "default_retention")]
    pub retention: usize,

    #[serde(default = "default_profile_capacity")]
    pub profile_capacity: usize,

    #[serde(default = "default_anomaly_cooldown")]
    pub anomaly_cooldown_secs: u64,

    #[serde(default = "default_prediction_cooldown")]
    pub prediction_cooldown_secs: u64,

    #[serde(default = "default_forecast_horizon")]
    pub forecast_horizon: usize,

    #[serde(default = "default_load_threshold")]
    pub load_threshold: f64,

    /// Wall-clock limit for a from-scratch profile build
    #[serde(default = "default_recompute_timeout")]
    pub recompute_timeout_ms: u64,

    /// Largest channel length accepted for a from-scratch build
    #[serde(default = "default_recompute_max_samples")]
    pub recompute_max_samples: usize,

    /// Base URL placed in alert `generatorURL` fields
    #[serde(default)]
    pub external_url: Option<String>,
}

fn default_node_name() -> String {
    std::env::var("NODE_NAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_window_size() -> usize {
    DEFAULT_WINDOW_SIZE
}

fn default_trailing_window() -> usize {
    sentinel_lib::anomaly::DEFAULT_TRAILING_WINDOW
}

fn default_threshold_k() -> f64 {
    sentinel_lib::anomaly::DEFAULT_THRESHOLD_K
}

fn default_retention() -> usize {
    DEFAULT_RETENTION
}

fn default_profile_capacity() -> usize {
    DEFAULT_PROFILE_CAPACITY
}

fn default_anomaly_cooldown() -> u64 {
    10 * 60
}

fn default_prediction_cooldown() -> u64 {
    30 * 60
}

fn default_forecast_horizon() -> usize {
    sentinel_lib::predictor::DEFAULT_FORECAST_HORIZON
}

fn default_load_threshold() -> f64 {
    sentinel_lib::predictor::DEFAULT_LOAD_THRESHOLD
}

fn default_recompute_timeout() -> u64 {
    2_000
}

fn default_recompute_max_samples() -> usize {
    50_000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            api_port: default_api_port(),
            window_size: default_window_size(),
            trailing_window: default_trailing_window(),
            threshold_k: default_threshold_k(),
            retention: default_retention(),
            profile_capacity: default_profile_capacity(),
            anomaly_cooldown_secs: default_anomaly_cooldown(),
            prediction_cooldown_secs: default_prediction_cooldown(),
            forecast_horizon: default_forecast_horizon(),
            load_threshold: default_load_threshold(),
            recompute_timeout_ms: default_recompute_timeout(),
            recompute_max_samples: default_recompute_max_samples(),
            external_url: None,
        }
    }
}

impl AgentConfig {
    /// Load configuration from environment and config file
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("sentinel").required(false))
            .add_source(config::Environment::with_prefix("SENTINEL"))
            .build()
            .context("Failed to read sentinel configuration")?;

        config
            .try_deserialize()
            .context("Invalid sentinel configuration")
    }

    /// Engine settings, validated
    pub fn monitor_config(&self) -> Result<MonitorConfig> {
        let config = MonitorConfig {
            window_size: self.window_size,
            trailing_window: self.trailing_window,
            threshold_k: self.threshold_k,
            retention: self.retention,
            profile_capacity: self.profile_capacity,
            anomaly_cooldown: Duration::from_secs(self.anomaly_cooldown_secs),
            prediction_cooldown: Duration::from_secs(self.prediction_cooldown_secs),
            forecast_horizon: self.forecast_horizon,
            load_threshold: self.load_threshold,
            recompute_budget: ComputeBudget::new(
                Duration::from_millis(self.recompute_timeout_ms),
                self.recompute_max_samples,
            ),
        };
        config.validate().context("Invalid engine settings")?;
        Ok(config)
    }
}
