//! Core data models for the load sentinel

use serde::{Deserialize, Serialize};

/// Message attached to matrix-profile anomaly alerts
pub const ANOMALY_MESSAGE: &str = "Anomaly detected.";

/// Message attached to forecast-driven load alerts
pub const LOAD_INCREASE_MESSAGE: &str = "A large increase in the load is expected.";

/// A single timestamped reading of one channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: i64,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Anomaly raised when the trailing joint profile leaves its recent band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyEvent {
    pub entity_id: String,
    pub timestamp: i64,
    pub triggering_channels: Vec<String>,
    pub score: f64,
    pub threshold: f64,
}

/// Forecast that crosses the configured load threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadForecast {
    pub entity_id: String,
    pub timestamp: i64,
    pub channel: String,
    pub peak_value: f64,
    pub threshold: f64,
    pub horizon: usize,
}

/// Alert handed to the response layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Alert {
    Anomaly(AnomalyEvent),
    LoadIncrease(LoadForecast),
}

impl Alert {
    pub fn message(&self) -> &'static str {
        match self {
            Alert::Anomaly(_) => ANOMALY_MESSAGE,
            Alert::LoadIncrease(_) => LOAD_INCREASE_MESSAGE,
        }
    }

    pub fn entity_id(&self) -> &str {
        match self {
            Alert::Anomaly(event) => &event.entity_id,
            Alert::LoadIncrease(forecast) => &forecast.entity_id,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            Alert::Anomaly(event) => event.timestamp,
            Alert::LoadIncrease(forecast) => forecast.timestamp,
        }
    }
}

/// A high matrix-profile window returned by the discord extractor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Discord {
    /// Start index of the subsequence within the profiled series
    pub index: usize,
    pub distance: f64,
    /// Timestamp of the first sample of the subsequence, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// Point-in-time view of one monitored entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub entity_id: String,
    pub channels: Vec<String>,
    pub samples: usize,
    pub window_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_len: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_joint_distance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_anomaly_check: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_prediction_check: Option<i64>,
}
