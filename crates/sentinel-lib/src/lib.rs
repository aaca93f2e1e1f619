//! Load sentinel library
//!
//! This crate provides the core functionality for:
//! - Matrix-profile anomaly detection over streaming resource metrics
//! - Forecast-driven load alerts behind a pluggable forecaster
//! - Per-entity state, throttled checks and ingestion from a metric source
//! - Health checks and observability

pub mod anomaly;
pub mod channel;
pub mod error;
pub mod health;
pub mod models;
pub mod monitor;
pub mod observability;
pub mod predictor;
pub mod schema;
pub mod source;
pub mod throttle;

pub use error::{DetectorError, DetectorResult};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use monitor::{CheckStatus, IngestOutcome, Monitor, MonitorConfig};
pub use observability::{SentinelMetrics, StructuredLogger};
