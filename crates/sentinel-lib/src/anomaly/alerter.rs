//! Alert formatting for the response layer
//!
//! Turns [`Alert`]s into Alertmanager webhook alerts so the agent can hand
//! them to any Alertmanager-compatible receiver.

use std::collections::HashMap;

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Alert;

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertSeverity::Warning => write!(f, "warning"),
            AlertSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// Alertmanager webhook alert format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertmanagerAlert {
    /// Alert status (firing or resolved)
    pub status: String,
    /// Alert labels for routing and grouping
    pub labels: HashMap<String, String>,
    /// Alert annotations with details
    pub annotations: HashMap<String, String>,
    /// Start time in RFC3339 format
    pub starts_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator_url: Option<String>,
}

/// Alertmanager webhook payload (array of alerts)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertmanagerPayload {
    pub alerts: Vec<AlertmanagerAlert>,
}

impl AlertmanagerPayload {
    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }
}

/// Builds Alertmanager payloads for engine alerts
#[derive(Debug, Clone)]
pub struct Alerter {
    node_name: String,
    generator_url: Option<String>,
}

impl Alerter {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            generator_url: None,
        }
    }

    /// Link attached to every alert, e.g. the agent's entity endpoint
    pub fn with_generator_url(mut self, url: impl Into<String>) -> Self {
        self.generator_url = Some(url.into());
        self
    }

    /// Severity of an alert
    ///
    /// Anomalies scoring more than twice their threshold and forecasts
    /// exceeding the threshold by 10% are critical.
    pub fn severity(alert: &Alert) -> AlertSeverity {
        match alert {
            Alert::Anomaly(event) => {
                if event.threshold > 0.0 && event.score >= 2.0 * event.threshold {
                    AlertSeverity::Critical
                } else {
                    AlertSeverity::Warning
                }
            }
            Alert::LoadIncrease(forecast) => {
                if forecast.peak_value >= forecast.threshold * 1.1 {
                    AlertSeverity::Critical
                } else {
                    AlertSeverity::Warning
                }
            }
        }
    }

    /// Format a single alert
    pub fn format(&self, alert: &Alert) -> AlertmanagerAlert {
        let severity = Self::severity(alert);
        let mut labels = HashMap::new();
        labels.insert("entity".to_string(), alert.entity_id().to_string());
        labels.insert("severity".to_string(), severity.to_string());
        labels.insert("node".to_string(), self.node_name.clone());

        let mut annotations = HashMap::new();
        annotations.insert("summary".to_string(), alert.message().to_string());

        match alert {
            Alert::Anomaly(event) => {
                labels.insert("alertname".to_string(), "MatrixProfileAnomaly".to_string());
                annotations.insert(
                    "description".to_string(),
                    format!(
                        "Joint matrix profile {:.3} exceeded threshold {:.3} on channels [{}]",
                        event.score,
                        event.threshold,
                        event.triggering_channels.join(", ")
                    ),
                );
                annotations.insert("score".to_string(), format!("{:.6}", event.score));
                annotations.insert("threshold".to_string(), format!("{:.6}", event.threshold));
            }
            Alert::LoadIncrease(forecast) => {
                labels.insert("alertname".to_string(), "LoadIncreaseExpected".to_string());
                labels.insert("channel".to_string(), forecast.channel.clone());
                annotations.insert(
                    "description".to_string(),
                    format!(
                        "Channel {} forecast to reach {:.2} within {} steps (threshold {:.2})",
                        forecast.channel, forecast.peak_value, forecast.horizon, forecast.threshold
                    ),
                );
            }
        }

        AlertmanagerAlert {
            status: "firing".to_string(),
            labels,
            annotations,
            starts_at: rfc3339(alert.timestamp()),
            ends_at: None,
            generator_url: self.generator_url.clone(),
        }
    }

    /// Format a batch of alerts into one webhook payload
    pub fn payload(&self, alerts: &[Alert]) -> AlertmanagerPayload {
        AlertmanagerPayload {
            alerts: alerts.iter().map(|a| self.format(a)).collect(),
        }
    }
}

fn rfc3339(timestamp: i64) -> String {
    Utc.timestamp_opt(timestamp, 0)
        .single()
        .unwrap_or_else(Utc::now)
        .to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnomalyEvent, LoadForecast};

    fn anomaly(score: f64, threshold: f64) -> Alert {
        Alert::Anomaly(AnomalyEvent {
            entity_id: "host1/cpu".to_string(),
            timestamp: 1_700_000_000,
            triggering_channels: vec!["used_ratio".to_string(), "free_ratio".to_string()],
            score,
            threshold,
        })
    }

    #[test]
    fn test_anomaly_alert_format() {
        let alerter = Alerter::new("node-a");
        let alert = alerter.format(&anomaly(3.0, 2.0));

        assert_eq!(alert.status, "firing");
        assert_eq!(alert.labels["alertname"], "MatrixProfileAnomaly");
        assert_eq!(alert.labels["entity"], "host1/cpu");
        assert_eq!(alert.labels["node"], "node-a");
        assert_eq!(alert.labels["severity"], "warning");
        assert_eq!(alert.annotations["summary"], "Anomaly detected.");
        assert!(alert.annotations["description"].contains("used_ratio, free_ratio"));
        assert!(alert.starts_at.starts_with("2023-11-14"));
    }

    #[test]
    fn test_severity() {
        assert_eq!(Alerter::severity(&anomaly(4.0, 2.0)), AlertSeverity::Critical);
        assert_eq!(Alerter::severity(&anomaly(3.9, 2.0)), AlertSeverity::Warning);

        let load = Alert::LoadIncrease(LoadForecast {
            entity_id: "host1/ram".to_string(),
            timestamp: 0,
            channel: "used_ratio".to_string(),
            peak_value: 99.5,
            threshold: 90.0,
            horizon: 12,
        });
        assert_eq!(Alerter::severity(&load), AlertSeverity::Critical);
    }

    #[test]
    fn test_payload_serialization() {
        let alerter = Alerter::new("node-a").with_generator_url("http://agent:8080/v1/entities");
        let load = Alert::LoadIncrease(LoadForecast {
            entity_id: "host1/disk".to_string(),
            timestamp: 0,
            channel: "used_ratio".to_string(),
            peak_value: 92.0,
            threshold: 90.0,
            horizon: 6,
        });
        let payload = alerter.payload(&[anomaly(1.0, 0.5), load]);
        assert_eq!(payload.len(), 2);

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json["alerts"][1]["annotations"]["summary"],
            "A large increase in the load is expected."
        );
        assert_eq!(json["alerts"][1]["labels"]["alertname"], "LoadIncreaseExpected");
        assert!(json["alerts"][0]["generatorUrl"].is_string());
        assert!(json["alerts"][0].get("endsAt").is_none());
    }
}
