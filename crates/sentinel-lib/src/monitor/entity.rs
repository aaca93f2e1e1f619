//! State owned by one monitored entity

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::anomaly::{joint, ComputeBudget, JointProfile, StreamingProfile};
use crate::channel::ChannelBuffer;
use crate::error::{DetectorError, DetectorResult};
use crate::models::{Alert, Discord, EntitySnapshot, Sample};
use crate::predictor::ForecastWindow;
use crate::throttle::CheckThrottle;

/// Outcome of one gated check during ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckStatus {
    /// Not enough history yet; the throttle was not consumed
    WarmingUp { have: usize, need: usize },
    /// The cooldown has not elapsed
    Throttled { retry_in_secs: i64 },
    /// The check could not run this cycle, previous state kept
    Skipped { reason: String },
    /// Checked, nothing to report
    Clear,
    /// Checked and an alert was raised
    Alerted,
    /// The forecasting collaborator failed
    Failed { reason: String },
}

/// Result of ingesting one row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub alerts: Vec<Alert>,
    pub anomaly_status: CheckStatus,
    pub prediction_status: CheckStatus,
}

/// Channels, profiles and throttles of one entity
#[derive(Debug)]
pub struct EntityState {
    entity_id: String,
    retention: usize,
    /// Ordered by channel name; fixed by the first accepted row
    pub(crate) channels: Vec<ChannelBuffer>,
    /// One streaming profile per channel, same order as `channels`
    pub(crate) profiles: Option<Vec<StreamingProfile>>,
    pub(crate) joint: Option<JointProfile>,
    pub(crate) anomaly_throttle: CheckThrottle,
    pub(crate) prediction_throttle: CheckThrottle,
    /// Rows accepted over the lifetime of the entity
    rows_appended: usize,
    /// No profile build is attempted before this many rows were appended
    rebuild_not_before: usize,
}

impl EntityState {
    pub fn new(
        entity_id: impl Into<String>,
        retention: usize,
        anomaly_cooldown: Duration,
        prediction_cooldown: Duration,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            retention,
            channels: Vec::new(),
            profiles: None,
            joint: None,
            anomaly_throttle: CheckThrottle::new(anomaly_cooldown),
            prediction_throttle: CheckThrottle::new(prediction_cooldown),
            rows_appended: 0,
            rebuild_not_before: 0,
        }
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name().to_string()).collect()
    }

    /// Samples held per channel
    pub fn samples(&self) -> usize {
        self.channels.first().map_or(0, ChannelBuffer::len)
    }

    pub fn last_timestamp(&self) -> Option<i64> {
        self.channels.first().and_then(|c| c.last()).map(|s| s.timestamp)
    }

    pub fn joint(&self) -> Option<&JointProfile> {
        self.joint.as_ref()
    }

    pub fn profiles(&self) -> Option<&[StreamingProfile]> {
        self.profiles.as_deref()
    }

    /// Check a row against the entity without touching any state.
    ///
    /// The first row fixes the channel set; later rows must carry exactly the
    /// same channels, a later timestamp and well-formed values.
    pub fn validate_row(
        &self,
        timestamp: i64,
        values: &BTreeMap<String, f64>,
    ) -> DetectorResult<()> {
        if values.is_empty() {
            return Err(DetectorError::invalid("row carries no channel values"));
        }

        if !self.channels.is_empty() {
            let same_channels = values.len() == self.channels.len()
                && self.channels.iter().all(|c| values.contains_key(c.name()));
            if !same_channels {
                return Err(DetectorError::invalid(format!(
                    "entity '{}' expects channels [{}], got [{}]",
                    self.entity_id,
                    self.channel_names().join(", "),
                    values.keys().cloned().collect::<Vec<_>>().join(", ")
                )));
            }
        }

        if let Some(last) = self.last_timestamp() {
            if timestamp <= last {
                return Err(DetectorError::invalid(format!(
                    "timestamp {} is not after the last accepted timestamp {}",
                    timestamp, last
                )));
            }
        }

        for (name, &value) in values {
            if !value.is_finite() || value < 0.0 {
                return Err(DetectorError::MalformedSample {
                    channel: name.clone(),
                    timestamp,
                    value,
                });
            }
        }
        Ok(())
    }

    /// Append a validated row to the channel buffers
    pub(crate) fn append_row(
        &mut self,
        timestamp: i64,
        values: &BTreeMap<String, f64>,
    ) -> DetectorResult<()> {
        if self.channels.is_empty() {
            self.channels = values
                .keys()
                .map(|name| ChannelBuffer::new(name.clone(), self.retention))
                .collect();
        }
        for channel in &mut self.channels {
            let value = values[channel.name()];
            channel.push(Sample::new(timestamp, value))?;
        }
        self.rows_appended += 1;
        Ok(())
    }

    /// Whether a profile build may be attempted on this row
    pub(crate) fn rebuild_due(&self) -> bool {
        self.rows_appended >= self.rebuild_not_before
    }

    /// Hold off profile builds for the next `rows` rows
    pub(crate) fn defer_rebuild(&mut self, rows: usize) {
        self.rebuild_not_before = self.rows_appended + rows;
    }

    /// Rows left before the next build attempt
    pub(crate) fn rebuild_backoff_remaining(&self) -> usize {
        self.rebuild_not_before.saturating_sub(self.rows_appended)
    }

    /// Discard the streaming state; the buffers are kept
    pub(crate) fn drop_profiles(&mut self) {
        self.profiles = None;
        self.joint = None;
    }

    /// Build streaming profiles for every channel from the buffers.
    ///
    /// Either every channel succeeds or nothing is returned.
    pub(crate) fn build_profiles(
        &self,
        window: usize,
        budget: &ComputeBudget,
    ) -> DetectorResult<Vec<StreamingProfile>> {
        self.channels
            .iter()
            .map(|channel| {
                StreamingProfile::new(&channel.values(), window, budget).map_err(|e| match e {
                    DetectorError::MalformedSample {
                        timestamp, value, ..
                    } => DetectorError::MalformedSample {
                        channel: channel.name().to_string(),
                        timestamp,
                        value,
                    },
                    other => other,
                })
            })
            .collect()
    }

    /// Feed the newest sample of every channel into its streaming profile
    pub(crate) fn update_profiles(&mut self) -> DetectorResult<()> {
        let Some(profiles) = self.profiles.as_mut() else {
            return Ok(());
        };

        let result = profiles
            .iter_mut()
            .zip(&self.channels)
            .filter_map(|(profile, channel)| channel.last().map(|s| (profile, s.value)))
            .try_for_each(|(profile, value)| profile.append_and_update(value));

        if result.is_err() {
            // Channels are no longer aligned; the next row rebuilds from the buffers
            self.drop_profiles();
        }
        result
    }

    /// Longest streaming series across channels
    pub(crate) fn series_len(&self) -> usize {
        self.profiles
            .as_ref()
            .and_then(|p| p.iter().map(StreamingProfile::series_len).max())
            .unwrap_or(0)
    }

    pub(crate) fn refresh_joint(&mut self) -> DetectorResult<()> {
        self.joint = match &self.profiles {
            Some(profiles) => {
                let channel_profiles: Vec<_> = profiles.iter().map(|p| p.profile()).collect();
                Some(joint(&channel_profiles)?)
            }
            None => None,
        };
        Ok(())
    }

    /// Timestamp of the first sample of a subsequence starting at profile
    /// position `index`, if that sample is still buffered
    pub(crate) fn timestamp_at(&self, index: usize) -> Option<i64> {
        let channel = self.channels.first()?;
        let offset = self.series_len().checked_sub(channel.len())?;
        let position = index.checked_sub(offset)?;
        channel.timestamps().get(position).copied()
    }

    pub(crate) fn annotate(&self, mut discords: Vec<Discord>) -> Vec<Discord> {
        for discord in &mut discords {
            discord.timestamp = self.timestamp_at(discord.index);
        }
        discords
    }

    pub fn forecast_window(&self) -> DetectorResult<ForecastWindow> {
        ForecastWindow::from_buffers(&self.channels)
    }

    pub fn snapshot(&self, window_size: usize) -> EntitySnapshot {
        EntitySnapshot {
            entity_id: self.entity_id.clone(),
            channels: self.channel_names(),
            samples: self.samples(),
            window_size,
            profile_len: self.joint.as_ref().map(JointProfile::len),
            last_joint_distance: self.joint.as_ref().and_then(JointProfile::last_distance),
            last_timestamp: self.last_timestamp(),
            last_anomaly_check: self.anomaly_throttle.last_run().map(|t| t.timestamp()),
            last_prediction_check: self.prediction_throttle.last_run().map(|t| t.timestamp()),
        }
    }

    /// Try the anomaly throttle at `now`
    pub(crate) fn acquire_anomaly_check(&mut self, now: DateTime<Utc>) -> Result<(), CheckStatus> {
        acquire(&mut self.anomaly_throttle, now)
    }

    pub(crate) fn acquire_prediction_check(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<(), CheckStatus> {
        acquire(&mut self.prediction_throttle, now)
    }
}

fn acquire(throttle: &mut CheckThrottle, now: DateTime<Utc>) -> Result<(), CheckStatus> {
    if throttle.try_acquire(now) {
        Ok(())
    } else {
        Err(CheckStatus::Throttled {
            retry_in_secs: throttle.remaining(now).num_seconds(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> EntityState {
        EntityState::new("host1/cpu", 100, Duration::minutes(10), Duration::minutes(30))
    }

    fn row(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_first_row_fixes_channels() {
        let mut state = state();
        let first = row(&[("used_ratio", 40.0), ("free_ratio", 60.0)]);
        state.validate_row(1, &first).unwrap();
        state.append_row(1, &first).unwrap();
        assert_eq!(state.channel_names(), vec!["free_ratio", "used_ratio"]);

        let missing = row(&[("used_ratio", 41.0)]);
        assert!(matches!(
            state.validate_row(2, &missing),
            Err(DetectorError::InvalidArgument(_))
        ));

        let renamed = row(&[("used_ratio", 41.0), ("idle", 59.0)]);
        assert!(state.validate_row(2, &renamed).is_err());
    }

    #[test]
    fn test_rejects_stale_timestamp_and_bad_values() {
        let mut state = state();
        let first = row(&[("io", 1.0)]);
        state.append_row(10, &first).unwrap();

        assert!(state.validate_row(10, &first).is_err());
        let err = state.validate_row(11, &row(&[("io", f64::NAN)])).unwrap_err();
        assert!(matches!(err, DetectorError::MalformedSample { timestamp: 11, .. }));
        assert!(state.validate_row(11, &row(&[("io", -1.0)])).is_err());
        assert_eq!(state.samples(), 1);
    }

    #[test]
    fn test_timestamp_mapping_after_retention() {
        let mut state = EntityState::new("e", 20, Duration::minutes(1), Duration::minutes(1));
        for t in 0..20 {
            state.append_row(t, &row(&[("a", (t % 7) as f64)])).unwrap();
        }
        state.profiles = Some(state.build_profiles(4, &ComputeBudget::unbounded()).unwrap());

        // Buffer keeps 20 samples while the streaming series keeps growing
        for t in 20..30 {
            state.append_row(t, &row(&[("a", (t % 7) as f64)])).unwrap();
            state.update_profiles().unwrap();
        }
        assert_eq!(state.series_len(), 30);
        assert_eq!(state.samples(), 20);
        assert_eq!(state.timestamp_at(9), None);
        assert_eq!(state.timestamp_at(10), Some(10));
        assert_eq!(state.timestamp_at(26), Some(26));
    }

    #[test]
    fn test_throttle_status() {
        let mut state = state();
        let now = Utc::now();
        assert!(state.acquire_anomaly_check(now).is_ok());
        assert_eq!(
            state.acquire_anomaly_check(now + Duration::minutes(4)),
            Err(CheckStatus::Throttled { retry_in_secs: 360 })
        );
        assert!(state.acquire_prediction_check(now).is_ok());
    }
}
