//! Multivariate input window for forecasters

use serde::{Deserialize, Serialize};

use crate::channel::ChannelBuffer;
use crate::error::{DetectorError, DetectorResult};

/// Timestamps plus one value row per channel, aligned by position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastWindow {
    timestamps: Vec<i64>,
    channels: Vec<String>,
    /// `values[channel][time]`
    values: Vec<Vec<f64>>,
}

impl ForecastWindow {
    pub fn new(
        timestamps: Vec<i64>,
        channels: Vec<String>,
        values: Vec<Vec<f64>>,
    ) -> DetectorResult<Self> {
        if channels.is_empty() {
            return Err(DetectorError::invalid("forecast window needs at least one channel"));
        }
        if channels.len() != values.len() {
            return Err(DetectorError::invalid(format!(
                "{} channel names for {} value rows",
                channels.len(),
                values.len()
            )));
        }
        if values.iter().any(|row| row.len() != timestamps.len()) {
            let mut lengths = vec![timestamps.len()];
            lengths.extend(values.iter().map(Vec::len));
            return Err(DetectorError::DimensionMismatch { lengths });
        }
        Ok(Self {
            timestamps,
            channels,
            values,
        })
    }

    /// Build from the buffers of one entity; timestamps come from the first
    pub fn from_buffers(buffers: &[ChannelBuffer]) -> DetectorResult<Self> {
        let first = buffers
            .first()
            .ok_or_else(|| DetectorError::invalid("forecast window needs at least one channel"))?;
        Self::new(
            first.timestamps(),
            buffers.iter().map(|b| b.name().to_string()).collect(),
            buffers.iter().map(ChannelBuffer::values).collect(),
        )
    }

    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn values(&self) -> &[Vec<f64>] {
        &self.values
    }

    /// Number of time steps
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}
