//! Bounded per-channel sample history

use std::collections::VecDeque;

use crate::error::{DetectorError, DetectorResult};
use crate::models::Sample;

/// Ordered recent history of one numeric channel
#[derive(Debug, Clone)]
pub struct ChannelBuffer {
    name: String,
    samples: VecDeque<Sample>,
    retention: usize,
}

impl ChannelBuffer {
    pub fn new(name: impl Into<String>, retention: usize) -> Self {
        Self {
            name: name.into(),
            samples: VecDeque::with_capacity(retention.min(4096)),
            retention: retention.max(1),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    /// Reject values the engine cannot profile: non-finite or negative
    pub fn validate(&self, sample: &Sample) -> DetectorResult<()> {
        if !sample.value.is_finite() || sample.value < 0.0 {
            return Err(DetectorError::MalformedSample {
                channel: self.name.clone(),
                timestamp: sample.timestamp,
                value: sample.value,
            });
        }
        Ok(())
    }

    /// Append a sample, evicting the oldest one beyond retention
    pub fn push(&mut self, sample: Sample) -> DetectorResult<()> {
        self.validate(&sample)?;
        self.samples.push_back(sample);
        while self.samples.len() > self.retention {
            self.samples.pop_front();
        }
        Ok(())
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.value).collect()
    }

    pub fn timestamps(&self) -> Vec<i64> {
        self.samples.iter().map(|s| s.timestamp).collect()
    }
}
