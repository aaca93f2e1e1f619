//! Error taxonomy for the detection engine
//!
//! Warm-up and throttling are expected operating states and are reported as
//! values (see [`crate::monitor::CheckStatus`]). The variants here are the
//! conditions a caller has to act on.

use thiserror::Error;

/// Errors raised by the detection engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectorError {
    /// Not enough samples to build a profile or evaluate a score yet
    #[error("insufficient history: have {have} samples, need {need}")]
    InsufficientHistory { have: usize, need: usize },

    /// Channel profiles disagree in length or window when aggregating
    #[error("dimension mismatch: channel lengths {lengths:?}")]
    DimensionMismatch { lengths: Vec<usize> },

    /// A non-finite or out-of-domain value was offered for a channel
    #[error("malformed sample for channel '{channel}' at {timestamp}: {value}")]
    MalformedSample {
        channel: String,
        timestamp: i64,
        value: f64,
    },

    /// A full recomputation exceeded its size or time budget
    #[error("profile recomputation over {subsequences} subsequences aborted after {elapsed_ms}ms")]
    ComputeTimeout { subsequences: usize, elapsed_ms: u64 },

    /// Caller misuse, e.g. a window below 4 or `k == 0`
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No state is held for the requested entity
    #[error("unknown entity '{0}'")]
    UnknownEntity(String),

    /// A previous writer panicked while holding the entity lock
    #[error("state for entity '{0}' is poisoned")]
    StatePoisoned(String),
}

impl DetectorError {
    pub fn invalid(message: impl Into<String>) -> Self {
        DetectorError::InvalidArgument(message.into())
    }

    /// Whether the condition clears by itself once more data arrives
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DetectorError::InsufficientHistory { .. } | DetectorError::ComputeTimeout { .. }
        )
    }
}

/// Result alias used across the engine
pub type DetectorResult<T> = Result<T, DetectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(DetectorError::InsufficientHistory { have: 3, need: 80 }.is_transient());
        assert!(DetectorError::ComputeTimeout {
            subsequences: 10,
            elapsed_ms: 5
        }
        .is_transient());
        assert!(!DetectorError::invalid("k must be positive").is_transient());
        assert!(!DetectorError::DimensionMismatch {
            lengths: vec![200, 199]
        }
        .is_transient());
    }

    #[test]
    fn test_error_messages() {
        let err = DetectorError::MalformedSample {
            channel: "cpu.used_ratio".to_string(),
            timestamp: 42,
            value: f64::NAN,
        };
        assert!(err.to_string().contains("cpu.used_ratio"));
        assert!(err.to_string().contains("42"));
    }
}
