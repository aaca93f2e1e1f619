//! Multichannel aggregation
//!
//! The joint profile is the element-wise minimum of the channel profiles of
//! one entity. An offset scores high only when no channel finds a good
//! historical match for it.

use serde::{Deserialize, Serialize};

use super::profile::MatrixProfile;
use crate::error::{DetectorError, DetectorResult};

/// Element-wise minimum over the channel profiles of one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointProfile {
    window: usize,
    distances: Vec<f64>,
    /// Index of the channel that supplied each minimum
    sources: Vec<usize>,
}

impl JointProfile {
    pub fn window(&self) -> usize {
        self.window
    }

    pub fn len(&self) -> usize {
        self.distances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distances.is_empty()
    }

    pub fn distances(&self) -> &[f64] {
        &self.distances
    }

    pub fn sources(&self) -> &[usize] {
        &self.sources
    }

    pub fn last_distance(&self) -> Option<f64> {
        self.distances.last().copied()
    }
}

/// Combine channel profiles into their element-wise minimum.
///
/// Fails with `DimensionMismatch` when the profiles differ in length or
/// window; no partial result is produced.
pub fn joint(profiles: &[&MatrixProfile]) -> DetectorResult<JointProfile> {
    let first = profiles
        .first()
        .ok_or_else(|| DetectorError::invalid("at least one channel profile is required"))?;

    let mismatched = profiles
        .iter()
        .any(|p| p.len() != first.len() || p.window() != first.window());
    if mismatched {
        return Err(DetectorError::DimensionMismatch {
            lengths: profiles.iter().map(|p| p.len()).collect(),
        });
    }

    let mut distances = first.distances().to_vec();
    let mut sources = vec![0; distances.len()];

    for (channel, profile) in profiles.iter().enumerate().skip(1) {
        for (i, &d) in profile.distances().iter().enumerate() {
            if d < distances[i] {
                distances[i] = d;
                sources[i] = channel;
            }
        }
    }

    Ok(JointProfile {
        window: first.window(),
        distances,
        sources,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::profile::compute_profile;
    use crate::anomaly::test_support::noisy_series;

    #[test]
    fn test_joint_is_elementwise_minimum() {
        let a = compute_profile(&noisy_series(200, 1), 40).unwrap();
        let b = compute_profile(&noisy_series(200, 2), 40).unwrap();
        let combined = joint(&[&a, &b]).unwrap();

        assert_eq!(combined.len(), a.len());
        for i in 0..combined.len() {
            let expected = a.distances()[i].min(b.distances()[i]);
            assert_eq!(combined.distances()[i], expected);
            let source = if b.distances()[i] < a.distances()[i] { 1 } else { 0 };
            assert_eq!(combined.sources()[i], source);
        }
    }

    #[test]
    fn test_single_channel_is_identity() {
        let a = compute_profile(&noisy_series(100, 3), 10).unwrap();
        let combined = joint(&[&a]).unwrap();
        assert_eq!(combined.distances(), a.distances());
        assert!(combined.sources().iter().all(|&s| s == 0));
    }

    #[test]
    fn test_unequal_lengths_fail() {
        let a = compute_profile(&noisy_series(200, 1), 40).unwrap();
        let b = compute_profile(&noisy_series(199, 2), 40).unwrap();

        let err = joint(&[&a, &b]).unwrap_err();
        assert_eq!(
            err,
            DetectorError::DimensionMismatch {
                lengths: vec![161, 160]
            }
        );
    }

    #[test]
    fn test_unequal_windows_fail() {
        // Same profile length from different (n, w) pairs
        let a = compute_profile(&noisy_series(49, 1), 10).unwrap();
        let b = compute_profile(&noisy_series(50, 2), 11).unwrap();
        assert_eq!(a.len(), b.len());
        assert!(matches!(
            joint(&[&a, &b]),
            Err(DetectorError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_empty_input_is_invalid() {
        assert!(matches!(joint(&[]), Err(DetectorError::InvalidArgument(_))));
    }
}
