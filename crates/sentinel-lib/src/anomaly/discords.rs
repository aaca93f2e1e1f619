//! Top-K discord extraction
//!
//! Discords are the subsequences with the highest matrix-profile values.
//! Candidates are taken in descending distance order (lower index first on
//! ties) and accepted only if they start at least `w` positions away from
//! every discord already accepted.

use std::cmp::Ordering;

use super::joint::JointProfile;
use super::profile::MatrixProfile;
use crate::error::{DetectorError, DetectorResult};
use crate::models::Discord;

/// Return up to `k` non-overlapping discords of `distances`
pub fn top_k(distances: &[f64], window: usize, k: usize) -> DetectorResult<Vec<Discord>> {
    if k == 0 {
        return Err(DetectorError::invalid("k must be greater than 0"));
    }

    let mut candidates: Vec<usize> = (0..distances.len())
        .filter(|&i| distances[i].is_finite())
        .collect();
    candidates.sort_by(|&a, &b| {
        distances[b]
            .partial_cmp(&distances[a])
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });

    let mut accepted: Vec<Discord> = Vec::with_capacity(k.min(candidates.len()));
    for idx in candidates {
        if accepted.len() == k {
            break;
        }
        if accepted.iter().all(|d| d.index.abs_diff(idx) >= window) {
            accepted.push(Discord {
                index: idx,
                distance: distances[idx],
                timestamp: None,
            });
        }
    }

    Ok(accepted)
}

impl MatrixProfile {
    pub fn top_discords(&self, k: usize) -> DetectorResult<Vec<Discord>> {
        top_k(self.distances(), self.window(), k)
    }
}

impl JointProfile {
    pub fn top_discords(&self, k: usize) -> DetectorResult<Vec<Discord>> {
        top_k(self.distances(), self.window(), k)
    }
}
