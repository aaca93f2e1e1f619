//! Distance profile engine
//!
//! Computes the matrix profile of a single channel: for every subsequence of
//! length `w`, the z-normalized Euclidean distance to its nearest non-trivial
//! match. The batch path walks the diagonals of the distance matrix and
//! updates dot products with the recurrence
//! `QT[i][j] = QT[i-1][j-1] - T[i-1]*T[j-1] + T[i+w-1]*T[j+w-1]`, so the cost
//! is O(n^2) rather than O(n^2 * w).

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::stats::SubsequenceStats;
use crate::error::{DetectorError, DetectorResult};

/// Smallest window size accepted by the engine
pub const MIN_WINDOW: usize = 4;

/// Smallest admissible distance between two subsequence starts.
///
/// `j` is a trivial match of `i` iff `2 * |i - j| < w`.
pub fn exclusion_radius(window: usize) -> usize {
    window.div_ceil(2)
}

/// Size and time limits for a from-scratch recomputation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComputeBudget {
    /// Wall-clock limit for the whole computation
    pub max_duration: Duration,
    /// Largest channel length accepted for a full computation
    pub max_samples: usize,
}

impl ComputeBudget {
    pub fn new(max_duration: Duration, max_samples: usize) -> Self {
        Self {
            max_duration,
            max_samples,
        }
    }

    pub fn unbounded() -> Self {
        Self {
            max_duration: Duration::MAX,
            max_samples: usize::MAX,
        }
    }
}

impl Default for ComputeBudget {
    fn default() -> Self {
        Self {
            max_duration: Duration::from_secs(2),
            max_samples: 50_000,
        }
    }
}

/// Matrix profile of one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixProfile {
    window: usize,
    distances: Vec<f64>,
    indices: Vec<usize>,
}

impl MatrixProfile {
    pub(crate) fn unfilled(window: usize, n_subs: usize) -> Self {
        Self {
            window,
            distances: vec![f64::INFINITY; n_subs],
            indices: vec![0; n_subs],
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn len(&self) -> usize {
        self.distances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distances.is_empty()
    }

    /// Nearest-match distance per subsequence, ordered by start index
    pub fn distances(&self) -> &[f64] {
        &self.distances
    }

    /// Start index of the nearest match per subsequence
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn entry(&self, idx: usize) -> Option<(f64, usize)> {
        Some((*self.distances.get(idx)?, *self.indices.get(idx)?))
    }

    pub fn last_distance(&self) -> Option<f64> {
        self.distances.last().copied()
    }

    /// Keep `distance` for `idx` if it beats the current nearest match
    #[inline]
    pub(crate) fn offer(&mut self, idx: usize, distance: f64, neighbor: usize) {
        if distance < self.distances[idx] {
            self.distances[idx] = distance;
            self.indices[idx] = neighbor;
        }
    }

    pub(crate) fn push(&mut self, distance: f64, neighbor: usize) {
        self.distances.push(distance);
        self.indices.push(neighbor);
    }
}

/// Dot product of `query` against every same-length window of `series`
pub fn sliding_dot_product(query: &[f64], series: &[f64]) -> Vec<f64> {
    let m = query.len();
    if series.len() < m {
        return Vec::new();
    }
    (0..=series.len() - m)
        .map(|i| dot(query, &series[i..i + m]))
        .collect()
}

#[inline]
pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Validate inputs shared by the batch and streaming paths
pub(crate) fn validate_channel(channel: &[f64], window: usize) -> DetectorResult<()> {
    if window < MIN_WINDOW {
        return Err(DetectorError::invalid(format!(
            "window size must be at least {}, got {}",
            MIN_WINDOW, window
        )));
    }
    if channel.len() < 2 * window {
        return Err(DetectorError::InsufficientHistory {
            have: channel.len(),
            need: 2 * window,
        });
    }
    if let Some((idx, &value)) = channel.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(DetectorError::MalformedSample {
            channel: format!("#{}", idx),
            timestamp: idx as i64,
            value,
        });
    }
    Ok(())
}

/// Compute the matrix profile of `channel` for window `w` without limits
pub fn compute_profile(channel: &[f64], window: usize) -> DetectorResult<MatrixProfile> {
    compute_profile_with_budget(channel, window, &ComputeBudget::unbounded())
}

/// Compute the matrix profile of `channel`, aborting once `budget` is spent.
///
/// On abort nothing is returned, so callers holding a previous profile keep it.
pub fn compute_profile_with_budget(
    channel: &[f64],
    window: usize,
    budget: &ComputeBudget,
) -> DetectorResult<MatrixProfile> {
    validate_channel(channel, window)?;
    let stats = SubsequenceStats::compute(channel, window);
    compute_with_stats(channel, &stats, budget)
}

pub(crate) fn compute_with_stats(
    channel: &[f64],
    stats: &SubsequenceStats,
    budget: &ComputeBudget,
) -> DetectorResult<MatrixProfile> {
    let start = Instant::now();
    let w = stats.window();
    let n_subs = channel.len() - w + 1;

    if channel.len() > budget.max_samples {
        return Err(DetectorError::ComputeTimeout {
            subsequences: n_subs,
            elapsed_ms: 0,
        });
    }

    let offset = stats.offset();
    let shifted: Vec<f64> = channel.iter().map(|x| x - offset).collect();

    let mut profile = MatrixProfile::unfilled(w, n_subs);
    let first_row = sliding_dot_product(&shifted[..w], &shifted);

    for k in exclusion_radius(w)..n_subs {
        if start.elapsed() > budget.max_duration {
            return Err(DetectorError::ComputeTimeout {
                subsequences: n_subs,
                elapsed_ms: start.elapsed().as_millis() as u64,
            });
        }

        let mut qt = first_row[k];
        let d = stats.distance(qt, 0, k);
        profile.offer(0, d, k);
        profile.offer(k, d, 0);

        for i in 1..(n_subs - k) {
            let j = i + k;
            qt = qt - shifted[i - 1] * shifted[j - 1] + shifted[i + w - 1] * shifted[j + w - 1];
            let d = stats.distance(qt, i, j);
            profile.offer(i, d, j);
            profile.offer(j, d, i);
        }
    }

    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::test_support::noisy_series;

    /// Quadratic reference: z-normalize explicitly and compare every pair
    fn brute_force(channel: &[f64], w: usize) -> Vec<f64> {
        let n_subs = channel.len() - w + 1;
        let znorm = |i: usize| -> Vec<f64> {
            let sub = &channel[i..i + w];
            let mu = sub.iter().sum::<f64>() / w as f64;
            let sd = (sub.iter().map(|x| (x - mu).powi(2)).sum::<f64>() / w as f64).sqrt();
            sub.iter().map(|x| (x - mu) / sd).collect()
        };
        (0..n_subs)
            .map(|i| {
                let zi = znorm(i);
                (0..n_subs)
                    .filter(|&j| 2 * i.abs_diff(j) >= w)
                    .map(|j| {
                        let zj = znorm(j);
                        zi.iter().zip(&zj).map(|(a, b)| (a - b).powi(2)).sum::<f64>().sqrt()
                    })
                    .fold(f64::INFINITY, f64::min)
            })
            .collect()
    }

    #[test]
    fn test_profile_length() {
        for (n, w) in [(8, 4), (50, 5), (120, 16), (300, 40)] {
            let channel = noisy_series(n, 7);
            let profile = compute_profile(&channel, w).unwrap();
            assert_eq!(profile.len(), n - w + 1, "n={n}, w={w}");
            assert_eq!(profile.window(), w);
        }
    }

    #[test]
    fn test_matches_brute_force() {
        let channel = noisy_series(90, 3);
        let w = 10;
        let profile = compute_profile(&channel, w).unwrap();
        let reference = brute_force(&channel, w);

        for (i, (a, b)) in profile.distances().iter().zip(&reference).enumerate() {
            assert!((a - b).abs() < 1e-6, "Mismatch at {i}: stomp={a}, brute={b}");
        }
    }

    #[test]
    fn test_matches_brute_force_at_high_level() {
        let channel: Vec<f64> = noisy_series(150, 13)
            .into_iter()
            .map(|x| 90.0 + 0.01 * x)
            .collect();
        let w = 12;
        let profile = compute_profile(&channel, w).unwrap();
        let reference = brute_force(&channel, w);

        for (i, (a, b)) in profile.distances().iter().zip(&reference).enumerate() {
            assert!((a - b).abs() < 1e-6, "Mismatch at {i}: stomp={a}, brute={b}");
        }
    }

    #[test]
    fn test_no_trivial_matches() {
        for w in [4, 5, 9, 16] {
            let channel = noisy_series(6 * w, 11);
            let profile = compute_profile(&channel, w).unwrap();
            for (i, (&d, &j)) in profile.distances().iter().zip(profile.indices()).enumerate() {
                assert!(d.is_finite(), "entry {i} has no match (w={w})");
                assert!(2 * i.abs_diff(j) >= w, "entry {i} matched {j} (w={w})");
            }
        }
    }

    #[test]
    fn test_constant_channel_is_all_zero() {
        let channel = vec![0.42; 300];
        let profile = compute_profile(&channel, 40).unwrap();
        assert_eq!(profile.len(), 261);
        assert!(profile.distances().iter().all(|&d| d == 0.0));
    }

    #[test]
    fn test_rejects_small_window() {
        let channel = noisy_series(20, 1);
        let err = compute_profile(&channel, 3).unwrap_err();
        assert!(matches!(err, DetectorError::InvalidArgument(_)));
    }

    #[test]
    fn test_rejects_short_channel() {
        let channel = noisy_series(79, 1);
        let err = compute_profile(&channel, 40).unwrap_err();
        assert_eq!(err, DetectorError::InsufficientHistory { have: 79, need: 80 });
    }

    #[test]
    fn test_rejects_non_finite_values() {
        let mut channel = noisy_series(40, 1);
        channel[17] = f64::NAN;
        let err = compute_profile(&channel, 4).unwrap_err();
        assert!(matches!(err, DetectorError::MalformedSample { timestamp: 17, .. }));
    }

    #[test]
    fn test_size_budget_aborts() {
        let channel = noisy_series(200, 5);
        let budget = ComputeBudget::new(Duration::from_secs(10), 100);
        let err = compute_profile_with_budget(&channel, 10, &budget).unwrap_err();
        assert!(matches!(err, DetectorError::ComputeTimeout { .. }));
    }

    #[test]
    fn test_time_budget_aborts() {
        let channel = noisy_series(400, 5);
        let budget = ComputeBudget::new(Duration::ZERO, usize::MAX);
        let err = compute_profile_with_budget(&channel, 10, &budget);
        // A zero budget may still finish the first diagonal check on a very
        // fast clock, so only a timeout or a full profile is acceptable.
        match err {
            Err(DetectorError::ComputeTimeout { subsequences, .. }) => {
                assert_eq!(subsequences, 391)
            }
            Ok(profile) => assert_eq!(profile.len(), 391),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_sliding_dot_product() {
        let result = sliding_dot_product(&[1.0, 2.0], &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(result, vec![5.0, 8.0, 11.0]);
        assert!(sliding_dot_product(&[1.0, 2.0, 3.0], &[1.0]).is_empty());
    }

    #[test]
    fn test_exclusion_radius() {
        assert_eq!(exclusion_radius(4), 2);
        assert_eq!(exclusion_radius(5), 3);
        assert_eq!(exclusion_radius(40), 20);
    }
}
