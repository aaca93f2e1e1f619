//! Incremental matrix profile updates
//!
//! [`StreamingProfile`] keeps the channel, its subsequence statistics, the
//! matrix profile and the dot products of the newest subsequence against every
//! other one. Appending a sample rolls those dot products forward with
//! `QT'[j] = QT[j-1] - T[j-1]*T[s-1] + T[j+w-1]*T[s+w-1]`, so each append
//! costs O(n) instead of the O(n * w) of recomputing every dot product.
//! Dot products are taken over samples minus the stats offset.

use super::profile::{
    compute_profile, compute_with_stats, dot, exclusion_radius, sliding_dot_product,
    validate_channel, ComputeBudget, MatrixProfile,
};
use super::stats::SubsequenceStats;
use crate::error::{DetectorError, DetectorResult};

/// Matrix profile that is maintained as samples arrive
#[derive(Debug, Clone)]
pub struct StreamingProfile {
    series: Vec<f64>,
    /// `series` minus `stats.offset()`
    shifted: Vec<f64>,
    stats: SubsequenceStats,
    profile: MatrixProfile,
    /// `qt[j] = dot(T[j..j+w], T[last..last+w])` for the newest subsequence
    qt: Vec<f64>,
}

impl StreamingProfile {
    /// Build the initial profile from at least `2w` samples
    pub fn new(values: &[f64], window: usize, budget: &ComputeBudget) -> DetectorResult<Self> {
        validate_channel(values, window)?;

        let stats = SubsequenceStats::compute(values, window);
        let profile = compute_with_stats(values, &stats, budget)?;
        let offset = stats.offset();
        let shifted: Vec<f64> = values.iter().map(|x| x - offset).collect();
        let last = values.len() - window;
        let qt = sliding_dot_product(&shifted[last..], &shifted);

        Ok(Self {
            series: values.to_vec(),
            shifted,
            stats,
            profile,
            qt,
        })
    }

    pub fn window(&self) -> usize {
        self.profile.window()
    }

    pub fn profile(&self) -> &MatrixProfile {
        &self.profile
    }

    pub fn series(&self) -> &[f64] {
        &self.series
    }

    /// Number of samples covered by the profile
    pub fn series_len(&self) -> usize {
        self.series.len()
    }

    /// Append one sample and bring the profile up to date.
    ///
    /// The result equals a from-scratch computation over the extended series
    /// within floating-point tolerance. A non-finite value is rejected and
    /// leaves the state untouched.
    pub fn append_and_update(&mut self, value: f64) -> DetectorResult<()> {
        if !value.is_finite() {
            return Err(DetectorError::MalformedSample {
                channel: String::new(),
                timestamp: self.series.len() as i64,
                value,
            });
        }

        let w = self.window();

        // (a) extend the channel and its statistics
        self.series.push(value);
        self.shifted.push(value - self.stats.offset());
        self.stats.push(&self.series);

        let n = self.series.len();
        let newest = n - w;

        // Roll dot products forward in place, highest index first so that
        // qt[j - 1] is still the previous value when qt[j] is rewritten.
        let t = &self.shifted;
        self.qt.push(0.0);
        for j in (1..=newest).rev() {
            self.qt[j] = self.qt[j - 1] - t[j - 1] * t[newest - 1] + t[j + w - 1] * t[n - 1];
        }
        self.qt[0] = dot(&t[..w], &t[newest..]);

        // (b) distances from the new subsequence to every admissible one,
        // (c) refreshing prior entries the new subsequence now beats
        let mut best = (f64::INFINITY, 0usize);
        if let Some(last_admissible) = newest.checked_sub(exclusion_radius(w)) {
            for j in 0..=last_admissible {
                let d = self.stats.distance(self.qt[j], j, newest);
                self.profile.offer(j, d, newest);
                if d < best.0 {
                    best = (d, j);
                }
            }
        }

        // (d) one new profile entry
        self.profile.push(best.0, best.1);
        Ok(())
    }

    /// Largest absolute distance difference against a from-scratch profile
    pub fn max_deviation_from_batch(&self) -> DetectorResult<f64> {
        let batch = compute_profile(&self.series, self.window())?;
        Ok(batch
            .distances()
            .iter()
            .zip(self.profile.distances())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::test_support::noisy_series;

    #[test]
    fn test_streaming_matches_batch() {
        let full = noisy_series(160, 21);
        let w = 8;

        let mut streaming =
            StreamingProfile::new(&full[..2 * w], w, &ComputeBudget::unbounded()).unwrap();
        for &value in &full[2 * w..] {
            streaming.append_and_update(value).unwrap();
        }

        let batch = compute_profile(&full, w).unwrap();
        assert_eq!(streaming.profile().len(), batch.len());
        for (i, (a, b)) in streaming
            .profile()
            .distances()
            .iter()
            .zip(batch.distances())
            .enumerate()
        {
            let tolerance = 1e-6 * b.abs().max(1.0);
            assert!((a - b).abs() < tolerance, "Mismatch at {i}: streaming={a}, batch={b}");
        }
    }

    #[test]
    fn test_streaming_matches_batch_odd_window() {
        let full = noisy_series(120, 5);
        let w = 7;

        let mut streaming =
            StreamingProfile::new(&full[..30], w, &ComputeBudget::unbounded()).unwrap();
        for &value in &full[30..] {
            streaming.append_and_update(value).unwrap();
        }
        assert!(streaming.max_deviation_from_batch().unwrap() < 1e-6);
    }

    #[test]
    fn test_streaming_matches_batch_at_high_level() {
        // Small variation on top of a large constant level
        let full: Vec<f64> = noisy_series(600, 17)
            .into_iter()
            .map(|x| 90.0 + 0.01 * x)
            .collect();
        let w = 20;

        let mut streaming =
            StreamingProfile::new(&full[..2 * w], w, &ComputeBudget::unbounded()).unwrap();
        for &value in &full[2 * w..] {
            streaming.append_and_update(value).unwrap();
        }

        assert_eq!(streaming.profile().len(), 581);
        assert!(streaming.max_deviation_from_batch().unwrap() < 1e-6);
        assert!(streaming.profile().distances().iter().all(|d| d.is_finite()));
    }

    #[test]
    fn test_profile_grows_by_one_per_append() {
        let full = noisy_series(60, 2);
        let w = 10;
        let mut streaming =
            StreamingProfile::new(&full[..20], w, &ComputeBudget::unbounded()).unwrap();
        assert_eq!(streaming.profile().len(), 11);

        for (step, &value) in full[20..].iter().enumerate() {
            streaming.append_and_update(value).unwrap();
            assert_eq!(streaming.profile().len(), 12 + step);
            assert_eq!(streaming.series_len(), 21 + step);
        }
    }

    #[test]
    fn test_streaming_respects_exclusion_zone() {
        let full = noisy_series(100, 9);
        let w = 12;
        let mut streaming =
            StreamingProfile::new(&full[..24], w, &ComputeBudget::unbounded()).unwrap();
        for &value in &full[24..] {
            streaming.append_and_update(value).unwrap();
        }

        let profile = streaming.profile();
        for (i, (&d, &j)) in profile.distances().iter().zip(profile.indices()).enumerate() {
            assert!(d.is_finite());
            assert!(2 * i.abs_diff(j) >= w, "entry {i} matched {j}");
        }
    }

    #[test]
    fn test_rejects_non_finite_append() {
        let full = noisy_series(40, 4);
        let mut streaming =
            StreamingProfile::new(&full, 8, &ComputeBudget::unbounded()).unwrap();
        let before = streaming.profile().clone();

        let err = streaming.append_and_update(f64::INFINITY).unwrap_err();
        assert!(matches!(err, DetectorError::MalformedSample { .. }));
        assert_eq!(streaming.profile(), &before);
        assert_eq!(streaming.series_len(), 40);
    }

    #[test]
    fn test_constant_stream_stays_zero() {
        let mut streaming =
            StreamingProfile::new(&vec![0.7; 80], 40, &ComputeBudget::unbounded()).unwrap();
        for _ in 0..220 {
            streaming.append_and_update(0.7).unwrap();
        }
        assert_eq!(streaming.profile().len(), 261);
        assert!(streaming.profile().distances().iter().all(|&d| d == 0.0));
    }

    #[test]
    fn test_initial_build_requires_two_windows() {
        let err = StreamingProfile::new(&noisy_series(15, 1), 8, &ComputeBudget::unbounded())
            .unwrap_err();
        assert_eq!(err, DetectorError::InsufficientHistory { have: 15, need: 16 });
    }
}
