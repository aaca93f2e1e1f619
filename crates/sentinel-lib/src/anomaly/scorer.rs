//! Trailing z-score gate over a profile
//!
//! The most recent profile value is compared against the mean and standard
//! deviation of the entries immediately preceding it: statistics are taken
//! over `[len - trailing_window, len - 1)` and the value at `len - 1` is the
//! one under test.

use super::stats::RollingWindow;
use crate::error::{DetectorError, DetectorResult};

/// Default number of standard deviations above the trailing mean
pub const DEFAULT_THRESHOLD_K: f64 = 2.0;

/// Default trailing window length
pub const DEFAULT_TRAILING_WINDOW: usize = 40;

/// Decide whether the last value of `profile` is anomalous.
///
/// Returns false when fewer than `trailing_window` entries exist, which is
/// the expected state during warm-up.
pub fn is_anomalous(profile: &[f64], trailing_window: usize, k: f64) -> bool {
    evaluate_tail(profile, trailing_window, k).is_some_and(|outcome| outcome.is_anomalous())
}

/// Result of scoring the last profile entry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreOutcome {
    /// Last profile value
    pub score: f64,
    /// `mean + k * std_dev`
    pub threshold: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl ScoreOutcome {
    pub fn is_anomalous(&self) -> bool {
        self.score > self.threshold
    }
}

fn evaluate_tail(profile: &[f64], trailing_window: usize, k: f64) -> Option<ScoreOutcome> {
    let len = profile.len();
    if trailing_window < 2 || len < trailing_window {
        return None;
    }

    let score = profile[len - 1];
    let history =
        RollingWindow::from_slice(&profile[len - trailing_window..len - 1], trailing_window);
    let (mean, std_dev) = (history.mean(), history.std_dev());

    if !score.is_finite() || !mean.is_finite() || !std_dev.is_finite() {
        return None;
    }

    Some(ScoreOutcome {
        score,
        threshold: mean + k * std_dev,
        mean,
        std_dev,
    })
}

/// Configured anomaly gate
#[derive(Debug, Clone, Copy)]
pub struct AnomalyScorer {
    trailing_window: usize,
    k: f64,
}

impl AnomalyScorer {
    pub fn new(trailing_window: usize, k: f64) -> DetectorResult<Self> {
        if trailing_window < 2 {
            return Err(DetectorError::invalid(format!(
                "trailing window must be at least 2, got {}",
                trailing_window
            )));
        }
        if !k.is_finite() || k <= 0.0 {
            return Err(DetectorError::invalid(format!(
                "threshold multiplier must be positive, got {}",
                k
            )));
        }
        Ok(Self { trailing_window, k })
    }

    pub fn trailing_window(&self) -> usize {
        self.trailing_window
    }

    pub fn k(&self) -> f64 {
        self.k
    }

    /// Score the last entry of `profile`
    ///
    /// # Returns
    /// * `Some(ScoreOutcome)` when enough history exists, anomalous or not
    /// * `None` during warm-up
    pub fn evaluate(&self, profile: &[f64]) -> Option<ScoreOutcome> {
        evaluate_tail(profile, self.trailing_window, self.k)
    }

    /// Score the last entry and keep it only when it crosses the threshold
    pub fn detect(&self, profile: &[f64]) -> Option<ScoreOutcome> {
        self.evaluate(profile).filter(ScoreOutcome::is_anomalous)
    }
}

impl Default for AnomalyScorer {
    fn default() -> Self {
        Self {
            trailing_window: DEFAULT_TRAILING_WINDOW,
            k: DEFAULT_THRESHOLD_K,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::profile::{compute_profile, ComputeBudget};
    use crate::anomaly::streaming::StreamingProfile;

    fn wobble(n: usize) -> Vec<f64> {
        (0..n).map(|i| 1.0 + 0.1 * ((i % 5) as f64)).collect()
    }

    #[test]
    fn test_short_profile_is_not_anomalous() {
        assert!(!is_anomalous(&[1.0, 2.0, 100.0], 40, 2.0));
        assert!(!is_anomalous(&[], 40, 2.0));
    }

    #[test]
    fn test_detects_spike_in_last_value() {
        let mut profile = wobble(60);
        profile.push(5.0);
        assert!(is_anomalous(&profile, 40, 2.0));
    }

    #[test]
    fn test_last_value_excluded_from_statistics() {
        // Window of exactly two: one historical value and the one under test
        assert!(is_anomalous(&[1.0, 1.0, 1.5], 2, 2.0));
        assert!(!is_anomalous(&[1.0, 1.5, 1.5], 2, 2.0));
    }

    #[test]
    fn test_monotonic_in_last_value() {
        let history = wobble(50);
        let mut previous = false;
        for step in 0..200 {
            let mut profile = history.clone();
            profile.push(step as f64 * 0.01);
            let current = is_anomalous(&profile, 40, 2.0);
            assert!(!(previous && !current), "flipped back at step {step}");
            previous = current;
        }
        assert!(previous);
    }

    #[test]
    fn test_constant_profile_never_anomalous() {
        let profile = compute_profile(&vec![0.55; 300], 40).unwrap();
        let distances = profile.distances();
        for end in 40..=distances.len() {
            assert!(!is_anomalous(&distances[..end], 40, 2.0));
        }
    }

    #[test]
    fn test_outlier_in_sine_is_flagged() {
        let mut series: Vec<f64> = (0..200)
            .map(|i| 0.5 + 0.2 * (2.0 * std::f64::consts::PI * i as f64 / 20.0).sin())
            .collect();
        let sd = {
            let mean = series.iter().sum::<f64>() / series.len() as f64;
            (series.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / series.len() as f64).sqrt()
        };
        series[150] += 10.0 * sd;

        let w = 40;
        let mut streaming =
            StreamingProfile::new(&series[..2 * w], w, &ComputeBudget::unbounded()).unwrap();
        for &value in &series[2 * w..150] {
            streaming.append_and_update(value).unwrap();
        }
        streaming.append_and_update(series[150]).unwrap();

        let scorer = AnomalyScorer::new(40, 2.0).unwrap();
        let outcome = scorer.detect(streaming.profile().distances());
        assert!(outcome.is_some());
        assert!(outcome.unwrap().score > outcome.unwrap().threshold);
    }

    #[test]
    fn test_scorer_validation() {
        assert!(AnomalyScorer::new(1, 2.0).is_err());
        assert!(AnomalyScorer::new(40, 0.0).is_err());
        assert!(AnomalyScorer::new(40, f64::NAN).is_err());
        let scorer = AnomalyScorer::default();
        assert_eq!(scorer.trailing_window(), 40);
        assert_eq!(scorer.k(), 2.0);
    }

    #[test]
    fn test_evaluate_reports_statistics() {
        let mut profile = vec![1.0; 39];
        profile.push(3.0);
        let outcome = AnomalyScorer::new(40, 2.0).unwrap().evaluate(&profile).unwrap();
        assert_eq!(outcome.score, 3.0);
        assert!((outcome.mean - 1.0).abs() < 1e-12);
        assert!(outcome.std_dev < 1e-12);
        assert!(outcome.is_anomalous());
    }
}
