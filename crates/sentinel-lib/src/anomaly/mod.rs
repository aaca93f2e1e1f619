//! Matrix-profile anomaly detection
//!
//! This module provides:
//! - Batch and incremental matrix profiles per channel
//! - Joint (element-wise minimum) profiles across channels
//! - The trailing z-score gate and top-K discord extraction
//! - Alertmanager formatting of emitted alerts

mod alerter;
mod discords;
mod joint;
mod profile;
mod scorer;
mod stats;
mod streaming;

pub use alerter::{AlertSeverity, Alerter, AlertmanagerAlert, AlertmanagerPayload};
pub use discords::top_k;
pub use joint::{joint, JointProfile};
pub use profile::{
    compute_profile, compute_profile_with_budget, exclusion_radius, sliding_dot_product,
    ComputeBudget, MatrixProfile, MIN_WINDOW,
};
pub use scorer::{
    is_anomalous, AnomalyScorer, ScoreOutcome, DEFAULT_THRESHOLD_K, DEFAULT_TRAILING_WINDOW,
};
pub use stats::{RollingWindow, SubsequenceStats, FLAT_STD_EPSILON};
pub use streaming::StreamingProfile;

#[cfg(test)]
pub(crate) mod test_support {
    /// Deterministic sine plus LCG noise, never flat for windows of 4 or more
    pub(crate) fn noisy_series(n: usize, seed: u64) -> Vec<f64> {
        let mut state = seed;
        (0..n)
            .map(|i| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                let noise = (state >> 33) as f64 / (1u64 << 31) as f64;
                0.5 + 0.2 * (i as f64 * 0.3).sin() + 0.1 * noise
            })
            .collect()
    }
}
