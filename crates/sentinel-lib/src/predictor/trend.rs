//! Least-squares trend extrapolation
//!
//! Used when no trained model is wired in. Each channel is fitted with a
//! straight line over its most recent `lookback` steps and the line is
//! extended `horizon` steps past the last observation.

use anyhow::{bail, Result};

use super::{ForecastWindow, Forecaster};

/// Default number of trailing steps used for the fit
pub const DEFAULT_LOOKBACK: usize = 120;

/// Fit `y = slope * x + intercept` with `x = 0, 1, ...`
///
/// Returns a flat line through the mean when fewer than two points exist or
/// the fit is degenerate.
pub fn linear_fit(values: &[f64]) -> (f64, f64) {
    let n = values.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean_y = values.iter().sum::<f64>() / n as f64;
    if n < 2 {
        return (0.0, mean_y);
    }

    let nf = n as f64;
    let sum_x: f64 = (0..n).map(|i| i as f64).sum();
    let sum_y: f64 = values.iter().sum();
    let sum_xy: f64 = values.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
    let sum_x2: f64 = (0..n).map(|i| (i as f64).powi(2)).sum();
    let denom = nf * sum_x2 - sum_x.powi(2);
    if denom.abs() < f64::EPSILON {
        return (0.0, mean_y);
    }

    let slope = (nf * sum_xy - sum_x * sum_y) / denom;
    let intercept = (sum_y - slope * sum_x) / nf;
    (slope, intercept)
}

/// Dependency-free linear trend forecaster
#[derive(Debug, Clone)]
pub struct TrendForecaster {
    lookback: usize,
}

impl TrendForecaster {
    pub fn new(lookback: usize) -> Self {
        Self {
            lookback: lookback.max(2),
        }
    }

    pub fn lookback(&self) -> usize {
        self.lookback
    }
}

impl Default for TrendForecaster {
    fn default() -> Self {
        Self::new(DEFAULT_LOOKBACK)
    }
}

impl Forecaster for TrendForecaster {
    fn forecast(&self, window: &ForecastWindow, horizon: usize) -> Result<Vec<Vec<f64>>> {
        if window.is_empty() {
            bail!("Cannot forecast from an empty window");
        }

        let forecasts = window
            .values()
            .iter()
            .map(|row| {
                let tail = &row[row.len().saturating_sub(self.lookback)..];
                let (slope, intercept) = linear_fit(tail);
                let last_x = tail.len() as f64 - 1.0;
                (1..=horizon)
                    .map(|step| (intercept + slope * (last_x + step as f64)).max(0.0))
                    .collect()
            })
            .collect();

        Ok(forecasts)
    }

    fn name(&self) -> &str {
        "linear-trend"
    }
}
