//! Forecasting collaborator boundary
//!
//! The engine builds a multivariate window from channel buffers, hands it to
//! a [`Forecaster`] and compares the predicted values against a fixed load
//! threshold. The forecasting model itself is a black box behind the trait.

mod load;
mod trend;
mod window;

pub use load::{LoadPredictor, DEFAULT_FORECAST_HORIZON, DEFAULT_LOAD_THRESHOLD};
pub use trend::{linear_fit, TrendForecaster};
pub use window::ForecastWindow;

use anyhow::Result;

/// Trait for forecasting implementations
pub trait Forecaster: Send + Sync {
    /// Predict `horizon` future values for every channel of `window`.
    ///
    /// The outer vector follows `window.channels()`.
    fn forecast(&self, window: &ForecastWindow, horizon: usize) -> Result<Vec<Vec<f64>>>;

    /// Short identifier reported in logs
    fn name(&self) -> &str;
}
