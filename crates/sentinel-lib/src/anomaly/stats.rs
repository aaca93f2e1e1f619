//! Rolling statistics
//!
//! Two trackers live here:
//! - [`SubsequenceStats`]: mean and standard deviation of every length-`w`
//!   subsequence of a channel, extended in O(1) per appended sample
//! - [`RollingWindow`]: mean/variance over a bounded trailing window, used by
//!   the anomaly threshold test
//!
//! Sums are kept over the channel minus a fixed offset (the mean of the
//! values the stats were built from). Z-normalized distance does not change
//! under a constant shift, and `Σx²/w - μ²` loses every significant digit
//! when a channel sits at a high level with little variation.

use std::collections::VecDeque;

/// Relative tolerance under which a subsequence is treated as flat
pub const FLAT_STD_EPSILON: f64 = 1e-6;

/// Per-subsequence statistics for z-normalized distance computation
#[derive(Debug, Clone)]
pub struct SubsequenceStats {
    window: usize,
    /// Subtracted from every sample before summing
    offset: f64,
    /// Subsequence means relative to `offset`
    mean: Vec<f64>,
    std_dev: Vec<f64>,
    /// `1 / (sqrt(w) * sigma)`, zero for flat subsequences
    inv_norm: Vec<f64>,
    /// Running shifted `Σx` and `Σx²` of the most recent subsequence
    sum: f64,
    sum_sq: f64,
}

impl SubsequenceStats {
    /// Compute statistics for every subsequence of `series` using prefix sums.
    ///
    /// `series.len()` must be at least `window`; callers validate this.
    pub fn compute(series: &[f64], window: usize) -> Self {
        debug_assert!(window > 0 && series.len() >= window);

        let n = series.len();
        let n_subs = n - window + 1;
        let offset = series.iter().sum::<f64>() / n as f64;

        let mut cumsum = vec![0.0; n + 1];
        let mut cumsum_sq = vec![0.0; n + 1];
        for (i, &x) in series.iter().enumerate() {
            let x = x - offset;
            cumsum[i + 1] = cumsum[i] + x;
            cumsum_sq[i + 1] = cumsum_sq[i] + x * x;
        }

        let mut stats = Self {
            window,
            offset,
            mean: Vec::with_capacity(n_subs),
            std_dev: Vec::with_capacity(n_subs),
            inv_norm: Vec::with_capacity(n_subs),
            sum: 0.0,
            sum_sq: 0.0,
        };

        for i in 0..n_subs {
            let sum = cumsum[i + window] - cumsum[i];
            let sum_sq = cumsum_sq[i + window] - cumsum_sq[i];
            stats.record(sum, sum_sq);
        }

        // Seed the rolling sums from the exact last window rather than the
        // prefix difference.
        let tail = &series[n - window..];
        stats.sum = tail.iter().map(|x| x - offset).sum();
        stats.sum_sq = tail.iter().map(|x| (x - offset).powi(2)).sum();

        stats
    }

    /// Extend by one subsequence after a sample was appended to `series`.
    pub fn push(&mut self, series: &[f64]) {
        let n = series.len();
        debug_assert!(n > self.window);

        let incoming = series[n - 1] - self.offset;
        let outgoing = series[n - 1 - self.window] - self.offset;
        self.sum += incoming - outgoing;
        self.sum_sq += incoming * incoming - outgoing * outgoing;
        self.record(self.sum, self.sum_sq);
    }

    fn record(&mut self, sum: f64, sum_sq: f64) {
        let w = self.window as f64;
        let mu = sum / w;
        // E[X^2] - E[X]^2 on shifted values, clamped against rounding
        let var = (sum_sq / w - mu * mu).max(0.0);
        let sigma = var.sqrt();

        self.mean.push(mu);
        self.std_dev.push(sigma);
        if sigma <= FLAT_STD_EPSILON * (mu + self.offset).abs().max(1.0) {
            self.inv_norm.push(0.0);
        } else {
            self.inv_norm.push(1.0 / (w.sqrt() * sigma));
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn len(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    /// Constant subtracted from samples before dot products and sums
    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn mean(&self, idx: usize) -> f64 {
        self.mean[idx] + self.offset
    }

    pub fn std_dev(&self, idx: usize) -> f64 {
        self.std_dev[idx]
    }

    pub fn is_flat(&self, idx: usize) -> bool {
        self.inv_norm[idx] == 0.0
    }

    /// Z-normalized Euclidean distance between subsequences `i` and `j`
    /// given their dot product `qt` taken over offset-shifted samples.
    ///
    /// Two flat subsequences are identical after normalization (distance 0);
    /// a flat one against a non-flat one is maximally distant (`sqrt(2w)`).
    #[inline]
    pub fn distance(&self, qt: f64, i: usize, j: usize) -> f64 {
        let w = self.window as f64;
        let (ni, nj) = (self.inv_norm[i], self.inv_norm[j]);

        match (ni == 0.0, nj == 0.0) {
            (true, true) => 0.0,
            (true, false) | (false, true) => (2.0 * w).sqrt(),
            (false, false) => {
                let r = ((qt - w * self.mean[i] * self.mean[j]) * ni * nj).clamp(-1.0, 1.0);
                (2.0 * w * (1.0 - r)).max(0.0).sqrt()
            }
        }
    }
}

/// Bounded trailing window of recent values
#[derive(Debug, Clone)]
pub struct RollingWindow {
    capacity: usize,
    values: VecDeque<f64>,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            values: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    /// Build a window holding the last `capacity` values of `values`
    pub fn from_slice(values: &[f64], capacity: usize) -> Self {
        let mut window = Self::new(capacity);
        let start = values.len().saturating_sub(window.capacity);
        for &v in &values[start..] {
            window.push(v);
        }
        window
    }

    /// Add a value, evicting the oldest once at capacity
    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    /// Population variance, summed around the mean
    pub fn variance(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        self.values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / self.values.len() as f64
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}
