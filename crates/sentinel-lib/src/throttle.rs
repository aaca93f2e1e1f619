//! Per-entity check throttling
//!
//! Expensive checks run at most once per cooldown. The last-run timestamp is
//! owned by the entity state and updated together with the decision to run,
//! while the current time comes from an injectable [`Clock`].

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Default cooldown between anomaly checks
pub const DEFAULT_ANOMALY_COOLDOWN_MINS: i64 = 10;

/// Default cooldown between prediction checks
pub const DEFAULT_PREDICTION_COOLDOWN_MINS: i64 = 30;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Decide whether a gated check may run at `now`.
///
/// # Returns
/// * `(true, Some(now))` when nothing ran before or the cooldown has elapsed
/// * `(false, last_run)` otherwise, leaving the stored timestamp as it was
pub fn should_run(
    last_run: Option<DateTime<Utc>>,
    cooldown: Duration,
    now: DateTime<Utc>,
) -> (bool, Option<DateTime<Utc>>) {
    match last_run {
        Some(last) if now - last < cooldown => (false, last_run),
        _ => (true, Some(now)),
    }
}

/// Last-run timestamp and cooldown for one gated check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckThrottle {
    last_run: Option<DateTime<Utc>>,
    cooldown: Duration,
}

impl CheckThrottle {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            last_run: None,
            cooldown,
        }
    }

    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        self.last_run
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Check the gate and record `now` when it opens
    pub fn try_acquire(&mut self, now: DateTime<Utc>) -> bool {
        let (run, last_run) = should_run(self.last_run, self.cooldown, now);
        self.last_run = last_run;
        run
    }

    /// Time left until the gate opens again
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        match self.last_run {
            Some(last) => (self.cooldown - (now - last)).max(Duration::zero()),
            None => Duration::zero(),
        }
    }
}
