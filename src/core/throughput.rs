//! Rolling tokens-per-second history.
//!
//! Updated at most once per completed request. The numbers are advisory, so
//! a reader may observe a slightly stale view.

use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ThroughputStats {
    pub samples: usize,
    pub last: f64,
    pub average: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug)]
pub struct ThroughputTracker {
    capacity: usize,
    samples: RwLock<VecDeque<f64>>,
}

impl Default for ThroughputTracker {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl ThroughputTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Record one request. Zero-length spans or zero tokens are ignored.
    pub fn record(&self, tokens: u64, elapsed: Duration) -> Option<f64> {
        let seconds = elapsed.as_secs_f64();
        if tokens == 0 || seconds <= 0.0 {
            return None;
        }
        let rate = tokens as f64 / seconds;

        let mut samples = self.samples.write().unwrap_or_else(PoisonError::into_inner);
        if samples.len() == self.capacity {
            samples.pop_front();
        }
        samples.push_back(rate);
        Some(rate)
    }

    pub fn last(&self) -> Option<f64> {
        self.samples
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .back()
            .copied()
    }

    pub fn average(&self) -> Option<f64> {
        let samples = self.samples.read().unwrap_or_else(PoisonError::into_inner);
        if samples.is_empty() {
            return None;
        }
        Some(samples.iter().sum::<f64>() / samples.len() as f64)
    }

    pub fn reset(&self) {
        self.samples
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn stats(&self) -> ThroughputStats {
        let samples = self.samples.read().unwrap_or_else(PoisonError::into_inner);
        let Some(&last) = samples.back() else {
            return ThroughputStats::default();
        };
        ThroughputStats {
            samples: samples.len(),
            last,
            average: samples.iter().sum::<f64>() / samples.len() as f64,
            min: samples.iter().copied().fold(f64::INFINITY, f64::min),
            max: samples.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}
