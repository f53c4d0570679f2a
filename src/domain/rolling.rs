//! Trailing simple moving average.
//!
//! O(n) sliding window: a queue of the last `period` values plus a running
//! sum. Warmup: the first (period - 1) positions have no value.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct RollingMean {
    period: usize,
    window: VecDeque<f64>,
    sum: f64,
}

impl RollingMean {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            window: VecDeque::with_capacity(period),
            sum: 0.0,
        }
    }

    /// Pushes the next value and returns the mean of the last `period`
    /// values, or `None` while the window is still filling.
    pub fn push(&mut self, value: f64) -> Option<f64> {
        if self.period == 0 {
            return None;
        }
        self.window.push_back(value);
        self.sum += value;
        if self.window.len() > self.period {
            if let Some(evicted) = self.window.pop_front() {
                self.sum -= evicted;
            }
        }
        self.mean()
    }

    pub fn mean(&self) -> Option<f64> {
        if self.period == 0 || self.window.len() < self.period {
            None
        } else {
            Some(self.sum / self.period as f64)
        }
    }
}

/// SMA(period) over `values`, one entry per input position.
pub fn simple_moving_average(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut rolling = RollingMean::new(period);
    values.iter().map(|&v| rolling.push(v)).collect()
}
