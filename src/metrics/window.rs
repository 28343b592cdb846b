//! Sliding windows for coarse throughput rates

use serde::Serialize;
use std::collections::VecDeque;

/// Fixed-capacity history of a cumulative counter
///
/// The rate is the counter delta across a full window ("units per window"),
/// which tolerates irregular polling intervals. Until the window fills up for
/// the first time the rate keeps its previous value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateWindow {
    samples: VecDeque<u64>,
    capacity: usize,
    rate: u64,
    warmed_up: bool,
}

impl RateWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            rate: 0,
            warmed_up: false,
        }
    }

    /// Append the latest cumulative value and return the current rate
    pub fn push(&mut self, value: u64) -> u64 {
        self.samples.push_back(value);

        if self.samples.len() >= self.capacity {
            let first = self.samples.front().copied().unwrap_or(value);
            self.rate = value.saturating_sub(first);
            self.warmed_up = true;
            self.samples.pop_front();
        }

        self.rate
    }

    pub fn rate(&self) -> u64 {
        self.rate
    }

    /// Has the window been full at least once?
    pub fn is_warmed_up(&self) -> bool {
        self.warmed_up
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
