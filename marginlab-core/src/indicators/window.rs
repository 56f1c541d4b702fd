//! Fixed-capacity trailing window with moving average, RSI and RCI.
//!
//! - Average: arithmetic mean of the window.
//! - RSI: sum of rises / (sum of rises + sum of falls), in 0..1.
//! - RCI: rank correlation between chronological order and value order,
//!   in -100..100. Newest observation has date rank 1; the highest value has
//!   price rank 1. Equal values all take the rank of the last one in sorted
//!   order, so ties are not averaged.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct TrailingWindow {
    values: VecDeque<f64>,
    capacity: usize,
}

impl TrailingWindow {
    /// A window holding at most `capacity` observations. Zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Append an observation, dropping the oldest once over capacity.
    pub fn push(&mut self, value: f64) {
        self.values.push_back(value);
        if self.values.len() > self.capacity {
            self.values.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.values.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Mean of the window; 0.0 when empty.
    pub fn average(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    /// Relative strength in 0..1; 0.5 when the window never moved, 0.0 when empty.
    pub fn rsi(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let mut up = 0.0;
        let mut down = 0.0;
        for (prev, curr) in self.values.iter().zip(self.values.iter().skip(1)) {
            if curr > prev {
                up += curr - prev;
            } else {
                down += prev - curr;
            }
        }
        if up + down == 0.0 {
            return 0.5;
        }
        up / (up + down)
    }

    /// Rank correlation index in -100..100; 0.0 with fewer than two values.
    pub fn rci(&self) -> f64 {
        let n = self.values.len();
        if n < 2 {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self.values.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);

        let sum: f64 = self
            .values
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                let date_rank = (n - i) as f64;
                let last_equal = sorted.partition_point(|&x| x.total_cmp(&v).is_le()) - 1;
                let price_rank = (n - last_equal) as f64;
                (date_rank - price_rank).powi(2)
            })
            .sum();

        let n = n as f64;
        (1.0 - (6.0 * sum) / (n.powi(3) - n)) * 100.0
    }
}
