//! Moving-average filter over recent elbow angles

use std::collections::VecDeque;

/// Default number of samples in the window
pub const DEFAULT_WINDOW: usize = 6;

/// Fixed-capacity FIFO of angles that returns the mean of what it holds.
///
/// Capacity is at least 1. Once anything has been pushed the window is never
/// empty, so `push` always has something to average.
#[derive(Debug, Clone)]
pub struct AngleSmoother {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl AngleSmoother {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `angle`, evicting the oldest sample beyond capacity, and return
    /// the mean of the window.
    pub fn push(&mut self, angle: f64) -> f64 {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(angle);
        self.average()
    }

    fn average(&self) -> f64 {
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
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

impl Default for AngleSmoother {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_push_is_identity() {
        let mut smoother = AngleSmoother::default();
        assert!(smoother.is_empty());
        assert_eq!(smoother.push(120.0), 120.0);
        assert_eq!(smoother.len(), 1);
    }

    #[test]
    fn test_window_bound_after_ten_pushes() {
        let mut smoother = AngleSmoother::default();
        let pushed: Vec<f64> = (0..10).map(|i| 100.0 + i as f64 * 7.0).collect();

        let mut last = 0.0;
        for angle in &pushed {
            last = smoother.push(*angle);
        }

        assert_eq!(smoother.len(), 6);
        let expected = pushed[4..].iter().sum::<f64>() / 6.0;
        assert!((last - expected).abs() < 1e-9);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut smoother = AngleSmoother::new(0);
        assert_eq!(smoother.capacity(), 1);
        smoother.push(10.0);
        assert_eq!(smoother.push(20.0), 20.0);
        assert_eq!(smoother.len(), 1);
    }
}
