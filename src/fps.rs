use std::collections::VecDeque;

/// Samples kept in the rolling window.
pub const FPS_WINDOW: usize = 30;

/// Bounded FIFO of instantaneous frame rates with a uniform mean.
#[derive(Clone, Debug)]
pub struct FpsWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl FpsWindow {
    pub fn new() -> Self {
        Self::with_capacity(FPS_WINDOW)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest beyond capacity, and return the
    /// mean of what is held.
    pub fn record(&mut self, sample: f64) -> f64 {
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        self.mean()
    }

    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

impl Default for FpsWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// Turns cycle timestamps into FPS samples.
///
/// A cycle at the same millisecond as the previous one produces no sample
/// rather than an infinite rate.
#[derive(Clone, Debug, Default)]
pub struct FpsMeter {
    window: FpsWindow,
    last_ms: Option<f64>,
}

impl FpsMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start measuring from `now_ms`; the window is kept.
    pub fn rebase(&mut self, now_ms: f64) {
        self.last_ms = Some(now_ms);
    }

    /// Record a completed cycle. Returns the updated mean, or `None` when no
    /// sample was taken (first cycle without a baseline, or zero elapsed).
    pub fn tick(&mut self, now_ms: f64) -> Option<f64> {
        let previous = self.last_ms.replace(now_ms)?;
        let elapsed = now_ms - previous;
        if elapsed <= 0.0 {
            return None;
        }
        Some(self.window.record(1000.0 / elapsed))
    }

    pub fn mean(&self) -> f64 {
        self.window.mean()
    }

    pub fn window(&self) -> &FpsWindow {
        &self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_first_samples() {
        let mut window = FpsWindow::new();
        window.record(10.0);
        window.record(20.0);
        assert_eq!(window.record(30.0), 20.0);
    }

    #[test]
    fn window_evicts_oldest_beyond_capacity() {
        let mut window = FpsWindow::new();
        for _ in 0..FPS_WINDOW {
            window.record(10.0);
        }
        assert_eq!(window.len(), FPS_WINDOW);
        let mean = window.record(40.0);
        assert_eq!(window.len(), FPS_WINDOW);
        assert!((mean - (29.0 * 10.0 + 40.0) / 30.0).abs() < 1e-9);
    }

    #[test]
    fn empty_window_mean_is_zero() {
        assert_eq!(FpsWindow::new().mean(), 0.0);
    }

    #[test]
    fn meter_converts_intervals() {
        let mut meter = FpsMeter::new();
        meter.rebase(0.0);
        assert_eq!(meter.tick(50.0), Some(20.0));
        assert_eq!(meter.tick(75.0), Some(30.0));
    }

    #[test]
    fn meter_skips_zero_elapsed() {
        let mut meter = FpsMeter::new();
        assert_eq!(meter.tick(10.0), None);
        assert_eq!(meter.tick(10.0), None);
        assert!(meter.window().is_empty());
        assert_eq!(meter.tick(20.0), Some(100.0));
        assert!(meter.mean().is_finite());
    }
}
