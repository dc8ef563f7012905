use std::collections::VecDeque;

pub const DEFAULT_WINDOW_CAPACITY: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySample {
    pub time_ms: i64,
    pub current_amps: f64,
    pub power_w: f64,
}

/// Fixed-capacity rolling window of recent instantaneous readings, kept
/// purely for charting. One sample is appended per status push; the oldest
/// sample is evicted once the window is full. Never persisted.
#[derive(Debug, Clone)]
pub struct TelemetryWindow {
    capacity: usize,
    samples: VecDeque<TelemetrySample>,
}

impl TelemetryWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            samples: VecDeque::new(),
        }
    }

    pub fn push(&mut self, sample: TelemetrySample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples in arrival order, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = &TelemetrySample> {
        self.samples.iter()
    }
}

impl Default for TelemetryWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}
