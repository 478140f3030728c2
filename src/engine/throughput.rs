use std::collections::VecDeque;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Instantaneous and average transfer rate, in input units per second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Throughput {
    pub instantaneous: f64,
    pub average: f64,
}

impl Throughput {
    pub fn instantaneous_mb(&self) -> f64 {
        bytes_to_mb(self.instantaneous)
    }

    pub fn average_mb(&self) -> f64 {
        bytes_to_mb(self.average)
    }
}

pub fn bytes_to_mb(bytes: f64) -> f64 {
    bytes / BYTES_PER_MB
}

/// Sliding-window rate estimator over (cumulative bytes, timestamp) samples.
///
/// The ring always holds `window + 1` samples: `window` rate intervals need
/// one extra point to start from.
#[derive(Debug, Clone)]
pub struct ThroughputEstimator {
    window: usize,
    baseline_bytes: u64,
    baseline_time: f64,
    samples: VecDeque<(u64, f64)>,
}

impl ThroughputEstimator {
    pub fn new(window: usize, baseline_bytes: u64, baseline_time: f64) -> Self {
        let mut estimator = Self {
            window,
            baseline_bytes,
            baseline_time,
            samples: VecDeque::with_capacity(window + 1),
        };
        estimator.fill_with_baseline();
        estimator
    }

    fn fill_with_baseline(&mut self) {
        self.samples.clear();
        self.samples
            .extend(std::iter::repeat_n((self.baseline_bytes, self.baseline_time), self.window + 1));
    }

    /// Refills the ring with the baseline, optionally moving it first.
    pub fn reset_baseline(&mut self, bytes: Option<u64>, time: Option<f64>) {
        if let Some(bytes) = bytes {
            self.baseline_bytes = bytes;
        }
        if let Some(time) = time {
            self.baseline_time = time;
        }
        self.fill_with_baseline();
    }

    /// Records the cumulative byte count observed at `time`.
    pub fn update(&mut self, cumulative_bytes: u64, time: f64) {
        self.samples.push_back((cumulative_bytes, time));
        while self.samples.len() > self.window + 1 {
            self.samples.pop_front();
        }
    }

    /// `None` while either time span is still zero.
    pub fn speed(&self) -> Option<Throughput> {
        let (mut min_bytes, mut max_bytes) = (u64::MAX, 0u64);
        let (mut min_time, mut max_time) = (f64::INFINITY, f64::NEG_INFINITY);
        for &(bytes, time) in &self.samples {
            min_bytes = min_bytes.min(bytes);
            max_bytes = max_bytes.max(bytes);
            min_time = min_time.min(time);
            max_time = max_time.max(time);
        }

        let window_span = max_time - min_time;
        let total_span = max_time - self.baseline_time;
        if window_span <= 0.0 || total_span <= 0.0 {
            return None;
        }

        Some(Throughput {
            instantaneous: (max_bytes - min_bytes) as f64 / window_span,
            average: max_bytes.saturating_sub(self.baseline_bytes) as f64 / total_span,
        })
    }

    pub fn window(&self) -> usize {
        self.window
    }
}
