//! Rolling performance monitor for adaptive quality control.
//!
//! Keeps the last [`SAMPLE_CAPACITY`] `(timestamp, bytes, latency)`
//! samples and derives frame rate, throughput, average latency and a
//! recommended encoder quality from them.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::protocol::ConnectionQuality;

/// Ring capacity; older samples are evicted first.
pub const SAMPLE_CAPACITY: usize = 30;

/// Quality recommended while there are too few samples to judge.
pub const NEUTRAL_QUALITY: u8 = 75;

/// Samples needed before the recommendation leaves the neutral default.
const MIN_SAMPLES_FOR_RECOMMENDATION: usize = 5;

// ── QualityRating ────────────────────────────────────────────────

/// Coarse classification of link health shown to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QualityRating {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl QualityRating {
    /// Classify from frame rate, throughput (B/s) and latency (ms).
    pub fn classify(fps: f64, bandwidth: f64, latency_ms: f64) -> Self {
        if fps >= 24.0 && latency_ms < 30.0 && bandwidth >= 5_000_000.0 {
            QualityRating::Excellent
        } else if fps >= 15.0 && latency_ms < 60.0 {
            QualityRating::Good
        } else if fps >= 8.0 && latency_ms < 120.0 {
            QualityRating::Fair
        } else {
            QualityRating::Poor
        }
    }
}

impl fmt::Display for QualityRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QualityRating::Excellent => "excellent",
            QualityRating::Good => "good",
            QualityRating::Fair => "fair",
            QualityRating::Poor => "poor",
        };
        f.write_str(s)
    }
}

// ── PerformanceMonitor ───────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Sample {
    at: Instant,
    bytes: u64,
    latency_ms: f64,
}

/// Thread-safe accumulator of per-frame send samples.
pub struct PerformanceMonitor {
    samples: Mutex<VecDeque<Sample>>,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self {
            samples: Mutex::new(VecDeque::with_capacity(SAMPLE_CAPACITY)),
        }
    }

    /// Record that a frame of `bytes` was sent with the given latency.
    pub fn record_sample(&self, bytes: u64, latency_ms: f64) {
        self.record_sample_at(Instant::now(), bytes, latency_ms);
    }

    /// Record with an explicit timestamp (useful for testing).
    pub fn record_sample_at(&self, at: Instant, bytes: u64, latency_ms: f64) {
        let mut samples = self.lock();
        if samples.len() == SAMPLE_CAPACITY {
            samples.pop_front();
        }
        samples.push_back(Sample {
            at,
            bytes,
            latency_ms: latency_ms.max(0.0),
        });
    }

    /// Number of samples currently retained.
    pub fn sample_count(&self) -> usize {
        self.lock().len()
    }

    /// Frames per second over the retained window.
    pub fn current_fps(&self) -> f64 {
        let samples = self.lock();
        match Self::elapsed_millis(&samples) {
            Some(ms) => samples.len() as f64 * 1000.0 / ms,
            None => 0.0,
        }
    }

    /// Bytes per second over the retained window.
    pub fn current_bandwidth(&self) -> f64 {
        let samples = self.lock();
        match Self::elapsed_millis(&samples) {
            Some(ms) => {
                let total: u64 = samples.iter().map(|s| s.bytes).sum();
                total as f64 * 1000.0 / ms
            }
            None => 0.0,
        }
    }

    /// Mean latency in milliseconds, `0` when empty.
    pub fn average_latency(&self) -> f64 {
        let samples = self.lock();
        Self::mean_latency(&samples)
    }

    /// Encoder quality (0-100) suited to current conditions.
    ///
    /// Rules are checked in order and the first match wins.
    pub fn recommended_quality(&self) -> u8 {
        if self.sample_count() < MIN_SAMPLES_FOR_RECOMMENDATION {
            return NEUTRAL_QUALITY;
        }

        let latency = self.average_latency();
        let bandwidth = self.current_bandwidth();

        if latency > 100.0 {
            50
        } else if latency > 50.0 {
            65
        } else if bandwidth < 1_000_000.0 {
            60
        } else if bandwidth > 5_000_000.0 && latency < 50.0 {
            85
        } else {
            NEUTRAL_QUALITY
        }
    }

    /// Current rating derived from fps, bandwidth and latency.
    pub fn rating(&self) -> QualityRating {
        QualityRating::classify(
            self.current_fps(),
            self.current_bandwidth(),
            self.average_latency(),
        )
    }

    /// Snapshot suitable for a `ConnectionQuality` message.
    pub fn connection_quality(&self) -> ConnectionQuality {
        let fps = self.current_fps();
        let bandwidth = self.current_bandwidth();
        let latency_ms = self.average_latency();
        ConnectionQuality {
            quality: self.recommended_quality(),
            fps,
            bandwidth,
            latency_ms,
            rating: QualityRating::classify(fps, bandwidth, latency_ms),
        }
    }

    /// Drop all samples.
    pub fn reset(&self) {
        self.lock().clear();
    }

    // ── Internal ─────────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, VecDeque<Sample>> {
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Milliseconds between first and last sample; `None` if not measurable.
    fn elapsed_millis(samples: &VecDeque<Sample>) -> Option<f64> {
        if samples.len() < 2 {
            return None;
        }
        let (first, last) = (samples.front()?, samples.back()?);
        let ms = last.at.saturating_duration_since(first.at).as_secs_f64() * 1000.0;
        (ms > 0.0).then_some(ms)
    }

    fn mean_latency(samples: &VecDeque<Sample>) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().map(|s| s.latency_ms).sum::<f64>() / samples.len() as f64
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────
