//! Metrics and observability for capture finalization

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use serde::{Deserialize, Serialize};

/// How a video finalization ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoOutcome {
    /// Empty filter chain, source returned as-is
    FastPath,
    Exported,
    Failed,
}

/// Finalization counters
#[derive(Default)]
pub struct Metrics {
    pub stills_finalized: AtomicU64,
    pub stills_failed: AtomicU64,
    pub videos_exported: AtomicU64,
    pub videos_fast_path: AtomicU64,
    pub videos_failed: AtomicU64,
    pub frames_processed: AtomicU64,
    pub filter_substitutions: AtomicU64,
    pub total_latency_ms: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_still(&self, success: bool, latency_ms: u64) {
        if success {
            self.stills_finalized.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stills_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
    }

    pub fn record_video(&self, outcome: VideoOutcome, latency_ms: u64) {
        let counter = match outcome {
            VideoOutcome::FastPath => &self.videos_fast_path,
            VideoOutcome::Exported => &self.videos_exported,
            VideoOutcome::Failed => &self.videos_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
    }

    pub fn record_frames(&self, frames: u64, substitutions: u64) {
        self.frames_processed.fetch_add(frames, Ordering::Relaxed);
        self.filter_substitutions.fetch_add(substitutions, Ordering::Relaxed);
    }

    pub fn record_substitutions(&self, substitutions: u64) {
        self.filter_substitutions.fetch_add(substitutions, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let stills_finalized = self.stills_finalized.load(Ordering::Relaxed);
        let stills_failed = self.stills_failed.load(Ordering::Relaxed);
        let videos_exported = self.videos_exported.load(Ordering::Relaxed);
        let videos_fast_path = self.videos_fast_path.load(Ordering::Relaxed);
        let videos_failed = self.videos_failed.load(Ordering::Relaxed);

        let total = stills_finalized + stills_failed + videos_exported + videos_fast_path + videos_failed;
        let failed = stills_failed + videos_failed;
        let total_latency = self.total_latency_ms.load(Ordering::Relaxed);

        MetricsSnapshot {
            stills_finalized,
            stills_failed,
            videos_exported,
            videos_fast_path,
            videos_failed,
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            filter_substitutions: self.filter_substitutions.load(Ordering::Relaxed),
            error_rate: if total > 0 { failed as f64 / total as f64 } else { 0.0 },
            avg_latency_ms: if total > 0 { total_latency / total } else { 0 },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub stills_finalized: u64,
    pub stills_failed: u64,
    pub videos_exported: u64,
    pub videos_fast_path: u64,
    pub videos_failed: u64,
    pub frames_processed: u64,
    pub filter_substitutions: u64,
    pub error_rate: f64,
    pub avg_latency_ms: u64,
}

/// Timer for tracking operation latency
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_rates() {
        let metrics = Metrics::new();
        metrics.record_still(true, 10);
        metrics.record_still(false, 20);
        metrics.record_video(VideoOutcome::FastPath, 0);
        metrics.record_video(VideoOutcome::Failed, 30);
        metrics.record_frames(120, 3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.stills_finalized, 1);
        assert_eq!(snapshot.videos_fast_path, 1);
        assert_eq!(snapshot.frames_processed, 120);
        assert_eq!(snapshot.filter_substitutions, 3);
        assert_eq!(snapshot.error_rate, 0.5);
        assert_eq!(snapshot.avg_latency_ms, 15);
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = Metrics::new().snapshot();
        assert_eq!(snapshot.error_rate, 0.0);
        assert_eq!(snapshot.avg_latency_ms, 0);
    }
}
