//! Stream metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// How a stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Final batch received or body ended normally.
    Completed,
    /// Cancelled by the caller or superseded by a newer stream.
    Cancelled,
    /// Failed to open or interrupted; reported through `on_error`.
    Failed,
}

/// Metrics collector interface for ingestion streams.
pub trait StreamMetrics: Send + Sync {
    /// Records that a stream was opened.
    fn record_stream_started(&self);

    /// Records how a stream ended and how long it ran.
    fn record_stream_finished(&self, outcome: StreamOutcome, duration: Duration);

    /// Records delivered batches and skipped lines for one stream.
    fn record_batches(&self, delivered: u64, malformed_lines: u64);

    /// Gets current metrics.
    fn snapshot(&self) -> StreamMetricsSnapshot;

    /// Resets all metrics.
    fn reset(&self);
}

/// Stream metrics snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamMetricsSnapshot {
    /// Streams opened.
    pub streams_started: u64,
    /// Streams that completed.
    pub streams_completed: u64,
    /// Streams cancelled.
    pub streams_cancelled: u64,
    /// Streams that failed.
    pub streams_failed: u64,
    /// Batches delivered to callers.
    pub batches_delivered: u64,
    /// Lines dropped because they did not parse.
    pub malformed_lines: u64,
    /// Total stream time in milliseconds.
    pub total_stream_ms: u64,
}

impl StreamMetricsSnapshot {
    /// Number of streams that have ended.
    pub fn streams_finished(&self) -> u64 {
        self.streams_completed + self.streams_cancelled + self.streams_failed
    }

    /// Average batches per finished stream.
    #[allow(clippy::cast_precision_loss)]
    pub fn average_batches_per_stream(&self) -> f64 {
        let finished = self.streams_finished();
        if finished == 0 {
            0.0
        } else {
            self.batches_delivered as f64 / finished as f64
        }
    }
}

/// Default atomic metrics collector.
#[derive(Debug, Default)]
pub struct DefaultStreamMetrics {
    streams_started: AtomicU64,
    streams_completed: AtomicU64,
    streams_cancelled: AtomicU64,
    streams_failed: AtomicU64,
    batches_delivered: AtomicU64,
    malformed_lines: AtomicU64,
    total_stream_ms: AtomicU64,
}

impl DefaultStreamMetrics {
    /// Creates a new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }
}

impl StreamMetrics for DefaultStreamMetrics {
    fn record_stream_started(&self) {
        self.streams_started.fetch_add(1, Ordering::Relaxed);
    }

    fn record_stream_finished(&self, outcome: StreamOutcome, duration: Duration) {
        let counter = match outcome {
            StreamOutcome::Completed => &self.streams_completed,
            StreamOutcome::Cancelled => &self.streams_cancelled,
            StreamOutcome::Failed => &self.streams_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.total_stream_ms.fetch_add(
            u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
    }

    fn record_batches(&self, delivered: u64, malformed_lines: u64) {
        self.batches_delivered.fetch_add(delivered, Ordering::Relaxed);
        self.malformed_lines
            .fetch_add(malformed_lines, Ordering::Relaxed);
    }

    fn snapshot(&self) -> StreamMetricsSnapshot {
        StreamMetricsSnapshot {
            streams_started: self.streams_started.load(Ordering::Relaxed),
            streams_completed: self.streams_completed.load(Ordering::Relaxed),
            streams_cancelled: self.streams_cancelled.load(Ordering::Relaxed),
            streams_failed: self.streams_failed.load(Ordering::Relaxed),
            batches_delivered: self.batches_delivered.load(Ordering::Relaxed),
            malformed_lines: self.malformed_lines.load(Ordering::Relaxed),
            total_stream_ms: self.total_stream_ms.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        for counter in [
            &self.streams_started,
            &self.streams_completed,
            &self.streams_cancelled,
            &self.streams_failed,
            &self.batches_delivered,
            &self.malformed_lines,
            &self.total_stream_ms,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Metrics collector that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStreamMetrics;

impl StreamMetrics for NoopStreamMetrics {
    fn record_stream_started(&self) {}

    fn record_stream_finished(&self, _outcome: StreamOutcome, _duration: Duration) {}

    fn record_batches(&self, _delivered: u64, _malformed_lines: u64) {}

    fn snapshot(&self) -> StreamMetricsSnapshot {
        StreamMetricsSnapshot::default()
    }

    fn reset(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_outcomes() {
        let metrics = DefaultStreamMetrics::new();

        metrics.record_stream_started();
        metrics.record_stream_started();
        metrics.record_stream_finished(StreamOutcome::Completed, Duration::from_millis(40));
        metrics.record_stream_finished(StreamOutcome::Cancelled, Duration::from_millis(10));
        metrics.record_batches(3, 1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.streams_started, 2);
        assert_eq!(snapshot.streams_completed, 1);
        assert_eq!(snapshot.streams_cancelled, 1);
        assert_eq!(snapshot.batches_delivered, 3);
        assert_eq!(snapshot.malformed_lines, 1);
        assert_eq!(snapshot.total_stream_ms, 50);
        assert!((snapshot.average_batches_per_stream() - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reset() {
        let metrics = DefaultStreamMetrics::new();
        metrics.record_stream_started();
        metrics.record_batches(5, 0);
        metrics.reset();

        assert_eq!(metrics.snapshot(), StreamMetricsSnapshot::default());
    }

    #[test]
    fn test_empty_average() {
        assert_eq!(StreamMetricsSnapshot::default().average_batches_per_stream(), 0.0);
    }
}
