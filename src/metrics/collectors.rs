//! High-level metric recording for the worker loop.
//!
//! `MetricsCollector` wraps the raw Prometheus metrics so the service can
//! record events without caring whether metrics were initialized; every
//! method is a no-op until `init_metrics()` has run.

use super::registry::{
    RECORDINGS_TOTAL, RECORDING_DURATION, RESERVATIONS_TOTAL, RESERVATION_AGE, WORKER_STATUS,
};
use crate::recorder::RecordingStatus;
use crate::service::WorkerStatus;

/// What happened to a received reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationOutcome {
    /// Accepted and handed to a recorder.
    Claimed,
    /// Discarded for exceeding the reservation timeout.
    Stale,
    /// Discarded because it could not be decoded.
    Malformed,
}

impl ReservationOutcome {
    /// Label value used in metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationOutcome::Claimed => "claimed",
            ReservationOutcome::Stale => "stale",
            ReservationOutcome::Malformed => "malformed",
        }
    }
}

/// Metrics collector for recorder worker events.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    /// Create a new MetricsCollector instance.
    pub fn new() -> Self {
        Self
    }

    /// Record a received reservation.
    pub fn record_reservation(&self, outcome: ReservationOutcome) {
        if let Some(reservations) = RESERVATIONS_TOTAL.get() {
            reservations.with_label_values(&[outcome.as_str()]).inc();
        }

        tracing::trace!(outcome = outcome.as_str(), "Recorded reservation metric");
    }

    /// Record how long a claimed reservation waited in the queue.
    pub fn record_reservation_age(&self, age_secs: f64) {
        if let Some(age) = RESERVATION_AGE.get() {
            age.observe(age_secs);
        }
    }

    /// Record a finished recording.
    ///
    /// `status` is `None` when the recorder returned an error instead of an
    /// outcome.
    pub fn record_recording(&self, status: Option<RecordingStatus>, duration_secs: f64) {
        let label = match status {
            Some(RecordingStatus::Completed) => "completed",
            Some(RecordingStatus::Failed) => "failed",
            Some(RecordingStatus::Killed) => "killed",
            None => "error",
        };

        if let Some(recordings) = RECORDINGS_TOTAL.get() {
            recordings.with_label_values(&[label]).inc();
        }

        if let Some(duration) = RECORDING_DURATION.get() {
            duration.observe(duration_secs);
        }

        tracing::trace!(
            status = label,
            duration_secs = duration_secs,
            "Recorded recording metric"
        );
    }

    /// Record a claimed reservation whose recorder could not be built.
    ///
    /// No recording ran, so the duration histogram is left alone.
    pub fn record_recorder_start_failure(&self) {
        if let Some(recordings) = RECORDINGS_TOTAL.get() {
            recordings.with_label_values(&["start_failed"]).inc();
        }

        tracing::trace!(status = "start_failed", "Recorded recording metric");
    }

    /// Publish the current worker status.
    pub fn set_status(&self, current: WorkerStatus) {
        if let Some(gauge) = WORKER_STATUS.get() {
            for status in WorkerStatus::ALL {
                let value = if status == current { 1.0 } else { 0.0 };
                gauge.with_label_values(&[status.as_str()]).set(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{export_metrics, init_metrics};

    fn ensure_metrics_init() {
        let _ = init_metrics();
    }

    #[test]
    fn test_metrics_collector_new() {
        let collector = MetricsCollector::new();
        assert!(std::mem::size_of_val(&collector) == 0);
    }

    #[test]
    fn test_reservation_outcome_labels() {
        assert_eq!(ReservationOutcome::Claimed.as_str(), "claimed");
        assert_eq!(ReservationOutcome::Stale.as_str(), "stale");
        assert_eq!(ReservationOutcome::Malformed.as_str(), "malformed");
    }

    #[test]
    fn test_record_reservation_counts() {
        ensure_metrics_init();
        let collector = MetricsCollector::new();

        let before = RESERVATIONS_TOTAL
            .get()
            .map(|m| m.with_label_values(&["stale"]).get())
            .unwrap_or_default();

        collector.record_reservation(ReservationOutcome::Stale);

        let after = RESERVATIONS_TOTAL
            .get()
            .map(|m| m.with_label_values(&["stale"]).get())
            .unwrap_or_default();
        assert!(after >= before + 1.0);
    }

    #[test]
    fn test_record_recording() {
        ensure_metrics_init();
        let collector = MetricsCollector::new();

        collector.record_recording(Some(RecordingStatus::Completed), 120.0);
        collector.record_recording(Some(RecordingStatus::Killed), 3.0);
        collector.record_recording(None, 0.0);
        collector.record_reservation_age(0.25);

        let metrics = export_metrics();
        assert!(metrics.contains("recorder_recordings_total"));
        assert!(metrics.contains("recorder_recording_duration_seconds"));
    }

    #[test]
    fn test_record_recorder_start_failure() {
        ensure_metrics_init();
        let collector = MetricsCollector::new();

        let count = |label: &str| {
            RECORDINGS_TOTAL
                .get()
                .map(|m| m.with_label_values(&[label]).get())
                .unwrap_or_default()
        };
        let before = count("start_failed");

        collector.record_recorder_start_failure();

        assert!(count("start_failed") >= before + 1.0);
        assert!(export_metrics().contains("status=\"start_failed\""));
    }

    #[test]
    fn test_set_status_exports_every_label() {
        ensure_metrics_init();
        let collector = MetricsCollector::new();

        collector.set_status(WorkerStatus::Recording);

        let metrics = export_metrics();
        for status in WorkerStatus::ALL {
            assert!(metrics.contains(&format!("status=\"{}\"", status.as_str())));
        }
    }
}
