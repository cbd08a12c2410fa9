//! Prometheus metrics registration and export.
//!
//! This module defines the Prometheus metrics published by a recorder worker
//! and provides functions for initializing, registering, and exporting them.

use prometheus::{CounterVec, Encoder, GaugeVec, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use std::sync::{Mutex, OnceLock};

/// Global Prometheus registry for all recorder worker metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Reservations received, labeled by outcome (claimed, stale, malformed).
pub static RESERVATIONS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Time a claimed reservation spent in the queue, in seconds.
pub static RESERVATION_AGE: OnceLock<Histogram> = OnceLock::new();

/// Recordings by status (completed, failed, killed, error, start_failed).
pub static RECORDINGS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Recording duration in seconds.
pub static RECORDING_DURATION: OnceLock<Histogram> = OnceLock::new();

/// Current worker status, one-hot by status label.
pub static WORKER_STATUS: OnceLock<GaugeVec> = OnceLock::new();

/// Serializes initialization so the statics always belong to one registry.
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Initialize all metrics and register them with the registry.
///
/// Calling it again after a successful initialization is a no-op.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let _guard = INIT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let reservations_total = CounterVec::new(
        Opts::new(
            "recorder_reservations_total",
            "Reservations received by this worker",
        ),
        &["outcome"],
    )?;

    let reservation_age = Histogram::with_opts(
        HistogramOpts::new(
            "recorder_reservation_age_seconds",
            "Time a claimed reservation waited in the queue",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0]),
    )?;

    let recordings_total = CounterVec::new(
        Opts::new("recorder_recordings_total", "Recordings finished"),
        &["status"],
    )?;

    let recording_duration = Histogram::with_opts(
        HistogramOpts::new(
            "recorder_recording_duration_seconds",
            "Recording duration in seconds",
        )
        .buckets(vec![10.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 7200.0]),
    )?;

    let worker_status = GaugeVec::new(
        Opts::new("recorder_worker_status", "Current worker status (1 = active)"),
        &["status"],
    )?;

    registry.register(Box::new(reservations_total.clone()))?;
    registry.register(Box::new(reservation_age.clone()))?;
    registry.register(Box::new(recordings_total.clone()))?;
    registry.register(Box::new(recording_duration.clone()))?;
    registry.register(Box::new(worker_status.clone()))?;

    let _ = REGISTRY.set(registry);
    let _ = RESERVATIONS_TOTAL.set(reservations_total);
    let _ = RESERVATION_AGE.set(reservation_age);
    let _ = RECORDINGS_TOTAL.set(recordings_total);
    let _ = RECORDING_DURATION.set(recording_duration);
    let _ = WORKER_STATUS.set(worker_status);

    tracing::info!("Prometheus metrics initialized successfully");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// If the registry has not been initialized or encoding fails, returns a
/// comment line describing the problem.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}
