//! Prometheus-based monitoring for the recorder worker.
//!
//! # Example
//!
//! ```ignore
//! use recorder_worker::metrics::{export_metrics, init_metrics, MetricsCollector, ReservationOutcome};
//!
//! init_metrics().expect("Failed to initialize metrics");
//!
//! let collector = MetricsCollector::new();
//! collector.record_reservation(ReservationOutcome::Claimed);
//!
//! let metrics_text = export_metrics();
//! ```

pub mod collectors;
pub mod registry;

pub use collectors::{MetricsCollector, ReservationOutcome};
pub use registry::{
    export_metrics, init_metrics, RECORDINGS_TOTAL, RECORDING_DURATION, REGISTRY,
    RESERVATIONS_TOTAL, RESERVATION_AGE, WORKER_STATUS,
};
