//! recorder_worker: a recording worker that competes for jobs on a shared
//! reservation queue.
//!
//! Every worker in a fleet subscribes to the same reservation group. Each
//! reservation is delivered to exactly one of them; the receiver claims it if
//! it is fresh, records it, and goes back to waiting.

pub mod cli;
pub mod error;
pub mod metrics;
pub mod recorder;
pub mod reservation;
pub mod service;

pub use error::ServiceError;
pub use recorder::{Recorder, RecorderError, RecorderFactory, RecordingOutcome, RecordingStatus};
pub use reservation::{
    DecodeError, MemoryReservationQueue, QueueError, RedisReservationQueue, ReservationQueue,
    ReservationRequest,
};
pub use service::{ConfigError, Service, ServiceConfig, ServiceHandle, WorkerStatus};
