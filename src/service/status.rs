//! Worker lifecycle status.
//!
//! The status is written only by the service loop and read by anyone who
//! holds a handle, so it lives in a single atomic byte.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// Lifecycle state of a recorder worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum WorkerStatus {
    /// Constructed, not yet subscribed.
    Starting = 0,
    /// Waiting for a reservation.
    Available = 1,
    /// A reservation was accepted; the recorder has not started yet.
    Reserved = 2,
    /// The recorder is running.
    Recording = 3,
    /// Shutdown observed; no further reservations are claimed.
    Stopping = 4,
}

impl WorkerStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [WorkerStatus; 5] = [
        WorkerStatus::Starting,
        WorkerStatus::Available,
        WorkerStatus::Reserved,
        WorkerStatus::Recording,
        WorkerStatus::Stopping,
    ];

    /// Returns the lowercase name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Starting => "starting",
            WorkerStatus::Available => "available",
            WorkerStatus::Reserved => "reserved",
            WorkerStatus::Recording => "recording",
            WorkerStatus::Stopping => "stopping",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerStatus::Starting,
            1 => WorkerStatus::Available,
            2 => WorkerStatus::Reserved,
            3 => WorkerStatus::Recording,
            _ => WorkerStatus::Stopping,
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkerStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown worker status '{}'", s))
    }
}

/// Process-wide holder of the current [`WorkerStatus`].
///
/// `store` overwrites unconditionally; transition rules belong to the
/// service loop.
#[derive(Debug)]
pub struct StatusRegister(AtomicU8);

impl StatusRegister {
    /// Creates a register holding `Starting`.
    pub fn new() -> Self {
        Self(AtomicU8::new(WorkerStatus::Starting as u8))
    }

    /// Replaces the current status.
    pub fn store(&self, status: WorkerStatus) {
        self.0.store(status as u8, Ordering::SeqCst);
    }

    /// Returns the most recently stored status.
    pub fn load(&self) -> WorkerStatus {
        WorkerStatus::from_u8(self.0.load(Ordering::SeqCst))
    }
}

impl Default for StatusRegister {
    fn default() -> Self {
        Self::new()
    }
}
