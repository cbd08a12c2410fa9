//! Recorder collaborators.
//!
//! The worker treats a recording as one opaque unit of work: it asks a
//! [`RecorderFactory`] for a [`Recorder`] bound to the claimed reservation and
//! awaits [`Recorder::record`] until it returns. Whatever the outcome, the
//! worker goes back to waiting for reservations afterwards.

pub mod command;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::reservation::ReservationRequest;
use crate::service::KillSignal;

pub use command::{CommandRecorder, CommandRecorderFactory};

/// Errors that can occur while setting up or running a recording.
#[derive(Debug, Error)]
pub enum RecorderError {
    /// The recorder could not be created or launched.
    #[error("Failed to start recorder: {0}")]
    StartFailed(String),

    /// The recording failed while running.
    #[error("Recording failed: {0}")]
    ExecutionFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// How a recording ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingStatus {
    /// The recording ran to completion.
    Completed,
    /// The recording ended with an error.
    Failed,
    /// The recording was stopped by a kill request.
    Killed,
}

impl fmt::Display for RecordingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingStatus::Completed => write!(f, "completed"),
            RecordingStatus::Failed => write!(f, "failed"),
            RecordingStatus::Killed => write!(f, "killed"),
        }
    }
}

/// Result of a recording run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingOutcome {
    /// Final status.
    pub status: RecordingStatus,
    /// Wall time spent recording.
    pub duration: Duration,
    /// Exit code, for recorders backed by a process.
    pub exit_code: Option<i32>,
}

impl RecordingOutcome {
    /// A recording that completed.
    pub fn completed(duration: Duration) -> Self {
        Self {
            status: RecordingStatus::Completed,
            duration,
            exit_code: None,
        }
    }

    /// A recording that failed.
    pub fn failed(duration: Duration) -> Self {
        Self {
            status: RecordingStatus::Failed,
            duration,
            exit_code: None,
        }
    }

    /// A recording that was killed.
    pub fn killed(duration: Duration) -> Self {
        Self {
            status: RecordingStatus::Killed,
            duration,
            exit_code: None,
        }
    }

    /// Attaches a process exit code.
    pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }

    /// Returns whether the recording completed.
    pub fn is_success(&self) -> bool {
        self.status == RecordingStatus::Completed
    }
}

/// A recording bound to a single reservation.
#[async_trait]
pub trait Recorder: Send + Sync {
    /// Runs the recording to completion.
    ///
    /// `kill` fires if the operator asks for a forced stop while the
    /// recording is in progress.
    async fn record(
        &self,
        request: &ReservationRequest,
        kill: KillSignal,
    ) -> Result<RecordingOutcome, RecorderError>;
}

/// Builds a [`Recorder`] for a claimed reservation.
pub trait RecorderFactory: Send + Sync {
    /// Creates the recorder for `request`.
    fn create(&self, request: &ReservationRequest) -> Result<Box<dyn Recorder>, RecorderError>;
}

impl<F> RecorderFactory for F
where
    F: Fn(&ReservationRequest) -> Result<Box<dyn Recorder>, RecorderError> + Send + Sync,
{
    fn create(&self, request: &ReservationRequest) -> Result<Box<dyn Recorder>, RecorderError> {
        self(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct InstantRecorder;

    #[async_trait]
    impl Recorder for InstantRecorder {
        async fn record(
            &self,
            _request: &ReservationRequest,
            _kill: KillSignal,
        ) -> Result<RecordingOutcome, RecorderError> {
            Ok(RecordingOutcome::completed(Duration::ZERO))
        }
    }

    #[test]
    fn test_recording_status_display() {
        assert_eq!(format!("{}", RecordingStatus::Completed), "completed");
        assert_eq!(format!("{}", RecordingStatus::Failed), "failed");
        assert_eq!(format!("{}", RecordingStatus::Killed), "killed");
    }

    #[test]
    fn test_outcome_constructors() {
        let done = RecordingOutcome::completed(Duration::from_secs(3));
        assert!(done.is_success());
        assert_eq!(done.exit_code, None);

        let failed = RecordingOutcome::failed(Duration::from_secs(1)).with_exit_code(Some(2));
        assert!(!failed.is_success());
        assert_eq!(failed.exit_code, Some(2));

        let killed = RecordingOutcome::killed(Duration::ZERO);
        assert_eq!(killed.status, RecordingStatus::Killed);
    }

    #[test]
    fn test_recorder_error_display() {
        let err = RecorderError::StartFailed("no such program".to_string());
        assert!(err.to_string().contains("no such program"));

        let err = RecorderError::ExecutionFailed("encoder crashed".to_string());
        assert!(err.to_string().contains("encoder crashed"));
    }

    #[tokio::test]
    async fn test_closure_factory() {
        let factory = |_request: &ReservationRequest| -> Result<Box<dyn Recorder>, RecorderError> {
            Ok(Box::new(InstantRecorder))
        };

        let request = ReservationRequest::new("job-1");
        let recorder = factory.create(&request).expect("factory should build a recorder");
        let outcome = recorder
            .record(&request, KillSignal::never())
            .await
            .expect("recording should succeed");

        assert!(outcome.is_success());
    }
}
