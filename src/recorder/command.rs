//! Process-backed recorder.
//!
//! Launches an external recording program per reservation. The program gets
//! the reservation id as its last argument and in `RECORDING_ID`, and the
//! full reservation document on stdin. The recording ends when the program
//! exits.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{Recorder, RecorderError, RecorderFactory, RecordingOutcome};
use crate::reservation::ReservationRequest;
use crate::service::KillSignal;

/// Environment variable carrying the reservation id.
pub const RECORDING_ID_ENV: &str = "RECORDING_ID";

/// Builds [`CommandRecorder`]s for a fixed program.
#[derive(Debug, Clone)]
pub struct CommandRecorderFactory {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CommandRecorderFactory {
    /// Creates a factory that runs `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    /// Sets arguments passed before the reservation id.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Sets the working directory of the recording program.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

impl RecorderFactory for CommandRecorderFactory {
    fn create(&self, request: &ReservationRequest) -> Result<Box<dyn Recorder>, RecorderError> {
        if self.program.trim().is_empty() {
            return Err(RecorderError::StartFailed(
                "no recorder program configured".to_string(),
            ));
        }

        debug!(reservation_id = %request.id, program = %self.program, "Creating recorder");

        Ok(Box::new(CommandRecorder {
            program: self.program.clone(),
            args: self.args.clone(),
            working_dir: self.working_dir.clone(),
        }))
    }
}

/// A recording carried out by an external program.
#[derive(Debug, Clone)]
pub struct CommandRecorder {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

#[async_trait]
impl Recorder for CommandRecorder {
    async fn record(
        &self,
        request: &ReservationRequest,
        mut kill: KillSignal,
    ) -> Result<RecordingOutcome, RecorderError> {
        let start = Instant::now();
        let payload = request.encode()?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(&request.id)
            .env(RECORDING_ID_ENV, &request.id)
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }

        info!(reservation_id = %request.id, program = %self.program, "Starting recorder process");

        let mut child = cmd.spawn().map_err(|e| {
            RecorderError::StartFailed(format!("Failed to spawn {}: {}", self.program, e))
        })?;

        // A program that never drains stdin must not hold up a kill, so the
        // reservation is fed from its own task.
        let feeder = child.stdin.take().map(|mut stdin| {
            let reservation_id = request.id.clone();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&payload).await {
                    debug!(reservation_id = %reservation_id, error = %e, "Recorder did not read reservation");
                }
            })
        });

        let result = tokio::select! {
            status = child.wait() => match status {
                Ok(status) => {
                    let outcome = if status.success() {
                        RecordingOutcome::completed(start.elapsed())
                    } else {
                        RecordingOutcome::failed(start.elapsed())
                    };
                    Ok(outcome.with_exit_code(status.code()))
                }
                Err(e) => Err(RecorderError::ExecutionFailed(format!("Process error: {}", e))),
            },
            _ = kill.killed() => {
                warn!(reservation_id = %request.id, "Kill requested, terminating recorder process");
                child
                    .kill()
                    .await
                    .map(|_| RecordingOutcome::killed(start.elapsed()))
                    .map_err(RecorderError::from)
            }
        };

        if let Some(feeder) = feeder {
            feeder.abort();
        }

        result
    }
}
