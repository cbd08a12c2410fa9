//! Command-line interface for the recorder worker.
//!
//! Provides the `run` command that starts a worker and the `reserve` command
//! that publishes a reservation.

mod commands;

pub use commands::{parse_cli, run, run_with_cli};
