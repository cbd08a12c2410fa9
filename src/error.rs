//! Error types for recorder worker operations.
//!
//! Each subsystem owns its error enum:
//! - Reservation transport (`QueueError`) and decoding (`DecodeError`)
//! - Recorder setup and execution (`RecorderError`)
//! - Configuration (`ConfigError`)
//!
//! `ServiceError` covers the few failures that end the worker loop. Anything
//! that goes wrong while handling a single reservation is logged and absorbed
//! so the worker stays available.

use thiserror::Error;

use crate::reservation::QueueError;
use crate::service::ConfigError;

/// Errors that end a recorder service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Failed to subscribe to reservation channel '{channel}': {source}")]
    Subscription {
        channel: String,
        #[source]
        source: QueueError,
    },

    #[error("Reservation channel '{0}' was closed by the transport")]
    SubscriptionClosed(String),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}
