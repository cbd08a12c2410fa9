//! The job-claiming orchestrator.
//!
//! - **Service**: the worker loop competing for reservations
//! - **ServiceHandle**: thread-safe `stop` / `status` access to a running worker
//! - **StatusRegister / WorkerStatus**: the lifecycle state readable at any time
//! - **Signals**: single-slot shutdown and kill notifications
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use recorder_worker::recorder::CommandRecorderFactory;
//! use recorder_worker::reservation::RedisReservationQueue;
//! use recorder_worker::service::{Service, ServiceConfig};
//!
//! let config = ServiceConfig::from_env()?;
//! let queue = RedisReservationQueue::connect(&config.redis_url).await?;
//! let recorders = CommandRecorderFactory::new("/usr/local/bin/record-room");
//!
//! let service = Service::new(config, Arc::new(queue), Arc::new(recorders));
//! let handle = service.handle();
//!
//! tokio::spawn(async move {
//!     tokio::signal::ctrl_c().await.ok();
//!     handle.stop(false);
//! });
//!
//! service.run().await?;
//! ```

pub mod config;
pub mod signal;
pub mod status;
pub mod worker;

pub use config::{ConfigError, ServiceConfig, DEFAULT_RESERVATION_CHANNEL};
pub use signal::{kill_switch, KillSignal, KillSwitch};
pub use status::{StatusRegister, WorkerStatus};
pub use worker::{Service, ServiceHandle};
