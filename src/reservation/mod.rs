//! Reservation messages and the queues that carry them.
//!
//! - **ReservationRequest**: the job claim published by a requester
//! - **ReservationQueue / Subscription**: competing-consumer transport
//! - **RedisReservationQueue**: Redis lists with per-subscriber processing lists
//! - **MemoryReservationQueue**: in-process transport with the same semantics
//!
//! # Architecture
//!
//! ```text
//!                      ┌──────────────┐
//!                      │  Requester   │
//!                      │ (API / CLI)  │
//!                      └──────┬───────┘
//!                             │ publish
//!                      ┌──────▼───────┐
//!                      │ Reservation  │
//!                      │    group     │
//!                      └──────┬───────┘
//!                             │ one delivery per payload
//!         ┌───────────────────┼───────────────────┐
//!         ▼                   ▼                   ▼
//!    ┌──────────┐        ┌──────────┐        ┌──────────┐
//!    │Recorder 1│        │Recorder 2│        │Recorder N│
//!    └──────────┘        └──────────┘        └──────────┘
//! ```

pub mod memory;
pub mod queue;
pub mod redis_queue;
pub mod request;

pub use memory::MemoryReservationQueue;
pub use queue::{Delivery, QueueError, ReservationQueue, Subscription};
pub use redis_queue::RedisReservationQueue;
pub use request::{DecodeError, ReservationRequest, DEFAULT_RESERVATION_TIMEOUT};
