//! Competing-consumer queue abstraction for reservations.
//!
//! A [`ReservationQueue`] hands out [`Subscription`]s on a named group. Every
//! payload published to a group is delivered to exactly one of the
//! subscriptions currently attached to it; idle workers in the same group
//! compete for work rather than each receiving a copy.
//!
//! Delivery is at-least-once. A subscription that is closed while a payload
//! is in flight must not drop it on the floor: backends either return it to
//! the group or never take it off the group in the first place.

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Failed to reach the transport.
    #[error("Queue connection failed: {0}")]
    ConnectionFailed(String),

    /// Redis operation failed.
    #[error("Redis operation failed: {0}")]
    RedisError(#[from] redis::RedisError),

    /// The group was closed by the transport.
    #[error("Queue group '{0}' is closed")]
    Closed(String),
}

/// A raw payload handed to one subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    payload: Vec<u8>,
}

impl Delivery {
    /// Wraps a raw payload.
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Returns the raw payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consumes the delivery, returning the payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

/// An attached consumer on a reservation group.
#[async_trait]
pub trait Subscription: Send {
    /// Waits for the next delivery.
    ///
    /// Returns `Ok(None)` once the transport has closed the group and no
    /// further deliveries will arrive. Dropping the returned future before it
    /// completes must not lose a payload.
    async fn receive(&mut self) -> Result<Option<Delivery>, QueueError>;

    /// Acknowledges a delivery, removing it from the group for good.
    async fn ack(&mut self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Detaches from the group.
    async fn close(self: Box<Self>) -> Result<(), QueueError>;
}

/// A queue transport offering competing-consumer groups.
#[async_trait]
pub trait ReservationQueue: Send + Sync {
    /// Attaches a new consumer to `group`.
    async fn subscribe(&self, group: &str) -> Result<Box<dyn Subscription>, QueueError>;

    /// Publishes a payload to `group`.
    async fn publish(&self, group: &str, payload: Vec<u8>) -> Result<(), QueueError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_error_display() {
        let err = QueueError::ConnectionFailed("refused".to_string());
        assert!(err.to_string().contains("refused"));

        let err = QueueError::Closed("recording_reservation".to_string());
        assert!(err.to_string().contains("recording_reservation"));
    }

    #[test]
    fn test_delivery_payload() {
        let delivery = Delivery::new(b"hello".to_vec());
        assert_eq!(delivery.payload(), b"hello");
        assert_eq!(delivery.into_payload(), b"hello".to_vec());
    }
}
