//! In-process reservation queue.
//!
//! Every group is a single unbounded FIFO whose receiving end is shared by
//! all subscriptions on that group, so concurrent subscribers compete for
//! payloads exactly like workers on a real transport. Useful for embedding a
//! worker in tests or single-process deployments.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use super::queue::{Delivery, QueueError, ReservationQueue, Subscription};

type SharedReceiver = Arc<Mutex<mpsc::UnboundedReceiver<Vec<u8>>>>;

struct Group {
    /// `None` once the group has been closed.
    tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
    rx: SharedReceiver,
}

impl Group {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: Some(tx),
            rx: Arc::new(Mutex::new(rx)),
        }
    }
}

/// In-memory competing-consumer queue.
#[derive(Default)]
pub struct MemoryReservationQueue {
    groups: Mutex<HashMap<String, Group>>,
}

impl MemoryReservationQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Closes `group`.
    ///
    /// Payloads already published are still delivered; after that every
    /// subscription on the group receives `None`.
    pub async fn close_group(&self, group: &str) {
        let mut groups = self.groups.lock().await;
        groups.entry(group.to_string()).or_insert_with(Group::new).tx = None;
    }
}

#[async_trait]
impl ReservationQueue for MemoryReservationQueue {
    async fn subscribe(&self, group: &str) -> Result<Box<dyn Subscription>, QueueError> {
        let mut groups = self.groups.lock().await;
        let entry = groups.entry(group.to_string()).or_insert_with(Group::new);

        Ok(Box::new(MemorySubscription {
            rx: Arc::clone(&entry.rx),
        }))
    }

    async fn publish(&self, group: &str, payload: Vec<u8>) -> Result<(), QueueError> {
        let mut groups = self.groups.lock().await;
        let entry = groups.entry(group.to_string()).or_insert_with(Group::new);

        match &entry.tx {
            Some(tx) => tx
                .send(payload)
                .map_err(|_| QueueError::Closed(group.to_string())),
            None => Err(QueueError::Closed(group.to_string())),
        }
    }
}

/// A consumer attached to an in-memory group.
pub struct MemorySubscription {
    rx: SharedReceiver,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn receive(&mut self) -> Result<Option<Delivery>, QueueError> {
        let mut rx = self.rx.lock().await;
        Ok(rx.recv().await.map(Delivery::new))
    }

    async fn ack(&mut self, _delivery: &Delivery) -> Result<(), QueueError> {
        // Payloads leave the channel when they are received.
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), QueueError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_publish_then_receive() {
        let queue = MemoryReservationQueue::new();
        let mut subscription = queue.subscribe("reservations").await.expect("subscribe");

        queue
            .publish("reservations", b"first".to_vec())
            .await
            .expect("publish");
        queue
            .publish("reservations", b"second".to_vec())
            .await
            .expect("publish");

        let first = subscription.receive().await.expect("receive").expect("delivery");
        let second = subscription.receive().await.expect("receive").expect("delivery");
        assert_eq!(first.payload(), b"first");
        assert_eq!(second.payload(), b"second");
    }

    #[tokio::test]
    async fn test_subscribers_compete_for_each_payload() {
        let queue = MemoryReservationQueue::new();
        let mut first = queue.subscribe("reservations").await.expect("subscribe");
        let mut second = queue.subscribe("reservations").await.expect("subscribe");

        queue
            .publish("reservations", b"only-once".to_vec())
            .await
            .expect("publish");

        let delivered = first.receive().await.expect("receive");
        assert!(delivered.is_some());

        let nothing = tokio::time::timeout(Duration::from_millis(50), second.receive()).await;
        assert!(nothing.is_err(), "payload must reach a single subscriber");
    }

    #[tokio::test]
    async fn test_groups_are_isolated() {
        let queue = MemoryReservationQueue::new();
        let mut other = queue.subscribe("other").await.expect("subscribe");

        queue
            .publish("reservations", b"payload".to_vec())
            .await
            .expect("publish");

        let nothing = tokio::time::timeout(Duration::from_millis(50), other.receive()).await;
        assert!(nothing.is_err());
    }

    #[tokio::test]
    async fn test_close_group_drains_then_ends() {
        let queue = MemoryReservationQueue::new();
        let mut subscription = queue.subscribe("reservations").await.expect("subscribe");

        queue
            .publish("reservations", b"last".to_vec())
            .await
            .expect("publish");
        queue.close_group("reservations").await;

        let last = subscription.receive().await.expect("receive");
        assert_eq!(last.map(Delivery::into_payload), Some(b"last".to_vec()));
        assert!(subscription.receive().await.expect("receive").is_none());

        let result = queue.publish("reservations", b"late".to_vec()).await;
        assert!(matches!(result, Err(QueueError::Closed(_))));
    }

    #[tokio::test]
    async fn test_cancelled_receive_keeps_payload() {
        let queue = MemoryReservationQueue::new();
        let mut subscription = queue.subscribe("reservations").await.expect("subscribe");

        let cancelled =
            tokio::time::timeout(Duration::from_millis(20), subscription.receive()).await;
        assert!(cancelled.is_err());

        queue
            .publish("reservations", b"kept".to_vec())
            .await
            .expect("publish");
        let delivery = subscription.receive().await.expect("receive").expect("delivery");
        assert_eq!(delivery.payload(), b"kept");
    }
}
