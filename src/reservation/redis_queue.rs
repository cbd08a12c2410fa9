//! Redis-backed reservation queue.
//!
//! Each reservation group is a Redis list. Publishers `LPUSH` onto it and
//! subscribers pull from the other end with `BRPOPLPUSH`, which hands every
//! payload to exactly one consumer.
//!
//! # Key Structure
//!
//! - `{group}`: pending reservations
//! - `{group}:processing:{subscriber_id}`: payloads taken by one subscriber
//!   but not yet acknowledged
//! - `{group}:subscriber:{subscriber_id}`: liveness lease, refreshed before
//!   every blocking pop
//!
//! Closing a subscription pushes anything left in its processing list back
//! onto the group, so a receive abandoned mid-flight by a shutdown is picked
//! up by the next idle worker. Processing lists of subscribers that died
//! without closing are requeued by [`RedisReservationQueue::recover_abandoned`]
//! once their lease has lapsed; every new subscription runs it first.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::queue::{Delivery, QueueError, ReservationQueue, Subscription};

/// Default blocking window for a single `BRPOPLPUSH` call.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Lease lifetime in multiples of the blocking window.
const LEASE_POLL_INTERVALS: u64 = 3;

fn processing_key(group: &str, subscriber_id: &str) -> String {
    format!("{}:processing:{}", group, subscriber_id)
}

fn lease_key(group: &str, subscriber_id: &str) -> String {
    format!("{}:subscriber:{}", group, subscriber_id)
}

/// Subscriber id of a processing list key, if it belongs to `group`.
fn subscriber_of<'a>(group: &str, key: &'a str) -> Option<&'a str> {
    key.strip_prefix(group)?
        .strip_prefix(":processing:")
        .filter(|id| !id.is_empty() && !id.contains(':'))
}

fn poll_secs(interval: Duration) -> u64 {
    interval.as_secs().max(1)
}

/// Redis reservation queue.
pub struct RedisReservationQueue {
    client: redis::Client,
    /// Shared connection for publishing; subscriptions get their own.
    publisher: ConnectionManager,
    poll_interval: Duration,
}

impl RedisReservationQueue {
    /// Connects to Redis.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::ConnectionFailed` if the connection fails.
    pub async fn connect(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| QueueError::ConnectionFailed(e.to_string()))?;

        let publisher = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| QueueError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            client,
            publisher,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Sets how long a single blocking pop waits before it is reissued.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Requeues payloads stranded in the processing lists of subscribers
    /// whose lease has lapsed, returning how many were requeued.
    ///
    /// Each list is renamed before it is drained, so concurrent callers never
    /// requeue the same list twice.
    pub async fn recover_abandoned(&self, group: &str) -> Result<usize, QueueError> {
        let mut conn = self.publisher.clone();

        let keys: Vec<String> = {
            let mut iter: redis::AsyncIter<String> = conn
                .scan_match(format!("{}:processing:*", group))
                .await?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            keys
        };

        let mut recovered = 0;
        for key in keys {
            let Some(subscriber) = subscriber_of(group, &key) else {
                continue;
            };

            let alive: bool = conn.exists(lease_key(group, subscriber)).await?;
            if alive {
                continue;
            }

            // The claimed name has no lease either, so a crash from here on
            // leaves it for the next recovery.
            let claimed = processing_key(group, &Uuid::new_v4().to_string());
            let renamed: redis::RedisResult<()> = conn.rename(&key, &claimed).await;
            if renamed.is_err() {
                debug!(group = %group, key = %key, "Abandoned list already taken");
                continue;
            }

            let leftovers: Vec<Vec<u8>> = conn.lrange(&claimed, 0, -1).await?;
            let mut pipe = redis::pipe();
            pipe.atomic();
            for payload in &leftovers {
                pipe.rpush(group, payload);
            }
            pipe.del(&claimed);
            pipe.query_async::<_, ()>(&mut conn).await?;

            recovered += leftovers.len();
        }

        if recovered > 0 {
            info!(group = %group, requeued = recovered, "Recovered reservations from abandoned subscribers");
        }

        Ok(recovered)
    }

    /// Returns the number of pending reservations in `group`.
    pub async fn len(&self, group: &str) -> Result<usize, QueueError> {
        let mut conn = self.publisher.clone();
        let len: usize = conn.llen(group).await?;
        Ok(len)
    }
}

#[async_trait]
impl ReservationQueue for RedisReservationQueue {
    async fn subscribe(&self, group: &str) -> Result<Box<dyn Subscription>, QueueError> {
        // BRPOPLPUSH parks the connection it runs on, so every subscription
        // needs its own.
        let redis = ConnectionManager::new(self.client.clone())
            .await
            .map_err(|e| QueueError::ConnectionFailed(e.to_string()))?;

        if let Err(e) = self.recover_abandoned(group).await {
            warn!(group = %group, error = %e, "Failed to recover abandoned reservations");
        }

        let subscriber_id = Uuid::new_v4().to_string();
        let mut subscription = RedisSubscription {
            redis,
            group: group.to_string(),
            processing: processing_key(group, &subscriber_id),
            lease: lease_key(group, &subscriber_id),
            poll_interval: self.poll_interval,
        };
        subscription.renew_lease().await?;

        debug!(group = %group, processing = %subscription.processing, "Subscribed to reservation group");
        Ok(Box::new(subscription))
    }

    async fn publish(&self, group: &str, payload: Vec<u8>) -> Result<(), QueueError> {
        let mut conn = self.publisher.clone();
        conn.lpush::<_, _, ()>(group, payload).await?;
        Ok(())
    }
}

/// A single consumer attached to a Redis reservation group.
pub struct RedisSubscription {
    redis: ConnectionManager,
    group: String,
    processing: String,
    lease: String,
    poll_interval: Duration,
}

impl RedisSubscription {
    async fn renew_lease(&mut self) -> Result<(), QueueError> {
        let ttl = poll_secs(self.poll_interval) * LEASE_POLL_INTERVALS;
        redis::cmd("SET")
            .arg(&self.lease)
            .arg(1)
            .arg("EX")
            .arg(ttl)
            .query_async::<_, ()>(&mut self.redis)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Subscription for RedisSubscription {
    async fn receive(&mut self) -> Result<Option<Delivery>, QueueError> {
        let timeout_secs = poll_secs(self.poll_interval);

        loop {
            self.renew_lease().await?;

            let result: Option<Vec<u8>> = redis::cmd("BRPOPLPUSH")
                .arg(&self.group)
                .arg(&self.processing)
                .arg(timeout_secs)
                .query_async(&mut self.redis)
                .await?;

            if let Some(payload) = result {
                return Ok(Some(Delivery::new(payload)));
            }
        }
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<(), QueueError> {
        self.redis
            .lrem::<_, _, ()>(&self.processing, 1, delivery.payload())
            .await?;
        Ok(())
    }

    async fn close(mut self: Box<Self>) -> Result<(), QueueError> {
        // Runs after any pop still parked on this connection, so a payload
        // taken by an abandoned receive is visible here.
        let leftovers: Vec<Vec<u8>> = self.redis.lrange(&self.processing, 0, -1).await?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        for payload in &leftovers {
            pipe.rpush(&self.group, payload);
        }
        pipe.del(&self.processing).del(&self.lease);
        pipe.query_async::<_, ()>(&mut self.redis).await?;

        if !leftovers.is_empty() {
            info!(
                group = %self.group,
                requeued = leftovers.len(),
                "Returned unacknowledged reservations to the group"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reservation::ReservationRequest;

    const TEST_REDIS_URL: &str = "redis://localhost:6379";

    #[test]
    fn test_key_layout() {
        let id = Uuid::nil().to_string();
        assert_eq!(
            processing_key("recording_reservation", &id),
            "recording_reservation:processing:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            lease_key("recording_reservation", &id),
            "recording_reservation:subscriber:00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_subscriber_of_processing_key() {
        let key = processing_key("egress", "abc");
        assert_eq!(subscriber_of("egress", &key), Some("abc"));

        // Another group sharing the prefix is not ours.
        let other = processing_key("egress:hd", "abc");
        assert_eq!(subscriber_of("egress", &other), None);
        assert_eq!(subscriber_of("egress", "egress:processing:"), None);
        assert_eq!(subscriber_of("egress", "egress:subscriber:abc"), None);
    }

    #[test]
    fn test_poll_secs_has_floor() {
        assert_eq!(poll_secs(Duration::from_millis(200)), 1);
        assert_eq!(poll_secs(Duration::from_secs(5)), 5);
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_url() {
        let result = RedisReservationQueue::connect("not-a-redis-url").await;
        assert!(matches!(result, Err(QueueError::ConnectionFailed(_))));
    }

    #[tokio::test]
    #[ignore] // Requires a local Redis: cargo test -- --ignored
    async fn test_competing_subscribers_share_one_copy() {
        let queue = RedisReservationQueue::connect(TEST_REDIS_URL)
            .await
            .expect("redis should be reachable");
        let group = format!("test_reservation_{}", Uuid::new_v4());

        let mut first = queue.subscribe(&group).await.expect("subscribe");
        let mut second = queue.subscribe(&group).await.expect("subscribe");

        let payload = ReservationRequest::new("job-1").encode().expect("encode");
        queue.publish(&group, payload.clone()).await.expect("publish");

        let delivery = first.receive().await.expect("receive").expect("delivery");
        assert_eq!(delivery.payload(), payload.as_slice());
        first.ack(&delivery).await.expect("ack");

        assert_eq!(queue.len(&group).await.expect("len"), 0);
        let nothing = tokio::time::timeout(Duration::from_millis(1500), second.receive()).await;
        assert!(nothing.is_err(), "second subscriber must not see the payload");

        first.close().await.expect("close");
        second.close().await.expect("close");
    }

    #[tokio::test]
    #[ignore] // Requires a local Redis: cargo test -- --ignored
    async fn test_close_requeues_unacknowledged_payloads() {
        let queue = RedisReservationQueue::connect(TEST_REDIS_URL)
            .await
            .expect("redis should be reachable");
        let group = format!("test_reservation_{}", Uuid::new_v4());

        let mut subscription = queue.subscribe(&group).await.expect("subscribe");
        queue
            .publish(&group, b"pending".to_vec())
            .await
            .expect("publish");

        let delivery = subscription.receive().await.expect("receive");
        assert!(delivery.is_some());
        subscription.close().await.expect("close");

        assert_eq!(queue.len(&group).await.expect("len"), 1);
    }

    #[tokio::test]
    #[ignore] // Requires a local Redis: cargo test -- --ignored
    async fn test_subscribe_recovers_abandoned_processing_list() {
        let queue = RedisReservationQueue::connect(TEST_REDIS_URL)
            .await
            .expect("redis should be reachable");
        let group = format!("test_reservation_{}", Uuid::new_v4());

        // A subscriber that died mid-claim: processing list, no lease.
        let mut conn = queue.publisher.clone();
        let orphan = processing_key(&group, &Uuid::new_v4().to_string());
        conn.lpush::<_, _, ()>(&orphan, b"stranded".to_vec())
            .await
            .expect("seed orphan");

        let mut subscription = queue.subscribe(&group).await.expect("subscribe");
        let exists: bool = conn.exists(&orphan).await.expect("exists");
        assert!(!exists);

        let delivery = subscription
            .receive()
            .await
            .expect("receive")
            .expect("delivery");
        assert_eq!(delivery.payload(), b"stranded");
        subscription.ack(&delivery).await.expect("ack");
        subscription.close().await.expect("close");
    }

    #[tokio::test]
    #[ignore] // Requires a local Redis: cargo test -- --ignored
    async fn test_recovery_skips_live_subscribers() {
        let queue = RedisReservationQueue::connect(TEST_REDIS_URL)
            .await
            .expect("redis should be reachable");
        let group = format!("test_reservation_{}", Uuid::new_v4());

        let mut subscription = queue.subscribe(&group).await.expect("subscribe");
        queue
            .publish(&group, b"in-flight".to_vec())
            .await
            .expect("publish");
        let delivery = subscription.receive().await.expect("receive");
        assert!(delivery.is_some());

        assert_eq!(queue.recover_abandoned(&group).await.expect("recover"), 0);
        assert_eq!(queue.len(&group).await.expect("len"), 0);

        subscription.close().await.expect("close");
        assert_eq!(queue.len(&group).await.expect("len"), 1);
    }
}
