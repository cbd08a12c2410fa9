//! Reservation request definitions.
//!
//! A reservation is the message a publisher drops on the reservation channel
//! when it wants exactly one idle recorder to pick up a job. Workers decode
//! it, check that it is still fresh, and claim it.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default time a reservation may sit in the queue before workers ignore it.
pub const DEFAULT_RESERVATION_TIMEOUT: Duration = Duration::from_secs(2);

/// Errors that can occur while decoding a reservation payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload is not a valid reservation document.
    #[error("Invalid reservation payload: {0}")]
    Json(#[from] serde_json::Error),

    /// The reservation carries an empty job identifier.
    #[error("Reservation has an empty id")]
    EmptyId,
}

/// A request to reserve a recorder for a single job.
///
/// Fields other than `id` and `submittedAt` are opaque to the worker and are
/// handed to the recorder untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReservationRequest {
    /// Unique identifier of the job.
    pub id: String,
    /// When the publisher enqueued the request, in milliseconds since epoch.
    pub submitted_at: i64,
    /// Pass-through recording options.
    #[serde(flatten)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl ReservationRequest {
    /// Creates a new reservation stamped with the current time.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            submitted_at: Utc::now().timestamp_millis(),
            options: serde_json::Map::new(),
        }
    }

    /// Overrides the submission timestamp.
    pub fn with_submitted_at(mut self, submitted_at: i64) -> Self {
        self.submitted_at = submitted_at;
        self
    }

    /// Adds a pass-through option.
    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    /// Decodes a reservation from its wire form.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let request: Self = serde_json::from_slice(payload)?;
        if request.id.is_empty() {
            return Err(DecodeError::EmptyId);
        }
        Ok(request)
    }

    /// Encodes the reservation to its wire form.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Returns how long the request has been waiting at `now_ms`.
    ///
    /// Clock skew between publisher and worker can make this negative; it is
    /// clamped to zero.
    pub fn age_at(&self, now_ms: i64) -> Duration {
        let age = now_ms.saturating_sub(self.submitted_at);
        Duration::from_millis(age.max(0) as u64)
    }

    /// Returns whether the request expired before `now_ms`.
    pub fn is_stale_at(&self, now_ms: i64, timeout: Duration) -> bool {
        let timeout_ms = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
        self.submitted_at < now_ms.saturating_sub(timeout_ms)
    }

    /// Returns whether the request has expired according to the wall clock.
    pub fn is_stale(&self, timeout: Duration) -> bool {
        self.is_stale_at(Utc::now().timestamp_millis(), timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_stamps_current_time() {
        let before = Utc::now().timestamp_millis();
        let request = ReservationRequest::new("job-1");
        let after = Utc::now().timestamp_millis();

        assert_eq!(request.id, "job-1");
        assert!(request.submitted_at >= before && request.submitted_at <= after);
        assert!(request.options.is_empty());
    }

    #[test]
    fn test_decode_camel_case_with_options() {
        let payload = br#"{"id":"job-7","submittedAt":1700000000000,"template":"grid","fps":30}"#;
        let request = ReservationRequest::decode(payload).expect("payload should decode");

        assert_eq!(request.id, "job-7");
        assert_eq!(request.submitted_at, 1_700_000_000_000);
        assert_eq!(request.options.get("template"), Some(&serde_json::json!("grid")));
        assert_eq!(request.options.get("fps"), Some(&serde_json::json!(30)));
    }

    #[test]
    fn test_encode_keeps_options_at_top_level() {
        let request = ReservationRequest::new("job-2")
            .with_submitted_at(42)
            .with_option("url", serde_json::json!("https://example.com/room"));

        let encoded = request.encode().expect("encoding should work");
        let value: serde_json::Value = serde_json::from_slice(&encoded).expect("valid json");

        assert_eq!(value["id"], "job-2");
        assert_eq!(value["submittedAt"], 42);
        assert_eq!(value["url"], "https://example.com/room");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            ReservationRequest::decode(b"\x00\x01not json"),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(
            ReservationRequest::decode(br#"{"id":"job-1"}"#),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn test_decode_rejects_empty_id() {
        let result = ReservationRequest::decode(br#"{"id":"","submittedAt":1}"#);
        assert!(matches!(result, Err(DecodeError::EmptyId)));
    }

    #[test]
    fn test_staleness_boundary() {
        let timeout = Duration::from_secs(60);
        let now = 1_000_000;

        let fresh = ReservationRequest::new("a").with_submitted_at(now - 10_000);
        let edge = ReservationRequest::new("b").with_submitted_at(now - 60_000);
        let old = ReservationRequest::new("c").with_submitted_at(now - 120_000);

        assert!(!fresh.is_stale_at(now, timeout));
        assert!(!edge.is_stale_at(now, timeout));
        assert!(old.is_stale_at(now, timeout));
    }

    #[test]
    fn test_wall_clock_staleness() {
        let now = Utc::now().timestamp_millis();
        let timeout = Duration::from_secs(60);

        assert!(!ReservationRequest::new("a")
            .with_submitted_at(now - 10_000)
            .is_stale(timeout));
        assert!(ReservationRequest::new("b")
            .with_submitted_at(now - 120_000)
            .is_stale(timeout));
    }

    #[test]
    fn test_age_clamps_future_timestamps() {
        let request = ReservationRequest::new("a").with_submitted_at(5_000);

        assert_eq!(request.age_at(7_500), Duration::from_millis(2_500));
        assert_eq!(request.age_at(1_000), Duration::ZERO);
    }
}
