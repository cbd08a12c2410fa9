//! The recorder worker loop.
//!
//! A [`Service`] subscribes once to the reservation group and then cycles:
//!
//! 1. Publish `Available` and wait for either a shutdown request or the next
//!    reservation.
//! 2. Discard payloads that do not decode and reservations older than the
//!    reservation timeout.
//! 3. Claim anything else: publish `Reserved`, build a recorder, publish
//!    `Recording`, and await the recording until it returns.
//!
//! Shutdown is only observed while `Available`, and always wins over a
//! reservation that is ready at the same moment. A kill request arriving
//! during a recording is forwarded to the recorder; the loop itself never
//! abandons a recording.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::error::ServiceError;
use crate::metrics::{MetricsCollector, ReservationOutcome};
use crate::recorder::RecorderFactory;
use crate::reservation::{Delivery, QueueError, ReservationQueue, ReservationRequest, Subscription};

use super::config::ServiceConfig;
use super::signal::{kill_switch, signal, SignalReceiver, SignalSender};
use super::status::{StatusRegister, WorkerStatus};

/// Control and observation handle for a running [`Service`].
///
/// Cheap to clone and safe to use from any thread.
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    status: Arc<StatusRegister>,
    shutdown: SignalSender,
    kill: SignalSender,
}

impl ServiceHandle {
    /// Asks the worker to stop claiming reservations.
    ///
    /// With `kill`, a recording in progress is also told to stop. Never
    /// blocks; repeated calls before the worker reacts are ignored.
    pub fn stop(&self, kill: bool) {
        let shutdown_sent = self.shutdown.fire();
        let kill_sent = kill && self.kill.fire();
        debug!(kill = kill, shutdown_sent, kill_sent, "Stop requested");
    }

    /// Returns the worker's current status.
    pub fn status(&self) -> WorkerStatus {
        self.status.load()
    }
}

enum Event {
    Shutdown,
    Received(Result<Option<Delivery>, QueueError>),
}

/// A single recorder worker competing for reservations.
pub struct Service {
    config: ServiceConfig,
    queue: Arc<dyn ReservationQueue>,
    recorders: Arc<dyn RecorderFactory>,
    handle: ServiceHandle,
    shutdown_rx: SignalReceiver,
    kill_rx: SignalReceiver,
    metrics: MetricsCollector,
}

impl Service {
    /// Creates a worker in the `Starting` state.
    pub fn new(
        config: ServiceConfig,
        queue: Arc<dyn ReservationQueue>,
        recorders: Arc<dyn RecorderFactory>,
    ) -> Self {
        let (shutdown, shutdown_rx) = signal();
        let (kill, kill_rx) = signal();

        let metrics = MetricsCollector::new();
        metrics.set_status(WorkerStatus::Starting);

        Self {
            config,
            queue,
            recorders,
            handle: ServiceHandle {
                status: Arc::new(StatusRegister::new()),
                shutdown,
                kill,
            },
            shutdown_rx,
            kill_rx,
            metrics,
        }
    }

    /// Returns a handle for stopping and observing the worker.
    pub fn handle(&self) -> ServiceHandle {
        self.handle.clone()
    }

    /// Returns the worker's current status.
    pub fn status(&self) -> WorkerStatus {
        self.handle.status()
    }

    /// See [`ServiceHandle::stop`].
    pub fn stop(&self, kill: bool) {
        self.handle.stop(kill)
    }

    /// Runs the worker until it is stopped.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Config` for an invalid configuration,
    /// `ServiceError::Subscription` if the reservation group cannot be
    /// joined, and `ServiceError::SubscriptionClosed` if the transport ends
    /// the group while the worker is running.
    pub async fn run(mut self) -> Result<(), ServiceError> {
        self.config.validate()?;

        let channel = self.config.reservation_channel.clone();
        info!(worker_id = %self.config.worker_id, channel = %channel, "Starting recorder service");

        let mut reservations =
            self.queue
                .subscribe(&channel)
                .await
                .map_err(|source| ServiceError::Subscription {
                    channel: channel.clone(),
                    source,
                })?;

        let result = loop {
            self.set_status(WorkerStatus::Available);
            debug!(worker_id = %self.config.worker_id, "Recorder waiting");

            match self.next_event(reservations.as_mut()).await {
                Event::Shutdown => break Ok(()),
                Event::Received(Ok(Some(delivery))) => {
                    self.handle_delivery(reservations.as_mut(), delivery).await;
                }
                Event::Received(Ok(None)) => {
                    error!(worker_id = %self.config.worker_id, channel = %channel, "Reservation channel closed by transport");
                    break Err(ServiceError::SubscriptionClosed(channel.clone()));
                }
                Event::Received(Err(e)) => {
                    error!(worker_id = %self.config.worker_id, error = %e, "Failed to receive reservation");
                    if self.pause(self.config.receive_retry_interval).await {
                        break Ok(());
                    }
                }
            }
        };

        self.set_status(WorkerStatus::Stopping);
        info!(worker_id = %self.config.worker_id, "Shutting down");

        if let Err(e) = reservations.close().await {
            warn!(worker_id = %self.config.worker_id, error = %e, "Failed to close reservation subscription");
        }

        result
    }

    /// Waits for shutdown or the next delivery. Shutdown wins ties.
    async fn next_event(&mut self, reservations: &mut dyn Subscription) -> Event {
        tokio::select! {
            biased;
            Some(()) = self.shutdown_rx.recv() => Event::Shutdown,
            received = reservations.receive() => Event::Received(received),
        }
    }

    /// Sleeps for `delay`, returning early with `true` on shutdown.
    async fn pause(&mut self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            Some(()) = self.shutdown_rx.recv() => true,
            _ = tokio::time::sleep(delay) => false,
        }
    }

    async fn handle_delivery(&mut self, reservations: &mut dyn Subscription, delivery: Delivery) {
        debug!(worker_id = %self.config.worker_id, "Reservation received");

        let request = match ReservationRequest::decode(delivery.payload()) {
            Ok(request) => request,
            Err(e) => {
                error!(worker_id = %self.config.worker_id, error = %e, "Malformed reservation");
                self.metrics.record_reservation(ReservationOutcome::Malformed);
                acknowledge(&self.config.worker_id, reservations, &delivery).await;
                return;
            }
        };

        let now = Utc::now().timestamp_millis();
        if request.is_stale_at(now, self.config.reservation_timeout) {
            debug!(
                worker_id = %self.config.worker_id,
                reservation_id = %request.id,
                age_ms = request.age_at(now).as_millis() as u64,
                "Discarding old reservation"
            );
            self.metrics.record_reservation(ReservationOutcome::Stale);
            acknowledge(&self.config.worker_id, reservations, &delivery).await;
            return;
        }

        self.set_status(WorkerStatus::Reserved);
        acknowledge(&self.config.worker_id, reservations, &delivery).await;
        self.metrics.record_reservation(ReservationOutcome::Claimed);
        self.metrics
            .record_reservation_age(request.age_at(now).as_secs_f64());
        info!(worker_id = %self.config.worker_id, reservation_id = %request.id, "Reservation claimed");

        self.record(&request).await;
    }

    /// Runs the recording for a claimed reservation. Returns once the
    /// recorder does, whatever the outcome.
    async fn record(&mut self, request: &ReservationRequest) {
        let recorder = match self.recorders.create(request) {
            Ok(recorder) => recorder,
            Err(e) => {
                error!(
                    worker_id = %self.config.worker_id,
                    reservation_id = %request.id,
                    error = %e,
                    "Failed to create recorder"
                );
                self.metrics.record_recorder_start_failure();
                return;
            }
        };

        self.set_status(WorkerStatus::Recording);
        let start = Instant::now();
        let (switch, signal) = kill_switch();

        let recording = recorder.record(request, signal);
        tokio::pin!(recording);

        let mut kill_forwarded = false;
        let result = loop {
            tokio::select! {
                result = &mut recording => break result,
                Some(()) = self.kill_rx.recv(), if !kill_forwarded => {
                    warn!(
                        worker_id = %self.config.worker_id,
                        reservation_id = %request.id,
                        "Kill requested, forwarding to recorder"
                    );
                    switch.trip();
                    kill_forwarded = true;
                }
            }
        };

        let duration = start.elapsed();
        match result {
            Ok(outcome) => {
                info!(
                    worker_id = %self.config.worker_id,
                    reservation_id = %request.id,
                    status = %outcome.status,
                    exit_code = ?outcome.exit_code,
                    duration_ms = duration.as_millis() as u64,
                    "Recording finished"
                );
                self.metrics
                    .record_recording(Some(outcome.status), duration.as_secs_f64());
            }
            Err(e) => {
                error!(
                    worker_id = %self.config.worker_id,
                    reservation_id = %request.id,
                    error = %e,
                    duration_ms = duration.as_millis() as u64,
                    "Recording failed"
                );
                self.metrics.record_recording(None, duration.as_secs_f64());
            }
        }
    }

    fn set_status(&self, status: WorkerStatus) {
        self.handle.status.store(status);
        self.metrics.set_status(status);
    }
}

/// Removes a handled delivery from the group. Failures are logged only.
async fn acknowledge(worker_id: &str, reservations: &mut dyn Subscription, delivery: &Delivery) {
    if let Err(e) = reservations.ack(delivery).await {
        warn!(worker_id = %worker_id, error = %e, "Failed to acknowledge reservation");
    }
}
