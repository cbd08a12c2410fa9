//! Shutdown and kill signalling.
//!
//! Control callers fire signals through a single-slot channel with
//! `try_send`: firing never waits on the worker loop, and firing again before
//! the loop has observed the first one is a no-op.

use tokio::sync::{mpsc, watch};

/// Creates a single-slot signal.
pub fn signal() -> (SignalSender, SignalReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (SignalSender(tx), SignalReceiver(rx))
}

/// Sending half of a single-slot signal.
#[derive(Debug, Clone)]
pub struct SignalSender(mpsc::Sender<()>);

impl SignalSender {
    /// Fires the signal without blocking.
    ///
    /// Returns `false` if a previous firing is still pending or the receiver
    /// is gone.
    pub fn fire(&self) -> bool {
        self.0.try_send(()).is_ok()
    }
}

/// Receiving half of a single-slot signal.
#[derive(Debug)]
pub struct SignalReceiver(mpsc::Receiver<()>);

impl SignalReceiver {
    /// Waits for the signal. Returns `None` if every sender is gone.
    pub async fn recv(&mut self) -> Option<()> {
        self.0.recv().await
    }

    /// Consumes a pending firing, if any.
    pub fn try_recv(&mut self) -> bool {
        self.0.try_recv().is_ok()
    }
}

/// Creates a connected kill switch and signal.
pub fn kill_switch() -> (KillSwitch, KillSignal) {
    let (tx, rx) = watch::channel(false);
    (KillSwitch(tx), KillSignal(rx))
}

/// Trips the [`KillSignal`] handed to a running recorder.
#[derive(Debug)]
pub struct KillSwitch(watch::Sender<bool>);

impl KillSwitch {
    /// Marks the recording as killed.
    pub fn trip(&self) {
        self.0.send_replace(true);
    }
}

/// Kill notification observed by a recorder.
///
/// The worker loop never cancels a recording itself; it forwards an operator
/// kill here and the recorder decides how to wind down.
#[derive(Debug, Clone)]
pub struct KillSignal(watch::Receiver<bool>);

impl KillSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_, signal) = kill_switch();
        signal
    }

    /// Returns whether the kill has been requested.
    pub fn is_killed(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once the kill is requested. Never resolves if the switch is
    /// dropped untripped.
    pub async fn killed(&mut self) {
        let result = self.0.wait_for(|killed| *killed).await.map(|_| ());
        if result.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
