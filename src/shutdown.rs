//! Cancellation signal shared by the coordinator and its callers.
//!
//! Signalling drops the only sender, so every clone of [`Shutdown`] observes the
//! disconnect and nothing consumes the signal.

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};

pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = channel::bounded(0);
    (ShutdownTrigger { _tx: tx }, Shutdown { rx })
}

/// Fires on [`trigger`](ShutdownTrigger::trigger) or when dropped.
#[derive(Debug)]
pub struct ShutdownTrigger {
    _tx: Sender<()>,
}

impl ShutdownTrigger {
    pub fn trigger(self) {}
}

#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: Receiver<()>,
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Becomes ready (disconnected) once shutdown fires; use in `select!`.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}
