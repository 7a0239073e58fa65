//! Process-wide shutdown signal.
//!
//! `main` holds the [`ShutdownTrigger`]; the accept loop, the discovery loop
//! and every channel session hold a cloned [`Shutdown`] and select on
//! [`Shutdown::wait`] next to their socket I/O.

use tokio::sync::watch;

/// Sender half: flips the signal once.
#[derive(Debug)]
pub struct ShutdownTrigger(watch::Sender<bool>);

/// Receiver half, cheap to clone.
#[derive(Debug, Clone)]
pub struct Shutdown(watch::Receiver<bool>);

/// Creates a connected trigger/signal pair.
pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger(tx), Shutdown(rx))
}

impl ShutdownTrigger {
    /// Signals every holder of a [`Shutdown`].
    pub fn trigger(&self) {
        // send_replace never fails, even with no receivers left.
        self.0.send_replace(true);
    }
}

impl Shutdown {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self(rx)
    }

    /// Returns `true` once the trigger has fired.
    pub fn is_triggered(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves when the trigger fires.  If the trigger is dropped without
    /// firing, this never resolves.
    pub async fn wait(&self) {
        let mut rx = self.0.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
