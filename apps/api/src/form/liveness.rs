use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// Liveness flag for a form session. Once killed it stays dead; background work
/// checks it before applying side effects and can await `killed()` to stop early.
#[derive(Debug)]
pub struct Liveness {
    alive: AtomicBool,
    notify: Notify,
}

impl Default for Liveness {
    fn default() -> Self {
        Self {
            alive: AtomicBool::new(true),
            notify: Notify::new(),
        }
    }
}

impl Liveness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn kill(&self) {
        self.alive.store(false, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Resolves once `kill` has been called.
    pub async fn killed(&self) {
        loop {
            // Register interest before checking, so a kill in between is not missed.
            let notified = self.notify.notified();
            if !self.is_alive() {
                return;
            }
            notified.await;
        }
    }
}
