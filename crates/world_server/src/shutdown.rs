//! Shutdown coordination shared by the receive loop, the replication tick,
//! the idle sweep and the owning application.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::info;

/// Two-phase shutdown flag.
///
/// `initiate` stops intake of new frames and wakes every task parked in
/// [`ShutdownState::initiated`]; `complete` marks that zones have been torn
/// down and the process may exit.
#[derive(Debug, Clone, Default)]
pub struct ShutdownState {
    initiated: Arc<AtomicBool>,
    complete: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_shutdown_initiated(&self) -> bool {
        self.initiated.load(Ordering::Acquire)
    }

    pub fn is_shutdown_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    /// Stops frame intake. Idempotent.
    pub fn initiate_shutdown(&self) {
        if !self.initiated.swap(true, Ordering::AcqRel) {
            info!("🛑 Shutdown initiated - no new frames will be dispatched");
        }
        self.notify.notify_waiters();
    }

    pub fn complete_shutdown(&self) {
        self.complete.store(true, Ordering::Release);
        info!("✅ Zones torn down - ready for final cleanup");
        self.notify.notify_waiters();
    }

    /// Resolves once shutdown has been initiated.
    pub async fn initiated(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_shutdown_initiated() {
                return;
            }
            notified.await;
        }
    }

    /// Resolves once shutdown has completed.
    pub async fn completed(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_shutdown_complete() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn waiters_wake_on_initiate() {
        let state = ShutdownState::new();
        let waiter = {
            let state = state.clone();
            tokio::spawn(async move { state.initiated().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        state.initiate_shutdown();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(state.is_shutdown_initiated());
        assert!(!state.is_shutdown_complete());

        state.complete_shutdown();
        tokio::time::timeout(Duration::from_millis(100), state.completed())
            .await
            .expect("completion observed");
    }

    #[tokio::test]
    async fn late_waiters_return_immediately() {
        let state = ShutdownState::new();
        state.initiate_shutdown();
        state.initiate_shutdown();
        tokio::time::timeout(Duration::from_millis(100), state.initiated())
            .await
            .expect("already initiated");
    }
}
