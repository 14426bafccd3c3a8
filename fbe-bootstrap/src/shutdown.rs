// /////////////////////////////////////////////////////////////////////////////
// FBE Key Management Core
// Copyright (c) 2025 Contributors
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Shutdown coordination.
//!
//! Every operation in this daemon is a blocking filesystem call or kernel
//! ioctl, never an async task, so shutdown here is the classic signal-handler
//! pattern: a `CancellationToken` backed by a condition variable rather than
//! `tokio::sync::Notify`. The admin loop checks [`CancellationToken::is_cancelled`]
//! between requests and [`CancellationToken::wait`] to sleep until told to stop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 5;

#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    gate: Arc<(Mutex<bool>, Condvar)>,
}

impl CancellationToken {
    fn new() -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)), gate: Arc::new((Mutex::new(false), Condvar::new())) }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let (lock, cvar) = &*self.gate;
        let mut fired = lock.lock().unwrap_or_else(|e| e.into_inner());
        *fired = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Blocks until cancelled or `timeout` elapses, whichever comes first.
    pub fn wait(&self, timeout: Duration) {
        if self.is_cancelled() {
            return;
        }
        let (lock, cvar) = &*self.gate;
        let guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        let _ = cvar.wait_timeout_while(guard, timeout, |fired| !*fired && !self.is_cancelled());
    }
}

/// Owns the token and the grace period applied once shutdown is initiated.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    grace_period: Duration,
    initiated: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    pub fn new(grace_period: Duration) -> Self {
        Self { token: CancellationToken::new(), grace_period, initiated: Arc::new(AtomicBool::new(false)) }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn initiate_shutdown(&self) {
        self.initiated.store(true, Ordering::SeqCst);
        self.token.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.initiated.load(Ordering::SeqCst)
    }

    /// Gives in-flight work `grace_period` to notice cancellation before the
    /// caller proceeds to tear down process state.
    pub fn wait_for_grace_period(&self) {
        std::thread::sleep(self.grace_period);
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_starts_uncancelled() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(10));
        assert!(!coordinator.token().is_cancelled());
        assert!(!coordinator.is_shutting_down());
    }

    #[test]
    fn cancel_marks_token_and_coordinator() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(10));
        let token = coordinator.token();
        coordinator.initiate_shutdown();
        assert!(token.is_cancelled());
        assert!(coordinator.is_shutting_down());
    }

    #[test]
    fn wait_returns_once_cancelled_from_another_thread() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(10));
        let token = coordinator.token();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            token.cancel();
        });
        coordinator.token().wait(Duration::from_secs(5));
        assert!(coordinator.token().is_cancelled());
        handle.join().unwrap();
    }

    #[test]
    fn wait_times_out_without_cancellation() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(10));
        coordinator.token().wait(Duration::from_millis(20));
        assert!(!coordinator.token().is_cancelled());
    }
}
