// SPDX-License-Identifier: GPL-3.0-only

//! Lifecycle gate
//!
//! A binary permit serializing open and close against the asynchronous
//! device callbacks. Callers take the permit before touching the device and
//! the event handler returns it once the device has settled (opened, errored
//! or disconnected), so a close can never race a half-finished open.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct LifecycleGate {
    available: Mutex<bool>,
    condvar: Condvar,
}

impl LifecycleGate {
    pub fn new() -> Self {
        Self {
            available: Mutex::new(true),
            condvar: Condvar::new(),
        }
    }

    /// Take the permit, waiting up to `timeout`. Returns false on timeout.
    pub fn acquire(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut available = match self.available.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        while !*available {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, result) = match self.condvar.wait_timeout(available, deadline - now) {
                Ok(pair) => pair,
                Err(poisoned) => poisoned.into_inner(),
            };
            available = guard;
            if result.timed_out() && !*available {
                return false;
            }
        }
        *available = false;
        true
    }

    /// Return the permit. Safe to call more than once; releasing an already
    /// available gate is a no-op.
    pub fn release(&self) {
        let mut available = match self.available.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !*available {
            *available = true;
            self.condvar.notify_one();
        }
    }
}

impl Default for LifecycleGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_acquire_then_release() {
        let gate = LifecycleGate::new();
        assert!(gate.acquire(Duration::from_millis(10)));
        // Held, second acquire times out
        assert!(!gate.acquire(Duration::from_millis(20)));
        gate.release();
        assert!(gate.acquire(Duration::from_millis(10)));
    }

    #[test]
    fn test_double_release_is_idempotent() {
        let gate = LifecycleGate::new();
        assert!(gate.acquire(Duration::from_millis(10)));
        gate.release();
        gate.release();
        assert!(gate.acquire(Duration::from_millis(10)));
        // Still a single permit
        assert!(!gate.acquire(Duration::from_millis(20)));
    }

    #[test]
    fn test_release_wakes_waiter() {
        let gate = Arc::new(LifecycleGate::new());
        assert!(gate.acquire(Duration::from_millis(10)));

        let waiter = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || gate.acquire(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(50));
        gate.release();
        assert!(waiter.join().unwrap());
    }
}
