// SPDX-License-Identifier: GPL-3.0-only

//! Frame loop threads
//!
//! The synthetic backend runs its preview ticks on a dedicated thread. This
//! controller owns that thread and gives the backend a uniform way to start
//! it, stop it and join it on close.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

/// Returned by the loop body to keep running or bail out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    Continue,
    Stop,
}

/// Handle to a running frame loop. Dropping it stops and joins the thread.
pub struct FrameLoopController {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    name: String,
}

impl FrameLoopController {
    /// Start a loop thread. `body` runs until it returns [`LoopAction::Stop`]
    /// or [`stop`](Self::stop) is called.
    pub fn start<F>(name: &str, mut body: F) -> Self
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let name = name.to_string();

        let thread_handle = {
            let stop_signal = Arc::clone(&stop_signal);
            let loop_name = name.clone();
            thread::Builder::new()
                .name(name.clone())
                .spawn(move || {
                    debug!(name = %loop_name, "frame loop running");
                    while !stop_signal.load(Ordering::SeqCst) {
                        if body() == LoopAction::Stop {
                            debug!(name = %loop_name, "frame loop stopped itself");
                            break;
                        }
                    }
                    info!(name = %loop_name, "frame loop exiting");
                })
                .unwrap_or_else(|e| panic!("failed to spawn frame loop {name}: {e}"))
        };

        Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name,
        }
    }

    /// Signal stop without waiting.
    pub fn request_stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Stop the loop and join the thread.
    pub fn stop(&mut self) {
        self.request_stop();
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                warn!(name = %self.name, "frame loop thread panicked");
            }
        }
    }
}

impl Drop for FrameLoopController {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[test]
    fn test_loop_stops_itself() {
        let ticks = Arc::new(AtomicU32::new(0));
        let mut controller = {
            let ticks = Arc::clone(&ticks);
            FrameLoopController::start("test-self-stop", move || {
                if ticks.fetch_add(1, Ordering::SeqCst) >= 4 {
                    LoopAction::Stop
                } else {
                    LoopAction::Continue
                }
            })
        };
        // Wait for the loop to finish on its own
        while ticks.load(Ordering::SeqCst) < 5 {
            thread::sleep(Duration::from_millis(1));
        }
        controller.stop();
        assert_eq!(ticks.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_external_stop() {
        let ticks = Arc::new(AtomicU32::new(0));
        let mut controller = {
            let ticks = Arc::clone(&ticks);
            FrameLoopController::start("test-external-stop", move || {
                ticks.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(5));
                LoopAction::Continue
            })
        };
        thread::sleep(Duration::from_millis(30));
        controller.stop();
        assert!(ticks.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn test_drop_joins_thread() {
        let ticks = Arc::new(AtomicU32::new(0));
        let controller = {
            let ticks = Arc::clone(&ticks);
            FrameLoopController::start("test-drop", move || {
                ticks.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(5));
                LoopAction::Continue
            })
        };
        thread::sleep(Duration::from_millis(20));
        drop(controller);
        let after_drop = ticks.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        // No further ticks once dropped
        assert_eq!(ticks.load(Ordering::SeqCst), after_drop);
    }
}
