// SPDX-License-Identifier: GPL-3.0-only

//! Session event worker
//!
//! All device callbacks funnel through one named thread so state mutations
//! happen one at a time, in arrival order. Backends report through an
//! [`EventSender`] stamped with the session epoch that created it; the
//! handler drops envelopes from earlier epochs.

use std::sync::mpsc;
use std::thread;

use tracing::{debug, error};

use super::types::CameraFrame;

/// Events a camera backend reports to the session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The device finished opening and is ready to configure
    DeviceOpened,
    /// The device went away (unplugged, claimed elsewhere)
    DeviceDisconnected,
    /// The device failed in a way that ends the session
    DeviceError(String),
    /// The repeating preview stream is live
    SessionConfigured,
    /// Preview configuration failed; the device itself is still usable
    SessionConfigureFailed(String),
    /// A still frame arrived for an in-flight capture
    StillCaptured(CameraFrame),
}

/// A [`SessionEvent`] stamped with the epoch of the session that produced it.
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub epoch: u64,
    pub event: SessionEvent,
}

enum WorkerMessage {
    Event(EventEnvelope),
    Shutdown,
}

/// Epoch-stamped handle a backend uses to report events.
///
/// Senders are cheap to clone and safe to keep on backend threads; once the
/// session moves to a new epoch their envelopes are ignored rather than
/// acted on.
#[derive(Clone)]
pub struct EventSender {
    epoch: u64,
    tx: mpsc::Sender<WorkerMessage>,
}

impl EventSender {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Report an event. Sending after the worker stopped is a no-op.
    pub fn send(&self, event: SessionEvent) {
        let envelope = EventEnvelope {
            epoch: self.epoch,
            event,
        };
        if self.tx.send(WorkerMessage::Event(envelope)).is_err() {
            debug!("session worker gone, dropping event");
        }
    }
}

/// Mints epoch-stamped senders for a running worker.
///
/// The event handler itself holds one of these so it can hand fresh senders
/// to the hardware while reacting to an event.
#[derive(Clone)]
pub struct EventPort {
    tx: mpsc::Sender<WorkerMessage>,
}

impl EventPort {
    pub fn sender(&self, epoch: u64) -> EventSender {
        EventSender {
            epoch,
            tx: self.tx.clone(),
        }
    }
}

/// Owns the event thread; dropping it stops and joins the thread.
pub struct CameraWorker {
    tx: mpsc::Sender<WorkerMessage>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl CameraWorker {
    /// Spawn the event thread. `handler` runs on that thread for every
    /// envelope in arrival order.
    pub fn spawn<F>(mut handler: F) -> Self
    where
        F: FnMut(EventEnvelope) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<WorkerMessage>();

        let thread_handle = thread::Builder::new()
            .name("camera-events".to_string())
            .spawn(move || {
                debug!("session worker started");
                while let Ok(message) = rx.recv() {
                    match message {
                        WorkerMessage::Event(envelope) => handler(envelope),
                        WorkerMessage::Shutdown => break,
                    }
                }
                debug!("session worker stopped");
            })
            // Spawn only fails when the process is out of threads
            .expect("failed to spawn session worker");

        Self {
            tx,
            thread_handle: Some(thread_handle),
        }
    }

    /// Mint a sender stamped with `epoch`.
    pub fn sender(&self, epoch: u64) -> EventSender {
        EventSender {
            epoch,
            tx: self.tx.clone(),
        }
    }

    /// A reusable sender factory, detached from the worker's lifetime.
    pub fn port(&self) -> EventPort {
        EventPort {
            tx: self.tx.clone(),
        }
    }

    fn stop(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            let _ = self.tx.send(WorkerMessage::Shutdown);
            if handle.join().is_err() {
                error!("session worker panicked");
            }
        }
    }
}

impl Drop for CameraWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
