// SPDX-License-Identifier: GPL-3.0-only

//! Camera session manager
//!
//! Owns the session state machine and serializes every lifecycle step:
//!
//! ```text
//! Closed → Opening → Open → ConfiguringSession → Previewing ⇄ Capturing
//!    ↑                                               │
//!    └────────────── Closing ←───────────────────────┘
//! ```
//!
//! `open` and `close` run on the caller's thread behind the lifecycle gate;
//! everything the hardware reports lands on the session worker thread, which
//! is the only place state advances afterwards. Events are stamped with the
//! session epoch, so callbacks from a session that was already torn down are
//! discarded instead of corrupting the next one.

use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::gate::LifecycleGate;
use super::negotiation::{self, NegotiatedConfig};
use super::types::{
    CameraDescriptor, CameraDirection, CameraError, CameraFrame, CameraResult,
    CaptureRequestContext, Dimension, DisplayRotation, LatestFrame, SessionState,
};
use super::worker::{CameraWorker, EventEnvelope, EventPort, SessionEvent};
use super::{CameraHardware, SessionConfig};
use crate::constants::timing;

/// Receives a finished still for persistence, returning the saved path.
///
/// Runs on the session worker thread with no locks held, so it may block on
/// encoding and IO.
pub type StillSink =
    Arc<dyn Fn(CameraFrame, CaptureRequestContext) -> Result<PathBuf, String> + Send + Sync>;

/// Out-of-band notifications for UI layers and tests.
#[derive(Debug, Clone)]
pub enum SessionNotice {
    StateChanged(SessionState),
    /// A non-fatal or fatal session error, already logged
    Error(String),
    CaptureSaved(PathBuf),
    CaptureFailed(String),
}

struct SessionInner {
    state: SessionState,
    epoch: u64,
    hardware: Box<dyn CameraHardware>,
    descriptor: Option<CameraDescriptor>,
    negotiated: Option<NegotiatedConfig>,
    pending_capture: Option<CaptureRequestContext>,
}

struct SessionShared {
    inner: Mutex<SessionInner>,
    state_changed: Condvar,
    notices: Mutex<Vec<mpsc::Sender<SessionNotice>>>,
    port: OnceLock<EventPort>,
    gate: LifecycleGate,
    frames: LatestFrame,
    still_sink: StillSink,
}

pub struct CameraSessionManager {
    shared: Arc<SessionShared>,
    worker: CameraWorker,
}

impl CameraSessionManager {
    pub fn new(hardware: Box<dyn CameraHardware>, still_sink: StillSink) -> Self {
        let shared = Arc::new(SessionShared {
            inner: Mutex::new(SessionInner {
                state: SessionState::Closed,
                epoch: 0,
                hardware,
                descriptor: None,
                negotiated: None,
                pending_capture: None,
            }),
            state_changed: Condvar::new(),
            notices: Mutex::new(Vec::new()),
            port: OnceLock::new(),
            gate: LifecycleGate::new(),
            frames: LatestFrame::new(),
            still_sink,
        });

        let worker = {
            let shared = Arc::clone(&shared);
            CameraWorker::spawn(move |envelope| handle_event(&shared, envelope))
        };
        let _ = shared.port.set(worker.port());

        Self { shared, worker }
    }

    /// Open a camera and start it towards `Previewing`.
    ///
    /// Selects a device by facing (`None` takes the first camera), negotiates
    /// sizes against the view, then asks the hardware to open. Returns once
    /// the open is underway; the gate is held until the device reports back,
    /// so a concurrent `close` waits instead of racing the half-open device.
    pub fn open(
        &self,
        direction: Option<CameraDirection>,
        view: Dimension,
        display: DisplayRotation,
    ) -> CameraResult<()> {
        if !self.shared.gate.acquire(timing::GATE_TIMEOUT) {
            return Err(CameraError::GateTimeout);
        }

        match self.begin_open(direction, view, display) {
            Ok(()) => Ok(()),
            Err(e) => {
                let mut inner = lock_inner(&self.shared);
                if inner.state == SessionState::Opening {
                    inner.descriptor = None;
                    inner.negotiated = None;
                    set_state(&self.shared, &mut inner, SessionState::Closed);
                }
                drop(inner);
                self.shared.gate.release();
                Err(e)
            }
        }
    }

    fn begin_open(
        &self,
        direction: Option<CameraDirection>,
        view: Dimension,
        display: DisplayRotation,
    ) -> CameraResult<()> {
        let mut inner = lock_inner(&self.shared);
        if inner.state != SessionState::Closed {
            return Err(CameraError::InvalidTransition {
                operation: "open",
                state: inner.state,
            });
        }

        let devices = inner.hardware.enumerate()?;
        let descriptor = select_device(&devices, direction)?;
        let negotiated = negotiation::negotiate(&descriptor.capabilities, view, display)?;
        info!(
            device = %descriptor.name,
            preview = %negotiated.preview,
            still = %negotiated.still,
            rotation = negotiated.upright_rotation,
            "opening camera"
        );

        inner.descriptor = Some(descriptor.clone());
        inner.negotiated = Some(negotiated);
        set_state(&self.shared, &mut inner, SessionState::Opening);

        let events = self.worker.sender(inner.epoch);
        inner.hardware.open(&descriptor, events)?;
        Ok(())
    }

    /// Request a still capture with the current committed filter.
    ///
    /// The capture context is snapshotted now; selection changes made while
    /// the still is in flight do not affect it.
    pub fn capture_photo(&self, target_filter_id: Option<i32>) -> CameraResult<()> {
        let mut inner = lock_inner(&self.shared);
        if inner.state != SessionState::Previewing {
            return Err(CameraError::InvalidTransition {
                operation: "capture a photo",
                state: inner.state,
            });
        }
        let negotiated = inner
            .negotiated
            .ok_or_else(|| CameraError::Device("no negotiated configuration".to_string()))?;

        inner.pending_capture = Some(CaptureRequestContext {
            target_filter_id,
            rotation_degrees: negotiated.upright_rotation,
        });
        set_state(&self.shared, &mut inner, SessionState::Capturing);

        let events = self.worker.sender(inner.epoch);
        match inner.hardware.capture_still(events) {
            Ok(()) => Ok(()),
            Err(e) => {
                inner.pending_capture = None;
                set_state(&self.shared, &mut inner, SessionState::Previewing);
                Err(e)
            }
        }
    }

    /// Close the session. Idempotent; closing a closed session is a no-op.
    pub fn close(&self) -> CameraResult<()> {
        if !self.shared.gate.acquire(timing::GATE_TIMEOUT) {
            return Err(CameraError::GateTimeout);
        }

        let mut inner = lock_inner(&self.shared);
        if inner.state == SessionState::Closed {
            drop(inner);
            self.shared.gate.release();
            return Ok(());
        }

        set_state(&self.shared, &mut inner, SessionState::Closing);
        teardown(&self.shared, &mut inner);
        drop(inner);
        self.shared.gate.release();
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        lock_inner(&self.shared).state
    }

    pub fn negotiated(&self) -> Option<NegotiatedConfig> {
        lock_inner(&self.shared).negotiated
    }

    pub fn descriptor(&self) -> Option<CameraDescriptor> {
        lock_inner(&self.shared).descriptor.clone()
    }

    /// The slot the active backend publishes preview frames into.
    pub fn frames(&self) -> LatestFrame {
        self.shared.frames.clone()
    }

    /// Block until the session reaches `target` or `timeout` passes.
    pub fn wait_for_state(&self, target: SessionState, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = lock_inner(&self.shared);
        while inner.state != target {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            inner = match self.shared.state_changed.wait_timeout(inner, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }

    /// Register for session notices. Receivers that go away are pruned on
    /// the next notice.
    pub fn subscribe(&self) -> mpsc::Receiver<SessionNotice> {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut subscribers) = self.shared.notices.lock() {
            subscribers.push(tx);
        }
        rx
    }
}

impl Drop for CameraSessionManager {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "session close on drop failed");
        }
    }
}

fn lock_inner(shared: &SessionShared) -> MutexGuard<'_, SessionInner> {
    match shared.inner.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn select_device(
    devices: &[CameraDescriptor],
    want: Option<CameraDirection>,
) -> CameraResult<CameraDescriptor> {
    match want {
        Some(direction) => devices
            .iter()
            // Unknown facing never satisfies a specific request
            .find(|d| d.facing == Some(direction))
            .cloned()
            .ok_or(CameraError::NoMatchingDevice(Some(direction))),
        None => devices
            .first()
            .cloned()
            .ok_or(CameraError::NoMatchingDevice(None)),
    }
}

fn set_state(shared: &SessionShared, inner: &mut SessionInner, next: SessionState) {
    if inner.state == next {
        return;
    }
    info!(from = %inner.state, to = %next, "session state changed");
    inner.state = next;
    shared.state_changed.notify_all();
    notify(shared, SessionNotice::StateChanged(next));
}

fn notify(shared: &SessionShared, notice: SessionNotice) {
    if let Ok(mut subscribers) = shared.notices.lock() {
        subscribers.retain(|tx| tx.send(notice.clone()).is_ok());
    }
}

/// Release resources and return to `Closed`, bumping the epoch so events
/// from the dying session are discarded.
fn teardown(shared: &SessionShared, inner: &mut SessionInner) {
    inner.hardware.close();
    inner.epoch += 1;
    inner.descriptor = None;
    inner.negotiated = None;
    inner.pending_capture = None;
    shared.frames.clear();
    set_state(shared, inner, SessionState::Closed);
}

/// Runs on the session worker thread for every hardware event.
fn handle_event(shared: &Arc<SessionShared>, envelope: EventEnvelope) {
    let mut inner = lock_inner(shared);
    if envelope.epoch != inner.epoch {
        debug!(
            event_epoch = envelope.epoch,
            current_epoch = inner.epoch,
            "dropping stale session event"
        );
        return;
    }

    match envelope.event {
        SessionEvent::DeviceOpened => {
            // The open is settled; a waiting close may proceed after us
            shared.gate.release();
            set_state(shared, &mut inner, SessionState::Open);

            let Some(negotiated) = inner.negotiated else {
                warn!("device opened without a negotiated configuration");
                return;
            };
            let Some(port) = shared.port.get() else {
                return;
            };
            let config = SessionConfig {
                preview: negotiated.preview,
                still: negotiated.still,
                frames: shared.frames.clone(),
            };
            let events = port.sender(inner.epoch);
            match inner.hardware.configure(config, events) {
                Ok(()) => set_state(shared, &mut inner, SessionState::ConfiguringSession),
                Err(e) => {
                    // Device stays open; the caller may close and retry
                    error!(error = %e, "failed to start session configuration");
                    notify(shared, SessionNotice::Error(e.to_string()));
                }
            }
        }
        SessionEvent::SessionConfigured => {
            if inner.state == SessionState::ConfiguringSession {
                set_state(shared, &mut inner, SessionState::Previewing);
            } else {
                debug!(state = %inner.state, "ignoring configured event in this state");
            }
        }
        SessionEvent::SessionConfigureFailed(msg) => {
            error!(error = %msg, "session configuration failed");
            set_state(shared, &mut inner, SessionState::Open);
            notify(
                shared,
                SessionNotice::Error(CameraError::ConfigureFailed(msg).to_string()),
            );
        }
        SessionEvent::DeviceError(msg) => {
            error!(error = %msg, "camera device error");
            shared.gate.release();
            teardown(shared, &mut inner);
            notify(shared, SessionNotice::Error(msg));
        }
        SessionEvent::DeviceDisconnected => {
            warn!("camera disconnected");
            shared.gate.release();
            teardown(shared, &mut inner);
            notify(
                shared,
                SessionNotice::Error(CameraError::Disconnected.to_string()),
            );
        }
        SessionEvent::StillCaptured(frame) => {
            let context = inner.pending_capture.take();
            if inner.state == SessionState::Capturing {
                set_state(shared, &mut inner, SessionState::Previewing);
            }
            // Persisting can block; never do it under the state lock
            drop(inner);
            match context {
                Some(context) => {
                    debug!(
                        filter = ?context.target_filter_id,
                        rotation = context.rotation_degrees,
                        "persisting captured still"
                    );
                    match (shared.still_sink)(frame, context) {
                        Ok(path) => {
                            info!(path = %path.display(), "capture saved");
                            notify(shared, SessionNotice::CaptureSaved(path));
                        }
                        Err(msg) => {
                            error!(error = %msg, "capture processing failed");
                            notify(shared, SessionNotice::CaptureFailed(msg));
                        }
                    }
                }
                None => warn!("still frame arrived without a pending capture"),
            }
        }
    }
}
