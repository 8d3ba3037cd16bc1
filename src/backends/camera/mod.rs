// SPDX-License-Identifier: GPL-3.0-only

//! Camera backend abstraction
//!
//! The session manager drives concrete camera hardware through one trait so
//! V4L2 devices and the synthetic test camera are interchangeable.
//!
//! ```text
//! ┌──────────────────────┐
//! │ CameraSessionManager │  ← state machine, lifecycle gate, event worker
//! └──────────┬───────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐
//! │ CameraHardware trait │  ← common interface
//! └──────────┬───────────┘
//!            │
//!      ┌─────┴─────┐
//!      ▼           ▼
//!  ┌───────┐  ┌──────────┐
//!  │ V4L2  │  │Synthetic │
//!  └───────┘  └──────────┘
//! ```
//!
//! Hardware calls are expected to return quickly; anything slow (opening the
//! device node, starting the stream) happens on a backend thread that
//! reports progress through the [`EventSender`] it was given.

pub mod format_converters;
pub mod frame_loop;
pub mod gate;
pub mod negotiation;
pub mod session;
pub mod synthetic;
pub mod types;
pub mod v4l2;
pub mod worker;

pub use negotiation::NegotiatedConfig;
pub use session::{CameraSessionManager, SessionNotice};
pub use types::*;
pub use worker::{EventSender, SessionEvent};

/// Stream configuration handed to a backend after negotiation.
#[derive(Clone)]
pub struct SessionConfig {
    /// Size of the repeating preview stream
    pub preview: types::Dimension,
    /// Size the backend should deliver still captures at, when it can
    pub still: types::Dimension,
    /// Shared slot the backend publishes preview frames into
    pub frames: types::LatestFrame,
}

/// Camera hardware driven by the session manager
///
/// Implementations must be cheap to call; device work that can block runs on
/// the backend's own thread and completes through [`SessionEvent`]s.
pub trait CameraHardware: Send {
    // ===== Enumeration =====

    /// List the cameras this backend can open right now.
    fn enumerate(&mut self) -> types::CameraResult<Vec<CameraDescriptor>>;

    // ===== Lifecycle =====

    /// Begin opening `descriptor`.
    ///
    /// Completion is reported through `events`: `DeviceOpened` on success,
    /// `DeviceError` or `DeviceDisconnected` on failure. An `Err` return
    /// means the attempt never started and no event will follow.
    fn open(
        &mut self,
        descriptor: &CameraDescriptor,
        events: EventSender,
    ) -> types::CameraResult<()>;

    /// Start the repeating preview stream into `config.frames`.
    ///
    /// Reports `SessionConfigured` once frames are flowing, or
    /// `SessionConfigureFailed` if the stream cannot be built.
    fn configure(&mut self, config: SessionConfig, events: EventSender)
    -> types::CameraResult<()>;

    // ===== Capture =====

    /// Grab one still frame, reported as `StillCaptured`.
    ///
    /// The preview stream keeps running while the still is taken.
    fn capture_still(&mut self, events: EventSender) -> types::CameraResult<()>;

    // ===== Teardown =====

    /// Stop streaming and release the device. Must be idempotent.
    fn close(&mut self);
}

/// Concrete hardware for the session manager.
pub fn default_hardware(synthetic: bool) -> Box<dyn CameraHardware> {
    if synthetic {
        Box::new(synthetic::SyntheticCamera::new(
            synthetic::SyntheticProfile::default(),
        ))
    } else {
        Box::new(v4l2::V4l2Camera::new())
    }
}
