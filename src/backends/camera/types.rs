// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for the camera engine
//!
//! Everything that crosses a module boundary lives here: sizes, rotations,
//! device descriptions, frames, the latest-frame handoff slot, and the
//! camera error type.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// A pixel size (width x height).
///
/// Comparison helpers use exact 64-bit products so that 4K-class sizes and
/// ratio checks never overflow or truncate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimension {
    pub width: u32,
    pub height: u32,
}

impl Dimension {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Pixel area as u64 (never overflows for 32-bit edges).
    pub fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Exact aspect-ratio equality via cross multiplication.
    pub fn ratio_matches(self, other: Dimension) -> bool {
        self.width as u64 * other.height as u64 == other.width as u64 * self.height as u64
    }

    /// The same size with width and height exchanged.
    pub fn swapped(self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }

    /// True when both edges fit inside `bound`.
    pub fn fits_within(self, bound: Dimension) -> bool {
        self.width <= bound.width && self.height <= bound.height
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Which way the requested lens faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CameraDirection {
    /// User-facing lens
    Front,
    /// World-facing lens
    #[default]
    Back,
}

impl std::fmt::Display for CameraDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraDirection::Front => write!(f, "front"),
            CameraDirection::Back => write!(f, "back"),
        }
    }
}

/// Rotation of the host surface relative to its natural orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayRotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl DisplayRotation {
    /// Create from an integer degree value (normalised to 0-360).
    ///
    /// Values that are not a multiple of 90 fall back to `Deg0`.
    pub fn from_degrees_int(degrees: i32) -> Self {
        match degrees.rem_euclid(360) {
            90 => DisplayRotation::Deg90,
            180 => DisplayRotation::Deg180,
            270 => DisplayRotation::Deg270,
            _ => DisplayRotation::Deg0,
        }
    }

    /// Rotation in degrees clockwise.
    pub fn degrees(self) -> u32 {
        match self {
            DisplayRotation::Deg0 => 0,
            DisplayRotation::Deg90 => 90,
            DisplayRotation::Deg180 => 180,
            DisplayRotation::Deg270 => 270,
        }
    }
}

impl std::fmt::Display for DisplayRotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Lifecycle states of a camera session.
///
/// The session manager is the only writer; everything else observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No device held
    #[default]
    Closed,
    /// Device open requested, waiting for the hardware callback
    Opening,
    /// Device held, no stream yet
    Open,
    /// Stream configuration requested
    ConfiguringSession,
    /// Repeating preview frames are flowing
    Previewing,
    /// One still capture in flight
    Capturing,
    /// Teardown in progress
    Closing,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Closed => "closed",
            SessionState::Opening => "opening",
            SessionState::Open => "open",
            SessionState::ConfiguringSession => "configuring-session",
            SessionState::Previewing => "previewing",
            SessionState::Capturing => "capturing",
            SessionState::Closing => "closing",
        };
        write!(f, "{}", name)
    }
}

/// Size tables and mounting data reported by a device.
#[derive(Debug, Clone, Default)]
pub struct DeviceCapabilities {
    /// Sizes usable for the repeating preview stream
    pub preview_sizes: Vec<Dimension>,
    /// Sizes usable for still capture
    pub still_sizes: Vec<Dimension>,
    /// Clockwise angle the sensor is mounted at, in degrees
    pub sensor_orientation: u32,
}

/// One enumerated camera device.
#[derive(Debug, Clone)]
pub struct CameraDescriptor {
    /// Stable identifier (device path for V4L2 backends)
    pub id: String,
    /// Human-readable name (V4L2 card string)
    pub name: String,
    /// Kernel driver, when known
    pub driver: String,
    /// Lens facing; `None` when the device does not report one
    pub facing: Option<CameraDirection>,
    pub capabilities: DeviceCapabilities,
}

/// One RGBA8 frame.
///
/// Backends convert whatever the hardware produces into tightly packed RGBA
/// before publishing, so consumers never see raw pixel formats.
#[derive(Clone)]
pub struct CameraFrame {
    pub data: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
    /// Bytes per row (width * 4 for tightly packed frames)
    pub stride: u32,
    pub captured_at: Instant,
}

impl CameraFrame {
    /// Build a frame from an owned RGBA buffer, computing the stride.
    pub fn from_rgba(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data: Arc::from(data.into_boxed_slice()),
            width,
            height,
            stride: width * 4,
            captured_at: Instant::now(),
        }
    }

    pub fn dimension(&self) -> Dimension {
        Dimension::new(self.width, self.height)
    }
}

impl std::fmt::Debug for CameraFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CameraFrame({}x{}, {} bytes)",
            self.width,
            self.height,
            self.data.len()
        )
    }
}

/// Latest-frame-wins handoff between a capture thread and the renderer.
///
/// At most one frame is pending; publishing replaces an untaken older frame.
/// The sequence counter lets damage-driven hosts detect new frames without
/// taking the lock.
#[derive(Clone, Default)]
pub struct LatestFrame {
    slot: Arc<Mutex<Option<CameraFrame>>>,
    sequence: Arc<AtomicU64>,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a frame, replacing any pending one.
    pub fn publish(&self, frame: CameraFrame) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(frame);
            self.sequence.fetch_add(1, Ordering::Release);
        }
    }

    /// Take the pending frame, leaving the slot empty.
    pub fn take(&self) -> Option<CameraFrame> {
        self.slot.lock().ok().and_then(|mut slot| slot.take())
    }

    /// Drop any pending frame.
    pub fn clear(&self) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = None;
        }
    }

    /// Number of frames published so far.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }
}

/// Everything the sink needs to know about one capture request.
///
/// Snapshotted when the capture is requested so later selection changes do
/// not affect an in-flight still. The filter provider version is not part
/// of this; the sink holds the provider itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRequestContext {
    /// Filter to apply, `None` for a plain capture
    pub target_filter_id: Option<i32>,
    /// Clockwise rotation that makes the image upright
    pub rotation_degrees: u32,
}

/// Camera lifecycle and backend errors.
#[derive(Debug, Clone)]
pub enum CameraError {
    /// The lifecycle gate could not be acquired within its timeout
    GateTimeout,
    /// No enumerated device matches the requested facing, `None` when any
    /// camera would have done
    NoMatchingDevice(Option<CameraDirection>),
    /// The operation is not legal in the current state
    InvalidTransition {
        operation: &'static str,
        state: SessionState,
    },
    /// A device reported an empty size table
    NoResolutions,
    /// Hardware/backend failure
    Device(String),
    /// The device went away
    Disconnected,
    /// Stream configuration was rejected
    ConfigureFailed(String),
}

impl std::fmt::Display for CameraError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraError::GateTimeout => {
                write!(f, "timed out acquiring the camera lifecycle gate")
            }
            CameraError::NoMatchingDevice(Some(direction)) => {
                write!(f, "no {} camera available", direction)
            }
            CameraError::NoMatchingDevice(None) => write!(f, "no camera available"),
            CameraError::InvalidTransition { operation, state } => {
                write!(f, "cannot {} while the session is {}", operation, state)
            }
            CameraError::NoResolutions => write!(f, "device reported no usable resolutions"),
            CameraError::Device(msg) => write!(f, "camera device error: {}", msg),
            CameraError::Disconnected => write!(f, "camera disconnected"),
            CameraError::ConfigureFailed(msg) => {
                write!(f, "session configuration failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for CameraError {}

/// Result alias for camera operations.
pub type CameraResult<T> = Result<T, CameraError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_area_uses_u64() {
        let d = Dimension::new(u32::MAX, u32::MAX);
        assert_eq!(d.area(), u32::MAX as u64 * u32::MAX as u64);
    }

    #[test]
    fn test_ratio_matches_exactly() {
        let a = Dimension::new(1920, 1080);
        assert!(a.ratio_matches(Dimension::new(1280, 720)));
        assert!(a.ratio_matches(Dimension::new(640, 360)));
        // 4:3 is not 16:9
        assert!(!a.ratio_matches(Dimension::new(640, 480)));
        // 1366x768 is close to 16:9 but not exactly equal
        assert!(!a.ratio_matches(Dimension::new(1366, 768)));
    }

    #[test]
    fn test_dimension_swap_and_fit() {
        let d = Dimension::new(1280, 720);
        assert_eq!(d.swapped(), Dimension::new(720, 1280));
        assert!(d.fits_within(Dimension::new(1920, 1080)));
        assert!(!d.swapped().fits_within(Dimension::new(1920, 1080)));
    }

    #[test]
    fn test_display_rotation_from_degrees() {
        assert_eq!(DisplayRotation::from_degrees_int(0), DisplayRotation::Deg0);
        assert_eq!(
            DisplayRotation::from_degrees_int(90),
            DisplayRotation::Deg90
        );
        assert_eq!(
            DisplayRotation::from_degrees_int(-90),
            DisplayRotation::Deg270
        );
        assert_eq!(
            DisplayRotation::from_degrees_int(450),
            DisplayRotation::Deg90
        );
    }

    #[test]
    fn test_latest_frame_wins() {
        let slot = LatestFrame::new();
        assert!(slot.take().is_none());

        slot.publish(CameraFrame::from_rgba(vec![0; 4], 1, 1));
        slot.publish(CameraFrame::from_rgba(vec![255; 16], 2, 2));
        assert_eq!(slot.sequence(), 2);

        let frame = slot.take().expect("frame pending");
        assert_eq!(frame.width, 2);
        assert!(slot.take().is_none(), "slot must be empty after take");
    }

    #[test]
    fn test_session_state_display() {
        assert_eq!(SessionState::ConfiguringSession.to_string(), "configuring-session");
        assert_eq!(SessionState::Previewing.to_string(), "previewing");
    }
}
