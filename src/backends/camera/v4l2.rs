// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 camera backend
//!
//! Drives real webcams through the Video4Linux2 API. The preview runs as a
//! blocking mmap stream on its own thread; stills are snapshots of the
//! stream, taken by the same thread so no second device handle is needed.
//!
//! YUYV is preferred because it converts without a decode step; MJPG is the
//! fallback for cameras that only offer compressed formats at useful sizes.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, warn};
use v4l::buffer::Type;
use v4l::control::{Control, Value};
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::{Format, FourCC};

use super::format_converters::yuyv_to_rgba;
use super::types::{
    CameraDescriptor, CameraDirection, CameraError, CameraFrame, CameraResult,
    DeviceCapabilities, Dimension,
};
use super::worker::{EventSender, SessionEvent};
use super::{CameraHardware, SessionConfig};

const BUFFER_COUNT: u32 = 4;

/// V4L2_CID_FOCUS_AUTO from the camera control class.
const V4L2_CID_FOCUS_AUTO: u32 = 0x009a_0900 + 12;

pub struct V4l2Camera {
    device_path: Option<PathBuf>,
    stream_thread: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    pending_still: Arc<Mutex<Option<EventSender>>>,
}

impl V4l2Camera {
    pub fn new() -> Self {
        Self {
            device_path: None,
            stream_thread: None,
            stop_signal: Arc::new(AtomicBool::new(false)),
            pending_still: Arc::new(Mutex::new(None)),
        }
    }

    fn stop_stream(&mut self) {
        self.stop_signal.store(true, Ordering::SeqCst);
        if let Some(handle) = self.stream_thread.take() {
            if handle.join().is_err() {
                warn!("v4l2 preview thread panicked");
            }
        }
        self.stop_signal.store(false, Ordering::SeqCst);
        if let Ok(mut pending) = self.pending_still.lock() {
            *pending = None;
        }
    }
}

impl Default for V4l2Camera {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraHardware for V4l2Camera {
    fn enumerate(&mut self) -> CameraResult<Vec<CameraDescriptor>> {
        let mut nodes: Vec<PathBuf> = Vec::new();
        let entries = std::fs::read_dir("/dev")
            .map_err(|e| CameraError::Device(format!("cannot scan /dev: {e}")))?;
        for entry in entries.flatten() {
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with("video") {
                    nodes.push(entry.path());
                }
            }
        }
        nodes.sort();

        let mut descriptors = Vec::new();
        for path in nodes {
            let dev = match Device::with_path(&path) {
                Ok(dev) => dev,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "skipping unopenable node");
                    continue;
                }
            };
            let caps = match dev.query_caps() {
                Ok(caps) => caps,
                Err(_) => continue,
            };
            if !caps
                .capabilities
                .contains(v4l::capability::Flags::VIDEO_CAPTURE)
            {
                continue;
            }
            let Some((_, sizes)) = select_format(&dev) else {
                // Metadata nodes advertise capture but no usable format
                continue;
            };

            descriptors.push(CameraDescriptor {
                id: path.to_string_lossy().to_string(),
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                facing: guess_facing(&caps.card),
                capabilities: DeviceCapabilities {
                    preview_sizes: sizes.clone(),
                    // Webcams capture stills from the same stream
                    still_sizes: sizes,
                    sensor_orientation: 0,
                },
            });
        }

        info!(count = descriptors.len(), "enumerated v4l2 capture devices");
        Ok(descriptors)
    }

    fn open(&mut self, descriptor: &CameraDescriptor, events: EventSender) -> CameraResult<()> {
        let path = PathBuf::from(&descriptor.id);
        // Probe now so a missing or busy node fails the open synchronously
        Device::with_path(&path)
            .map_err(|e| CameraError::Device(format!("open {}: {e}", path.display())))?;
        self.device_path = Some(path);
        info!(id = %descriptor.id, name = %descriptor.name, "v4l2 device opened");
        events.send(SessionEvent::DeviceOpened);
        Ok(())
    }

    fn configure(&mut self, config: SessionConfig, events: EventSender) -> CameraResult<()> {
        let path = self
            .device_path
            .clone()
            .ok_or_else(|| CameraError::Device("device not open".to_string()))?;

        self.stop_stream();
        let stop = Arc::clone(&self.stop_signal);
        let pending_still = Arc::clone(&self.pending_still);

        let handle = thread::Builder::new()
            .name("v4l2-preview".to_string())
            .spawn(move || {
                match run_preview_stream(&path, &config, &pending_still, &stop, &events) {
                    Ok(()) => info!("v4l2 preview stream ended"),
                    Err(e) => {
                        error!(error = %e, "v4l2 preview stream failed to start");
                        events.send(SessionEvent::SessionConfigureFailed(e));
                    }
                }
            })
            .map_err(|e| CameraError::Device(format!("spawn preview thread: {e}")))?;

        self.stream_thread = Some(handle);
        Ok(())
    }

    fn capture_still(&mut self, events: EventSender) -> CameraResult<()> {
        if self.stream_thread.is_none() {
            return Err(CameraError::Device("preview not running".to_string()));
        }
        if let Ok(mut pending) = self.pending_still.lock() {
            *pending = Some(events);
        }
        Ok(())
    }

    fn close(&mut self) {
        self.stop_stream();
        if self.device_path.take().is_some() {
            info!("v4l2 device closed");
        }
    }
}

impl Drop for V4l2Camera {
    fn drop(&mut self) {
        self.close();
    }
}

/// Open the device, set the format and pump frames until stopped.
///
/// Setup failures are returned so the caller reports them as a configure
/// failure; stream errors after that are reported here as device errors.
fn run_preview_stream(
    path: &PathBuf,
    config: &SessionConfig,
    pending_still: &Arc<Mutex<Option<EventSender>>>,
    stop: &Arc<AtomicBool>,
    events: &EventSender,
) -> Result<(), String> {
    let dev = Device::with_path(path).map_err(|e| format!("open {}: {e}", path.display()))?;

    let (fourcc, _) = select_format(&dev).ok_or("no YUYV or MJPG format available")?;
    let requested = Format::new(config.preview.width, config.preview.height, fourcc);
    let actual = dev
        .set_format(&requested)
        .map_err(|e| format!("set format: {e}"))?;
    if actual.width != config.preview.width || actual.height != config.preview.height {
        warn!(
            requested = %config.preview,
            actual = %Dimension::new(actual.width, actual.height),
            "driver adjusted the preview size"
        );
    }
    debug!(
        fourcc = ?actual.fourcc,
        width = actual.width,
        height = actual.height,
        "v4l2 stream format set"
    );

    // Best effort, fixed-focus webcams reject this control
    let autofocus = Control {
        id: V4L2_CID_FOCUS_AUTO,
        value: Value::Boolean(true),
    };
    if let Err(e) = dev.set_control(autofocus) {
        debug!(error = %e, "continuous autofocus not enabled");
    }

    let mut stream = Stream::with_buffers(&dev, Type::VideoCapture, BUFFER_COUNT)
        .map_err(|e| format!("create stream: {e}"))?;

    let mut announced = false;
    while !stop.load(Ordering::SeqCst) {
        let (buf, _meta) = match stream.next() {
            Ok(pair) => pair,
            Err(e) => {
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                error!(error = %e, "v4l2 stream read failed");
                events.send(SessionEvent::DeviceError(format!("stream read: {e}")));
                return Ok(());
            }
        };

        let frame = match decode_frame(buf, &actual) {
            Some(frame) => frame,
            None => continue,
        };

        let still_request = pending_still
            .lock()
            .ok()
            .and_then(|mut pending| pending.take());
        if let Some(sender) = still_request {
            sender.send(SessionEvent::StillCaptured(frame.clone()));
        }

        config.frames.publish(frame);
        if !announced {
            announced = true;
            events.send(SessionEvent::SessionConfigured);
        }
    }

    Ok(())
}

fn decode_frame(buf: &[u8], format: &Format) -> Option<CameraFrame> {
    if format.fourcc == FourCC::new(b"YUYV") {
        let rgba = yuyv_to_rgba(buf, format.width, format.height);
        Some(CameraFrame::from_rgba(rgba, format.width, format.height))
    } else if format.fourcc == FourCC::new(b"MJPG") {
        match image::load_from_memory_with_format(buf, image::ImageFormat::Jpeg) {
            Ok(decoded) => {
                let rgba = decoded.to_rgba8();
                let (width, height) = rgba.dimensions();
                Some(CameraFrame::from_rgba(rgba.into_raw(), width, height))
            }
            Err(e) => {
                // Corrupt MJPG frames happen on some cameras, skip them
                debug!(error = %e, "dropping undecodable MJPG frame");
                None
            }
        }
    } else {
        warn!(fourcc = ?format.fourcc, "unsupported stream format");
        None
    }
}

/// Pick the stream format and collect its discrete sizes.
///
/// Prefers YUYV over MJPG. Stepwise size ranges are reduced to the common
/// resolutions that fall inside them.
fn select_format(dev: &Device) -> Option<(FourCC, Vec<Dimension>)> {
    let fourcc_yuyv = FourCC::new(b"YUYV");
    let fourcc_mjpg = FourCC::new(b"MJPG");

    let formats: Vec<_> = dev.enum_formats().into_iter().flatten().collect();
    let fourcc = if formats.iter().any(|f| f.fourcc == fourcc_yuyv) {
        fourcc_yuyv
    } else if formats.iter().any(|f| f.fourcc == fourcc_mjpg) {
        fourcc_mjpg
    } else {
        return None;
    };

    let mut sizes = Vec::new();
    if let Ok(frame_sizes) = dev.enum_framesizes(fourcc) {
        for size in frame_sizes {
            match size.size {
                v4l::framesize::FrameSizeEnum::Discrete(discrete) => {
                    sizes.push(Dimension::new(discrete.width, discrete.height));
                }
                v4l::framesize::FrameSizeEnum::Stepwise(step) => {
                    for (w, h) in [(640, 480), (1280, 720), (1920, 1080)] {
                        if w >= step.min_width
                            && w <= step.max_width
                            && h >= step.min_height
                            && h <= step.max_height
                        {
                            sizes.push(Dimension::new(w, h));
                        }
                    }
                }
            }
        }
    }
    sizes.sort_by_key(|d| d.area());
    sizes.dedup();

    if sizes.is_empty() { None } else { Some((fourcc, sizes)) }
}

/// Heuristic facing from the device name. Most UVC webcams say neither, and
/// those stay unknown rather than guessing wrong.
fn guess_facing(card: &str) -> Option<CameraDirection> {
    let lower = card.to_lowercase();
    if lower.contains("front") {
        Some(CameraDirection::Front)
    } else if lower.contains("back") || lower.contains("rear") {
        Some(CameraDirection::Back)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_facing() {
        assert_eq!(
            guess_facing("Front Camera: Integrated"),
            Some(CameraDirection::Front)
        );
        assert_eq!(guess_facing("OV5693 rear"), Some(CameraDirection::Back));
        assert_eq!(guess_facing("HD Pro Webcam C920"), None);
    }

    #[test]
    fn test_enumerate_without_devices_is_not_an_error() {
        // On machines without cameras this returns an empty list
        let mut camera = V4l2Camera::new();
        if let Ok(descriptors) = camera.enumerate() {
            for descriptor in &descriptors {
                assert!(descriptor.id.starts_with("/dev/video"));
                assert!(!descriptor.capabilities.preview_sizes.is_empty());
            }
        }
    }

    #[test]
    fn test_capture_without_stream_is_rejected() {
        let worker = crate::backends::camera::worker::CameraWorker::spawn(|_| {});
        let mut camera = V4l2Camera::new();
        assert!(camera.capture_still(worker.sender(1)).is_err());
    }
}
