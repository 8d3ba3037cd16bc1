// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic camera backend
//!
//! An in-process camera that renders animated test frames. It exists for
//! development on machines without a webcam and for exercising the session
//! state machine in tests, where the [`SyntheticProfile`] failure switches
//! drive the error paths deterministically.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use super::frame_loop::{FrameLoopController, LoopAction};
use super::types::{
    CameraDescriptor, CameraDirection, CameraError, CameraFrame, CameraResult,
    DeviceCapabilities, Dimension,
};
use super::worker::{EventSender, SessionEvent};
use super::{CameraHardware, SessionConfig};

/// Behaviour of a synthetic device.
#[derive(Debug, Clone)]
pub struct SyntheticProfile {
    pub facing: Option<CameraDirection>,
    pub sensor_orientation: u32,
    pub preview_sizes: Vec<Dimension>,
    pub still_sizes: Vec<Dimension>,
    pub fps: u32,
    /// Report `DeviceError` instead of opening
    pub fail_open: bool,
    /// Report `SessionConfigureFailed` instead of streaming
    pub fail_configure: bool,
    /// Report `DeviceDisconnected` after this many preview frames
    pub disconnect_after_frames: Option<u64>,
}

impl Default for SyntheticProfile {
    fn default() -> Self {
        Self {
            facing: Some(CameraDirection::Back),
            sensor_orientation: 90,
            preview_sizes: vec![
                Dimension::new(640, 360),
                Dimension::new(1280, 720),
                Dimension::new(1920, 1080),
            ],
            still_sizes: vec![Dimension::new(1920, 1080), Dimension::new(2560, 1440)],
            fps: 30,
            fail_open: false,
            fail_configure: false,
            disconnect_after_frames: None,
        }
    }
}

pub struct SyntheticCamera {
    profile: SyntheticProfile,
    opened: bool,
    preview_loop: Option<FrameLoopController>,
    /// Still request pending for the loop thread to fulfil
    pending_still: Arc<Mutex<Option<EventSender>>>,
}

impl SyntheticCamera {
    pub fn new(profile: SyntheticProfile) -> Self {
        Self {
            profile,
            opened: false,
            preview_loop: None,
            pending_still: Arc::new(Mutex::new(None)),
        }
    }
}

impl CameraHardware for SyntheticCamera {
    fn enumerate(&mut self) -> CameraResult<Vec<CameraDescriptor>> {
        Ok(vec![CameraDescriptor {
            id: "synthetic-0".to_string(),
            name: "Synthetic Camera".to_string(),
            driver: "synthetic".to_string(),
            facing: self.profile.facing,
            capabilities: DeviceCapabilities {
                preview_sizes: self.profile.preview_sizes.clone(),
                still_sizes: self.profile.still_sizes.clone(),
                sensor_orientation: self.profile.sensor_orientation,
            },
        }])
    }

    fn open(&mut self, descriptor: &CameraDescriptor, events: EventSender) -> CameraResult<()> {
        if descriptor.driver != "synthetic" {
            return Err(CameraError::Device(format!(
                "not a synthetic device: {}",
                descriptor.id
            )));
        }
        if self.profile.fail_open {
            debug!("synthetic camera configured to fail open");
            events.send(SessionEvent::DeviceError("injected open failure".to_string()));
            return Ok(());
        }
        self.opened = true;
        info!(id = %descriptor.id, "synthetic camera opened");
        events.send(SessionEvent::DeviceOpened);
        Ok(())
    }

    fn configure(&mut self, config: SessionConfig, events: EventSender) -> CameraResult<()> {
        if !self.opened {
            return Err(CameraError::Device("device not open".to_string()));
        }
        if self.profile.fail_configure {
            debug!("synthetic camera configured to fail configure");
            events.send(SessionEvent::SessionConfigureFailed(
                "injected configure failure".to_string(),
            ));
            return Ok(());
        }

        let preview = config.preview;
        let frames = config.frames;
        let pending_still = Arc::clone(&self.pending_still);
        let frame_interval = Duration::from_secs_f64(1.0 / self.profile.fps.max(1) as f64);
        let disconnect_after = self.profile.disconnect_after_frames;
        let still_size = config.still;

        let mut tick: u64 = 0;
        let announced = AtomicBool::new(false);

        self.preview_loop = Some(FrameLoopController::start("synthetic-preview", move || {
            if let Some(limit) = disconnect_after {
                if tick >= limit {
                    events.send(SessionEvent::DeviceDisconnected);
                    return LoopAction::Stop;
                }
            }

            frames.publish(test_frame(preview, tick));
            if !announced.swap(true, Ordering::Relaxed) {
                events.send(SessionEvent::SessionConfigured);
            }

            let still_request = pending_still
                .lock()
                .ok()
                .and_then(|mut pending| pending.take());
            if let Some(sender) = still_request {
                sender.send(SessionEvent::StillCaptured(test_frame(still_size, tick)));
            }

            tick += 1;
            thread::sleep(frame_interval);
            LoopAction::Continue
        }));
        Ok(())
    }

    fn capture_still(&mut self, events: EventSender) -> CameraResult<()> {
        if self.preview_loop.is_none() {
            return Err(CameraError::Device("preview not running".to_string()));
        }
        if let Ok(mut pending) = self.pending_still.lock() {
            *pending = Some(events);
        }
        Ok(())
    }

    fn close(&mut self) {
        if let Some(mut preview) = self.preview_loop.take() {
            preview.stop();
        }
        if let Ok(mut pending) = self.pending_still.lock() {
            *pending = None;
        }
        if self.opened {
            info!("synthetic camera closed");
        }
        self.opened = false;
    }
}

impl Drop for SyntheticCamera {
    fn drop(&mut self) {
        self.close();
    }
}

/// Animated gradient with a sweeping highlight bar, bright enough that a
/// stuck preview is obvious at a glance.
fn test_frame(size: Dimension, tick: u64) -> CameraFrame {
    let width = size.width.max(1);
    let height = size.height.max(1);
    let mut data = vec![0u8; (width * height * 4) as usize];
    let bar = ((tick * 4) % width as u64) as u32;

    for y in 0..height {
        let g = ((y * 255) / height.max(1)) as u8;
        for x in 0..width {
            let idx = ((y * width + x) * 4) as usize;
            let r = ((x * 255) / width) as u8;
            let b = ((tick * 3) % 256) as u8;
            let highlight = x.abs_diff(bar) < 8;
            data[idx] = if highlight { 255 } else { r };
            data[idx + 1] = if highlight { 255 } else { g };
            data[idx + 2] = if highlight { 255 } else { b };
            data[idx + 3] = 255;
        }
    }

    CameraFrame::from_rgba(data, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::LatestFrame;
    use crate::backends::camera::worker::CameraWorker;
    use std::sync::mpsc;

    fn collect_events() -> (CameraWorker, mpsc::Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel();
        let worker = CameraWorker::spawn(move |envelope| {
            let _ = tx.send(envelope.event);
        });
        (worker, rx)
    }

    #[test]
    fn test_open_reports_device_opened() {
        let (worker, rx) = collect_events();
        let mut camera = SyntheticCamera::new(SyntheticProfile::default());
        let descriptor = camera.enumerate().unwrap().remove(0);
        camera.open(&descriptor, worker.sender(1)).unwrap();

        let event = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(matches!(event, SessionEvent::DeviceOpened));
    }

    #[test]
    fn test_injected_open_failure() {
        let (worker, rx) = collect_events();
        let mut camera = SyntheticCamera::new(SyntheticProfile {
            fail_open: true,
            ..Default::default()
        });
        let descriptor = camera.enumerate().unwrap().remove(0);
        camera.open(&descriptor, worker.sender(1)).unwrap();

        let event = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(matches!(event, SessionEvent::DeviceError(_)));
    }

    #[test]
    fn test_preview_publishes_frames() {
        let (worker, rx) = collect_events();
        let mut camera = SyntheticCamera::new(SyntheticProfile::default());
        let descriptor = camera.enumerate().unwrap().remove(0);
        camera.open(&descriptor, worker.sender(1)).unwrap();
        rx.recv_timeout(Duration::from_secs(1)).unwrap();

        let frames = LatestFrame::new();
        camera
            .configure(
                SessionConfig {
                    preview: Dimension::new(64, 36),
                    still: Dimension::new(128, 72),
                    frames: frames.clone(),
                },
                worker.sender(1),
            )
            .unwrap();

        let event = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(matches!(event, SessionEvent::SessionConfigured));

        // Wait for at least one frame to land in the slot
        let deadline = std::time::Instant::now() + Duration::from_secs(1);
        while frames.sequence() == 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        let frame = frames.take().unwrap();
        assert_eq!(frame.dimension(), Dimension::new(64, 36));
        camera.close();
    }

    #[test]
    fn test_still_uses_still_size() {
        let (worker, rx) = collect_events();
        let mut camera = SyntheticCamera::new(SyntheticProfile::default());
        let descriptor = camera.enumerate().unwrap().remove(0);
        camera.open(&descriptor, worker.sender(1)).unwrap();
        rx.recv_timeout(Duration::from_secs(1)).unwrap();

        camera
            .configure(
                SessionConfig {
                    preview: Dimension::new(64, 36),
                    still: Dimension::new(192, 108),
                    frames: LatestFrame::new(),
                },
                worker.sender(1),
            )
            .unwrap();
        rx.recv_timeout(Duration::from_secs(1)).unwrap();

        camera.capture_still(worker.sender(1)).unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        loop {
            match rx.recv_timeout(
                deadline.saturating_duration_since(std::time::Instant::now()),
            ) {
                Ok(SessionEvent::StillCaptured(frame)) => {
                    assert_eq!(frame.dimension(), Dimension::new(192, 108));
                    break;
                }
                Ok(_) => continue,
                Err(e) => panic!("no still delivered: {e}"),
            }
        }
        camera.close();
    }

    #[test]
    fn test_disconnect_after_frames() {
        let (worker, rx) = collect_events();
        let mut camera = SyntheticCamera::new(SyntheticProfile {
            disconnect_after_frames: Some(3),
            fps: 120,
            ..Default::default()
        });
        let descriptor = camera.enumerate().unwrap().remove(0);
        camera.open(&descriptor, worker.sender(1)).unwrap();
        rx.recv_timeout(Duration::from_secs(1)).unwrap();

        camera
            .configure(
                SessionConfig {
                    preview: Dimension::new(64, 36),
                    still: Dimension::new(64, 36),
                    frames: LatestFrame::new(),
                },
                worker.sender(1),
            )
            .unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        loop {
            match rx.recv_timeout(
                deadline.saturating_duration_since(std::time::Instant::now()),
            ) {
                Ok(SessionEvent::DeviceDisconnected) => break,
                Ok(_) => continue,
                Err(e) => panic!("no disconnect reported: {e}"),
            }
        }
        camera.close();
    }

    #[test]
    fn test_capture_without_preview_is_rejected() {
        let (worker, _rx) = collect_events();
        let mut camera = SyntheticCamera::new(SyntheticProfile::default());
        let result = camera.capture_still(worker.sender(1));
        assert!(result.is_err());
    }
}
