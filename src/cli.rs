// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for camera operations
//!
//! This module provides command-line functionality for:
//! - Listing available cameras and the filter catalog
//! - Running a live filtered preview
//! - Capturing photos

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use lutcam::backends::camera::{
    CameraDirection, CameraSessionManager, Dimension, DisplayRotation, SessionNotice,
    SessionState, default_hardware,
};
use lutcam::capture::ImageCaptureSink;
use lutcam::config::Config;
use lutcam::constants::{resolution_label, timing};
use lutcam::errors::{AppError, AppResult};
use lutcam::providers::{BakedFilterProvider, FilterProvider};
use lutcam::render::{PreviewRenderer, SelectionState};
use lutcam::storage;

/// Preview surface used when no window system drives the view size.
const PREVIEW_VIEW: Dimension = Dimension::new(1280, 720);

/// Camera facing requested on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DirectionArg {
    Front,
    Back,
    /// First camera regardless of facing
    Any,
}

impl DirectionArg {
    fn resolve(self) -> Option<CameraDirection> {
        match self {
            DirectionArg::Front => Some(CameraDirection::Front),
            DirectionArg::Back => Some(CameraDirection::Back),
            DirectionArg::Any => None,
        }
    }
}

/// A flag given on the command line beats the configured preference.
fn resolve_direction(arg: Option<DirectionArg>, config: &Config) -> Option<CameraDirection> {
    match arg {
        Some(arg) => arg.resolve(),
        None => config.direction,
    }
}

/// List all available cameras
pub fn list_devices(synthetic: bool) -> AppResult<()> {
    let mut hardware = default_hardware(synthetic);
    let devices = hardware.enumerate()?;

    if devices.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras:");
    println!();
    for descriptor in &devices {
        println!(
            "  {}  {} ({})",
            descriptor.id, descriptor.name, descriptor.driver
        );
        if let Some(facing) = descriptor.facing {
            println!("      Facing: {}", facing);
        }

        let caps = &descriptor.capabilities;
        if !caps.preview_sizes.is_empty() {
            let mut sizes = caps.preview_sizes.clone();
            sizes.sort_by_key(|size| std::cmp::Reverse(size.area()));
            let labels: Vec<String> = sizes
                .iter()
                .take(3)
                .map(|size| match resolution_label(size.width) {
                    Some(label) => format!("{} ({})", size, label),
                    None => size.to_string(),
                })
                .collect();
            println!("      Preview: {}", labels.join(", "));
        }
        if caps.sensor_orientation != 0 {
            println!("      Sensor orientation: {}", caps.sensor_orientation);
        }
        println!();
    }

    Ok(())
}

/// List the built-in filter catalog
pub fn list_filters() -> AppResult<()> {
    let provider = BakedFilterProvider::new()?;
    let set = provider.list_filters()?;

    println!("Filter provider protocol version: {}", provider.version());
    println!("Available filters:");
    println!();
    for entry in set.entries() {
        let grayscale = if entry.is_grayscale {
            "  (grayscale pass)"
        } else {
            ""
        };
        println!("  [{}] {}{}", entry.id, entry.name, grayscale);
    }

    Ok(())
}

pub struct PreviewOptions {
    pub synthetic: bool,
    pub direction: Option<DirectionArg>,
    /// Seconds to run; 0 runs until Ctrl+C
    pub duration: u64,
    /// Save a PNG of the rendered preview every N frames
    pub snapshot_every: Option<u64>,
    pub filter: Option<i32>,
    pub grid: bool,
}

/// Run the preview render loop against the offscreen surface
pub fn run_preview(options: PreviewOptions) -> AppResult<()> {
    let config = Config::load();
    let direction = resolve_direction(options.direction, &config);

    let provider = Arc::new(BakedFilterProvider::with_quality(
        config.effective_jpeg_quality(),
    )?);
    // A failed listing degrades to an unfiltered preview
    let filters = match provider.list_filters() {
        Ok(set) => Some(Arc::new(set)),
        Err(err) => {
            println!("No filters available ({}), previewing unfiltered.", err);
            None
        }
    };

    let sink = Arc::new(ImageCaptureSink::new(
        provider,
        config.output_dir(),
        config.staging_dir(),
        config.effective_jpeg_quality(),
    ));
    let manager = CameraSessionManager::new(
        default_hardware(options.synthetic),
        sink.into_still_sink(),
    );

    manager.open(direction, PREVIEW_VIEW, DisplayRotation::Deg0)?;
    if !manager.wait_for_state(SessionState::Previewing, timing::STATE_WAIT_TIMEOUT) {
        return Err(AppError::Other(format!(
            "camera did not reach preview (state is {})",
            manager.state()
        )));
    }

    if let Some(descriptor) = manager.descriptor() {
        println!("Using camera: {}", descriptor.name);
    }
    let rotation = manager
        .negotiated()
        .map(|negotiated| negotiated.upright_rotation)
        .unwrap_or(0);

    let selection = SelectionState::new();
    if let Some(filters) = filters {
        selection.set_filters(filters);
    }
    selection.set_grid_visible(options.grid);
    if let Some(filter_id) = options.filter
        && !selection.commit_filter(filter_id)
    {
        return Err(AppError::Other(format!(
            "unknown filter id {} (see 'lutcam filters')",
            filter_id
        )));
    }

    let mut renderer = PreviewRenderer::new(PREVIEW_VIEW).map_err(AppError::Render)?;

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();
    ctrlc::set_handler(move || stop_flag.store(true, Ordering::SeqCst))
        .map_err(|err| AppError::Other(err.to_string()))?;

    println!("Previewing... (press Ctrl+C to stop)");
    let frames = manager.frames();
    let start = Instant::now();
    let target = (options.duration > 0).then(|| Duration::from_secs(options.duration));
    let mut snapshots: u64 = 0;

    while !stop.load(Ordering::SeqCst) {
        if let Some(limit) = target
            && start.elapsed() >= limit
        {
            break;
        }
        if manager.state() == SessionState::Closed {
            println!();
            println!("Camera session ended.");
            break;
        }

        let Some(frame) = frames.take() else {
            std::thread::sleep(Duration::from_millis(5));
            continue;
        };

        renderer
            .render(&frame, &selection, rotation)
            .map_err(AppError::Render)?;
        let rendered = renderer.frames_rendered();

        if let Some(every) = options.snapshot_every
            && every > 0
            && rendered % every == 0
        {
            let pixels = renderer.read_rgba().map_err(AppError::Render)?;
            let path = save_snapshot(&config, &pixels, renderer.surface_size(), snapshots)?;
            snapshots += 1;
            println!();
            println!("Snapshot saved: {}", path.display());
        }

        print!("\rPreview: {} frames", rendered);
        let _ = std::io::Write::flush(&mut std::io::stdout());
    }
    println!();

    manager.close()?;
    let rendered = renderer.frames_rendered();
    let elapsed = start.elapsed().as_secs_f64();
    if rendered > 0 && elapsed > 0.0 {
        println!(
            "Rendered {} frames in {:.1}s ({:.1} fps)",
            rendered,
            elapsed,
            rendered as f64 / elapsed
        );
    }

    Ok(())
}

fn save_snapshot(
    config: &Config,
    pixels: &[u8],
    surface: Dimension,
    index: u64,
) -> AppResult<PathBuf> {
    let dir = config.output_dir();
    storage::ensure_dir(&dir)?;
    let path = dir.join(storage::snapshot_filename(index));
    image::save_buffer(
        &path,
        pixels,
        surface.width,
        surface.height,
        image::ExtendedColorType::Rgba8,
    )
    .map_err(|err| AppError::Storage(err.to_string()))?;
    Ok(path)
}

pub struct CaptureOptions {
    pub synthetic: bool,
    pub direction: Option<DirectionArg>,
    pub filter: Option<i32>,
    /// File or directory to save into; a directory keeps the default naming
    pub output: Option<PathBuf>,
}

/// Take a photo, optionally through a filter
pub fn capture_photo(options: CaptureOptions) -> AppResult<()> {
    let config = Config::load();
    let direction = resolve_direction(options.direction, &config);

    let provider = Arc::new(BakedFilterProvider::with_quality(
        config.effective_jpeg_quality(),
    )?);
    if let Some(filter_id) = options.filter {
        let set = provider.list_filters()?;
        let entry = set.entry_by_id(filter_id).ok_or_else(|| {
            AppError::Other(format!(
                "unknown filter id {} (see 'lutcam filters')",
                filter_id
            ))
        })?;
        println!("Filter: {}", entry.name);
    }

    let output_dir = match options.output.as_ref() {
        Some(path) if path.is_dir() => path.clone(),
        Some(path) => path
            .parent()
            .map(|parent| parent.to_path_buf())
            .unwrap_or_else(|| config.output_dir()),
        None => config.output_dir(),
    };

    let sink = Arc::new(ImageCaptureSink::new(
        provider,
        output_dir,
        config.staging_dir(),
        config.effective_jpeg_quality(),
    ));
    let manager = CameraSessionManager::new(
        default_hardware(options.synthetic),
        sink.into_still_sink(),
    );
    let notices = manager.subscribe();

    manager.open(direction, PREVIEW_VIEW, DisplayRotation::Deg0)?;
    if !manager.wait_for_state(SessionState::Previewing, timing::STATE_WAIT_TIMEOUT) {
        return Err(AppError::Other(format!(
            "camera did not reach preview (state is {})",
            manager.state()
        )));
    }

    // Let the stream settle so the still is not the very first frame
    let frames = manager.frames();
    let warmup = Instant::now();
    while frames.sequence() < 3 && warmup.elapsed() < Duration::from_secs(2) {
        std::thread::sleep(Duration::from_millis(16));
    }

    println!("Capturing...");
    manager.capture_photo(options.filter)?;
    let saved = wait_for_capture(&notices, Duration::from_secs(10))?;
    manager.close()?;

    // A file-style --output renames the sink's own naming
    if let Some(user_path) = options.output
        && !user_path.is_dir()
    {
        std::fs::rename(&saved, &user_path)?;
        println!("Photo saved: {}", user_path.display());
        return Ok(());
    }

    println!("Photo saved: {}", saved.display());
    Ok(())
}

/// Wait for the session to report the in-flight capture's outcome.
fn wait_for_capture(notices: &Receiver<SessionNotice>, timeout: Duration) -> AppResult<PathBuf> {
    let deadline = Instant::now() + timeout;
    loop {
        let now = Instant::now();
        if now >= deadline {
            return Err(AppError::Other(
                "timed out waiting for the capture".to_string(),
            ));
        }
        match notices.recv_timeout(deadline - now) {
            Ok(SessionNotice::CaptureSaved(path)) => return Ok(path),
            Ok(SessionNotice::CaptureFailed(msg)) => return Err(AppError::Other(msg)),
            Ok(_) => continue,
            Err(RecvTimeoutError::Timeout) => {
                return Err(AppError::Other(
                    "timed out waiting for the capture".to_string(),
                ));
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(AppError::Other(
                    "session ended before the capture finished".to_string(),
                ));
            }
        }
    }
}
