// SPDX-License-Identifier: GPL-3.0-only

//! Resolution and orientation negotiation
//!
//! Pure selection logic run once per `open()`: picks the still size, picks
//! the preview size against the surface and the preview cap, and works out
//! the rotation the rest of the engine needs (upright capture rotation and
//! whether surface dimensions swap relative to the sensor).

use super::types::{CameraError, CameraResult, DeviceCapabilities, Dimension, DisplayRotation};
use crate::constants::preview;
use tracing::{debug, warn};

/// Result of a successful negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedConfig {
    /// Size of the repeating preview stream
    pub preview: Dimension,
    /// Size of still captures
    pub still: Dimension,
    /// Clockwise rotation in degrees that makes a capture upright
    pub upright_rotation: u32,
    /// Whether surface width/height swap relative to sensor coordinates
    pub swapped: bool,
}

/// Base rotation per display rotation, combined with the sensor angle to
/// compute the upright capture rotation.
fn base_rotation(display: DisplayRotation) -> u32 {
    match display {
        DisplayRotation::Deg0 => 90,
        DisplayRotation::Deg90 => 0,
        DisplayRotation::Deg180 => 270,
        DisplayRotation::Deg270 => 180,
    }
}

/// Clockwise rotation in degrees that makes a captured image upright.
pub fn upright_rotation(display: DisplayRotation, sensor_orientation: u32) -> u32 {
    (base_rotation(display) + sensor_orientation % 360 + 270) % 360
}

/// Whether the surface's width/height are swapped relative to the sensor.
///
/// Sensor orientations that are not a quarter turn are reported and treated
/// as not swapping.
pub fn swaps_dimensions(display: DisplayRotation, sensor_orientation: u32) -> bool {
    let sensor = sensor_orientation % 360;
    match display {
        DisplayRotation::Deg0 | DisplayRotation::Deg180 => match sensor {
            90 | 270 => true,
            0 | 180 => false,
            other => {
                warn!(sensor = other, "unexpected sensor orientation");
                false
            }
        },
        DisplayRotation::Deg90 | DisplayRotation::Deg270 => match sensor {
            0 | 180 => true,
            90 | 270 => false,
            other => {
                warn!(sensor = other, "unexpected sensor orientation");
                false
            }
        },
    }
}

/// Choose the preview size for a surface.
///
/// Candidates must match `aspect` exactly (cross multiplication) and fit
/// within `max`. Among those, prefer the smallest that covers the surface;
/// fall back to the largest that does not. When nothing matches the aspect
/// ratio at all, the first candidate is returned with a warning, mirroring
/// the behaviour cameras are known to tolerate.
pub fn choose_optimal_size(
    choices: &[Dimension],
    surface: Dimension,
    max: Dimension,
    aspect: Dimension,
) -> CameraResult<Dimension> {
    if choices.is_empty() {
        return Err(CameraError::NoResolutions);
    }

    let mut big_enough: Vec<Dimension> = Vec::new();
    let mut not_big_enough: Vec<Dimension> = Vec::new();

    for &option in choices {
        if !option.fits_within(max) || !option.ratio_matches(aspect) {
            continue;
        }
        if option.width >= surface.width && option.height >= surface.height {
            big_enough.push(option);
        } else {
            not_big_enough.push(option);
        }
    }

    if let Some(best) = big_enough.iter().copied().min_by_key(|d| d.area()) {
        return Ok(best);
    }
    if let Some(best) = not_big_enough.iter().copied().max_by_key(|d| d.area()) {
        return Ok(best);
    }

    warn!(
        surface = %surface,
        aspect = %aspect,
        "no preview size matches the target aspect ratio, using the first candidate"
    );
    Ok(choices[0])
}

/// Largest candidate by pixel area, used for still capture.
pub fn largest_by_area(choices: &[Dimension]) -> Option<Dimension> {
    choices.iter().copied().max_by_key(|d| d.area())
}

/// Full negotiation for one device.
///
/// The preview bound is the 1920x1080 cap expressed in sensor coordinates;
/// hosts with smaller displays still get a correctly-shaped stream and scale
/// it down.
pub fn negotiate(
    capabilities: &DeviceCapabilities,
    view: Dimension,
    display: DisplayRotation,
) -> CameraResult<NegotiatedConfig> {
    let still =
        largest_by_area(&capabilities.still_sizes).ok_or(CameraError::NoResolutions)?;

    let swapped = swaps_dimensions(display, capabilities.sensor_orientation);
    let surface = if swapped { view.swapped() } else { view };
    let bound = Dimension::new(preview::MAX_WIDTH, preview::MAX_HEIGHT);

    let preview = choose_optimal_size(&capabilities.preview_sizes, surface, bound, still)?;
    let upright_rotation = upright_rotation(display, capabilities.sensor_orientation);

    debug!(
        preview = %preview,
        still = %still,
        upright_rotation,
        swapped,
        "negotiated camera configuration"
    );

    Ok(NegotiatedConfig {
        preview,
        still,
        upright_rotation,
        swapped,
    })
}
