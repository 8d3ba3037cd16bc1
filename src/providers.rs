// SPDX-License-Identifier: GPL-3.0-only

//! Color filter providers
//!
//! A provider owns the filter catalog shown in the preview grid and applies
//! a committed filter to a staged capture on disk. The capture sink talks to
//! it through [`FilterProvider`] and gates filtered captures on the
//! negotiated protocol version.

use std::fmt;
use std::path::Path;

use tracing::{debug, warn};

use crate::constants::capture::DEFAULT_JPEG_QUALITY;
use crate::render::luts::{FilterEntry, FilterSet, LUMA_WEIGHTS, LutLayoutError, bake_lut};
use crate::storage;

/// Result type alias for provider operations.
pub type FilterResult<T> = Result<T, FilterError>;

/// Errors raised while listing or applying filters.
#[derive(Debug, Clone)]
pub enum FilterError {
    /// No catalog entry matches the requested id
    UnknownFilter(i32),
    /// The LUT strip violated its layout invariant
    Layout(LutLayoutError),
    /// Reading or writing the image files failed
    Io(String),
    /// Decoding or encoding pixel data failed
    Image(String),
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterError::UnknownFilter(id) => write!(f, "no filter with id {}", id),
            FilterError::Layout(err) => write!(f, "LUT layout error: {}", err),
            FilterError::Io(msg) => write!(f, "I/O error: {}", msg),
            FilterError::Image(msg) => write!(f, "image error: {}", msg),
        }
    }
}

impl std::error::Error for FilterError {}

impl From<LutLayoutError> for FilterError {
    fn from(err: LutLayoutError) -> Self {
        FilterError::Layout(err)
    }
}

impl From<std::io::Error> for FilterError {
    fn from(err: std::io::Error) -> Self {
        FilterError::Io(err.to_string())
    }
}

impl From<image::ImageError> for FilterError {
    fn from(err: image::ImageError) -> Self {
        FilterError::Image(err.to_string())
    }
}

/// Source of filters as seen by the capture sink and the CLI.
///
/// Filtered captures require
/// [`version`](FilterProvider::version) to be at least
/// [`MIN_APPLY_VERSION`](crate::constants::filters::MIN_APPLY_VERSION);
/// the sink enforces that before staging anything.
pub trait FilterProvider: Send + Sync {
    /// Protocol version negotiated with this provider.
    fn version(&self) -> u32;

    /// The full catalog as entries plus a stitched LUT strip.
    fn list_filters(&self) -> FilterResult<FilterSet>;

    /// Apply `filter_id` to the staged image and write the result to `output`.
    ///
    /// The staged file belongs to the caller; the provider must not remove it.
    fn apply_filter(&self, staged: &Path, filter_id: i32, output: &Path) -> FilterResult<()>;

    /// Delete a previously written filtered image.
    ///
    /// Returns whether a file was actually removed.
    fn delete_filtered(&self, path: &Path) -> bool;
}

/// Protocol version the baked provider implements.
const BAKED_PROTOCOL_VERSION: u32 = 2;

/// In-process provider backed by programmatically baked LUTs.
///
/// The catalog is baked once at construction and `list_filters` hands out
/// clones of the finished set. Applying a filter runs the same LUT sampling
/// the preview shader uses, on the CPU.
pub struct BakedFilterProvider {
    filters: FilterSet,
    jpeg_quality: u8,
}

impl BakedFilterProvider {
    pub fn new() -> FilterResult<Self> {
        Self::with_quality(DEFAULT_JPEG_QUALITY)
    }

    pub fn with_quality(jpeg_quality: u8) -> FilterResult<Self> {
        let filters = bake_catalog()?;
        debug!(filters = filters.len(), "baked filter catalog");
        Ok(Self {
            filters,
            jpeg_quality: jpeg_quality.clamp(1, 100),
        })
    }
}

impl FilterProvider for BakedFilterProvider {
    fn version(&self) -> u32 {
        BAKED_PROTOCOL_VERSION
    }

    fn list_filters(&self) -> FilterResult<FilterSet> {
        Ok(self.filters.clone())
    }

    fn apply_filter(&self, staged: &Path, filter_id: i32, output: &Path) -> FilterResult<()> {
        let slot = self
            .filters
            .slot_of_id(filter_id)
            .ok_or(FilterError::UnknownFilter(filter_id))?;
        let grayscale = self.filters.entries()[slot].is_grayscale;

        let mut rgb = image::open(staged)?.into_rgb8();
        let (width, height) = rgb.dimensions();
        self.filters.apply_to_rgb(slot, grayscale, &mut rgb);
        storage::write_jpeg(output, &rgb, width, height, self.jpeg_quality)?;

        debug!(
            filter = filter_id,
            output = %output.display(),
            "applied filter to staged capture"
        );
        Ok(())
    }

    fn delete_filtered(&self, path: &Path) -> bool {
        match std::fs::remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), "deleted filtered image");
                true
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => false,
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to delete filtered image"
                );
                false
            }
        }
    }
}

/// Bake the built-in catalog. Nine entries, so a full selection grid maps
/// one filter per tile.
fn bake_catalog() -> Result<FilterSet, LutLayoutError> {
    let catalog: [(&str, bool, fn([f32; 3]) -> [f32; 3]); 9] = [
        ("Neutral", false, |c| c),
        ("Mono", true, |c| c),
        ("Sepia", true, sepia),
        ("Warm", false, warm),
        ("Cool", false, cool),
        ("Fade", false, fade),
        ("Punch", false, punch),
        ("Invert", false, invert),
        ("Dusk", false, dusk),
    ];

    let mut entries = Vec::with_capacity(catalog.len());
    let mut luts = Vec::with_capacity(catalog.len());
    for (id, (name, is_grayscale, tone)) in catalog.into_iter().enumerate() {
        entries.push(FilterEntry {
            name: name.to_string(),
            id: id as i32,
            is_grayscale,
        });
        luts.push(bake_lut(tone));
    }
    FilterSet::from_luts(entries, luts)
}

fn luma(c: [f32; 3]) -> f32 {
    LUMA_WEIGHTS[0] * c[0] + LUMA_WEIGHTS[1] * c[1] + LUMA_WEIGHTS[2] * c[2]
}

fn warm(c: [f32; 3]) -> [f32; 3] {
    [c[0] * 1.08 + 0.02, c[1] * 1.01, c[2] * 0.88]
}

fn cool(c: [f32; 3]) -> [f32; 3] {
    [c[0] * 0.88, c[1], c[2] * 1.08 + 0.02]
}

/// Lifted blacks, compressed highlights.
fn fade(c: [f32; 3]) -> [f32; 3] {
    c.map(|v| v * 0.78 + 0.14)
}

/// Smoothstep s-curve for extra contrast.
fn punch(c: [f32; 3]) -> [f32; 3] {
    c.map(|v| v * v * (3.0 - 2.0 * v))
}

fn invert(c: [f32; 3]) -> [f32; 3] {
    c.map(|v| 1.0 - v)
}

/// Amber tint over luminance. Runs after the grayscale pass, so the input
/// is already on the gray diagonal.
fn sepia(c: [f32; 3]) -> [f32; 3] {
    let l = luma(c);
    [l * 1.02 + 0.07, l * 0.89 + 0.03, l * 0.69]
}

/// Cool shadows, warm highlights.
fn dusk(c: [f32; 3]) -> [f32; 3] {
    let l = luma(c);
    let shadow = (1.0 - l) * 0.10;
    let highlight = l * 0.08;
    [
        c[0] + highlight - shadow * 0.4,
        c[1],
        c[2] + shadow - highlight * 0.5,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::filters::{MIN_APPLY_VERSION, TILE_COUNT};
    use image::{Rgb, RgbImage};

    #[test]
    fn test_catalog_fills_selection_grid() {
        let provider = BakedFilterProvider::new().unwrap();
        let set = provider.list_filters().unwrap();

        assert_eq!(set.len(), TILE_COUNT);
        assert_eq!(set.strip().width(), set.slice_size() * TILE_COUNT as u32);

        let mut ids: Vec<i32> = set.entries().iter().map(|e| e.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), TILE_COUNT, "catalog ids must be unique");
    }

    #[test]
    fn test_version_meets_apply_minimum() {
        let provider = BakedFilterProvider::new().unwrap();
        assert!(provider.version() >= MIN_APPLY_VERSION);
    }

    #[test]
    fn test_neutral_entry_is_identity() {
        let provider = BakedFilterProvider::new().unwrap();
        let set = provider.list_filters().unwrap();
        let slot = set.slot_of_id(0).unwrap();

        for rgb in [[0u8, 0, 0], [255, 255, 255], [180, 90, 45]] {
            let mapped = set.map_color(slot, false, rgb);
            for c in 0..3 {
                assert!(
                    (mapped[c] as i16 - rgb[c] as i16).abs() <= 2,
                    "{:?} mapped to {:?}",
                    rgb,
                    mapped
                );
            }
        }
    }

    #[test]
    fn test_grayscale_entries_flagged() {
        let provider = BakedFilterProvider::new().unwrap();
        let set = provider.list_filters().unwrap();

        for name in ["Mono", "Sepia"] {
            let entry = set.entries().iter().find(|e| e.name == name).unwrap();
            assert!(entry.is_grayscale, "{} should run the grayscale pass", name);
        }
        let neutral = set.entries().iter().find(|e| e.name == "Neutral").unwrap();
        assert!(!neutral.is_grayscale);
    }

    #[test]
    fn test_apply_invert_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let staged = dir.path().join("staged.jpg");
        let output = dir.path().join("out.jpg");

        RgbImage::from_pixel(16, 16, Rgb([200, 40, 30]))
            .save(&staged)
            .unwrap();

        let provider = BakedFilterProvider::new().unwrap();
        let set = provider.list_filters().unwrap();
        let invert_id = set
            .entries()
            .iter()
            .find(|e| e.name == "Invert")
            .map(|e| e.id)
            .unwrap();

        provider.apply_filter(&staged, invert_id, &output).unwrap();
        assert!(staged.exists(), "provider must not remove the staged file");

        let result = image::open(&output).unwrap().into_rgb8();
        let px = result.get_pixel(8, 8).0;
        // Two JPEG round trips, so allow generous tolerance
        assert!((px[0] as i16 - 55).abs() <= 16, "red was {}", px[0]);
        assert!((px[1] as i16 - 215).abs() <= 16, "green was {}", px[1]);
        assert!((px[2] as i16 - 225).abs() <= 16, "blue was {}", px[2]);
    }

    #[test]
    fn test_apply_unknown_filter_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let staged = dir.path().join("staged.jpg");
        let output = dir.path().join("out.jpg");
        RgbImage::from_pixel(4, 4, Rgb([10, 20, 30]))
            .save(&staged)
            .unwrap();

        let provider = BakedFilterProvider::new().unwrap();
        let result = provider.apply_filter(&staged, 999, &output);

        assert!(matches!(result, Err(FilterError::UnknownFilter(999))));
        assert!(!output.exists());
    }

    #[test]
    fn test_delete_filtered_reports_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let provider = BakedFilterProvider::new().unwrap();

        let missing = dir.path().join("missing.jpg");
        assert!(!provider.delete_filtered(&missing));

        let present = dir.path().join("present.jpg");
        std::fs::write(&present, b"jpeg bytes").unwrap();
        assert!(provider.delete_filtered(&present));
        assert!(!present.exists());
    }
}
