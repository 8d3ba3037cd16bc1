// SPDX-License-Identifier: GPL-3.0-only

//! Color lookup tables
//!
//! Filters are 512x512 LUT images: an 8x8 grid of 64x64 tiles, one tile per
//! quantized blue level, red along x and green along y inside each tile. A
//! filter set stitches the LUTs of all offered filters into one horizontal
//! strip so the renderer binds a single texture for the whole grid.
//!
//! The CPU sampler here mirrors the shader exactly, including the half-texel
//! inset that keeps lookups from bleeding across tile borders, so a filtered
//! still matches what the preview showed.

use image::RgbaImage;

use crate::constants::filters::{LUT_GRID, LUT_SIZE, LUT_TILE, TILE_COUNT};

/// Rec. 709 luma weights used for grayscale filters.
pub const LUMA_WEIGHTS: [f32; 3] = [0.2125, 0.7154, 0.0721];

/// One offered filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterEntry {
    pub name: String,
    /// Stable id, unique within a provider. Never the no-filter sentinel.
    pub id: i32,
    /// Convert the sample to luminance before the LUT lookup
    pub is_grayscale: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LutLayoutError {
    NoEntries,
    TooManyEntries(usize),
    /// Strip width is not a multiple of the entry count
    RaggedStrip { width: u32, entries: usize },
    /// Slices must be square
    NonSquareSlices { slice_width: u32, height: u32 },
    /// All LUTs in a set must share one size
    MismatchedLut { index: usize },
}

impl std::fmt::Display for LutLayoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LutLayoutError::NoEntries => write!(f, "a filter set needs at least one entry"),
            LutLayoutError::TooManyEntries(n) => {
                write!(f, "{} filters exceed the {} the grid can show", n, TILE_COUNT)
            }
            LutLayoutError::RaggedStrip { width, entries } => {
                write!(f, "strip width {} is not divisible by {} entries", width, entries)
            }
            LutLayoutError::NonSquareSlices {
                slice_width,
                height,
            } => write!(f, "slice {}x{} is not square", slice_width, height),
            LutLayoutError::MismatchedLut { index } => {
                write!(f, "LUT {} does not match the size of the first LUT", index)
            }
        }
    }
}

impl std::error::Error for LutLayoutError {}

/// An ordered set of filters and their stitched LUT strip.
///
/// Slice `i` of the strip belongs to entry `i`; square slices all share one
/// edge length.
#[derive(Debug, Clone)]
pub struct FilterSet {
    entries: Vec<FilterEntry>,
    strip: RgbaImage,
    slice_size: u32,
}

impl FilterSet {
    pub fn new(entries: Vec<FilterEntry>, strip: RgbaImage) -> Result<Self, LutLayoutError> {
        if entries.is_empty() {
            return Err(LutLayoutError::NoEntries);
        }
        if entries.len() > TILE_COUNT {
            return Err(LutLayoutError::TooManyEntries(entries.len()));
        }
        let count = entries.len() as u32;
        if strip.width() % count != 0 {
            return Err(LutLayoutError::RaggedStrip {
                width: strip.width(),
                entries: entries.len(),
            });
        }
        let slice_size = strip.width() / count;
        if slice_size != strip.height() {
            return Err(LutLayoutError::NonSquareSlices {
                slice_width: slice_size,
                height: strip.height(),
            });
        }
        Ok(Self {
            entries,
            strip,
            slice_size,
        })
    }

    /// Stitch per-filter LUTs into a strip and build the set.
    pub fn from_luts(
        entries: Vec<FilterEntry>,
        luts: Vec<RgbaImage>,
    ) -> Result<Self, LutLayoutError> {
        if luts.is_empty() {
            return Err(LutLayoutError::NoEntries);
        }
        let size = luts[0].width();
        for (index, lut) in luts.iter().enumerate() {
            if lut.width() != size || lut.height() != size {
                return Err(LutLayoutError::MismatchedLut { index });
            }
        }
        let mut strip = RgbaImage::new(size * luts.len() as u32, size);
        for (index, lut) in luts.iter().enumerate() {
            image::imageops::replace(&mut strip, lut, (index as u32 * size) as i64, 0);
        }
        Self::new(entries, strip)
    }

    pub fn entries(&self) -> &[FilterEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn strip(&self) -> &RgbaImage {
        &self.strip
    }

    pub fn slice_size(&self) -> u32 {
        self.slice_size
    }

    /// Grid slot of the entry with `id`.
    pub fn slot_of_id(&self, id: i32) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    pub fn entry_by_id(&self, id: i32) -> Option<&FilterEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Map one color through slice `slot`, optionally via luminance first.
    pub fn map_color(&self, slot: usize, grayscale: bool, rgb: [u8; 3]) -> [u8; 3] {
        let mut r = rgb[0] as f32 / 255.0;
        let mut g = rgb[1] as f32 / 255.0;
        let b = rgb[2] as f32 / 255.0;
        let mut bb = b;
        if grayscale {
            let luma = LUMA_WEIGHTS[0] * r + LUMA_WEIGHTS[1] * g + LUMA_WEIGHTS[2] * b;
            r = luma;
            g = luma;
            bb = luma;
        }

        let tiles_per_side = LUT_GRID as f32;
        let tile_px = self.slice_size as f32 / tiles_per_side;
        let max_tile = tiles_per_side * tiles_per_side - 1.0;

        let blue = bb * max_tile;
        let lower = blue.floor().clamp(0.0, max_tile);
        let upper = blue.ceil().clamp(0.0, max_tile);
        let mix = blue - lower;

        let c0 = self.sample_tile(slot, lower as u32, tile_px, r, g);
        let c1 = self.sample_tile(slot, upper as u32, tile_px, r, g);

        [
            to_byte(c0[0] + (c1[0] - c0[0]) * mix),
            to_byte(c0[1] + (c1[1] - c0[1]) * mix),
            to_byte(c0[2] + (c1[2] - c0[2]) * mix),
        ]
    }

    /// Apply slice `slot` to a packed RGB buffer in place.
    pub fn apply_to_rgb(&self, slot: usize, grayscale: bool, rgb: &mut [u8]) {
        for pixel in rgb.chunks_exact_mut(3) {
            let mapped = self.map_color(slot, grayscale, [pixel[0], pixel[1], pixel[2]]);
            pixel.copy_from_slice(&mapped);
        }
    }

    fn sample_tile(&self, slot: usize, tile: u32, tile_px: f32, r: f32, g: f32) -> [f32; 3] {
        let tile_x = (tile % LUT_GRID) as f32;
        let tile_y = (tile / LUT_GRID) as f32;
        // Half-texel inset so filtering stays inside the tile
        let px = slot as f32 * self.slice_size as f32
            + tile_x * tile_px
            + 0.5
            + r * (tile_px - 1.0);
        let py = tile_y * tile_px + 0.5 + g * (tile_px - 1.0);
        self.bilinear(px, py)
    }

    fn bilinear(&self, px: f32, py: f32) -> [f32; 3] {
        let x = (px - 0.5).max(0.0);
        let y = (py - 0.5).max(0.0);
        let x0 = x.floor() as u32;
        let y0 = y.floor() as u32;
        let x1 = (x0 + 1).min(self.strip.width() - 1);
        let y1 = (y0 + 1).min(self.strip.height() - 1);
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;

        let fetch = |x: u32, y: u32| -> [f32; 3] {
            let p = self.strip.get_pixel(x, y).0;
            [
                p[0] as f32 / 255.0,
                p[1] as f32 / 255.0,
                p[2] as f32 / 255.0,
            ]
        };
        let p00 = fetch(x0, y0);
        let p10 = fetch(x1, y0);
        let p01 = fetch(x0, y1);
        let p11 = fetch(x1, y1);

        let mut out = [0.0f32; 3];
        for c in 0..3 {
            let top = p00[c] + (p10[c] - p00[c]) * fx;
            let bottom = p01[c] + (p11[c] - p01[c]) * fx;
            out[c] = top + (bottom - top) * fy;
        }
        out
    }
}

fn to_byte(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Bake a LUT from a color transform.
///
/// Every texel encodes the transform of the identity color it represents,
/// so applying the baked LUT reproduces `transform` up to quantization.
pub fn bake_lut<F>(transform: F) -> RgbaImage
where
    F: Fn([f32; 3]) -> [f32; 3],
{
    let max_tile = (LUT_GRID * LUT_GRID - 1) as f32;
    let max_texel = (LUT_TILE - 1) as f32;

    RgbaImage::from_fn(LUT_SIZE, LUT_SIZE, |x, y| {
        let tile = (y / LUT_TILE) * LUT_GRID + x / LUT_TILE;
        let identity = [
            (x % LUT_TILE) as f32 / max_texel,
            (y % LUT_TILE) as f32 / max_texel,
            tile as f32 / max_tile,
        ];
        let mapped = transform(identity);
        image::Rgba([
            to_byte(mapped[0]),
            to_byte(mapped[1]),
            to_byte(mapped[2]),
            255,
        ])
    })
}

/// The LUT that maps every color to itself.
pub fn identity_lut() -> RgbaImage {
    bake_lut(|c| c)
}
