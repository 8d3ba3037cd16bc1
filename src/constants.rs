// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

/// Preview stream bounds
pub mod preview {
    /// Widest preview the render path is sized for
    pub const MAX_WIDTH: u32 = 1920;

    /// Tallest preview the render path is sized for
    pub const MAX_HEIGHT: u32 = 1080;
}

/// Timing constants
pub mod timing {
    use std::time::Duration;

    /// How long open/close wait for the lifecycle gate before giving up
    pub const GATE_TIMEOUT: Duration = Duration::from_millis(2500);

    /// Default wait for a state transition in the CLI
    pub const STATE_WAIT_TIMEOUT: Duration = Duration::from_secs(5);
}

/// Filter selection and LUT layout
pub mod filters {
    /// Sentinel filter id meaning "no filter"
    pub const NO_FILTER_ID: i32 = -1;

    /// Minimum provider protocol version that supports applying filters
    /// to captured stills
    pub const MIN_APPLY_VERSION: u32 = 2;

    /// Columns and rows of the selection grid
    pub const GRID_DIM: u32 = 3;

    /// Tiles in the selection grid
    pub const TILE_COUNT: usize = (GRID_DIM * GRID_DIM) as usize;

    /// Edge length of one square LUT image
    pub const LUT_SIZE: u32 = 512;

    /// Blue-axis tiles per row/column inside one LUT image
    pub const LUT_GRID: u32 = 8;

    /// Edge length of one blue-axis tile
    pub const LUT_TILE: u32 = LUT_SIZE / LUT_GRID;
}

/// Still capture defaults
pub mod capture {
    /// JPEG quality for saved captures
    pub const DEFAULT_JPEG_QUALITY: u8 = 90;
}

/// Resolution labels for device listings
pub fn resolution_label(width: u32) -> Option<&'static str> {
    match width {
        w if w >= 3840 => Some("4K"),
        w if w >= 2560 => Some("2K"),
        w if w >= 1920 => Some("HD"),
        w if w >= 1280 => Some("720p"),
        w if w >= 640 => Some("SD"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_labels() {
        assert_eq!(resolution_label(3840), Some("4K"));
        assert_eq!(resolution_label(1920), Some("HD"));
        assert_eq!(resolution_label(1280), Some("720p"));
        assert_eq!(resolution_label(640), Some("SD"));
        assert_eq!(resolution_label(320), None);
    }

    #[test]
    fn test_lut_layout_is_consistent() {
        assert_eq!(filters::LUT_GRID * filters::LUT_TILE, filters::LUT_SIZE);
        assert_eq!(filters::TILE_COUNT, 9);
    }
}
