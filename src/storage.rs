// SPDX-License-Identifier: GPL-3.0-only

//! Storage helpers for captured images
//!
//! Default directory resolution, capture file naming and the shared JPEG
//! writer used by the capture sink and the filter provider.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use image::ExtendedColorType;
use image::codecs::jpeg::JpegEncoder;
use uuid::Uuid;

/// Default folder name for saved captures under the pictures directory.
const DEFAULT_SAVE_FOLDER: &str = "Lutcam";

/// Default output directory for captures.
pub fn default_output_dir() -> PathBuf {
    dirs::picture_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join(DEFAULT_SAVE_FOLDER)
}

/// Default staging directory for in-flight filtered captures.
pub fn default_staging_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("lutcam")
        .join("staging")
}

/// Create `dir` and its parents when missing.
pub fn ensure_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)
}

/// Final filename for a capture: timestamp plus a fragment of the id.
///
/// `IMG_20260825_153000_1a2b3c4d.jpg`
pub fn capture_filename(capture_id: Uuid) -> String {
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let hex = capture_id.simple().to_string();
    format!("IMG_{}_{}.jpg", stamp, &hex[..8])
}

/// Staging filename for a filtered capture in flight.
pub fn staged_filename(capture_id: Uuid) -> String {
    format!("staged-{}.jpg", capture_id)
}

/// Filename for a rendered preview snapshot.
pub fn snapshot_filename(index: u64) -> String {
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    format!("preview_{}_{:03}.png", stamp, index)
}

/// Encode packed RGB8 pixels as a JPEG file.
pub fn write_jpeg(
    path: &Path,
    rgb: &[u8],
    width: u32,
    height: u32,
    quality: u8,
) -> image::ImageResult<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let mut encoder = JpegEncoder::new_with_quality(&mut writer, quality);
    encoder.encode(rgb, width, height, ExtendedColorType::Rgb8)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_filename_shape() {
        let id = Uuid::new_v4();
        let name = capture_filename(id);

        assert!(name.starts_with("IMG_"));
        assert!(name.ends_with(".jpg"));
        // IMG_ + 15 timestamp chars + _ + 8 id chars + .jpg
        assert_eq!(name.len(), 32);

        let hex = id.simple().to_string();
        assert!(name.contains(&hex[..8]));
    }

    #[test]
    fn test_staged_filename_uses_full_id() {
        let id = Uuid::new_v4();
        assert_eq!(staged_filename(id), format!("staged-{}.jpg", id));
    }

    #[test]
    fn test_snapshot_filename_counts() {
        let name = snapshot_filename(7);
        assert!(name.starts_with("preview_"));
        assert!(name.ends_with("_007.png"));
    }

    #[test]
    fn test_ensure_dir_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        ensure_dir(&nested).unwrap();
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn test_write_jpeg_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img.jpg");
        let rgb: Vec<u8> = (0..8 * 8).flat_map(|_| [120u8, 200, 40]).collect();

        write_jpeg(&path, &rgb, 8, 8, 90).unwrap();

        let decoded = image::open(&path).unwrap().into_rgb8();
        assert_eq!(decoded.dimensions(), (8, 8));
        let px = decoded.get_pixel(4, 4).0;
        assert!((px[1] as i16 - 200).abs() < 16, "green was {}", px[1]);
    }
}
