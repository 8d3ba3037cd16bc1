// SPDX-License-Identifier: GPL-3.0-only

//! Still capture persistence
//!
//! [`ImageCaptureSink`] turns finished frames into JPEG files. Plain
//! captures go straight to the output directory; filtered captures take a
//! detour through a staging file that the filter provider reads from, and
//! the staging file is cleaned up on both outcomes.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbaImage;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backends::camera::format_converters::rgba_to_rgb;
use crate::backends::camera::session::StillSink;
use crate::backends::camera::types::{CameraFrame, CaptureRequestContext};
use crate::constants::filters::{MIN_APPLY_VERSION, NO_FILTER_ID};
use crate::providers::{FilterError, FilterProvider};
use crate::storage;

/// Result type alias for capture persistence.
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Errors raised while persisting a capture.
#[derive(Debug, Clone)]
pub enum CaptureError {
    /// Filtered capture requested but the provider protocol is too old
    ProviderTooOld(u32),
    /// The provider failed to apply the filter
    Filter(FilterError),
    /// Converting or encoding the frame failed
    Encode(String),
    /// Filesystem failure while writing the capture
    Io(String),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::ProviderTooOld(version) => write!(
                f,
                "filter provider version {} is below the required {}",
                version, MIN_APPLY_VERSION
            ),
            CaptureError::Filter(err) => write!(f, "filter apply failed: {}", err),
            CaptureError::Encode(msg) => write!(f, "encode failed: {}", msg),
            CaptureError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for CaptureError {}

impl From<FilterError> for CaptureError {
    fn from(err: FilterError) -> Self {
        CaptureError::Filter(err)
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        CaptureError::Io(err.to_string())
    }
}

impl From<image::ImageError> for CaptureError {
    fn from(err: image::ImageError) -> Self {
        CaptureError::Encode(err.to_string())
    }
}

/// Outcome of one processed capture.
#[derive(Debug, Clone)]
pub struct SavedCapture {
    /// Final image on disk
    pub path: PathBuf,
    /// Whether a filter was applied
    pub filtered: bool,
    /// Fresh id assigned to this capture
    pub capture_id: Uuid,
}

/// Persists finished stills, filtered or plain.
///
/// Plain captures rotate upright and encode straight into the output
/// directory. Filtered captures first check the provider's protocol
/// version, then stage the upright JPEG under the capture id, hand the
/// staged path to the provider, and remove it again whether the apply
/// succeeded or not.
pub struct ImageCaptureSink {
    provider: Arc<dyn FilterProvider>,
    output_dir: PathBuf,
    staging_dir: PathBuf,
    jpeg_quality: u8,
}

impl ImageCaptureSink {
    pub fn new(
        provider: Arc<dyn FilterProvider>,
        output_dir: PathBuf,
        staging_dir: PathBuf,
        jpeg_quality: u8,
    ) -> Self {
        Self {
            provider,
            output_dir,
            staging_dir,
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Wrap the sink for the session manager's persistence seam.
    pub fn into_still_sink(self: Arc<Self>) -> StillSink {
        Arc::new(move |frame, context| {
            self.process(&frame, &context)
                .map(|saved| saved.path)
                .map_err(|err| err.to_string())
        })
    }

    /// Persist one capture, assigning it a fresh id.
    pub fn process(
        &self,
        frame: &CameraFrame,
        context: &CaptureRequestContext,
    ) -> CaptureResult<SavedCapture> {
        let capture_id = Uuid::new_v4();
        // The sentinel id means "no filter" even when it arrives as Some
        let target = context.target_filter_id.filter(|id| *id != NO_FILTER_ID);
        debug!(
            capture = %capture_id,
            filter = ?target,
            rotation = context.rotation_degrees,
            "processing capture"
        );

        match target {
            Some(filter_id) => {
                self.save_filtered(frame, context.rotation_degrees, filter_id, capture_id)
            }
            None => self.save_direct(frame, context.rotation_degrees, capture_id),
        }
    }

    fn save_direct(
        &self,
        frame: &CameraFrame,
        rotation: u32,
        capture_id: Uuid,
    ) -> CaptureResult<SavedCapture> {
        let upright = rotate_upright(frame_to_rgba(frame)?, rotation);
        storage::ensure_dir(&self.output_dir)?;
        let path = self.output_dir.join(storage::capture_filename(capture_id));

        storage::write_jpeg(
            &path,
            &rgba_to_rgb(&upright),
            upright.width(),
            upright.height(),
            self.jpeg_quality,
        )?;

        info!(path = %path.display(), "saved capture");
        Ok(SavedCapture {
            path,
            filtered: false,
            capture_id,
        })
    }

    fn save_filtered(
        &self,
        frame: &CameraFrame,
        rotation: u32,
        filter_id: i32,
        capture_id: Uuid,
    ) -> CaptureResult<SavedCapture> {
        // Gate before anything touches the disk
        let version = self.provider.version();
        if version < MIN_APPLY_VERSION {
            return Err(CaptureError::ProviderTooOld(version));
        }

        let upright = rotate_upright(frame_to_rgba(frame)?, rotation);
        storage::ensure_dir(&self.staging_dir)?;
        storage::ensure_dir(&self.output_dir)?;
        let staged = self.staging_dir.join(storage::staged_filename(capture_id));
        let output = self.output_dir.join(storage::capture_filename(capture_id));

        storage::write_jpeg(
            &staged,
            &rgba_to_rgb(&upright),
            upright.width(),
            upright.height(),
            self.jpeg_quality,
        )?;
        debug!(
            staged = %staged.display(),
            filter = filter_id,
            "staged capture for filtering"
        );

        let applied = self.provider.apply_filter(&staged, filter_id, &output);

        // The staged file goes away on both outcomes
        if let Err(err) = fs::remove_file(&staged) {
            warn!(
                path = %staged.display(),
                error = %err,
                "failed to remove staged capture"
            );
        }

        applied?;
        info!(path = %output.display(), filter = filter_id, "saved filtered capture");
        Ok(SavedCapture {
            path: output,
            filtered: true,
            capture_id,
        })
    }
}

/// Repack a possibly strided frame into a tight RGBA image.
fn frame_to_rgba(frame: &CameraFrame) -> CaptureResult<RgbaImage> {
    let tight = frame.width as usize * 4;
    let stride = frame.stride as usize;
    let height = frame.height as usize;

    if stride < tight {
        return Err(CaptureError::Encode(format!(
            "stride {} is shorter than a row of {} pixels",
            frame.stride, frame.width
        )));
    }
    let needed = if height == 0 {
        0
    } else {
        (height - 1) * stride + tight
    };
    if frame.data.len() < needed {
        return Err(CaptureError::Encode(format!(
            "frame buffer holds {} bytes, layout needs {}",
            frame.data.len(),
            needed
        )));
    }

    let raw = if stride == tight {
        frame.data[..tight * height].to_vec()
    } else {
        let mut packed = Vec::with_capacity(tight * height);
        for row in 0..height {
            let start = row * stride;
            packed.extend_from_slice(&frame.data[start..start + tight]);
        }
        packed
    };

    RgbaImage::from_raw(frame.width, frame.height, raw)
        .ok_or_else(|| CaptureError::Encode("frame does not fit an RGBA image".to_string()))
}

/// Rotate clockwise in quarter turns so the capture lands upright.
fn rotate_upright(image: RgbaImage, degrees: u32) -> RgbaImage {
    match (degrees / 90) % 4 {
        1 => image::imageops::rotate90(&image),
        2 => image::imageops::rotate180(&image),
        3 => image::imageops::rotate270(&image),
        _ => image,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::FilterResult;
    use crate::render::luts::{FilterEntry, FilterSet, identity_lut};
    use std::sync::Mutex;
    use std::time::Instant;

    struct StubProvider {
        version: u32,
        fail_apply: bool,
        staged_existed: Mutex<Option<bool>>,
    }

    impl StubProvider {
        fn new(version: u32, fail_apply: bool) -> Arc<Self> {
            Arc::new(Self {
                version,
                fail_apply,
                staged_existed: Mutex::new(None),
            })
        }
    }

    impl FilterProvider for StubProvider {
        fn version(&self) -> u32 {
            self.version
        }

        fn list_filters(&self) -> FilterResult<FilterSet> {
            let entries = vec![FilterEntry {
                name: "stub".to_string(),
                id: 1,
                is_grayscale: false,
            }];
            Ok(FilterSet::from_luts(entries, vec![identity_lut()]).unwrap())
        }

        fn apply_filter(&self, staged: &Path, _filter_id: i32, output: &Path) -> FilterResult<()> {
            *self.staged_existed.lock().unwrap() = Some(staged.exists());
            if self.fail_apply {
                return Err(FilterError::Io("stub apply failure".to_string()));
            }
            fs::copy(staged, output)?;
            Ok(())
        }

        fn delete_filtered(&self, path: &Path) -> bool {
            fs::remove_file(path).is_ok()
        }
    }

    fn solid_frame(r: u8, g: u8, b: u8) -> CameraFrame {
        let mut data = Vec::with_capacity(16 * 16 * 4);
        for _ in 0..16 * 16 {
            data.extend_from_slice(&[r, g, b, 255]);
        }
        CameraFrame::from_rgba(data, 16, 16)
    }

    fn sink_in(dir: &Path, provider: Arc<dyn FilterProvider>) -> ImageCaptureSink {
        ImageCaptureSink::new(provider, dir.join("out"), dir.join("staging"), 90)
    }

    fn file_count(dir: &Path) -> usize {
        fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
    }

    fn plain_context() -> CaptureRequestContext {
        CaptureRequestContext {
            target_filter_id: None,
            rotation_degrees: 0,
        }
    }

    #[test]
    fn test_direct_capture_writes_exactly_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sink_in(dir.path(), StubProvider::new(2, false));

        let saved = sink.process(&solid_frame(200, 40, 30), &plain_context()).unwrap();

        assert!(!saved.filtered);
        assert!(saved.path.exists());
        assert_eq!(file_count(&dir.path().join("out")), 1);
        assert_eq!(file_count(&dir.path().join("staging")), 0);
    }

    #[test]
    fn test_each_capture_gets_fresh_id() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sink_in(dir.path(), StubProvider::new(2, false));
        let frame = solid_frame(10, 20, 30);

        let first = sink.process(&frame, &plain_context()).unwrap();
        let second = sink.process(&frame, &plain_context()).unwrap();

        assert_ne!(first.capture_id, second.capture_id);
        assert_ne!(first.path, second.path);
        assert_eq!(file_count(&dir.path().join("out")), 2);
    }

    #[test]
    fn test_old_provider_rejected_without_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sink_in(dir.path(), StubProvider::new(1, false));
        let context = CaptureRequestContext {
            target_filter_id: Some(1),
            rotation_degrees: 0,
        };

        let result = sink.process(&solid_frame(1, 2, 3), &context);

        assert!(matches!(result, Err(CaptureError::ProviderTooOld(1))));
        assert_eq!(file_count(&dir.path().join("out")), 0);
        assert_eq!(file_count(&dir.path().join("staging")), 0);
    }

    #[test]
    fn test_staged_file_removed_after_successful_apply() {
        let dir = tempfile::tempdir().unwrap();
        let provider = StubProvider::new(2, false);
        let sink = sink_in(dir.path(), provider.clone());
        let context = CaptureRequestContext {
            target_filter_id: Some(1),
            rotation_degrees: 0,
        };

        let saved = sink.process(&solid_frame(90, 90, 90), &context).unwrap();

        assert!(saved.filtered);
        assert!(saved.path.exists());
        assert_eq!(*provider.staged_existed.lock().unwrap(), Some(true));
        assert_eq!(file_count(&dir.path().join("staging")), 0);
    }

    #[test]
    fn test_staged_file_removed_after_failed_apply() {
        let dir = tempfile::tempdir().unwrap();
        let provider = StubProvider::new(2, true);
        let sink = sink_in(dir.path(), provider.clone());
        let context = CaptureRequestContext {
            target_filter_id: Some(1),
            rotation_degrees: 0,
        };

        let result = sink.process(&solid_frame(90, 90, 90), &context);

        assert!(matches!(result, Err(CaptureError::Filter(_))));
        assert_eq!(*provider.staged_existed.lock().unwrap(), Some(true));
        assert_eq!(file_count(&dir.path().join("staging")), 0);
        assert_eq!(file_count(&dir.path().join("out")), 0);
    }

    #[test]
    fn test_sentinel_filter_id_is_plain_capture() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sink_in(dir.path(), StubProvider::new(1, false));
        let context = CaptureRequestContext {
            target_filter_id: Some(NO_FILTER_ID),
            rotation_degrees: 0,
        };

        // Would be rejected as version 1 if it took the filtered path
        let saved = sink.process(&solid_frame(5, 5, 5), &context).unwrap();
        assert!(!saved.filtered);
        assert_eq!(file_count(&dir.path().join("staging")), 0);
    }

    #[test]
    fn test_rotation_quarter_turn() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sink_in(dir.path(), StubProvider::new(2, false));

        // 16x8, left half red, right half blue
        let mut data = Vec::with_capacity(16 * 8 * 4);
        for _ in 0..8 {
            for x in 0..16 {
                if x < 8 {
                    data.extend_from_slice(&[220, 0, 0, 255]);
                } else {
                    data.extend_from_slice(&[0, 0, 220, 255]);
                }
            }
        }
        let frame = CameraFrame::from_rgba(data, 16, 8);
        let context = CaptureRequestContext {
            target_filter_id: None,
            rotation_degrees: 90,
        };

        let saved = sink.process(&frame, &context).unwrap();
        let image = image::open(&saved.path).unwrap().into_rgb8();

        // Clockwise quarter turn: 16x8 becomes 8x16 with red on top
        assert_eq!(image.dimensions(), (8, 16));
        let top = image.get_pixel(4, 3).0;
        let bottom = image.get_pixel(4, 12).0;
        assert!(top[0] > 160 && top[2] < 90, "top pixel was {:?}", top);
        assert!(bottom[2] > 160 && bottom[0] < 90, "bottom pixel was {:?}", bottom);
    }

    #[test]
    fn test_strided_frame_packs_rows() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sink_in(dir.path(), StubProvider::new(2, false));

        // 4 pixels per row plus 8 bytes of padding
        let width = 4u32;
        let height = 2u32;
        let stride = width * 4 + 8;
        let mut data = vec![0u8; (stride * height) as usize];
        for row in 0..height as usize {
            for x in 0..width as usize {
                let at = row * stride as usize + x * 4;
                data[at..at + 4].copy_from_slice(&[40, 200, 120, 255]);
            }
        }
        let frame = CameraFrame {
            data: Arc::from(data.into_boxed_slice()),
            width,
            height,
            stride,
            captured_at: Instant::now(),
        };

        let saved = sink.process(&frame, &plain_context()).unwrap();
        let image = image::open(&saved.path).unwrap().into_rgb8();
        assert_eq!(image.dimensions(), (width, height));
        let px = image.get_pixel(1, 1).0;
        assert!((px[1] as i16 - 200).abs() < 20, "green was {}", px[1]);
    }
}
