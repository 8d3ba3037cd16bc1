// SPDX-License-Identifier: GPL-3.0-only

//! Pixel format conversion for camera backends
//!
//! Webcams overwhelmingly deliver YUYV 4:2:2; the engine works in RGBA and
//! the capture sink encodes from RGB. These converters are the seams between
//! those worlds.

/// Convert YUYV (YUV 4:2:2) to RGBA.
///
/// YUYV format: Y0 U Y1 V, each 4-byte group encodes 2 pixels.
/// Uses BT.601 coefficients for YUV to RGB conversion.
pub fn yuyv_to_rgba(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let pixel_count = (width * height) as usize;
    let mut rgba = Vec::with_capacity(pixel_count * 4);

    for chunk in data.chunks_exact(4) {
        let y0 = chunk[0] as f32;
        let u = chunk[1] as f32 - 128.0;
        let y1 = chunk[2] as f32;
        let v = chunk[3] as f32 - 128.0;

        for y in [y0, y1] {
            let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
            let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
            let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;

            rgba.push(r);
            rgba.push(g);
            rgba.push(b);
            rgba.push(255);

            if rgba.len() >= pixel_count * 4 {
                break;
            }
        }
        if rgba.len() >= pixel_count * 4 {
            break;
        }
    }

    // Short buffers pad with black rather than panic
    while rgba.len() < pixel_count * 4 {
        rgba.extend_from_slice(&[0, 0, 0, 255]);
    }

    rgba
}

/// Drop the alpha channel, for encoders that want tightly packed RGB.
pub fn rgba_to_rgb(rgba: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(rgba.len() / 4 * 3);
    for chunk in rgba.chunks_exact(4) {
        rgb.push(chunk[0]);
        rgb.push(chunk[1]);
        rgb.push(chunk[2]);
    }
    rgb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_white_pair() {
        // Pure white in YUV (Y=255, U=128, V=128)
        let yuyv = vec![255u8, 128, 255, 128];
        let rgba = yuyv_to_rgba(&yuyv, 2, 1);

        assert_eq!(rgba.len(), 8);
        assert!(rgba[0] > 250);
        assert!(rgba[1] > 250);
        assert!(rgba[2] > 250);
        assert_eq!(rgba[3], 255);
    }

    #[test]
    fn test_yuyv_short_buffer_pads_black() {
        let yuyv = vec![255u8, 128, 255, 128];
        let rgba = yuyv_to_rgba(&yuyv, 2, 2);

        assert_eq!(rgba.len(), 16);
        assert_eq!(&rgba[8..12], &[0, 0, 0, 255]);
    }

    #[test]
    fn test_yuyv_excess_is_truncated() {
        let yuyv = vec![255u8, 128, 255, 128, 0, 128, 0, 128];
        let rgba = yuyv_to_rgba(&yuyv, 2, 1);
        assert_eq!(rgba.len(), 8);
    }

    #[test]
    fn test_rgba_to_rgb_strips_alpha() {
        let rgba = vec![255, 128, 64, 255, 0, 0, 0, 10];
        assert_eq!(rgba_to_rgb(&rgba), vec![255, 128, 64, 0, 0, 0]);
    }

    #[test]
    fn test_rgba_to_rgb_ignores_trailing_partial_pixel() {
        let rgba = vec![9, 8, 7, 255, 1, 2];
        assert_eq!(rgba_to_rgb(&rgba), vec![9, 8, 7]);
    }
}
