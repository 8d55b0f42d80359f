//! Screen capture and the API-image coordinate model.
//!
//! A capture grabs one PNG frame of the session's display at native
//! resolution, then downscales it so the client never receives an image
//! with a long edge over 1568 px or more than 1.15 megapixels. One scalar
//! relates the two coordinate spaces; the same scalar maps inbound client
//! coordinates to display space and outbound cursor positions back.

use std::io::Cursor;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::ImageEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::imageops::FilterType;
use tracing::debug;

use crate::error::SessionError;
use crate::runner::{CommandRunner, display_env};

/// Longest edge the API image space permits.
pub const MAX_LONG_EDGE: u32 = 1568;
/// Pixel-count ceiling of the API image space.
pub const MAX_PIXELS: f64 = 1.15 * 1024.0 * 1024.0;

/// Downscale factor `s <= 1` for a display of the given size. Both axes
/// share the single scalar.
pub fn scale_factor(width: u32, height: u32) -> f64 {
    let long_edge = width.max(height) as f64;
    let pixels = width as f64 * height as f64;

    let long_edge_scale = if long_edge > MAX_LONG_EDGE as f64 {
        MAX_LONG_EDGE as f64 / long_edge
    } else {
        1.0
    };
    let pixel_scale = if pixels > MAX_PIXELS {
        (MAX_PIXELS / pixels).sqrt()
    } else {
        1.0
    };

    long_edge_scale.min(pixel_scale)
}

/// Dimensions of the image the client will see for this display size.
pub fn scaled_dimensions(width: u32, height: u32) -> (u32, u32) {
    let s = scale_factor(width, height);
    if s < 1.0 {
        (
            (width as f64 * s).floor() as u32,
            (height as f64 * s).floor() as u32,
        )
    } else {
        (width, height)
    }
}

/// Map an API-image-space coordinate to display space: multiply by `1/s`,
/// round, clamp into the framebuffer.
pub fn to_display(x: f64, y: f64, width: u32, height: u32) -> (i64, i64) {
    let k = 1.0 / scale_factor(width, height);
    let dx = (x * k).round() as i64;
    let dy = (y * k).round() as i64;
    (
        dx.clamp(0, width.saturating_sub(1) as i64),
        dy.clamp(0, height.saturating_sub(1) as i64),
    )
}

/// Map a display-space coordinate back to API image space.
pub fn from_display(x: i64, y: i64, width: u32, height: u32) -> (i64, i64) {
    let s = scale_factor(width, height);
    ((x as f64 * s).round() as i64, (y as f64 * s).round() as i64)
}

#[derive(Debug, Clone)]
pub struct CapturedImage {
    /// Base64-encoded PNG bytes.
    pub data: String,
    /// Reported dimensions in API image space.
    pub width: u32,
    pub height: u32,
}

/// Grab one frame of the display and rescale it per the policy above.
pub fn screenshot(
    runner: &dyn CommandRunner,
    display: u32,
    width: u32,
    height: u32,
) -> Result<CapturedImage, SessionError> {
    let file = tempfile::Builder::new()
        .prefix("agent-desktop-")
        .suffix(".png")
        .tempfile()
        .map_err(|e| SessionError::CaptureFailed(format!("temp file: {}", e)))?;
    let path = file.path().to_path_buf();

    let args: Vec<String> = vec![
        "-f".into(),
        "x11grab".into(),
        "-video_size".into(),
        format!("{}x{}", width, height),
        "-i".into(),
        format!(":{}", display),
        "-vframes".into(),
        "1".into(),
        "-y".into(),
        path.display().to_string(),
    ];

    runner
        .run("ffmpeg", &args, &display_env(display))
        .map_err(|e| SessionError::CaptureFailed(e.to_string()))?;

    let bytes = std::fs::read(&path)
        .map_err(|e| SessionError::CaptureFailed(format!("reading frame: {}", e)))?;
    if bytes.is_empty() {
        return Err(SessionError::CaptureFailed("empty frame file".into()));
    }
    // The temp file unlinks on drop; a failure there is tolerated.
    drop(file);

    rescale(bytes, width, height)
}

fn rescale(bytes: Vec<u8>, width: u32, height: u32) -> Result<CapturedImage, SessionError> {
    let s = scale_factor(width, height);
    if s >= 1.0 {
        return Ok(CapturedImage {
            data: BASE64.encode(&bytes),
            width,
            height,
        });
    }

    let (target_w, target_h) = scaled_dimensions(width, height);
    let decoded = image::load_from_memory(&bytes)
        .map_err(|e| SessionError::CaptureFailed(format!("decoding frame: {}", e)))?;
    let resized = decoded.resize_exact(target_w, target_h, FilterType::Lanczos3);

    let mut encoded = Vec::new();
    let encoder = PngEncoder::new_with_quality(
        Cursor::new(&mut encoded),
        CompressionType::Fast,
        PngFilterType::Adaptive,
    );
    encoder
        .write_image(
            resized.as_bytes(),
            resized.width(),
            resized.height(),
            resized.color().into(),
        )
        .map_err(|e| SessionError::CaptureFailed(format!("encoding frame: {}", e)))?;

    debug!(
        from = %format!("{}x{}", width, height),
        to = %format!("{}x{}", target_w, target_h),
        "Downscaled capture"
    );

    Ok(CapturedImage {
        data: BASE64.encode(&encoded),
        width: target_w,
        height: target_h,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingRunner;

    #[test]
    fn test_small_display_is_unscaled() {
        assert_eq!(scale_factor(800, 600), 1.0);
        assert_eq!(scaled_dimensions(800, 600), (800, 600));
    }

    #[test]
    fn test_full_hd_scales_by_long_edge() {
        let (w, h) = scaled_dimensions(1920, 1080);
        assert_eq!(w, 1568);
        // floor(1080 * 1568/1920) = 882
        assert_eq!(h, 882);
    }

    #[test]
    fn test_square_display_scales_by_pixel_budget() {
        // 1300x1300 fits the long-edge cap but not the pixel budget.
        let (w, h) = scaled_dimensions(1300, 1300);
        assert_eq!(w, h);
        assert!(w < 1300);
        assert!((w as f64) * (h as f64) <= MAX_PIXELS);
    }

    #[test]
    fn test_scaled_dimensions_respect_both_caps() {
        for &(w, h) in &[
            (1920, 1080),
            (2560, 1440),
            (3840, 2160),
            (1568, 1568),
            (5000, 200),
            (200, 5000),
            (1024, 768),
        ] {
            let (sw, sh) = scaled_dimensions(w, h);
            assert!(sw <= MAX_LONG_EDGE, "{}x{} -> {}x{}", w, h, sw, sh);
            assert!(sh <= MAX_LONG_EDGE, "{}x{} -> {}x{}", w, h, sw, sh);
            assert!(
                (sw as f64) * (sh as f64) <= MAX_PIXELS + 1.0,
                "{}x{} -> {}x{}",
                w,
                h,
                sw,
                sh
            );
            // Single scale factor applied to both axes.
            let s = scale_factor(w, h);
            if s < 1.0 {
                assert_eq!(sw, (w as f64 * s).floor() as u32);
                assert_eq!(sh, (h as f64 * s).floor() as u32);
            } else {
                assert_eq!((sw, sh), (w, h));
            }
        }
    }

    #[test]
    fn test_to_display_scales_and_rounds() {
        // 1920x1080 -> s = 1568/1920, so (784, 441) maps to (960, 540).
        let (x, y) = to_display(784.0, 441.0, 1920, 1080);
        assert!((x - 960).abs() <= 1);
        assert!((y - 540).abs() <= 1);
    }

    #[test]
    fn test_to_display_is_identity_when_unscaled() {
        assert_eq!(to_display(100.0, 200.0, 1280, 720), (100, 200));
    }

    #[test]
    fn test_to_display_clamps_to_framebuffer() {
        let (x, y) = to_display(10_000.0, -50.0, 1920, 1080);
        assert_eq!((x, y), (1919, 0));
    }

    #[test]
    fn test_coordinate_round_trip_stays_in_bounds() {
        let (w, h) = (1920u32, 1080u32);
        let (img_w, img_h) = scaled_dimensions(w, h);
        for &(x, y) in &[(0, 0), (10, 20), (img_w as i64 - 1, img_h as i64 - 1)] {
            let (dx, dy) = to_display(x as f64, y as f64, w, h);
            assert!(dx >= 0 && dx < w as i64);
            assert!(dy >= 0 && dy < h as i64);
            let (bx, by) = from_display(dx, dy, w, h);
            assert!((bx - x).abs() <= 1, "x {} -> {} -> {}", x, dx, bx);
            assert!((by - y).abs() <= 1, "y {} -> {} -> {}", y, dy, by);
        }
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_screenshot_invokes_ffmpeg_with_native_resolution() {
        let runner = RecordingRunner::new();
        runner.set_run_hook(|program, args| {
            if program == "ffmpeg" {
                let path = args.last().unwrap();
                std::fs::write(path, png_bytes(4, 4)).unwrap();
            }
        });

        let captured = screenshot(&runner, 99, 4, 4).unwrap();
        assert_eq!((captured.width, captured.height), (4, 4));

        let call = &runner.run_calls("ffmpeg")[0];
        let expected: Vec<String> =
            ["-f", "x11grab", "-video_size", "4x4", "-i", ":99", "-vframes", "1", "-y"]
                .iter()
                .map(|s| s.to_string())
                .collect();
        assert_eq!(call.args[..9].to_vec(), expected);
        assert!(call.args[9].ends_with(".png"));

        // Raw bytes come back untouched below the caps.
        let decoded = BASE64.decode(captured.data).unwrap();
        assert_eq!(decoded, png_bytes(4, 4));
    }

    #[test]
    fn test_screenshot_downscales_oversized_frame() {
        let runner = RecordingRunner::new();
        runner.set_run_hook(|program, args| {
            if program == "ffmpeg" {
                let path = args.last().unwrap();
                std::fs::write(path, png_bytes(1920, 1080)).unwrap();
            }
        });

        let captured = screenshot(&runner, 99, 1920, 1080).unwrap();
        assert_eq!((captured.width, captured.height), (1568, 882));

        let decoded = BASE64.decode(captured.data).unwrap();
        let img = image::load_from_memory(&decoded).unwrap();
        assert_eq!((img.width(), img.height()), (1568, 882));
    }

    #[test]
    fn test_screenshot_tool_failure_is_capture_failed() {
        let runner = RecordingRunner::new();
        runner.fail_runs_forever("ffmpeg");
        let err = screenshot(&runner, 99, 1280, 720).unwrap_err();
        assert!(matches!(err, SessionError::CaptureFailed(_)));
    }

    #[test]
    fn test_screenshot_missing_output_is_capture_failed() {
        // ffmpeg "succeeds" but writes nothing.
        let runner = RecordingRunner::new();
        let err = screenshot(&runner, 99, 1280, 720).unwrap_err();
        assert!(matches!(err, SessionError::CaptureFailed(_)));
    }
}
