//! Cheap per-vehicle frame quality score.

use image::{GrayImage, RgbImage, imageops};
use imageproc::filter::laplacian_filter;

use crate::tracker::Rect;

/// Laplacian variance mapped to 1.0.
const SHARPNESS_NORM: f64 = 1000.0;
/// Box area (px²) mapped to 1.0.
const AREA_NORM: f32 = 100_000.0;

/// Components of the quality score, each in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameQuality {
    pub sharpness: f32,
    pub brightness: f32,
    pub area: f32,
}

impl FrameQuality {
    /// `0.5 * sharpness + 0.3 * brightness + 0.2 * area`.
    pub fn score(&self) -> f32 {
        0.5 * self.sharpness + 0.3 * self.brightness + 0.2 * self.area
    }
}

/// Score the vehicle crop. An empty crop scores zero everywhere.
pub fn frame_quality(frame: &RgbImage, bbox: Rect) -> FrameQuality {
    let Some((x, y, w, h)) = bbox.pixel_region(frame.width(), frame.height()) else {
        return FrameQuality::default();
    };
    let crop = imageops::crop_imm(frame, x, y, w, h).to_image();
    let gray = imageops::grayscale(&crop);

    FrameQuality {
        sharpness: sharpness(&gray),
        brightness: brightness(&gray),
        area: (bbox.area() / AREA_NORM).clamp(0.0, 1.0),
    }
}

/// Variance of the Laplacian, normalised.
fn sharpness(gray: &GrayImage) -> f32 {
    if gray.width() < 3 || gray.height() < 3 {
        return 0.0;
    }
    let lap = laplacian_filter(gray);
    let n = lap.pixels().len() as f64;
    let mean = lap.pixels().map(|p| p.0[0] as f64).sum::<f64>() / n;
    let variance = lap
        .pixels()
        .map(|p| {
            let d = p.0[0] as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    (variance / SHARPNESS_NORM).min(1.0) as f32
}

/// Closeness of mean brightness to mid-gray.
fn brightness(gray: &GrayImage) -> f32 {
    let n = gray.pixels().len();
    if n == 0 {
        return 0.0;
    }
    let mean = gray.pixels().map(|p| p.0[0] as f32).sum::<f32>() / n as f32;
    (1.0 - (mean - 127.5).abs() / 127.5).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_flat_mid_gray() {
        let frame = RgbImage::from_pixel(100, 100, Rgb([128, 128, 128]));
        let q = frame_quality(&frame, Rect::new(0.0, 0.0, 100.0, 100.0));
        assert_eq!(q.sharpness, 0.0);
        assert!(q.brightness > 0.99);
        assert!((q.area - 0.1).abs() < 1e-6);
        assert!((q.score() - (0.3 * q.brightness + 0.02)).abs() < 1e-5);
    }

    #[test]
    fn test_checkerboard_is_sharp() {
        let frame = RgbImage::from_fn(64, 64, |x, y| {
            if (x / 2 + y / 2) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        });
        let q = frame_quality(&frame, Rect::new(0.0, 0.0, 64.0, 64.0));
        assert!(q.sharpness > 0.9);
    }

    #[test]
    fn test_dark_frame_scores_low() {
        let frame = RgbImage::from_pixel(50, 50, Rgb([0, 0, 0]));
        let q = frame_quality(&frame, Rect::new(0.0, 0.0, 30.0, 30.0));
        assert!(q.score() < 0.08);
    }

    #[test]
    fn test_empty_region() {
        let frame = RgbImage::new(10, 10);
        assert_eq!(frame_quality(&frame, Rect::new(50.0, 50.0, 5.0, 5.0)), FrameQuality::default());
    }
}
