//! Colour-distribution appearance descriptors.

use image::{GenericImageView, RgbImage};

use crate::tracker::Rect;

/// Per-channel RGB histogram over `region`, `bins` buckets per channel,
/// concatenated and L2-normalised.
///
/// Returns `None` when the region does not overlap the image or `bins` is 0.
pub fn color_histogram(image: &RgbImage, region: Rect, bins: usize) -> Option<Vec<f32>> {
    if bins == 0 {
        return None;
    }
    let (x, y, w, h) = region.pixel_region(image.width(), image.height())?;
    let view = image.view(x, y, w, h);

    let bins = bins.min(256);
    let mut hist = vec![0f32; bins * 3];
    for (_, _, pixel) in view.pixels() {
        for (channel, &value) in pixel.0.iter().enumerate() {
            let bucket = value as usize * bins / 256;
            hist[channel * bins + bucket] += 1.0;
        }
    }

    let norm = hist.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm <= f32::EPSILON {
        return None;
    }
    hist.iter_mut().for_each(|v| *v /= norm);
    Some(hist)
}

/// Cosine similarity of two descriptors; 0 for mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let nb = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if na <= f32::EPSILON || nb <= f32::EPSILON {
        return 0.0;
    }
    dot / (na * nb)
}
