use serde::{Deserialize, Serialize};

/// Bounding box in pixel space with format conversion utilities.
///
/// Supports the formats the tracker moves between:
/// - TLWH: Top-Left X, Top-Left Y, Width, Height (storage format)
/// - TLBR: Top-Left X, Top-Left Y, Bottom-Right X, Bottom-Right Y
/// - Z: Center X, Center Y, Area (scale), Aspect Ratio (w/h), the Kalman observation
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// Top-left x coordinate
    pub x: f32,
    /// Top-left y coordinate
    pub y: f32,
    /// Width of the bounding box
    pub width: f32,
    /// Height of the bounding box
    pub height: f32,
}

impl Rect {
    /// Create a new Rect from top-left coordinates and dimensions (TLWH format).
    #[inline]
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Create a Rect from TLBR format (top-left x, top-left y, bottom-right x, bottom-right y).
    #[inline]
    pub fn from_tlbr(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        }
    }

    /// Create a Rect from the Kalman observation `[cx, cy, area, aspect_ratio]`.
    ///
    /// A non-positive area or aspect ratio collapses the box to zero size
    /// around its center.
    #[inline]
    pub fn from_z(cx: f32, cy: f32, area: f32, aspect_ratio: f32) -> Self {
        let (width, height) = if area > 0.0 && aspect_ratio > 0.0 {
            let width = (area * aspect_ratio).sqrt();
            (width, area / width)
        } else {
            (0.0, 0.0)
        };
        Self {
            x: cx - width / 2.0,
            y: cy - height / 2.0,
            width,
            height,
        }
    }

    /// Convert to TLBR format: (x1, y1, x2, y2).
    #[inline]
    pub fn to_tlbr(&self) -> [f32; 4] {
        [self.x, self.y, self.x + self.width, self.y + self.height]
    }

    /// Convert to TLWH format: (x, y, width, height).
    #[inline]
    pub fn to_tlwh(&self) -> [f32; 4] {
        [self.x, self.y, self.width, self.height]
    }

    /// Convert to the Kalman observation `[cx, cy, area, aspect_ratio]`.
    #[inline]
    pub fn to_z(&self) -> [f64; 4] {
        let (cx, cy) = self.center();
        let aspect_ratio = if self.height > 0.0 {
            self.width / self.height
        } else {
            0.0
        };
        [cx as f64, cy as f64, self.area() as f64, aspect_ratio as f64]
    }

    /// Get the center point of the bounding box.
    #[inline]
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Get the area of the bounding box.
    #[inline]
    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    #[inline]
    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// All coordinates finite and both sides strictly positive.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width > 0.0
            && self.height > 0.0
    }

    /// Clip the box to `[0, width) x [0, height)`.
    pub fn clip(&self, width: u32, height: u32) -> Rect {
        let [x1, y1, x2, y2] = self.to_tlbr();
        let (w, h) = (width as f32, height as f32);
        Rect::from_tlbr(
            x1.clamp(0.0, w),
            y1.clamp(0.0, h),
            x2.clamp(0.0, w),
            y2.clamp(0.0, h),
        )
    }

    /// Integer pixel region `(x, y, width, height)` inside an image of the
    /// given size, or `None` when the clipped box is empty.
    pub fn pixel_region(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let clipped = self.clip(width, height);
        let x = clipped.x.floor() as u32;
        let y = clipped.y.floor() as u32;
        let x2 = (clipped.x + clipped.width).ceil() as u32;
        let y2 = (clipped.y + clipped.height).ceil() as u32;
        let x2 = x2.min(width);
        let y2 = y2.min(height);
        if x2 <= x || y2 <= y {
            return None;
        }
        Some((x, y, x2 - x, y2 - y))
    }

    /// Calculate Intersection over Union (IoU) with another bounding box.
    pub fn iou(&self, other: &Rect) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let inter_width = (x2 - x1).max(0.0);
        let inter_height = (y2 - y1).max(0.0);
        let inter_area = inter_width * inter_height;

        let union_area = self.area() + other.area() - inter_area;

        if union_area > 0.0 {
            inter_area / union_area
        } else {
            0.0
        }
    }
}

use ndarray::Array2;

/// Calculate IoU matrix between two sets of bounding boxes.
///
/// Returns a matrix of shape (M, N) where M is the length of `boxes_a`
/// and N is the length of `boxes_b`.
pub fn iou_batch(boxes_a: &[Rect], boxes_b: &[Rect]) -> Array2<f32> {
    let mut ious = Array2::zeros((boxes_a.len(), boxes_b.len()));
    for (i, a) in boxes_a.iter().enumerate() {
        for (j, b) in boxes_b.iter().enumerate() {
            ious[[i, j]] = a.iou(b);
        }
    }
    ious
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_conversions() {
        let rect = Rect::new(10.0, 20.0, 30.0, 40.0);

        assert_eq!(rect.to_tlwh(), [10.0, 20.0, 30.0, 40.0]);
        assert_eq!(rect.to_tlbr(), [10.0, 20.0, 40.0, 60.0]);

        let z = rect.to_z();
        assert_eq!(z[0], 25.0); // cx
        assert_eq!(z[1], 40.0); // cy
        assert_eq!(z[2], 1200.0); // area
        assert!((z[3] - 0.75).abs() < 1e-6); // aspect ratio = 30/40
    }

    #[test]
    fn test_from_tlbr() {
        let rect = Rect::from_tlbr(10.0, 20.0, 40.0, 60.0);
        assert_eq!(rect.to_tlwh(), [10.0, 20.0, 30.0, 40.0]);
    }

    #[test]
    fn test_from_z() {
        let rect = Rect::from_z(25.0, 40.0, 1200.0, 0.75);
        assert!((rect.x - 10.0).abs() < 1e-4);
        assert!((rect.y - 20.0).abs() < 1e-4);
        assert!((rect.width - 30.0).abs() < 1e-4);
        assert!((rect.height - 40.0).abs() < 1e-4);
    }

    #[test]
    fn test_from_z_degenerate() {
        let rect = Rect::from_z(5.0, 5.0, -3.0, 1.0);
        assert_eq!(rect.area(), 0.0);
        assert!(!rect.is_valid());
    }

    #[test]
    fn test_iou() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 5.0, 10.0, 10.0);

        // Intersection: 5x5 = 25
        // Union: 100 + 100 - 25 = 175
        let iou = a.iou(&b);
        assert!((iou - 25.0 / 175.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_no_overlap() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(20.0, 20.0, 10.0, 10.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_same_box() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_pixel_region_clips() {
        let rect = Rect::new(-5.0, 90.0, 20.0, 20.0);
        assert_eq!(rect.pixel_region(100, 100), Some((0, 90, 15, 10)));
        assert_eq!(Rect::new(200.0, 0.0, 5.0, 5.0).pixel_region(100, 100), None);
    }
}
