//! Plate sub-region search inside a vehicle box.

use image::{GrayImage, RgbImage, imageops};
use imageproc::contours::find_contours;
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::morphology::dilate;

use crate::tracker::Rect;

const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;
const ASPECT_RANGE: (f32, f32) = (2.0, 6.0);
const PREFERRED_ASPECT: f32 = 3.5;
/// Candidate area as a fraction of the vehicle box.
const AREA_FRACTION_RANGE: (f32, f32) = (0.01, 0.10);
const WIDTH_RANGE: (f32, f32) = (40.0, 350.0);
const HEIGHT_RANGE: (f32, f32) = (12.0, 70.0);
const EDGE_DENSITY_RANGE: (f32, f32) = (0.05, 0.30);
/// Fallback: this bottom fraction of the vehicle box.
const FALLBACK_FRACTION: f32 = 0.4;

/// Region handed to the OCR engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlateRegion {
    /// Region in frame coordinates
    pub rect: Rect,
    /// `false` when no candidate passed and the fallback band was used
    pub from_contour: bool,
}

/// Search the lower half of `vehicle` for a rectangular plate-like contour.
pub fn locate_plate(frame: &RgbImage, vehicle: Rect) -> PlateRegion {
    find_candidate(frame, vehicle)
        .map(|rect| PlateRegion {
            rect,
            from_contour: true,
        })
        .unwrap_or_else(|| PlateRegion {
            rect: fallback_region(vehicle),
            from_contour: false,
        })
}

/// Bottom 40% of the vehicle box.
pub fn fallback_region(vehicle: Rect) -> Rect {
    let top = vehicle.y + vehicle.height * (1.0 - FALLBACK_FRACTION);
    Rect::new(vehicle.x, top, vehicle.width, vehicle.height * FALLBACK_FRACTION)
}

fn find_candidate(frame: &RgbImage, vehicle: Rect) -> Option<Rect> {
    let lower_half = Rect::new(
        vehicle.x,
        vehicle.y + vehicle.height / 2.0,
        vehicle.width,
        vehicle.height / 2.0,
    );
    let (ox, oy, w, h) = lower_half.pixel_region(frame.width(), frame.height())?;
    let crop = imageops::crop_imm(frame, ox, oy, w, h).to_image();
    let edges = canny(&imageops::grayscale(&crop), CANNY_LOW, CANNY_HIGH);

    let vehicle_area = vehicle.area();
    let mid_y = vehicle.y + vehicle.height / 2.0;

    // Close single-pixel gaps so plate borders form one contour.
    let closed = dilate(&edges, Norm::LInf, 1);

    find_contours::<u32>(&closed)
        .iter()
        .filter_map(|contour| {
            let xs = contour.points.iter().map(|p| p.x);
            let ys = contour.points.iter().map(|p| p.y);
            let (x1, x2) = (xs.clone().min()?, xs.max()?);
            let (y1, y2) = (ys.clone().min()?, ys.max()?);
            Some((x1, y1, x2 - x1 + 1, y2 - y1 + 1))
        })
        .filter(|&(x, y, cw, ch)| {
            let density = edge_density(&edges, x, y, cw, ch);
            in_range(density, EDGE_DENSITY_RANGE)
        })
        .map(|(x, y, cw, ch)| {
            Rect::new(
                (ox + x) as f32,
                (oy + y) as f32,
                cw as f32,
                ch as f32,
            )
        })
        .filter(|r| {
            let aspect = r.width / r.height;
            let (_, cy) = r.center();
            in_range(aspect, ASPECT_RANGE)
                && in_range(r.area() / vehicle_area, AREA_FRACTION_RANGE)
                && in_range(r.width, WIDTH_RANGE)
                && in_range(r.height, HEIGHT_RANGE)
                && cy >= mid_y
        })
        .max_by(|a, b| candidate_score(a, vehicle).total_cmp(&candidate_score(b, vehicle)))
}

/// Lower in the vehicle box is better, as is an aspect ratio near 3.5.
fn candidate_score(candidate: &Rect, vehicle: Rect) -> f32 {
    let (_, cy) = candidate.center();
    let relative_y = (cy - vehicle.y) / vehicle.height;
    let aspect = candidate.width / candidate.height;
    relative_y - 0.1 * (aspect - PREFERRED_ASPECT).abs()
}

fn edge_density(edges: &GrayImage, x: u32, y: u32, w: u32, h: u32) -> f32 {
    let mut count = 0u32;
    for yy in y..(y + h).min(edges.height()) {
        for xx in x..(x + w).min(edges.width()) {
            if edges.get_pixel(xx, yy).0[0] > 0 {
                count += 1;
            }
        }
    }
    count as f32 / (w * h).max(1) as f32
}

fn in_range(value: f32, (lo, hi): (f32, f32)) -> bool {
    value >= lo && value <= hi
}
