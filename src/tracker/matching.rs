//! Matching utilities for multi-object tracking.

use ndarray::Array2;

use crate::tracker::rect::{Rect, iou_batch};

/// Detection input for the tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Bounding box in source-frame pixels (TLWH storage)
    pub bbox: Rect,
    /// Detection confidence score in [0, 1]
    pub score: f32,
    /// Class label as reported by the detector, e.g. `"car"`
    pub class_label: String,
}

impl Detection {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, score: f32, class_label: &str) -> Self {
        Self {
            bbox: Rect::from_tlbr(x1, y1, x2, y2),
            score,
            class_label: class_label.to_string(),
        }
    }

    pub fn from_rect(bbox: Rect, score: f32, class_label: &str) -> Self {
        Self {
            bbox,
            score,
            class_label: class_label.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentResult {
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

/// Associate predicted track boxes with detections by IoU.
///
/// When every track and every detection has at most one partner above the
/// threshold the mapping is taken as is. Otherwise the assignment maximising
/// total IoU is solved. Pairs below `iou_threshold` are always rejected.
pub fn associate(track_boxes: &[Rect], det_boxes: &[Rect], iou_threshold: f32) -> AssignmentResult {
    let ious = iou_batch(track_boxes, det_boxes);
    let pairs = trivial_assignment(&ious, iou_threshold)
        .unwrap_or_else(|| optimal_assignment(&ious));
    split_assignment(&ious, pairs, iou_threshold)
}

/// Return the above-threshold pairs if they already form a one-to-one mapping.
pub fn trivial_assignment(ious: &Array2<f32>, iou_threshold: f32) -> Option<Vec<(usize, usize)>> {
    let (rows, cols) = ious.dim();
    let mut row_hits = vec![0usize; rows];
    let mut col_hits = vec![0usize; cols];
    let mut pairs = Vec::new();

    for i in 0..rows {
        for j in 0..cols {
            if ious[[i, j]] > iou_threshold {
                row_hits[i] += 1;
                col_hits[j] += 1;
                pairs.push((i, j));
            }
        }
    }

    let one_to_one = row_hits.iter().all(|&n| n <= 1) && col_hits.iter().all(|&n| n <= 1);
    one_to_one.then_some(pairs)
}

/// Solve the assignment maximising total IoU (minimising `1 - IoU`).
pub fn optimal_assignment(ious: &Array2<f32>) -> Vec<(usize, usize)> {
    let (num_rows, num_cols) = ious.dim();
    if num_rows == 0 || num_cols == 0 {
        return Vec::new();
    }

    let size = num_rows.max(num_cols);
    let mut padded = Array2::<f64>::from_elem((size, size), 1e6);

    for i in 0..num_rows {
        for j in 0..num_cols {
            padded[[i, j]] = 1.0 - ious[[i, j]] as f64;
        }
    }

    match lapjv::lapjv(&padded) {
        Ok((row_to_col, _)) => row_to_col
            .iter()
            .enumerate()
            .filter(|&(row, &col)| row < num_rows && col < num_cols)
            .map(|(row, &col)| (row, col))
            .collect(),
        Err(err) => {
            tracing::warn!(error = ?err, "assignment solver failed, treating all as unmatched");
            Vec::new()
        }
    }
}

fn split_assignment(
    ious: &Array2<f32>,
    pairs: Vec<(usize, usize)>,
    iou_threshold: f32,
) -> AssignmentResult {
    let (num_rows, num_cols) = ious.dim();
    let mut track_matched = vec![false; num_rows];
    let mut det_matched = vec![false; num_cols];
    let mut matches = Vec::with_capacity(pairs.len());

    for (row, col) in pairs {
        if ious[[row, col]] < iou_threshold {
            continue;
        }
        track_matched[row] = true;
        det_matched[col] = true;
        matches.push((row, col));
    }
    matches.sort_unstable();

    AssignmentResult {
        matches,
        unmatched_tracks: unmatched(&track_matched),
        unmatched_detections: unmatched(&det_matched),
    }
}

fn unmatched(mask: &[bool]) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .filter_map(|(i, &m)| if m { None } else { Some(i) })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxes(specs: &[(f32, f32)]) -> Vec<Rect> {
        specs
            .iter()
            .map(|&(x, y)| Rect::new(x, y, 10.0, 10.0))
            .collect()
    }

    #[test]
    fn test_empty_inputs() {
        let result = associate(&[], &boxes(&[(0.0, 0.0)]), 0.3);
        assert!(result.matches.is_empty());
        assert_eq!(result.unmatched_detections, vec![0]);

        let result = associate(&boxes(&[(0.0, 0.0)]), &[], 0.3);
        assert_eq!(result.unmatched_tracks, vec![0]);
    }

    #[test]
    fn test_trivial_mapping_used_directly() {
        let tracks = boxes(&[(0.0, 0.0), (100.0, 100.0)]);
        let dets = boxes(&[(101.0, 100.0), (1.0, 0.0)]);
        let ious = iou_batch(&tracks, &dets);
        let pairs = trivial_assignment(&ious, 0.3).unwrap();
        assert_eq!(pairs, vec![(0, 1), (1, 0)]);

        let result = associate(&tracks, &dets, 0.3);
        assert_eq!(result.matches, vec![(0, 1), (1, 0)]);
    }

    #[test]
    fn test_contended_detection_goes_to_best_total() {
        // Track 0 overlaps both detections, track 1 only detection 1.
        let tracks = vec![Rect::new(0.0, 0.0, 20.0, 10.0), Rect::new(12.0, 0.0, 10.0, 10.0)];
        let dets = vec![Rect::new(0.0, 0.0, 10.0, 10.0), Rect::new(11.0, 0.0, 10.0, 10.0)];
        let ious = iou_batch(&tracks, &dets);
        assert!(trivial_assignment(&ious, 0.3).is_none());

        let result = associate(&tracks, &dets, 0.3);
        assert_eq!(result.matches, vec![(0, 0), (1, 1)]);
        assert!(result.unmatched_tracks.is_empty());
        assert!(result.unmatched_detections.is_empty());
    }

    #[test]
    fn test_low_iou_pairs_dropped() {
        let tracks = boxes(&[(0.0, 0.0)]);
        let dets = boxes(&[(8.0, 8.0)]);
        let result = associate(&tracks, &dets, 0.3);
        assert!(result.matches.is_empty());
        assert_eq!(result.unmatched_tracks, vec![0]);
        assert_eq!(result.unmatched_detections, vec![0]);
    }
}
