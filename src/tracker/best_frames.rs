//! Bounded keep-the-best set of frames per track.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use serde::Serialize;

use crate::tracker::rect::Rect;

/// A frame worth keeping for a vehicle, ranked by `quality`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ScoredFrame {
    pub quality: f32,
    pub frame_number: u64,
    pub bbox: Rect,
}

impl PartialEq for ScoredFrame {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScoredFrame {}

impl Ord for ScoredFrame {
    fn cmp(&self, other: &Self) -> Ordering {
        self.quality
            .total_cmp(&other.quality)
            // Earlier frames win ties.
            .then_with(|| other.frame_number.cmp(&self.frame_number))
    }
}

impl PartialOrd for ScoredFrame {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Keeps at most `capacity` frames with the highest quality.
///
/// Backed by a min-heap so the weakest kept frame is evicted in O(log K).
#[derive(Debug, Clone)]
pub struct BestFrames {
    capacity: usize,
    heap: BinaryHeap<Reverse<ScoredFrame>>,
}

impl BestFrames {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            heap: BinaryHeap::with_capacity(capacity + 1),
        }
    }

    /// Offer a frame; returns `true` if it was kept.
    pub fn offer(&mut self, frame: ScoredFrame) -> bool {
        if self.capacity == 0 || !frame.quality.is_finite() {
            return false;
        }
        if self.heap.len() < self.capacity {
            self.heap.push(Reverse(frame));
            return true;
        }
        match self.heap.peek() {
            Some(Reverse(weakest)) if frame > *weakest => {
                self.heap.pop();
                self.heap.push(Reverse(frame));
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Kept frames, best first.
    pub fn sorted(&self) -> Vec<ScoredFrame> {
        let mut frames: Vec<ScoredFrame> = self.heap.iter().map(|Reverse(f)| *f).collect();
        frames.sort_by(|a, b| b.cmp(a));
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(quality: f32, frame_number: u64) -> ScoredFrame {
        ScoredFrame {
            quality,
            frame_number,
            bbox: Rect::default(),
        }
    }

    #[test]
    fn test_keeps_top_k() {
        let mut best = BestFrames::new(3);
        for (i, q) in [0.2, 0.9, 0.1, 0.5, 0.7].into_iter().enumerate() {
            best.offer(frame(q, i as u64));
        }
        let kept: Vec<f32> = best.sorted().iter().map(|f| f.quality).collect();
        assert_eq!(kept, vec![0.9, 0.7, 0.5]);
    }

    #[test]
    fn test_rejects_weaker_when_full() {
        let mut best = BestFrames::new(1);
        assert!(best.offer(frame(0.5, 1)));
        assert!(!best.offer(frame(0.4, 2)));
        assert!(!best.offer(frame(0.5, 3)));
        assert_eq!(best.sorted()[0].frame_number, 1);
    }

    #[test]
    fn test_zero_capacity_and_nan() {
        let mut best = BestFrames::new(0);
        assert!(!best.offer(frame(1.0, 1)));
        let mut best = BestFrames::new(2);
        assert!(!best.offer(frame(f32::NAN, 1)));
        assert!(best.is_empty());
    }
}
