//! Single vehicle track for multi-object tracking.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use ndarray::{Array1, Array2};
use serde::{Serialize, Serializer};

use crate::tracker::best_frames::BestFrames;
use crate::tracker::kalman_filter::KalmanFilter;
use crate::tracker::matching::Detection;
use crate::tracker::rect::Rect;
use crate::tracker::track_state::TrackState;

/// Global counter so base ids are unique for the whole process.
static TRACK_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Stable track identity.
///
/// `generation` is 0 for a freshly spawned identity and counts
/// re-identifications of the same vehicle after it left the scene. Displayed
/// as `17` or `17_R2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId {
    base: u64,
    generation: u32,
}

impl TrackId {
    /// Allocate the next process-unique id.
    pub fn next() -> Self {
        Self {
            base: TRACK_ID_COUNTER.fetch_add(1, Ordering::SeqCst) + 1,
            generation: 0,
        }
    }

    /// Id of the `generation`-th re-identification of this vehicle.
    pub fn reidentified(&self, generation: u32) -> Self {
        Self {
            base: self.base,
            generation,
        }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.generation == 0 {
            write!(f, "{}", self.base)
        } else {
            write!(f, "{}_R{}", self.base, self.generation)
        }
    }
}

impl Serialize for TrackId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Locked licence plate. Written once per track.
#[derive(Debug, Clone, PartialEq)]
pub struct LockedPlate {
    pub text: String,
    pub confidence: f32,
    pub frame_number: u64,
}

/// Single vehicle track.
#[derive(Debug, Clone)]
pub struct Track {
    /// Unique track identifier
    pub track_id: TrackId,
    /// Lifecycle state
    pub state: TrackState,
    /// Latest class label, refreshed on every matched detection
    pub class_label: String,
    /// Latest matched detection confidence
    pub score: f32,
    /// Frames since creation (incremented on every predict)
    pub age: u32,
    /// Consecutive frames with a matched detection
    pub hit_streak: u32,
    /// Frames since the last matched detection
    pub time_since_update: u32,
    /// Total matched frames, spawn included
    pub hits: u32,
    pub first_frame: u64,
    pub last_frame: u64,
    pub first_seen_s: f64,
    pub last_seen_s: f64,
    confidence_sum: f64,
    /// Kalman filter state mean (7-dim)
    mean: Array1<f64>,
    /// Kalman filter state covariance (7x7)
    covariance: Array2<f64>,
    /// Box of the latest matched detection
    last_detection: Rect,
    plate: Option<LockedPlate>,
    /// Frame number of the latest OCR attempt
    pub last_ocr_attempt_frame: Option<u64>,
    pub ocr_attempts: u32,
    pub best_frames: BestFrames,
    appearance_feature: Option<Vec<f32>>,
    appearance_frame: Option<u64>,
    /// Already announced downstream as a vehicle
    pub announced: bool,
}

impl Track {
    /// Spawn a tentative track from an unmatched detection.
    pub fn spawn(
        track_id: TrackId,
        detection: &Detection,
        kalman_filter: &KalmanFilter,
        frame_number: u64,
        timestamp_s: f64,
        frames_per_vehicle_cap: usize,
    ) -> Self {
        let (mean, covariance) = kalman_filter.initiate(detection.bbox.to_z());
        Self {
            track_id,
            state: TrackState::Tentative,
            class_label: detection.class_label.clone(),
            score: detection.score,
            age: 0,
            hit_streak: 1,
            time_since_update: 0,
            hits: 1,
            first_frame: frame_number,
            last_frame: frame_number,
            first_seen_s: timestamp_s,
            last_seen_s: timestamp_s,
            confidence_sum: detection.score as f64,
            mean,
            covariance,
            last_detection: detection.bbox,
            plate: None,
            last_ocr_attempt_frame: None,
            ocr_attempts: 0,
            best_frames: BestFrames::new(frames_per_vehicle_cap),
            appearance_feature: None,
            appearance_frame: None,
            announced: false,
        }
    }

    /// Current box estimate from the Kalman state.
    pub fn rect(&self) -> Rect {
        Rect::from_z(
            self.mean[0] as f32,
            self.mean[1] as f32,
            self.mean[2] as f32,
            self.mean[3] as f32,
        )
    }

    /// Box of the latest matched detection.
    pub fn last_detection(&self) -> Rect {
        self.last_detection
    }

    /// Advance one frame. Returns `false` if the predicted state is not finite.
    pub fn predict(&mut self, kalman_filter: &KalmanFilter) -> bool {
        let (mean, covariance) = kalman_filter.predict(&self.mean, &self.covariance);
        self.mean = mean;
        self.covariance = covariance;

        self.age += 1;
        if self.time_since_update > 0 {
            self.hit_streak = 0;
        }
        self.time_since_update += 1;

        self.mean.iter().all(|v| v.is_finite())
    }

    /// Correct with a matched detection.
    pub fn update(
        &mut self,
        detection: &Detection,
        kalman_filter: &KalmanFilter,
        frame_number: u64,
        timestamp_s: f64,
        min_hits: u32,
    ) {
        match kalman_filter.update(&self.mean, &self.covariance, detection.bbox.to_z()) {
            Some((mean, covariance)) => {
                self.mean = mean;
                self.covariance = covariance;
            }
            None => {
                tracing::debug!(track_id = %self.track_id, "singular innovation covariance, keeping prediction");
            }
        }

        self.time_since_update = 0;
        self.hits += 1;
        self.hit_streak += 1;
        self.score = detection.score;
        self.confidence_sum += detection.score as f64;
        self.last_detection = detection.bbox;
        self.last_frame = frame_number;
        self.last_seen_s = timestamp_s;
        if !detection.class_label.is_empty() {
            self.class_label.clone_from(&detection.class_label);
        }

        if self.hit_streak >= min_hits || self.state == TrackState::Lost {
            self.state = TrackState::Confirmed;
        }
    }

    /// Record a missed frame.
    pub fn mark_missed(&mut self) {
        if self.state == TrackState::Confirmed {
            self.state = TrackState::Lost;
        }
    }

    pub fn mark_removed(&mut self) {
        self.state = TrackState::Removed;
    }

    pub fn average_confidence(&self) -> f32 {
        if self.hits == 0 {
            0.0
        } else {
            (self.confidence_sum / self.hits as f64) as f32
        }
    }

    pub fn plate(&self) -> Option<&LockedPlate> {
        self.plate.as_ref()
    }

    /// Lock the plate. A second call on the same track is ignored and
    /// returns `false`.
    pub fn lock_plate(&mut self, plate: LockedPlate) -> bool {
        if self.plate.is_some() {
            return false;
        }
        self.plate = Some(plate);
        true
    }

    pub fn appearance_feature(&self) -> Option<&[f32]> {
        self.appearance_feature.as_deref()
    }

    /// Whether the appearance descriptor is missing or older than `cadence` frames.
    pub fn needs_appearance_refresh(&self, frame_number: u64, cadence: u64) -> bool {
        match self.appearance_frame {
            None => true,
            Some(at) => frame_number.saturating_sub(at) >= cadence,
        }
    }

    pub fn set_appearance_feature(&mut self, feature: Vec<f32>, frame_number: u64) {
        self.appearance_feature = Some(feature);
        self.appearance_frame = Some(frame_number);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_id_display() {
        let id = TrackId { base: 17, generation: 0 };
        assert_eq!(id.to_string(), "17");
        assert_eq!(id.reidentified(2).to_string(), "17_R2");
        assert_eq!(id.reidentified(2).base(), 17);
    }

    #[test]
    fn test_track_ids_unique() {
        let a = TrackId::next();
        let b = TrackId::next();
        assert_ne!(a, b);
        assert!(b.base() > a.base());
    }

    #[test]
    fn test_plate_is_write_once() {
        let kf = KalmanFilter::new();
        let det = Detection::new(0.0, 0.0, 50.0, 50.0, 0.9, "car");
        let mut track = Track::spawn(TrackId::next(), &det, &kf, 1, 0.0, 3);
        let first = LockedPlate {
            text: "AB12CDE".into(),
            confidence: 0.5,
            frame_number: 1,
        };
        assert!(track.lock_plate(first.clone()));
        assert!(!track.lock_plate(LockedPlate {
            text: "ZZ99ZZZ".into(),
            confidence: 0.9,
            frame_number: 2,
        }));
        assert_eq!(track.plate(), Some(&first));
    }

    #[test]
    fn test_hit_streak_resets_after_miss() {
        let kf = KalmanFilter::new();
        let det = Detection::new(0.0, 0.0, 50.0, 50.0, 0.9, "car");
        let mut track = Track::spawn(TrackId::next(), &det, &kf, 1, 0.0, 3);
        assert!(track.predict(&kf));
        track.update(&det, &kf, 2, 0.1, 3);
        assert_eq!(track.hit_streak, 2);
        assert!(track.predict(&kf)); // frame 3, missed
        assert!(track.predict(&kf)); // frame 4
        assert_eq!(track.hit_streak, 0);
        assert_eq!(track.time_since_update, 2);
    }
}
