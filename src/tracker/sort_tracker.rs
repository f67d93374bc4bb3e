//! SORT tracker: per-track Kalman prediction plus optimal IoU association.

use serde::{Deserialize, Serialize};

use crate::tracker::arena::TrackArena;
use crate::tracker::kalman_filter::KalmanFilter;
use crate::tracker::matching::{self, AssignmentResult, Detection};
use crate::tracker::rect::Rect;
use crate::tracker::track::{LockedPlate, Track, TrackId};
use crate::tracker::track_state::TrackState;

/// Configuration for the [`SortTracker`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Minimum IoU for a predicted box and a detection to be associated
    pub iou_threshold: f32,
    /// Missed frames tolerated before a track is removed
    pub max_age: u32,
    /// Consecutive hits required before a track is exposed
    pub min_hits: u32,
    /// Expose every matched track during the first `min_hits` frames of the
    /// session. `true` is the literal SORT rule (`age <= min_hits` exposes);
    /// the default `false` only exposes tracks once their hit streak reaches
    /// `min_hits`.
    pub expose_during_burn_in: bool,
    /// Capacity of each track's best-frame set
    pub frames_per_vehicle_cap: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.3,
            max_age: 150,
            min_hits: 3,
            expose_during_burn_in: false,
            frames_per_vehicle_cap: 5,
        }
    }
}

/// Identity recovered for a detection that matched no live track.
#[derive(Debug, Clone)]
pub struct Reidentified {
    pub track_id: TrackId,
    pub plate: Option<LockedPlate>,
    pub appearance_feature: Option<Vec<f32>>,
}

/// Consulted once per unmatched detection before a new track is spawned.
pub trait IdentityResolver {
    fn resolve(&mut self, detection: &Detection, frame_number: u64) -> Option<Reidentified>;
}

/// Resolver that never recovers an identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReid;

impl IdentityResolver for NoReid {
    fn resolve(&mut self, _detection: &Detection, _frame_number: u64) -> Option<Reidentified> {
        None
    }
}

/// Result of one [`SortTracker::update`] call.
#[derive(Debug, Default)]
pub struct TrackerUpdate {
    /// Tracks matched this frame and past the confirmation rule, creation order
    pub exposed: Vec<TrackId>,
    /// Tracks spawned this frame
    pub spawned: Vec<TrackId>,
    /// Tracks removed this frame, handed over by value
    pub removed: Vec<Track>,
}

pub struct SortTracker {
    tracks: TrackArena,
    frame_count: u64,
    config: TrackerConfig,
    kalman_filter: KalmanFilter,
}

impl SortTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            tracks: TrackArena::new(),
            frame_count: 0,
            config,
            kalman_filter: KalmanFilter::default(),
        }
    }

    /// Process one frame of detections.
    ///
    /// Frames must be fed in order; the Kalman state assumes one step per call.
    pub fn update(
        &mut self,
        detections: &[Detection],
        frame_number: u64,
        timestamp_s: f64,
        resolver: &mut dyn IdentityResolver,
    ) -> TrackerUpdate {
        self.frame_count += 1;
        let mut removed = Vec::new();

        // Step 1: Predict, dropping numerically invalid tracks
        let mut invalid = Vec::new();
        for track in self.tracks.iter_mut() {
            if !track.predict(&self.kalman_filter) || !track.rect().is_valid() {
                invalid.push(track.track_id);
            }
        }
        for id in invalid {
            if let Some(mut track) = self.tracks.remove(id) {
                tracing::debug!(track_id = %id, "dropping track with invalid prediction");
                track.mark_removed();
                removed.push(track);
            }
        }

        // Step 2: Associate predicted boxes with detections
        let ids = self.tracks.ids();
        let predicted: Vec<Rect> = ids
            .iter()
            .filter_map(|&id| self.tracks.get(id).map(Track::rect))
            .collect();
        let det_rects: Vec<Rect> = detections.iter().map(|d| d.bbox).collect();

        let AssignmentResult {
            matches,
            unmatched_tracks,
            unmatched_detections,
        } = matching::associate(&predicted, &det_rects, self.config.iou_threshold);

        // Step 3: Update matched tracks
        for (itrack, idet) in matches {
            if let Some(track) = self.tracks.get_mut(ids[itrack]) {
                track.update(
                    &detections[idet],
                    &self.kalman_filter,
                    frame_number,
                    timestamp_s,
                    self.config.min_hits,
                );
            }
        }

        // Step 4: Age unmatched tracks, removing those past max_age
        for itrack in unmatched_tracks {
            let id = ids[itrack];
            let expired = match self.tracks.get_mut(id) {
                Some(track) => {
                    track.mark_missed();
                    track.time_since_update > self.config.max_age
                }
                None => false,
            };
            if expired {
                if let Some(mut track) = self.tracks.remove(id) {
                    tracing::debug!(track_id = %id, age = track.age, "track expired");
                    track.mark_removed();
                    removed.push(track);
                }
            }
        }

        // Step 5: Spawn new tracks for unmatched detections
        let mut spawned = Vec::with_capacity(unmatched_detections.len());
        for idet in unmatched_detections {
            let detection = &detections[idet];
            let recovered = resolver.resolve(detection, frame_number);
            let track_id = recovered
                .as_ref()
                .map(|r| r.track_id)
                .unwrap_or_else(TrackId::next);

            let mut track = Track::spawn(
                track_id,
                detection,
                &self.kalman_filter,
                frame_number,
                timestamp_s,
                self.config.frames_per_vehicle_cap,
            );
            if let Some(recovered) = recovered {
                if let Some(plate) = recovered.plate {
                    track.lock_plate(plate);
                }
                if let Some(feature) = recovered.appearance_feature {
                    track.set_appearance_feature(feature, frame_number);
                }
            }
            tracing::debug!(track_id = %track_id, class = %detection.class_label, "spawned track");
            spawned.push(track_id);
            self.tracks.insert(track);
        }

        // Step 6: Expose tracks matched this frame that passed confirmation
        let burn_in = self.config.expose_during_burn_in && self.frame_count <= self.config.min_hits as u64;
        let exposed = self
            .tracks
            .iter()
            .filter(|t| t.time_since_update < 1 && (t.hit_streak >= self.config.min_hits || burn_in))
            .map(|t| t.track_id)
            .collect();

        tracing::trace!(
            frame = frame_number,
            live = self.tracks.len(),
            removed = removed.len(),
            "tracker update"
        );

        TrackerUpdate {
            exposed,
            spawned,
            removed,
        }
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(id)
    }

    pub fn get_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        self.tracks.get_mut(id)
    }

    /// Live tracks in creation order.
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Hand over every live track, e.g. at the end of a session.
    pub fn drain(&mut self) -> Vec<Track> {
        self.tracks.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn car(x: f32, y: f32) -> Detection {
        Detection::new(x, y, x + 50.0, y + 50.0, 0.9, "car")
    }

    #[test]
    fn test_moving_object_keeps_identity() {
        let mut tracker = SortTracker::new(TrackerConfig::default());
        let mut ids = Vec::new();
        for frame in 1..=10u64 {
            let x = 100.0 + frame as f32 * 4.0;
            let update = tracker.update(&[car(x, 100.0)], frame, frame as f64 / 30.0, &mut NoReid);
            ids.extend(update.exposed);
        }
        assert_eq!(ids.len(), 8);
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_burn_in_exposes_early() {
        let config = TrackerConfig {
            expose_during_burn_in: true,
            ..TrackerConfig::default()
        };
        let mut tracker = SortTracker::new(config);
        let update = tracker.update(&[car(0.0, 0.0)], 1, 0.0, &mut NoReid);
        assert_eq!(update.exposed.len(), 1);
        assert_eq!(tracker.get(update.exposed[0]).unwrap().state, TrackState::Tentative);
    }

    #[test]
    fn test_class_label_refreshed() {
        let mut tracker = SortTracker::new(TrackerConfig::default());
        tracker.update(&[car(0.0, 0.0)], 1, 0.0, &mut NoReid);
        let mut truck = car(0.0, 0.0);
        truck.class_label = "truck".into();
        tracker.update(&[truck], 2, 0.03, &mut NoReid);
        let track = tracker.tracks().next().unwrap();
        assert_eq!(track.class_label, "truck");
        assert_eq!(track.hits, 2);
    }

    #[test]
    fn test_lost_then_recovered_within_max_age() {
        let mut tracker = SortTracker::new(TrackerConfig::default());
        for frame in 1..=4 {
            tracker.update(&[car(0.0, 0.0)], frame, 0.0, &mut NoReid);
        }
        let id = tracker.tracks().next().unwrap().track_id;
        tracker.update(&[], 5, 0.0, &mut NoReid);
        assert_eq!(tracker.get(id).unwrap().state, TrackState::Lost);

        tracker.update(&[car(0.0, 0.0)], 6, 0.0, &mut NoReid);
        let track = tracker.get(id).unwrap();
        assert_eq!(track.state, TrackState::Confirmed);
        assert_eq!(track.hit_streak, 1);
    }

    #[test]
    fn test_invalid_prediction_removes_track() {
        let config = TrackerConfig {
            expose_during_burn_in: true,
            ..TrackerConfig::default()
        };
        let mut tracker = SortTracker::new(config);
        let collapsed = Detection::new(300.0, 300.0, 300.0, 340.0, 0.9, "car");
        let non_finite = Detection::new(f32::NAN, 10.0, 60.0, 60.0, 0.9, "car");
        let first = tracker.update(&[car(0.0, 0.0), collapsed, non_finite], 1, 0.0, &mut NoReid);
        assert_eq!(first.spawned.len(), 3);
        let healthy = first.spawned[0];

        let update = tracker.update(&[car(0.0, 0.0)], 2, 0.03, &mut NoReid);
        let mut removed: Vec<TrackId> = update.removed.iter().map(|t| t.track_id).collect();
        removed.sort();
        let mut expected = first.spawned[1..].to_vec();
        expected.sort();
        assert_eq!(removed, expected);
        assert!(update.removed.iter().all(|t| t.state == TrackState::Removed));
        assert_eq!(update.exposed, vec![healthy]);
        assert_eq!(tracker.len(), 1);
    }

    struct FixedId(TrackId);

    impl IdentityResolver for FixedId {
        fn resolve(&mut self, _detection: &Detection, _frame_number: u64) -> Option<Reidentified> {
            Some(Reidentified {
                track_id: self.0,
                plate: Some(LockedPlate {
                    text: "AB12CDE".into(),
                    confidence: 0.4,
                    frame_number: 1,
                }),
                appearance_feature: None,
            })
        }
    }

    #[test]
    fn test_resolver_supplies_identity_and_plate() {
        let recovered = TrackId::next().reidentified(1);
        let mut tracker = SortTracker::new(TrackerConfig::default());
        let update = tracker.update(&[car(0.0, 0.0)], 1, 0.0, &mut FixedId(recovered));
        assert_eq!(update.spawned, vec![recovered]);
        let track = tracker.get(recovered).unwrap();
        assert_eq!(track.plate().map(|p| p.text.as_str()), Some("AB12CDE"));
    }
}
