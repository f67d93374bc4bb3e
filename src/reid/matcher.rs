//! Time-windowed re-identification of removed tracks.

use std::collections::{HashMap, VecDeque};

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::plate::ClaimedPlates;
use crate::reid::appearance::{color_histogram, cosine_similarity};
use crate::tracker::{Detection, IdentityResolver, LockedPlate, Reidentified, Track, TrackId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReidConfig {
    /// Lower edge of the eligibility band in seconds; the upper edge is twice this
    pub window_seconds: f64,
    /// Minimum cosine similarity between appearance descriptors
    pub similarity_threshold: f32,
    /// Matched frames between appearance refreshes of a live track
    pub feature_refresh_frames: u64,
    /// Histogram buckets per colour channel
    pub histogram_bins: usize,
}

impl Default for ReidConfig {
    fn default() -> Self {
        Self {
            window_seconds: 60.0,
            similarity_threshold: 0.7,
            feature_refresh_frames: 10,
            histogram_bins: 8,
        }
    }
}

/// Snapshot of a removed track kept for possible re-identification.
#[derive(Debug, Clone)]
pub struct LostTrack {
    pub track_id: TrackId,
    pub class_label: String,
    pub appearance_feature: Vec<f32>,
    pub last_seen_s: f64,
    pub plate: Option<LockedPlate>,
}

/// Holds lost tracks ordered by `last_seen_s` and matches new detections
/// against those inside the eligibility band.
#[derive(Debug, Default)]
pub struct ReidMatcher {
    config: ReidConfig,
    lost: VecDeque<LostTrack>,
    generations: HashMap<u64, u32>,
}

impl ReidMatcher {
    pub fn new(config: ReidConfig) -> Self {
        Self {
            config,
            lost: VecDeque::new(),
            generations: HashMap::new(),
        }
    }

    pub fn config(&self) -> &ReidConfig {
        &self.config
    }

    /// Keep a removed track for later matching. Tracks without an appearance
    /// descriptor cannot be matched and are ignored; returns whether it was kept.
    pub fn remember(&mut self, track: &Track) -> bool {
        let Some(feature) = track.appearance_feature() else {
            return false;
        };
        let lost = LostTrack {
            track_id: track.track_id,
            class_label: track.class_label.clone(),
            appearance_feature: feature.to_vec(),
            last_seen_s: track.last_seen_s,
            plate: track.plate().cloned(),
        };
        let at = self
            .lost
            .partition_point(|l| l.last_seen_s <= lost.last_seen_s);
        self.lost.insert(at, lost);
        true
    }

    /// `window <= elapsed <= 2 * window`.
    pub fn is_eligible(&self, elapsed_s: f64) -> bool {
        let window = self.config.window_seconds;
        elapsed_s >= window && elapsed_s <= 2.0 * window
    }

    /// Best eligible lost track of the same class with similarity at or above
    /// the threshold. A match consumes the lost entry.
    pub fn find_match(
        &mut self,
        class_label: &str,
        feature: &[f32],
        now_s: f64,
    ) -> Option<Reidentified> {
        let (index, similarity) = self
            .lost
            .iter()
            .enumerate()
            .filter(|(_, l)| l.class_label == class_label && self.is_eligible(now_s - l.last_seen_s))
            .map(|(i, l)| (i, cosine_similarity(&l.appearance_feature, feature)))
            .filter(|&(_, s)| s >= self.config.similarity_threshold)
            .max_by(|a, b| a.1.total_cmp(&b.1))?;

        let lost = self.lost.remove(index)?;
        let generation = self.generations.entry(lost.track_id.base()).or_insert(0);
        *generation += 1;
        let track_id = lost.track_id.reidentified(*generation);

        tracing::info!(
            original = %lost.track_id,
            track_id = %track_id,
            similarity,
            lost_for_s = now_s - lost.last_seen_s,
            "re-identified vehicle"
        );

        Some(Reidentified {
            track_id,
            plate: lost.plate,
            appearance_feature: Some(feature.to_vec()),
        })
    }

    /// Purge entries whose band has expired.
    pub fn sweep(&mut self, now_s: f64) -> usize {
        let horizon = 2.0 * self.config.window_seconds;
        let mut purged = 0;
        while let Some(front) = self.lost.front() {
            if now_s - front.last_seen_s <= horizon {
                break;
            }
            self.lost.pop_front();
            purged += 1;
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.lost.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lost.is_empty()
    }

    /// Bind the matcher to the current frame for one tracker update.
    pub fn resolver<'a>(&'a mut self, frame: &'a RgbImage, now_s: f64) -> FrameResolver<'a> {
        FrameResolver {
            matcher: self,
            frame,
            now_s,
            claims: None,
        }
    }
}

/// [`IdentityResolver`] computing descriptors for unmatched detections from
/// the current frame.
pub struct FrameResolver<'a> {
    matcher: &'a mut ReidMatcher,
    frame: &'a RgbImage,
    now_s: f64,
    claims: Option<&'a mut ClaimedPlates>,
}

impl<'a> FrameResolver<'a> {
    /// Restore a lost track's plate only if no live track holds it, claiming
    /// it for the recovered id. Without claims plates are restored as kept.
    pub fn with_claims(mut self, claims: &'a mut ClaimedPlates) -> Self {
        self.claims = Some(claims);
        self
    }
}

impl IdentityResolver for FrameResolver<'_> {
    fn resolve(&mut self, detection: &Detection, _frame_number: u64) -> Option<Reidentified> {
        if self.matcher.is_empty() {
            return None;
        }
        let feature = color_histogram(
            self.frame,
            detection.bbox,
            self.matcher.config.histogram_bins,
        )?;
        let mut found = self
            .matcher
            .find_match(&detection.class_label, &feature, self.now_s)?;
        if let Some(claims) = self.claims.as_deref_mut() {
            let track_id = found.track_id;
            found.plate = found.plate.take().and_then(|plate| claims.restore(track_id, plate));
        }
        Some(found)
    }
}
