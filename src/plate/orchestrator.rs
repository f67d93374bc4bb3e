//! Per-track OCR gating and write-once plate locking.

use std::collections::HashMap;

use image::{RgbImage, imageops};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, OcrError};
use crate::integration::OcrEngine;
use crate::plate::format::{DEFAULT_REGIONAL_PATTERNS, PlateFormat, normalize};
use crate::plate::locator::locate_plate;
use crate::tracker::{LockedPlate, Track, TrackId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlateConfig {
    /// Frames between two OCR attempts on the same track
    pub ocr_retry_interval_frames: u64,
    /// Minimum vehicle box area (px²) worth an OCR call
    pub min_detection_area: f32,
    /// Minimum frame quality score worth an OCR call
    pub min_frame_quality: f32,
    /// Regional plate regexes, matched against normalised text
    pub regional_patterns: Vec<String>,
}

impl Default for PlateConfig {
    fn default() -> Self {
        Self {
            ocr_retry_interval_frames: 5,
            min_detection_area: 800.0,
            min_frame_quality: 0.08,
            regional_patterns: DEFAULT_REGIONAL_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

/// Plates held by live tracks in one session.
#[derive(Debug, Default)]
pub struct ClaimedPlates {
    owners: HashMap<String, TrackId>,
}

impl ClaimedPlates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `text` for `track_id`. Fails with the current owner if another
    /// track holds it.
    pub fn claim(&mut self, text: &str, track_id: TrackId) -> Result<(), TrackId> {
        match self.owners.get(text) {
            Some(&owner) if owner != track_id => Err(owner),
            _ => {
                self.owners.insert(text.to_string(), track_id);
                Ok(())
            }
        }
    }

    pub fn owner(&self, text: &str) -> Option<TrackId> {
        self.owners.get(text).copied()
    }

    /// Claim a plate carried over by re-identification for `track_id`.
    /// Returns `None`, leaving the claim with its owner, when another live
    /// track already holds the text.
    pub fn restore(&mut self, track_id: TrackId, plate: LockedPlate) -> Option<LockedPlate> {
        match self.claim(&plate.text, track_id) {
            Ok(()) => Some(plate),
            Err(owner) => {
                tracing::debug!(%track_id, %owner, plate = %plate.text, "restored plate held by a live track, dropped");
                None
            }
        }
    }

    /// Release every plate held by `track_id`.
    pub fn release_track(&mut self, track_id: TrackId) -> usize {
        let before = self.owners.len();
        self.owners.retain(|_, owner| *owner != track_id);
        before - self.owners.len()
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyLocked,
    RetryInterval,
    TooSmall,
    LowQuality,
}

/// What happened to one track on one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum PlateOutcome {
    /// No OCR call was made
    Skipped(SkipReason),
    /// OCR ran (or failed) without usable text
    NoReading,
    /// Text failed format or confidence checks
    Rejected { text: String, confidence: f32 },
    /// Text already held by another live track
    Duplicate { text: String, owner: TrackId },
    Locked { text: String, confidence: f32 },
}

impl PlateOutcome {
    /// Whether an OCR call was spent.
    pub fn attempted(&self) -> bool {
        !matches!(self, Self::Skipped(_))
    }
}

/// Decides per track and frame whether to spend an OCR call, and locks
/// validated plates exactly once.
#[derive(Debug)]
pub struct PlateOrchestrator {
    config: PlateConfig,
    format: PlateFormat,
    claimed: ClaimedPlates,
}

impl PlateOrchestrator {
    pub fn new(config: PlateConfig) -> Result<Self, ConfigError> {
        let format = PlateFormat::new(&config.regional_patterns)?;
        Ok(Self {
            config,
            format,
            claimed: ClaimedPlates::new(),
        })
    }

    pub fn config(&self) -> &PlateConfig {
        &self.config
    }

    pub fn claimed(&self) -> &ClaimedPlates {
        &self.claimed
    }

    pub fn claimed_mut(&mut self) -> &mut ClaimedPlates {
        &mut self.claimed
    }

    /// Check order: locked, retry interval, box area, frame quality.
    pub fn should_attempt(
        &self,
        track: &Track,
        frame_number: u64,
        quality: f32,
    ) -> Result<(), SkipReason> {
        if track.plate().is_some() {
            return Err(SkipReason::AlreadyLocked);
        }
        if let Some(last) = track.last_ocr_attempt_frame {
            if frame_number.saturating_sub(last) < self.config.ocr_retry_interval_frames {
                return Err(SkipReason::RetryInterval);
            }
        }
        if track.last_detection().area() < self.config.min_detection_area {
            return Err(SkipReason::TooSmall);
        }
        if quality < self.config.min_frame_quality {
            return Err(SkipReason::LowQuality);
        }
        Ok(())
    }

    /// Run the gate and, if it passes, one OCR attempt on `track`.
    pub fn process<O: OcrEngine + ?Sized>(
        &mut self,
        track: &mut Track,
        frame: &RgbImage,
        frame_number: u64,
        quality: f32,
        ocr: &mut O,
    ) -> PlateOutcome {
        if let Err(reason) = self.should_attempt(track, frame_number, quality) {
            tracing::trace!(track_id = %track.track_id, ?reason, "ocr skipped");
            return PlateOutcome::Skipped(reason);
        }

        track.last_ocr_attempt_frame = Some(frame_number);
        track.ocr_attempts += 1;

        let region = locate_plate(frame, track.last_detection());
        let reading = match region.rect.pixel_region(frame.width(), frame.height()) {
            Some((x, y, w, h)) => {
                let crop = imageops::crop_imm(frame, x, y, w, h).to_image();
                ocr.read(&crop)
            }
            None => Err(OcrError::EmptyRegion {
                width: region.rect.width.max(0.0) as u32,
                height: region.rect.height.max(0.0) as u32,
            }),
        };

        let reading = match reading {
            Ok(Some(reading)) => reading,
            Ok(None) => return PlateOutcome::NoReading,
            Err(e) => {
                tracing::warn!(track_id = %track.track_id, error = %e, "ocr attempt failed");
                return PlateOutcome::NoReading;
            }
        };

        let text = normalize(&reading.text);
        let confidence = reading.confidence;
        if !self.format.accepts(&text, confidence) {
            tracing::debug!(track_id = %track.track_id, %text, confidence, "plate reading rejected");
            return PlateOutcome::Rejected { text, confidence };
        }

        if let Err(owner) = self.claimed.claim(&text, track.track_id) {
            tracing::debug!(track_id = %track.track_id, %owner, %text, "duplicate plate rejected");
            return PlateOutcome::Duplicate { text, owner };
        }

        track.lock_plate(LockedPlate {
            text: text.clone(),
            confidence,
            frame_number,
        });
        tracing::info!(
            track_id = %track.track_id,
            plate = %text,
            confidence,
            source = %reading.source,
            "plate locked"
        );
        PlateOutcome::Locked { text, confidence }
    }

    /// Drop the claims of a removed track.
    pub fn release(&mut self, track_id: TrackId) {
        if self.claimed.release_track(track_id) > 0 {
            tracing::debug!(%track_id, "released plate claim");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::OcrReading;
    use crate::tracker::{Detection, KalmanFilter, Rect};
    use image::Rgb;

    struct Scripted(Vec<Result<Option<OcrReading>, OcrError>>, usize);

    impl OcrEngine for Scripted {
        fn read(&mut self, _region: &RgbImage) -> Result<Option<OcrReading>, OcrError> {
            self.1 += 1;
            if self.0.is_empty() {
                Ok(None)
            } else {
                self.0.remove(0)
            }
        }
    }

    fn reading(text: &str, confidence: f32) -> Result<Option<OcrReading>, OcrError> {
        Ok(Some(OcrReading::new(text, confidence, "test")))
    }

    fn track_with_box(bbox: Rect) -> Track {
        let det = Detection::from_rect(bbox, 0.9, "car");
        Track::spawn(TrackId::next(), &det, &KalmanFilter::new(), 1, 0.0, 5)
    }

    fn frame() -> RgbImage {
        RgbImage::from_pixel(320, 240, Rgb([120, 120, 120]))
    }

    #[test]
    fn test_low_confidence_valid_plate_locked() {
        let mut orch = PlateOrchestrator::new(PlateConfig::default()).unwrap();
        let mut track = track_with_box(Rect::new(10.0, 10.0, 200.0, 150.0));
        let mut ocr = Scripted(vec![reading("ab12 cde", 0.04)], 0);

        let outcome = orch.process(&mut track, &frame(), 1, 0.5, &mut ocr);
        assert_eq!(
            outcome,
            PlateOutcome::Locked {
                text: "AB12CDE".into(),
                confidence: 0.04
            }
        );
        assert_eq!(track.plate().unwrap().text, "AB12CDE");
        assert_eq!(orch.claimed().owner("AB12CDE"), Some(track.track_id));

        let outcome = orch.process(&mut track, &frame(), 20, 0.5, &mut ocr);
        assert_eq!(outcome, PlateOutcome::Skipped(SkipReason::AlreadyLocked));
        assert_eq!(ocr.1, 1);
    }

    #[test]
    fn test_duplicate_plate_rejected() {
        let mut orch = PlateOrchestrator::new(PlateConfig::default()).unwrap();
        let mut first = track_with_box(Rect::new(0.0, 0.0, 100.0, 100.0));
        let mut second = track_with_box(Rect::new(150.0, 0.0, 100.0, 100.0));
        let mut ocr = Scripted(vec![reading("XYZ789", 0.5), reading("XYZ789", 0.6)], 0);

        assert!(matches!(
            orch.process(&mut first, &frame(), 1, 0.5, &mut ocr),
            PlateOutcome::Locked { .. }
        ));
        let outcome = orch.process(&mut second, &frame(), 1, 0.5, &mut ocr);
        assert_eq!(
            outcome,
            PlateOutcome::Duplicate {
                text: "XYZ789".into(),
                owner: first.track_id
            }
        );
        assert!(second.plate().is_none());

        orch.release(first.track_id);
        assert!(orch.claimed().is_empty());
    }

    #[test]
    fn test_retry_interval_limits_attempts() {
        let mut orch = PlateOrchestrator::new(PlateConfig::default()).unwrap();
        let mut track = track_with_box(Rect::new(0.0, 0.0, 100.0, 100.0));
        let mut ocr = Scripted(Vec::new(), 0);

        for frame_number in 1..=11 {
            orch.process(&mut track, &frame(), frame_number, 0.5, &mut ocr);
        }
        // Frames 1, 6 and 11.
        assert_eq!(ocr.1, 3);
        assert_eq!(track.ocr_attempts, 3);
        assert_eq!(track.last_ocr_attempt_frame, Some(11));
    }

    #[test]
    fn test_gate_order() {
        let orch = PlateOrchestrator::new(PlateConfig::default()).unwrap();
        let small = track_with_box(Rect::new(0.0, 0.0, 20.0, 20.0));
        assert_eq!(orch.should_attempt(&small, 1, 0.9), Err(SkipReason::TooSmall));
        let large = track_with_box(Rect::new(0.0, 0.0, 100.0, 100.0));
        assert_eq!(orch.should_attempt(&large, 1, 0.05), Err(SkipReason::LowQuality));
        assert_eq!(orch.should_attempt(&large, 1, 0.08), Ok(()));
    }

    #[test]
    fn test_engine_error_counts_as_attempt() {
        let mut orch = PlateOrchestrator::new(PlateConfig::default()).unwrap();
        let mut track = track_with_box(Rect::new(0.0, 0.0, 100.0, 100.0));
        let mut ocr = Scripted(vec![Err(OcrError::Engine("boom".into()))], 0);
        assert_eq!(orch.process(&mut track, &frame(), 1, 0.5, &mut ocr), PlateOutcome::NoReading);
        assert_eq!(track.ocr_attempts, 1);
    }

    #[test]
    fn test_short_fragment_not_locked() {
        let mut orch = PlateOrchestrator::new(PlateConfig::default()).unwrap();
        let mut track = track_with_box(Rect::new(0.0, 0.0, 100.0, 100.0));
        let mut ocr = Scripted(vec![reading("A12", 0.5)], 0);
        assert_eq!(
            orch.process(&mut track, &frame(), 1, 0.5, &mut ocr),
            PlateOutcome::Rejected {
                text: "A12".into(),
                confidence: 0.5
            }
        );
        assert!(track.plate().is_none());
        assert!(orch.claimed().is_empty());
    }

    #[test]
    fn test_restore_respects_live_owner() {
        let mut claimed = ClaimedPlates::new();
        let plate = LockedPlate {
            text: "AB12CDE".into(),
            confidence: 0.4,
            frame_number: 3,
        };
        let holder = TrackId::next();
        let returning = TrackId::next().reidentified(1);

        claimed.claim("AB12CDE", holder).unwrap();
        assert_eq!(claimed.restore(returning, plate.clone()), None);
        assert_eq!(claimed.owner("AB12CDE"), Some(holder));

        claimed.release_track(holder);
        assert_eq!(claimed.restore(returning, plate.clone()), Some(plate));
        assert_eq!(claimed.owner("AB12CDE"), Some(returning));
    }

    #[test]
    fn test_implausible_reading_rejected() {
        let mut orch = PlateOrchestrator::new(PlateConfig::default()).unwrap();
        let mut track = track_with_box(Rect::new(0.0, 0.0, 100.0, 100.0));
        let mut ocr = Scripted(vec![reading("HELLO", 0.9)], 0);
        assert!(matches!(
            orch.process(&mut track, &frame(), 1, 0.5, &mut ocr),
            PlateOutcome::Rejected { .. }
        ));
        assert!(track.plate().is_none());
    }
}
