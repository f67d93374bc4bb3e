//! Finalized vehicle records and the sink receiving them at session end.

use std::fs;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::SinkError;
use crate::tracker::{Rect, Track, TrackId};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestFrameRecord {
    pub frame_number: u64,
    pub quality: f32,
    pub bbox: Rect,
}

/// Everything persisted about one vehicle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleRecord {
    pub track_id: TrackId,
    pub class: String,
    pub avg_confidence: f32,
    pub first_seen_frame: u64,
    pub last_seen_frame: u64,
    pub first_seen_s: f64,
    pub last_seen_s: f64,
    /// Frames with a matched detection
    pub frame_count: u32,
    pub plate: Option<String>,
    pub plate_confidence: Option<f32>,
    /// Best first
    pub best_frames: Vec<BestFrameRecord>,
}

impl From<&Track> for VehicleRecord {
    fn from(track: &Track) -> Self {
        Self {
            track_id: track.track_id,
            class: track.class_label.clone(),
            avg_confidence: track.average_confidence(),
            first_seen_frame: track.first_frame,
            last_seen_frame: track.last_frame,
            first_seen_s: track.first_seen_s,
            last_seen_s: track.last_seen_s,
            frame_count: track.hits,
            plate: track.plate().map(|p| p.text.clone()),
            plate_confidence: track.plate().map(|p| p.confidence),
            best_frames: track
                .best_frames
                .sorted()
                .into_iter()
                .map(|f| BestFrameRecord {
                    frame_number: f.frame_number,
                    quality: f.quality,
                    bbox: f.bbox,
                })
                .collect(),
        }
    }
}

/// Consumer of finalized vehicles, called once per session.
pub trait PersistenceSink {
    fn persist(&mut self, session_id: &str, vehicles: &[VehicleRecord]) -> Result<(), SinkError>;
}

impl<S: PersistenceSink + ?Sized> PersistenceSink for Box<S> {
    fn persist(&mut self, session_id: &str, vehicles: &[VehicleRecord]) -> Result<(), SinkError> {
        (**self).persist(session_id, vehicles)
    }
}

/// Writes `<dir>/<session_id>.json` with every record.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl PersistenceSink for JsonFileSink {
    fn persist(&mut self, session_id: &str, vehicles: &[VehicleRecord]) -> Result<(), SinkError> {
        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(vehicles)?;
        let path = self.dir.join(format!("{session_id}.json"));
        fs::write(&path, json)?;
        tracing::debug!(path = %path.display(), count = vehicles.len(), "vehicle records written");
        Ok(())
    }
}
