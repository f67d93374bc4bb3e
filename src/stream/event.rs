//! Events published to live consumers.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::tracker::TrackId;

/// One published event, serialised with its name under the `event` key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    AnalysisStarted {
        session_id: String,
        started_at: DateTime<Utc>,
    },
    ProgressUpdate {
        frame_number: u64,
        /// Unknown for live sources
        total_frames: Option<u64>,
        percentage: Option<f32>,
        vehicles_count: usize,
    },
    VehicleDetected {
        track_id: TrackId,
        class: String,
        first_frame: u64,
        confidence: f32,
    },
    PlateDetected {
        track_id: TrackId,
        plate_text: String,
        plate_confidence: f32,
    },
    FrameUpdate {
        frame_number: u64,
        /// JPEG bytes
        encoded_image: Vec<u8>,
        detection_count: usize,
    },
    ProcessingComplete {
        session_id: String,
        total_vehicles: usize,
        total_frames: u64,
        duration_s: f64,
    },
    ProcessingError {
        session_id: String,
        error_message: String,
    },
    AnalysisPaused {
        session_id: String,
        message: String,
    },
    AnalysisResumed {
        session_id: String,
        message: String,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AnalysisStarted { .. } => "analysis_started",
            Self::ProgressUpdate { .. } => "progress_update",
            Self::VehicleDetected { .. } => "vehicle_detected",
            Self::PlateDetected { .. } => "plate_detected",
            Self::FrameUpdate { .. } => "frame_update",
            Self::ProcessingComplete { .. } => "processing_complete",
            Self::ProcessingError { .. } => "processing_error",
            Self::AnalysisPaused { .. } => "analysis_paused",
            Self::AnalysisResumed { .. } => "analysis_resumed",
        }
    }

    /// Progress event; `percentage` is filled in when the total is known.
    pub fn progress(frame_number: u64, total_frames: Option<u64>, vehicles_count: usize) -> Self {
        let percentage = total_frames
            .filter(|&total| total > 0)
            .map(|total| (frame_number as f32 / total as f32 * 100.0).min(100.0));
        Self::ProgressUpdate {
            frame_number,
            total_frames,
            percentage,
            vehicles_count,
        }
    }
}
