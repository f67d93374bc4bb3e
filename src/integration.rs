//! Integration module connecting external engines with the analysis core.
//!
//! This module provides the collaborator traits (object detector, OCR engine,
//! video source, persistence sink), the adapter normalising detector output,
//! and the per-session [`AnalysisPipeline`].

mod builder;
mod detector;
mod ocr;
mod pipeline;
mod sink;
mod video;

pub use builder::DetectionBuilder;
pub use detector::{
    DetectionAdapter, DetectorConfig, Letterbox, ObjectDetector, RawDetection, letterbox,
    non_max_suppression,
};
pub use ocr::{OcrEngine, OcrReading};
pub use pipeline::{AnalysisPipeline, SessionReport};
pub use sink::{BestFrameRecord, JsonFileSink, PersistenceSink, VehicleRecord};
pub use video::{ImageSequenceSource, VideoFrame, VideoSource};

#[cfg(feature = "burn-backend")]
mod burn_backend;

#[cfg(feature = "burn-backend")]
pub use burn_backend::{BurnDetector, BurnModel};
