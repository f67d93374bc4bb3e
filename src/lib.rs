//! Vehicle tracking, re-identification and gated licence-plate reading
//! for a single active video analysis session.
//!
//! The crate is organised leaves first:
//!
//! - [`tracker`]: SORT-style multi-object tracker (Kalman filter + optimal IoU assignment).
//! - [`reid`]: appearance based re-identification of vehicles that left the scene.
//! - [`plate`]: decides when a track is worth an OCR call and locks plates once.
//! - [`session`]: process-wide coordinator allowing one running analysis at a time.
//! - [`stream`]: event taxonomy and the throttled emitter publishing it.
//! - [`integration`]: collaborator traits (detector, OCR, video, sink) and the per-session pipeline.

pub mod config;
pub mod error;
pub mod integration;
pub mod plate;
pub mod reid;
pub mod session;
pub mod stream;
pub mod tracker;

pub use config::AnalysisConfig;
pub use integration::{AnalysisPipeline, DetectionAdapter, SessionReport};
pub use session::{SessionCoordinator, SessionHandle, SessionOutcome};
pub use tracker::{Detection, Rect, SortTracker, Track, TrackId, TrackState, TrackerConfig};
