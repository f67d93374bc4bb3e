//! Licence-plate recognition gating.
//!
//! OCR is expensive, so each confirmed track is checked every frame against a
//! cheap gate (already locked, retry interval, box area, frame quality) before
//! a plate region is located and handed to the engine. A reading is locked
//! into the track at most once, and never if another live track already holds
//! the same text.

mod format;
mod locator;
mod orchestrator;
mod quality;

pub use format::{DEFAULT_REGIONAL_PATTERNS, PlateFormat, normalize};
pub use locator::{PlateRegion, fallback_region, locate_plate};
pub use orchestrator::{ClaimedPlates, PlateConfig, PlateOrchestrator, PlateOutcome, SkipReason};
pub use quality::{FrameQuality, frame_quality};
