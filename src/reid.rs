//! Re-identification of vehicles that left the scene and came back.
//!
//! Removed tracks with an appearance descriptor become [`LostTrack`]s. A new
//! detection is linked to one only while the time since it was last seen
//! lies in `[window, 2 * window]`; outside that band it gets a fresh id.

mod appearance;
mod matcher;

pub use appearance::{color_histogram, cosine_similarity};
pub use matcher::{FrameResolver, LostTrack, ReidConfig, ReidMatcher};
