use serde::Serialize;

/// Track lifecycle for multi-object tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackState {
    /// Newly spawned track, not yet confirmed by repeated hits
    #[default]
    Tentative,
    /// Verified by at least `min_hits` consecutive hits
    Confirmed,
    /// Confirmed once, missed at least the latest frame
    Lost,
    /// Exceeded `max_age` or became numerically invalid
    Removed,
}
