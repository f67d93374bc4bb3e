mod arena;
mod best_frames;
mod kalman_filter;
mod matching;
mod rect;
mod sort_tracker;
mod track;
mod track_state;

pub use arena::TrackArena;
pub use best_frames::{BestFrames, ScoredFrame};
pub use kalman_filter::KalmanFilter;
pub use matching::{AssignmentResult, Detection, associate};
pub use rect::{Rect, iou_batch};
pub use sort_tracker::{
    IdentityResolver, NoReid, Reidentified, SortTracker, TrackerConfig, TrackerUpdate,
};
pub use track::{LockedPlate, Track, TrackId};
pub use track_state::TrackState;
