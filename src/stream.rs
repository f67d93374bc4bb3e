//! Live result streaming.
//!
//! Structured [`Event`]s go out on every occurrence; rendered frame images
//! only on every `frame_emit_stride`-th processed frame, downscaled and JPEG
//! encoded. Publishing never interrupts frame processing.

mod emitter;
mod event;
mod publisher;
pub mod render;

pub use emitter::{EventChannel, StreamConfig, StreamingEmitter, encode_frame};
pub use event::Event;
pub use publisher::BackgroundPublisher;
