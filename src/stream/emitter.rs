//! Throttled frame encoding and fire-and-forget event publishing.

use image::codecs::jpeg::JpegEncoder;
use image::{RgbImage, imageops};
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;
use crate::stream::event::Event;

/// Pub/sub channel consumed by live clients. At-most-once delivery.
pub trait EventChannel {
    fn publish(&mut self, session_id: &str, event: &Event) -> Result<(), ChannelError>;
}

impl<C: EventChannel + ?Sized> EventChannel for Box<C> {
    fn publish(&mut self, session_id: &str, event: &Event) -> Result<(), ChannelError> {
        (**self).publish(session_id, event)
    }
}

impl<C: EventChannel + ?Sized> EventChannel for &mut C {
    fn publish(&mut self, session_id: &str, event: &Event) -> Result<(), ChannelError> {
        (**self).publish(session_id, event)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Publish a frame image on every n-th processed frame
    pub frame_emit_stride: u64,
    /// Frames wider than this are downscaled before encoding
    pub downscale_width: u32,
    pub jpeg_quality: u8,
    /// Processed frames between two progress events
    pub progress_interval_frames: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            frame_emit_stride: 2,
            downscale_width: 960,
            jpeg_quality: 50,
            progress_interval_frames: 10,
        }
    }
}

/// Publishes a session's events in order. Failures are logged and counted,
/// never returned.
pub struct StreamingEmitter<C> {
    session_id: String,
    channel: C,
    config: StreamConfig,
    frames_seen: u64,
    published: u64,
    failures: u64,
}

impl<C: EventChannel> StreamingEmitter<C> {
    pub fn new(session_id: impl Into<String>, channel: C, config: StreamConfig) -> Self {
        Self {
            session_id: session_id.into(),
            channel,
            config,
            frames_seen: 0,
            published: 0,
            failures: 0,
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Returns whether the channel accepted the event.
    pub fn publish(&mut self, event: Event) -> bool {
        match self.channel.publish(&self.session_id, &event) {
            Ok(()) => {
                self.published += 1;
                true
            }
            Err(e) => {
                self.failures += 1;
                tracing::warn!(
                    session_id = %self.session_id,
                    event = event.name(),
                    error = %e,
                    "publish failed"
                );
                false
            }
        }
    }

    /// Count one processed frame and, on every stride-th call, render,
    /// encode and publish it. Returns whether a `frame_update` was published.
    pub fn frame<F>(&mut self, frame_number: u64, detection_count: usize, render: F) -> bool
    where
        F: FnOnce() -> RgbImage,
    {
        self.frames_seen += 1;
        if self.frames_seen % self.config.frame_emit_stride.max(1) != 0 {
            return false;
        }

        let image = render();
        match encode_frame(&image, self.config.downscale_width, self.config.jpeg_quality) {
            Ok(encoded_image) => self.publish(Event::FrameUpdate {
                frame_number,
                encoded_image,
                detection_count,
            }),
            Err(e) => {
                self.failures += 1;
                tracing::warn!(session_id = %self.session_id, frame = frame_number, error = %e, "frame encoding failed");
                false
            }
        }
    }

    pub fn published(&self) -> u64 {
        self.published
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }
}

/// Downscale to at most `max_width` (keeping aspect) and JPEG encode.
pub fn encode_frame(image: &RgbImage, max_width: u32, quality: u8) -> Result<Vec<u8>, ChannelError> {
    let mut bytes = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100));
        if max_width > 0 && image.width() > max_width {
            let height = ((image.height() as f32 * max_width as f32 / image.width() as f32).round() as u32).max(1);
            let resized = imageops::resize(image, max_width, height, imageops::FilterType::Triangle);
            encoder.encode_image(&resized)?;
        } else {
            encoder.encode_image(image)?;
        }
    }
    Ok(bytes)
}
