//! Error types shared across the crate.
//!
//! Only [`VideoError`] is fatal for a session. Detector, OCR, channel and
//! sink failures are isolated by the component that observes them.

use std::path::PathBuf;

use thiserror::Error;

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Video source could not be opened or read.
#[derive(Debug, Error)]
pub enum VideoError {
    #[error("video source not found: {0}")]
    NotFound(PathBuf),
    #[error("video source contains no frames: {0}")]
    Empty(PathBuf),
    #[error("failed to read frame {index}: {source}")]
    Decode {
        index: u64,
        #[source]
        source: image::ImageError,
    },
    #[error("video source I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure reported by an object detection backend.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("invalid input dimensions: expected {expected:?}, got {got:?}")]
    InvalidInputDimensions {
        expected: (u32, u32, u32),
        got: (u32, u32, u32),
    },
    #[error("preprocessing error: {0}")]
    Preprocessing(String),
    #[error("inference error: {0}")]
    Inference(String),
    #[error("malformed detector output: {0}")]
    Malformed(String),
}

/// Failure reported by an OCR backend.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("ocr engine error: {0}")]
    Engine(String),
    #[error("empty region {width}x{height}")]
    EmptyRegion { width: u32, height: u32 },
}

/// Failure while publishing an event.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel closed")]
    Closed,
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("failed to encode frame: {0}")]
    Encode(#[from] image::ImageError),
}

/// Failure while handing finalized vehicles to the persistence sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("persistence sink rejected {count} records: {reason}")]
    Rejected { count: usize, reason: String },
    #[error("persistence sink I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode vehicle records: {0}")]
    Encode(#[from] serde_json::Error),
}
