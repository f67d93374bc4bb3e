//! Trait for licence-plate OCR backends.

use image::RgbImage;

use crate::error::OcrError;

/// Text read from a plate region.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrReading {
    /// Raw engine text, not yet normalised
    pub text: String,
    /// Engine confidence in [0, 1]
    pub confidence: f32,
    /// Name of the engine (or engine pass) that produced the reading
    pub source: String,
}

impl OcrReading {
    pub fn new(text: impl Into<String>, confidence: f32, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence,
            source: source.into(),
        }
    }
}

/// Black-box OCR engine.
///
/// `Ok(None)` means the engine ran but found no text. Errors are isolated to
/// the attempt by the plate orchestrator.
pub trait OcrEngine {
    fn read(&mut self, region: &RgbImage) -> Result<Option<OcrReading>, OcrError>;
}

impl<O: OcrEngine + ?Sized> OcrEngine for Box<O> {
    fn read(&mut self, region: &RgbImage) -> Result<Option<OcrReading>, OcrError> {
        (**self).read(region)
    }
}
