//! Burn inference backend for object detection.
//!
//! This module provides a `BurnDetector` that implements `ObjectDetector`
//! for running vehicle detection models built with the Burn framework.
//!
//! # Example
//!
//! ```ignore
//! use platetrack_rs::integration::{BurnDetector, BurnModel, RawDetection};
//! use burn::backend::NdArray;
//!
//! // Implement BurnModel for your detection model
//! struct MyYoloModel { /* ... */ }
//!
//! impl BurnModel<NdArray> for MyYoloModel {
//!     fn forward(&self, input: burn::tensor::Tensor<NdArray, 4>) -> Vec<RawDetection> {
//!         // Run inference
//!     }
//! }
//!
//! let model = MyYoloModel::load("model.bin");
//! let detector = BurnDetector::new(model, Default::default(), coco_names());
//! ```

use burn::prelude::*;
use burn::tensor::Tensor;
use image::RgbImage;

use super::{ObjectDetector, RawDetection};
use crate::error::DetectorError;

/// Trait for Burn-based detection models.
///
/// Implement this trait for your specific model architecture.
pub trait BurnModel<B: Backend>: Send + Sync {
    /// Run forward pass on an input tensor of shape [batch, channels, height, width].
    fn forward(&self, input: Tensor<B, 4>) -> Vec<RawDetection>;

    /// Get the expected input size (channels, height, width).
    fn input_size(&self) -> (u32, u32, u32) {
        (3, 640, 640) // Default YOLO input size
    }

    /// Whether bbox output is in XYWH format (vs TLBR).
    fn bbox_is_xywh(&self) -> bool {
        true // Most YOLO variants use XYWH
    }
}

/// Burn-based object detector implementing `ObjectDetector`.
pub struct BurnDetector<B: Backend, M: BurnModel<B>> {
    model: M,
    device: B::Device,
    class_names: Vec<String>,
}

impl<B: Backend, M: BurnModel<B>> BurnDetector<B, M> {
    pub fn new(model: M, device: B::Device, class_names: Vec<String>) -> Self {
        Self {
            model,
            device,
            class_names,
        }
    }

    /// Convert a letterboxed frame to a normalised [1, 3, H, W] tensor.
    pub fn preprocess(&self, input: &RgbImage) -> Result<Tensor<B, 4>, DetectorError> {
        let (channels, target_h, target_w) = self.model.input_size();
        let (width, height) = input.dimensions();
        if channels != 3 || width != target_w || height != target_h {
            return Err(DetectorError::InvalidInputDimensions {
                expected: (channels, target_h, target_w),
                got: (3, height, width),
            });
        }

        // HWC u8 -> CHW f32 in [0, 1]
        let plane = (width * height) as usize;
        let mut data = vec![0.0f32; 3 * plane];
        for (i, pixel) in input.pixels().enumerate() {
            for c in 0..3 {
                data[c * plane + i] = pixel.0[c] as f32 / 255.0;
            }
        }

        let tensor = Tensor::<B, 1>::from_floats(data.as_slice(), &self.device).reshape([
            1,
            3,
            height as usize,
            width as usize,
        ]);
        Ok(tensor)
    }
}

impl<B: Backend, M: BurnModel<B>> ObjectDetector for BurnDetector<B, M> {
    fn class_names(&self) -> &[String] {
        &self.class_names
    }

    fn infer(&mut self, input: &RgbImage) -> Result<Vec<RawDetection>, DetectorError> {
        let tensor = self.preprocess(input)?;
        Ok(self.model.forward(tensor))
    }

    fn input_size(&self) -> Option<(u32, u32)> {
        let (_, height, width) = self.model.input_size();
        Some((width, height))
    }

    fn bbox_is_xywh(&self) -> bool {
        self.model.bbox_is_xywh()
    }
}
