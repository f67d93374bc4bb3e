//! Object detection backends and the adapter normalising their output.

use image::{Rgb, RgbImage, imageops};
use serde::{Deserialize, Serialize};

use super::DetectionBuilder;
use crate::error::DetectorError;
use crate::tracker::Detection;

/// Grey used to pad letterboxed frames.
const LETTERBOX_FILL: u8 = 114;

/// Raw detection output from the model, in model input coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    /// Bounding box: [x1, y1, x2, y2] or [cx, cy, w, h] depending on model
    pub bbox: [f32; 4],
    /// Confidence score
    pub score: f32,
    /// Index into the detector's class names
    pub class_id: usize,
}

/// Black-box object detection engine.
///
/// Implement this trait to connect any detection model to the pipeline.
///
/// # Example
///
/// ```ignore
/// use platetrack_rs::integration::{ObjectDetector, RawDetection};
///
/// struct MyDetector {
///     // Your model here
/// }
///
/// impl ObjectDetector for MyDetector {
///     fn class_names(&self) -> &[String] { &self.names }
///
///     fn infer(&mut self, input: &RgbImage) -> Result<Vec<RawDetection>, DetectorError> {
///         // Run inference on the letterboxed frame
///         Ok(vec![])
///     }
/// }
/// ```
pub trait ObjectDetector {
    /// Class names indexed by `RawDetection::class_id`.
    fn class_names(&self) -> &[String];

    /// Run inference on a frame already letterboxed to [`input_size`](Self::input_size).
    fn infer(&mut self, input: &RgbImage) -> Result<Vec<RawDetection>, DetectorError>;

    /// Model input (width, height). `None` uses the configured square size.
    fn input_size(&self) -> Option<(u32, u32)> {
        None
    }

    /// Whether bbox output is in XYWH format (vs TLBR).
    fn bbox_is_xywh(&self) -> bool {
        true
    }
}

impl<D: ObjectDetector + ?Sized> ObjectDetector for Box<D> {
    fn class_names(&self) -> &[String] {
        (**self).class_names()
    }

    fn infer(&mut self, input: &RgbImage) -> Result<Vec<RawDetection>, DetectorError> {
        (**self).infer(input)
    }

    fn input_size(&self) -> Option<(u32, u32)> {
        (**self).input_size()
    }

    fn bbox_is_xywh(&self) -> bool {
        (**self).bbox_is_xywh()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub conf_threshold: f32,
    /// IoU above which same-class boxes are suppressed
    pub iou_threshold: f32,
    /// Square model input size used when the detector does not report one
    pub input_size: u32,
    /// Class names kept; empty keeps every class
    pub classes: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            conf_threshold: 0.25,
            iou_threshold: 0.45,
            input_size: 640,
            classes: ["car", "truck", "bus", "motorcycle"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Scale and padding applied by [`letterbox`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl Letterbox {
    /// Map a point from model input back to source-frame coordinates.
    pub fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Resize `frame` to fit `(width, height)` keeping aspect ratio, centred on
/// a grey canvas.
pub fn letterbox(frame: &RgbImage, (width, height): (u32, u32)) -> (RgbImage, Letterbox) {
    let (w0, h0) = (frame.width() as f32, frame.height() as f32);
    let scale = (width as f32 / w0).min(height as f32 / h0);
    let new_w = ((w0 * scale).round() as u32).clamp(1, width);
    let new_h = ((h0 * scale).round() as u32).clamp(1, height);
    let pad_x = (width - new_w) / 2;
    let pad_y = (height - new_h) / 2;

    let mut canvas = RgbImage::from_pixel(width, height, Rgb([LETTERBOX_FILL; 3]));
    let resized = imageops::resize(frame, new_w, new_h, imageops::FilterType::Triangle);
    imageops::replace(&mut canvas, &resized, pad_x as i64, pad_y as i64);

    (
        canvas,
        Letterbox {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
        },
    )
}

/// Greedy class-aware non-maximum suppression, highest score first.
pub fn non_max_suppression(detections: &mut Vec<Detection>, iou_threshold: f32) {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut current_index = 0;
    for index in 0..detections.len() {
        let suppressed = (0..current_index).any(|prev| {
            detections[prev].class_label == detections[index].class_label
                && detections[prev].bbox.iou(&detections[index].bbox) > iou_threshold
        });
        if !suppressed {
            detections.swap(current_index, index);
            current_index += 1;
        }
    }
    detections.truncate(current_index);
}

/// Letterboxes frames for the detector and turns its raw output into
/// filtered, suppressed detections in source-frame coordinates.
#[derive(Debug, Clone, Default)]
pub struct DetectionAdapter {
    config: DetectorConfig,
}

impl DetectionAdapter {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Detect on one frame. Engine errors and malformed output yield an
    /// empty list for this frame.
    pub fn detect<D: ObjectDetector + ?Sized>(&self, detector: &mut D, frame: &RgbImage) -> Vec<Detection> {
        if frame.width() == 0 || frame.height() == 0 {
            return Vec::new();
        }
        let size = detector
            .input_size()
            .unwrap_or((self.config.input_size, self.config.input_size));
        let (input, transform) = letterbox(frame, size);

        let raw = match detector.infer(&input) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "detector failed, skipping frame");
                return Vec::new();
            }
        };

        match self.postprocess(detector, raw, transform, frame) {
            Ok(detections) => detections,
            Err(e) => {
                tracing::warn!(error = %e, "detector output rejected, skipping frame");
                Vec::new()
            }
        }
    }

    fn postprocess<D: ObjectDetector + ?Sized>(
        &self,
        detector: &D,
        raw: Vec<RawDetection>,
        transform: Letterbox,
        frame: &RgbImage,
    ) -> Result<Vec<Detection>, DetectorError> {
        let names = detector.class_names();
        let xywh = detector.bbox_is_xywh();
        let mut detections = Vec::with_capacity(raw.len());

        for d in raw {
            if !d.score.is_finite() || d.bbox.iter().any(|v| !v.is_finite()) {
                return Err(DetectorError::Malformed("non-finite value in detector output".into()));
            }
            let label = names.get(d.class_id).ok_or_else(|| {
                DetectorError::Malformed(format!("class id {} out of range", d.class_id))
            })?;
            if d.score < self.config.conf_threshold {
                continue;
            }
            if !self.config.classes.is_empty() && !self.config.classes.contains(label) {
                continue;
            }

            let [a, b, c, e] = d.bbox;
            let builder = DetectionBuilder::new().score(d.score).class_label(label.as_str());
            let builder = if xywh {
                builder.xywh(a, b, c, e)
            } else {
                builder.tlbr(a, b, c, e)
            };
            let mut detection = builder.map_box(|x, y| transform.unmap(x, y)).build();
            detection.bbox = detection.bbox.clip(frame.width(), frame.height());
            if detection.bbox.is_valid() {
                detections.push(detection);
            }
        }

        non_max_suppression(&mut detections, self.config.iou_threshold);
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::Rect;

    struct Scripted {
        names: Vec<String>,
        output: Result<Vec<RawDetection>, DetectorError>,
        seen: Option<(u32, u32)>,
    }

    impl Scripted {
        fn new(output: Result<Vec<RawDetection>, DetectorError>) -> Self {
            Self {
                names: vec!["car".into(), "person".into(), "truck".into()],
                output,
                seen: None,
            }
        }
    }

    impl ObjectDetector for Scripted {
        fn class_names(&self) -> &[String] {
            &self.names
        }

        fn infer(&mut self, input: &RgbImage) -> Result<Vec<RawDetection>, DetectorError> {
            self.seen = Some(input.dimensions());
            match &self.output {
                Ok(raw) => Ok(raw.clone()),
                Err(_) => Err(DetectorError::Inference("boom".into())),
            }
        }

        fn bbox_is_xywh(&self) -> bool {
            false
        }
    }

    fn raw(bbox: [f32; 4], score: f32, class_id: usize) -> RawDetection {
        RawDetection { bbox, score, class_id }
    }

    #[test]
    fn test_letterbox_unmap() {
        let frame = RgbImage::new(1280, 720);
        let (input, lb) = letterbox(&frame, (640, 640));
        assert_eq!(input.dimensions(), (640, 640));
        assert_eq!(lb.scale, 0.5);
        assert_eq!(lb.pad_y, 140.0);
        assert_eq!(*input.get_pixel(0, 0), Rgb([LETTERBOX_FILL; 3]));
        assert_eq!(lb.unmap(320.0, 320.0), (640.0, 360.0));
    }

    #[test]
    fn test_detect_rescales_and_filters() {
        let mut detector = Scripted::new(Ok(vec![
            // car at (200, 100)-(400, 300) in a 1280x720 source
            raw([100.0, 190.0, 200.0, 290.0], 0.9, 0),
            // person is not a vehicle class
            raw([0.0, 200.0, 50.0, 260.0], 0.9, 1),
            // below confidence threshold
            raw([300.0, 200.0, 400.0, 300.0], 0.1, 2),
        ]));
        let adapter = DetectionAdapter::default();
        let dets = adapter.detect(&mut detector, &RgbImage::new(1280, 720));

        assert_eq!(detector.seen, Some((640, 640)));
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_label, "car");
        assert!(dets[0].bbox.iou(&Rect::new(200.0, 100.0, 200.0, 200.0)) > 0.99);
    }

    #[test]
    fn test_nms_is_class_aware() {
        let mut dets = vec![
            Detection::new(0.0, 0.0, 100.0, 100.0, 0.8, "car"),
            Detection::new(5.0, 5.0, 105.0, 105.0, 0.9, "car"),
            Detection::new(5.0, 5.0, 105.0, 105.0, 0.7, "truck"),
        ];
        non_max_suppression(&mut dets, 0.45);
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].score, 0.9);
        assert_eq!(dets[1].class_label, "truck");
    }

    #[test]
    fn test_engine_error_yields_empty() {
        let mut detector = Scripted::new(Err(DetectorError::Inference("boom".into())));
        let dets = DetectionAdapter::default().detect(&mut detector, &RgbImage::new(64, 64));
        assert!(dets.is_empty());
    }

    #[test]
    fn test_malformed_output_yields_empty() {
        let mut detector = Scripted::new(Ok(vec![
            raw([10.0, 10.0, 50.0, 50.0], 0.9, 0),
            raw([10.0, 10.0, 50.0, 50.0], 0.9, 42),
        ]));
        let dets = DetectionAdapter::default().detect(&mut detector, &RgbImage::new(64, 64));
        assert!(dets.is_empty());

        let mut detector = Scripted::new(Ok(vec![raw([f32::NAN, 0.0, 1.0, 1.0], 0.9, 0)]));
        assert!(DetectionAdapter::default().detect(&mut detector, &RgbImage::new(64, 64)).is_empty());
    }
}
