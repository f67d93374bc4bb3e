//! Analysis configuration.
//!
//! Every section deserialises with `#[serde(default)]`, so a JSON document
//! only needs the fields it overrides:
//!
//! ```json
//! { "tracker": { "max_age": 90 }, "stream": { "frame_emit_stride": 3 } }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::integration::DetectorConfig;
use crate::plate::{PlateConfig, PlateFormat};
use crate::reid::ReidConfig;
use crate::stream::StreamConfig;
use crate::tracker::TrackerConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub detector: DetectorConfig,
    pub tracker: TrackerConfig,
    pub reid: ReidConfig,
    pub plate: PlateConfig,
    pub stream: StreamConfig,
}

impl AnalysisConfig {
    /// Parse and validate.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&json)?;
        tracing::debug!(path = %path.display(), "loaded analysis config");
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.detector;
        unit_interval("detector.conf_threshold", d.conf_threshold)?;
        unit_interval("detector.iou_threshold", d.iou_threshold)?;
        if d.input_size == 0 {
            return Err(ConfigError::invalid("detector.input_size", "must be positive"));
        }

        let t = &self.tracker;
        unit_interval("tracker.iou_threshold", t.iou_threshold)?;
        if t.min_hits == 0 {
            return Err(ConfigError::invalid("tracker.min_hits", "must be at least 1"));
        }
        if t.frames_per_vehicle_cap == 0 {
            return Err(ConfigError::invalid("tracker.frames_per_vehicle_cap", "must be at least 1"));
        }

        let r = &self.reid;
        if !(r.window_seconds.is_finite() && r.window_seconds > 0.0) {
            return Err(ConfigError::invalid("reid.window_seconds", "must be positive"));
        }
        unit_interval("reid.similarity_threshold", r.similarity_threshold)?;
        if r.feature_refresh_frames == 0 {
            return Err(ConfigError::invalid("reid.feature_refresh_frames", "must be at least 1"));
        }
        if r.histogram_bins == 0 || r.histogram_bins > 256 {
            return Err(ConfigError::invalid("reid.histogram_bins", "must be in 1..=256"));
        }

        let p = &self.plate;
        if p.ocr_retry_interval_frames == 0 {
            return Err(ConfigError::invalid("plate.ocr_retry_interval_frames", "must be at least 1"));
        }
        if p.min_detection_area < 0.0 {
            return Err(ConfigError::invalid("plate.min_detection_area", "must not be negative"));
        }
        unit_interval("plate.min_frame_quality", p.min_frame_quality)?;
        PlateFormat::new(&p.regional_patterns)?;

        let s = &self.stream;
        if s.frame_emit_stride == 0 {
            return Err(ConfigError::invalid("stream.frame_emit_stride", "must be at least 1"));
        }
        if s.downscale_width == 0 {
            return Err(ConfigError::invalid("stream.downscale_width", "must be positive"));
        }
        if !(1..=100).contains(&s.jpeg_quality) {
            return Err(ConfigError::invalid("stream.jpeg_quality", "must be in 1..=100"));
        }
        if s.progress_interval_frames == 0 {
            return Err(ConfigError::invalid("stream.progress_interval_frames", "must be at least 1"));
        }
        Ok(())
    }
}

fn unit_interval(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{value} is outside [0, 1]")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AnalysisConfig::default();
        config.validate().unwrap();
        assert_eq!(config.tracker.max_age, 150);
        assert_eq!(config.tracker.min_hits, 3);
        assert_eq!(config.reid.window_seconds, 60.0);
        assert_eq!(config.plate.ocr_retry_interval_frames, 5);
        assert_eq!(config.stream.frame_emit_stride, 2);
        assert_eq!(config.detector.classes.len(), 4);
    }

    #[test]
    fn test_partial_override() {
        let config = AnalysisConfig::from_json_str(
            r#"{ "tracker": { "max_age": 90 }, "stream": { "jpeg_quality": 40 } }"#,
        )
        .unwrap();
        assert_eq!(config.tracker.max_age, 90);
        assert_eq!(config.tracker.iou_threshold, 0.3);
        assert_eq!(config.stream.jpeg_quality, 40);
        assert_eq!(config.stream.frame_emit_stride, 2);
    }

    #[test]
    fn test_invalid_values_rejected() {
        for json in [
            r#"{ "tracker": { "min_hits": 0 } }"#,
            r#"{ "detector": { "conf_threshold": 1.5 } }"#,
            r#"{ "stream": { "frame_emit_stride": 0 } }"#,
            r#"{ "stream": { "jpeg_quality": 0 } }"#,
            r#"{ "plate": { "regional_patterns": ["(unclosed"] } }"#,
        ] {
            let err = AnalysisConfig::from_json_str(json).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { .. }), "{json}: {err}");
        }
        assert!(matches!(
            AnalysisConfig::from_json_str("{ nope"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("platetrack-config-{}.json", std::process::id()));
        let mut config = AnalysisConfig::default();
        config.reid.window_seconds = 30.0;
        config.save(&path).unwrap();
        assert_eq!(AnalysisConfig::load(&path).unwrap(), config);

        let missing = AnalysisConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
