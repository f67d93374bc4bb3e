//! Sequential frame sources.

use std::fs;
use std::path::{Path, PathBuf};

use image::RgbImage;

use crate::error::VideoError;

const FRAME_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// One decoded frame.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// 1-based frame number
    pub number: u64,
    /// Video time in seconds
    pub timestamp_s: f64,
    pub image: RgbImage,
}

/// Ordered frame source. No seeking.
pub trait VideoSource {
    /// Next frame, or `Ok(None)` at end of stream.
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, VideoError>;

    /// Frame count when known up front.
    fn total_frames(&self) -> Option<u64> {
        None
    }
}

impl<S: VideoSource + ?Sized> VideoSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, VideoError> {
        (**self).next_frame()
    }

    fn total_frames(&self) -> Option<u64> {
        (**self).total_frames()
    }
}

/// Directory of frame images played back in file-name order at a fixed rate.
#[derive(Debug)]
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    next: usize,
    fps: f64,
}

impl ImageSequenceSource {
    pub fn open(dir: impl AsRef<Path>, fps: f64) -> Result<Self, VideoError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(VideoError::NotFound(dir.to_path_buf()));
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let is_frame = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| FRAME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
            if is_frame {
                paths.push(path);
            }
        }
        if paths.is_empty() {
            return Err(VideoError::Empty(dir.to_path_buf()));
        }
        paths.sort();

        tracing::debug!(dir = %dir.display(), frames = paths.len(), fps, "opened image sequence");
        Ok(Self {
            paths,
            next: 0,
            fps: if fps > 0.0 { fps } else { 30.0 },
        })
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }
}

impl VideoSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, VideoError> {
        let Some(path) = self.paths.get(self.next) else {
            return Ok(None);
        };
        let number = self.next as u64 + 1;
        let image = image::open(path)
            .map_err(|source| VideoError::Decode { index: number, source })?
            .to_rgb8();
        self.next += 1;

        Ok(Some(VideoFrame {
            number,
            timestamp_s: (number - 1) as f64 / self.fps,
            image,
        }))
    }

    fn total_frames(&self) -> Option<u64> {
        Some(self.paths.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("platetrack-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_missing_dir_is_not_found() {
        let err = ImageSequenceSource::open("/definitely/not/here", 30.0).unwrap_err();
        assert!(matches!(err, VideoError::NotFound(_)));
    }

    #[test]
    fn test_empty_dir() {
        let dir = temp_dir("empty");
        fs::write(dir.join("notes.txt"), "x").unwrap();
        assert!(matches!(ImageSequenceSource::open(&dir, 30.0), Err(VideoError::Empty(_))));
    }

    #[test]
    fn test_frames_in_name_order() {
        let dir = temp_dir("seq");
        for (name, shade) in [("f002.png", 20u8), ("f001.png", 10), ("f003.png", 30)] {
            RgbImage::from_pixel(4, 4, image::Rgb([shade; 3]))
                .save(dir.join(name))
                .unwrap();
        }
        let mut source = ImageSequenceSource::open(&dir, 10.0).unwrap();
        assert_eq!(source.total_frames(), Some(3));

        let mut shades = Vec::new();
        while let Some(frame) = source.next_frame().unwrap() {
            shades.push((frame.number, frame.timestamp_s, frame.image.get_pixel(0, 0).0[0]));
        }
        assert_eq!(shades, vec![(1, 0.0, 10), (2, 0.1, 20), (3, 0.2, 30)]);
    }
}
