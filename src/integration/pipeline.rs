//! AnalysisPipeline running one session's frame loop.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::AnalysisConfig;
use crate::error::{ConfigError, VideoError};
use crate::plate::{PlateOrchestrator, PlateOutcome, frame_quality};
use crate::reid::{ReidMatcher, color_histogram};
use crate::session::{SessionCoordinator, SessionHandle, SessionOutcome};
use crate::stream::render::annotate;
use crate::stream::{Event, EventChannel, StreamingEmitter};
use crate::tracker::{ScoredFrame, SortTracker, Track, TrackId};

use super::{DetectionAdapter, ObjectDetector, OcrEngine, PersistenceSink, VehicleRecord, VideoFrame, VideoSource};

/// Poll period of the stop/resume flags while paused.
const PAUSE_POLL: Duration = Duration::from_millis(50);

/// Result of one [`AnalysisPipeline::run`].
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session_id: String,
    pub outcome: SessionOutcome,
    pub frames_processed: u64,
    /// Every vehicle exposed at least once, removed and still live
    pub vehicles: Vec<VehicleRecord>,
}

/// Detection, tracking, re-identification, plate reading and streaming for
/// one video source at a time.
///
/// The detector and OCR engine are owned by the pipeline; running a session
/// requires a [`SessionHandle`] from the shared [`SessionCoordinator`], which
/// is how a newer session stops this one.
pub struct AnalysisPipeline<D, O> {
    config: AnalysisConfig,
    coordinator: Arc<SessionCoordinator>,
    detector: D,
    ocr: O,
    channel: Box<dyn EventChannel + Send>,
    sink: Box<dyn PersistenceSink + Send>,
}

impl<D: ObjectDetector, O: OcrEngine> AnalysisPipeline<D, O> {
    pub fn new(
        config: AnalysisConfig,
        coordinator: Arc<SessionCoordinator>,
        detector: D,
        ocr: O,
        channel: Box<dyn EventChannel + Send>,
        sink: Box<dyn PersistenceSink + Send>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            coordinator,
            detector,
            ocr,
            channel,
            sink,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn detector_mut(&mut self) -> &mut D {
        &mut self.detector
    }

    /// Run one session to completion, cancellation or failure.
    ///
    /// `open_source` is called after `analysis_started` is published; its
    /// failure is the only fatal error. The session is always handed back to
    /// the coordinator before returning.
    pub fn run<S, F>(&mut self, handle: &SessionHandle, open_source: F) -> SessionReport
    where
        S: VideoSource,
        F: FnOnce() -> Result<S, VideoError>,
    {
        let started = Instant::now();
        let session_id = handle.session_id().to_string();
        let mut emitter = StreamingEmitter::new(session_id.clone(), &mut self.channel, self.config.stream.clone());
        emitter.publish(Event::AnalysisStarted {
            session_id: session_id.clone(),
            started_at: handle.started_at(),
        });
        tracing::info!(%session_id, "analysis started");

        let (outcome, frames_processed, vehicles) =
            match (open_source(), PlateOrchestrator::new(self.config.plate.clone())) {
                (Ok(mut source), Ok(plates)) => {
                    let mut frame_loop = FrameLoop::new(&self.config, plates);
                    let outcome = frame_loop.run(handle, &mut source, &mut self.detector, &mut self.ocr, &mut emitter);
                    let vehicles = frame_loop.finish();
                    (outcome, frame_loop.frames_processed, vehicles)
                }
                (Err(e), _) => {
                    tracing::warn!(%session_id, error = %e, "failed to open video source");
                    (SessionOutcome::Failed(e.to_string()), 0, Vec::new())
                }
                (_, Err(e)) => (SessionOutcome::Failed(e.to_string()), 0, Vec::new()),
            };

        if frames_processed > 0 {
            if let Err(e) = self.sink.persist(&session_id, &vehicles) {
                tracing::warn!(%session_id, error = %e, "failed to persist vehicles");
            }
        }

        match &outcome {
            SessionOutcome::Completed => {
                emitter.publish(Event::ProcessingComplete {
                    session_id: session_id.clone(),
                    total_vehicles: vehicles.len(),
                    total_frames: frames_processed,
                    duration_s: started.elapsed().as_secs_f64(),
                });
            }
            SessionOutcome::Failed(reason) => {
                emitter.publish(Event::ProcessingError {
                    session_id: session_id.clone(),
                    error_message: reason.clone(),
                });
            }
            SessionOutcome::Aborted => {}
        }

        self.coordinator.complete(handle, &outcome);
        tracing::info!(
            %session_id,
            ?outcome,
            frames = frames_processed,
            vehicles = vehicles.len(),
            publish_failures = emitter.failures(),
            "analysis finished"
        );

        SessionReport {
            session_id,
            outcome,
            frames_processed,
            vehicles,
        }
    }
}

/// Per-session state, owned by the worker running the session.
struct FrameLoop {
    adapter: DetectionAdapter,
    tracker: SortTracker,
    reid: ReidMatcher,
    plates: PlateOrchestrator,
    progress_interval: u64,
    frames_processed: u64,
    announced: usize,
    vehicles: Vec<VehicleRecord>,
}

impl FrameLoop {
    fn new(config: &AnalysisConfig, plates: PlateOrchestrator) -> Self {
        Self {
            adapter: DetectionAdapter::new(config.detector.clone()),
            tracker: SortTracker::new(config.tracker.clone()),
            reid: ReidMatcher::new(config.reid.clone()),
            plates,
            progress_interval: config.stream.progress_interval_frames.max(1),
            frames_processed: 0,
            announced: 0,
            vehicles: Vec::new(),
        }
    }

    fn run<S, D, O, C>(
        &mut self,
        handle: &SessionHandle,
        source: &mut S,
        detector: &mut D,
        ocr: &mut O,
        emitter: &mut StreamingEmitter<C>,
    ) -> SessionOutcome
    where
        S: VideoSource,
        D: ObjectDetector,
        O: OcrEngine,
        C: EventChannel,
    {
        handle.mark_running();
        let session_id = handle.session_id();
        let total_frames = source.total_frames();
        let mut paused = false;

        loop {
            if handle.should_stop() {
                tracing::info!(%session_id, frames = self.frames_processed, "stop requested, unwinding");
                return SessionOutcome::Aborted;
            }
            if handle.is_paused() {
                if !paused {
                    paused = true;
                    emitter.publish(Event::AnalysisPaused {
                        session_id: session_id.to_string(),
                        message: format!("paused after {} frames", self.frames_processed),
                    });
                }
                thread::sleep(PAUSE_POLL);
                continue;
            }
            if paused {
                paused = false;
                emitter.publish(Event::AnalysisResumed {
                    session_id: session_id.to_string(),
                    message: format!("resumed at frame {}", self.frames_processed + 1),
                });
            }

            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => return SessionOutcome::Completed,
                Err(e) => {
                    tracing::warn!(%session_id, error = %e, "video source failed");
                    return SessionOutcome::Failed(e.to_string());
                }
            };
            self.process(&frame, detector, ocr, emitter, total_frames);
        }
    }

    fn process<D, O, C>(
        &mut self,
        frame: &VideoFrame,
        detector: &mut D,
        ocr: &mut O,
        emitter: &mut StreamingEmitter<C>,
        total_frames: Option<u64>,
    ) where
        D: ObjectDetector,
        O: OcrEngine,
        C: EventChannel,
    {
        let (number, ts) = (frame.number, frame.timestamp_s);
        let detections = self.adapter.detect(detector, &frame.image);

        self.reid.sweep(ts);
        let update = {
            let mut resolver = self
                .reid
                .resolver(&frame.image, ts)
                .with_claims(self.plates.claimed_mut());
            self.tracker.update(&detections, number, ts, &mut resolver)
        };

        for track in update.removed {
            self.retire(track);
        }

        self.refresh_appearance(&frame.image, number);

        for &id in &update.exposed {
            let Some(track) = self.tracker.get_mut(id) else {
                continue;
            };
            let bbox = track.last_detection();
            let quality = frame_quality(&frame.image, bbox).score();
            track.best_frames.offer(ScoredFrame {
                quality,
                frame_number: number,
                bbox,
            });

            if !track.announced {
                track.announced = true;
                self.announced += 1;
                emitter.publish(Event::VehicleDetected {
                    track_id: id,
                    class: track.class_label.clone(),
                    first_frame: track.first_frame,
                    confidence: track.score,
                });
            }

            if let PlateOutcome::Locked { text, confidence } =
                self.plates.process(track, &frame.image, number, quality, ocr)
            {
                emitter.publish(Event::PlateDetected {
                    track_id: id,
                    plate_text: text,
                    plate_confidence: confidence,
                });
            }
        }

        self.frames_processed += 1;
        if self.frames_processed % self.progress_interval == 0 {
            emitter.publish(Event::progress(number, total_frames, self.announced));
        }

        let tracker = &self.tracker;
        emitter.frame(number, detections.len(), || {
            annotate(&frame.image, tracker.tracks().filter(|t| t.time_since_update == 0))
        });

        tracing::trace!(
            frame = number,
            detections = detections.len(),
            exposed = update.exposed.len(),
            live = self.tracker.len(),
            lost = self.reid.len(),
            "frame processed"
        );
    }

    /// Refresh descriptors of tracks matched this frame on the configured cadence.
    fn refresh_appearance(&mut self, image: &image::RgbImage, number: u64) {
        let cadence = self.reid.config().feature_refresh_frames;
        let bins = self.reid.config().histogram_bins;
        let due: Vec<TrackId> = self
            .tracker
            .tracks()
            .filter(|t| t.time_since_update == 0 && t.needs_appearance_refresh(number, cadence))
            .map(|t| t.track_id)
            .collect();
        for id in due {
            if let Some(track) = self.tracker.get_mut(id) {
                if let Some(feature) = color_histogram(image, track.last_detection(), bins) {
                    track.set_appearance_feature(feature, number);
                }
            }
        }
    }

    fn retire(&mut self, track: Track) {
        self.plates.release(track.track_id);
        if self.reid.remember(&track) {
            tracing::debug!(track_id = %track.track_id, "kept for re-identification");
        }
        if track.announced {
            self.vehicles.push(VehicleRecord::from(&track));
        }
    }

    /// Collect the records of removed and still-live vehicles.
    fn finish(&mut self) -> Vec<VehicleRecord> {
        for track in self.tracker.drain() {
            if track.announced {
                self.vehicles.push(VehicleRecord::from(&track));
            }
        }
        std::mem::take(&mut self.vehicles)
    }
}
