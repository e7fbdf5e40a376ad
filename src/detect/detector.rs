//! Person detector: video in, ordered person detections out.
//!
//! `PersonDetector` owns one backend handle, fixed at construction.
//! `DetectionStream` is the event-producing form of a detection run: it owns
//! the decoder for exactly as long as it is alive and yields one event per
//! sampled frame plus a final completion event. `detect` drives a stream to
//! the end and collects the detections.

use std::path::Path;
use std::sync::Arc;

use crate::config::ProcessingConfig;
use crate::detect::backend::{Device, DetectorBackend, ObjectClass};
use crate::detect::registry::BackendRegistry;
use crate::error::{KeyframeError, Result};
use crate::frame::{frame_timestamp, Detection, VideoFrame};
use crate::ingest::{VideoMetadata, VideoSource};
use crate::job::CancelToken;
use crate::track::IouTracker;

/// Output of one step of a detection run.
#[derive(Clone, Debug, PartialEq)]
pub enum DetectEvent {
    /// A sampled frame was analysed. `detections` may be empty.
    Sampled {
        frame_index: u64,
        detections: Vec<Detection>,
        frames_processed: u64,
        frames_total: u64,
    },
    /// End of stream. `frames_processed == frames_total`.
    Finished {
        frames_processed: u64,
        frames_total: u64,
    },
}

#[derive(Clone)]
pub struct PersonDetector {
    backend: Arc<dyn DetectorBackend>,
}

impl PersonDetector {
    pub fn new(backend: Arc<dyn DetectorBackend>) -> Self {
        Self { backend }
    }

    /// Pick the first usable backend in device preference order.
    pub fn from_registry(registry: &BackendRegistry, forced: Option<Device>) -> Result<Self> {
        let backend = registry
            .select(forced)
            .map_err(|e| KeyframeError::processing("loading model", e))?;
        backend
            .warm_up()
            .map_err(|e| KeyframeError::processing("loading model", e))?;
        Ok(Self::new(backend))
    }

    pub fn backend(&self) -> &dyn DetectorBackend {
        self.backend.as_ref()
    }

    /// Open `video` and return a lazy stream of detection events.
    pub fn stream(
        &self,
        video: &Path,
        config: &ProcessingConfig,
        cancel: CancelToken,
    ) -> Result<DetectionStream> {
        let source = VideoSource::open(video)?;
        Ok(DetectionStream::new(
            self.backend.clone(),
            source,
            config,
            cancel,
        ))
    }

    pub fn detect(&self, video: &Path, config: &ProcessingConfig) -> Result<Vec<Detection>> {
        self.detect_with_progress(video, config, |_, _| {}, &CancelToken::new())
    }

    /// Run to completion, reporting `(frames_processed, frames_total)` after
    /// each sampled frame and once more at the end.
    pub fn detect_with_progress<F>(
        &self,
        video: &Path,
        config: &ProcessingConfig,
        mut on_progress: F,
        cancel: &CancelToken,
    ) -> Result<Vec<Detection>>
    where
        F: FnMut(u64, u64),
    {
        let mut detections = Vec::new();
        for event in self.stream(video, config, cancel.clone())? {
            match event? {
                DetectEvent::Sampled {
                    detections: found,
                    frames_processed,
                    frames_total,
                    ..
                } => {
                    detections.extend(found);
                    on_progress(frames_processed, frames_total);
                }
                DetectEvent::Finished {
                    frames_processed,
                    frames_total,
                } => on_progress(frames_processed, frames_total),
            }
        }
        log::info!(
            "PersonDetector: {} detections in {}",
            detections.len(),
            video.display()
        );
        Ok(detections)
    }
}

impl std::fmt::Debug for PersonDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersonDetector")
            .field("backend", &self.backend.name())
            .field("device", &self.backend.device())
            .finish()
    }
}

/// One detection run over one video.
///
/// The decoder is released as soon as the stream ends, fails, or is dropped.
pub struct DetectionStream {
    backend: Arc<dyn DetectorBackend>,
    source: Option<VideoSource>,
    metadata: VideoMetadata,
    sample_rate: u64,
    confidence_threshold: f32,
    tracker: Option<IouTracker>,
    cancel: CancelToken,
    decoded: u64,
}

impl DetectionStream {
    fn new(
        backend: Arc<dyn DetectorBackend>,
        source: VideoSource,
        config: &ProcessingConfig,
        cancel: CancelToken,
    ) -> Self {
        let metadata = source.metadata().clone();
        Self {
            backend,
            source: Some(source),
            metadata,
            sample_rate: u64::from(config.sample_rate.max(1)),
            confidence_threshold: config.confidence_threshold,
            tracker: config.track_persons.then(IouTracker::new),
            cancel,
            decoded: 0,
        }
    }

    pub fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn advance(&mut self) -> Result<Option<DetectEvent>> {
        loop {
            let Some(source) = self.source.as_mut() else {
                return Ok(None);
            };
            self.cancel.check()?;

            let Some(frame) = source.next_frame()? else {
                self.source = None;
                let total = self.metadata.frame_count.max(self.decoded);
                return Ok(Some(DetectEvent::Finished {
                    frames_processed: total,
                    frames_total: total,
                }));
            };
            self.decoded += 1;
            if frame.index % self.sample_rate != 0 {
                continue;
            }

            let frame_index = frame.index;
            let mut detections = self.persons_in(&frame)?;
            drop(frame);
            if let Some(tracker) = self.tracker.as_mut() {
                tracker.update(&mut detections);
            }

            let frames_processed = frame_index + 1;
            return Ok(Some(DetectEvent::Sampled {
                frame_index,
                detections,
                frames_processed,
                frames_total: self.metadata.frame_count.max(frames_processed),
            }));
        }
    }

    fn persons_in(&self, frame: &VideoFrame) -> Result<Vec<Detection>> {
        let boxes = self.backend.detect(frame).map_err(|e| {
            KeyframeError::processing("detecting", e.context(format!("frame {}", frame.index)))
        })?;
        let timestamp = frame_timestamp(frame.index, self.metadata.fps);
        let (width, height) = (frame.width as f32, frame.height as f32);

        Ok(boxes
            .into_iter()
            .filter(|b| b.class == ObjectClass::Person)
            .filter(|b| b.confidence >= self.confidence_threshold)
            .map(|b| Detection {
                frame_index: frame.index,
                timestamp,
                bbox: b.bbox.clamp_to(width, height),
                confidence: b.confidence,
                track_id: None,
            })
            .collect())
    }
}

impl Iterator for DetectionStream {
    type Item = Result<DetectEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(Some(event)) => Some(Ok(event)),
            Ok(None) => None,
            Err(err) => {
                self.source = None;
                Some(Err(err))
            }
        }
    }
}
