//! Orchestrator: analyze -> detect -> extract -> finalize for one video.
//!
//! The pipeline holds the shared detector and the output root; everything
//! per-video (decoder handles, detections, job state) lives on the stack of
//! one `run` call, so independent videos can be processed concurrently from
//! separate threads.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{AppConfig, ConfigOverrides, ProcessingConfig, SAMPLE_RATE_RANGE};
use crate::detect::{default_registry, PersonDetector};
use crate::error::{KeyframeError, Result};
use crate::ingest::{VideoMetadata, VideoSource};
use crate::job::{CancelToken, Job, JobState};
use crate::metadata::{MetadataDocument, METADATA_FILENAME};
use crate::progress::{ProgressMapper, ProgressSink, Stage};
use crate::select::{FrameGeometry, Keyframe, KeyframeSelector, KeyframeWriter};

/// Videos up to this length are sampled at every frame.
const SHORT_VIDEO_SECS: f64 = 60.0;
/// Target upper bound on frames visited for long videos.
const VISITED_FRAME_BUDGET: u64 = 1800;

const KEYFRAME_SUBDIR: &str = "keyframes";

/// Summary of one successful run.
#[derive(Clone, Debug, Serialize)]
pub struct ProcessingResult {
    pub video_id: String,
    pub video_path: PathBuf,
    pub total_frames_seen: u64,
    pub total_detections: usize,
    pub keyframes_extracted: usize,
    pub processing_time_seconds: f64,
    pub output_directory: PathBuf,
    pub keyframe_dir: PathBuf,
    pub metadata_path: PathBuf,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub keyframes: Vec<Keyframe>,
}

/// Derive the effective config for a video.
///
/// Short videos are sampled densely; long ones get a stride that keeps the
/// number of visited frames near the budget. Explicit overrides win.
pub fn derive_plan(
    metadata: &VideoMetadata,
    defaults: &ProcessingConfig,
    overrides: &ConfigOverrides,
) -> ProcessingConfig {
    let mut plan = defaults.clone();
    let (_, max_rate) = SAMPLE_RATE_RANGE;
    plan.sample_rate = if metadata.duration_secs <= SHORT_VIDEO_SECS {
        1
    } else {
        let proportional = metadata.frame_count.div_ceil(VISITED_FRAME_BUDGET);
        let proportional = u32::try_from(proportional).unwrap_or(max_rate);
        defaults.sample_rate.max(proportional).clamp(1, max_rate)
    };
    overrides.apply(&plan)
}

pub struct KeyframePipeline {
    detector: PersonDetector,
    output_root: PathBuf,
    defaults: ProcessingConfig,
    configured: ConfigOverrides,
    job_timeout: Option<Duration>,
}

impl KeyframePipeline {
    pub fn new(detector: PersonDetector, output_root: impl Into<PathBuf>) -> Self {
        Self {
            detector,
            output_root: output_root.into(),
            defaults: ProcessingConfig::default(),
            configured: ConfigOverrides::default(),
            job_timeout: None,
        }
    }

    /// Build the detector from the compiled-in backends and apply app settings.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let registry = default_registry(&config.model_path);
        let detector = PersonDetector::from_registry(&registry, config.device)?;
        Ok(Self::new(detector, &config.output_dir)
            .with_defaults(config.processing.clone())
            .with_configured(config.configured.clone())
            .with_job_timeout(config.job_timeout))
    }

    pub fn with_defaults(mut self, defaults: ProcessingConfig) -> Self {
        self.defaults = defaults;
        self
    }

    /// Operator-set values that outrank the derived plan. Per-run overrides
    /// still win over these.
    pub fn with_configured(mut self, configured: ConfigOverrides) -> Self {
        self.configured = configured;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn detector(&self) -> &PersonDetector {
        &self.detector
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Effective config for a video with the given per-run overrides.
    pub fn plan(&self, metadata: &VideoMetadata, overrides: &ConfigOverrides) -> ProcessingConfig {
        derive_plan(metadata, &self.defaults, &self.configured.merged(overrides))
    }

    /// Process one video as a fresh job.
    pub fn process_video(
        &self,
        video_id: &str,
        video_path: &Path,
        overrides: &ConfigOverrides,
        sink: &mut dyn ProgressSink,
    ) -> Result<ProcessingResult> {
        let mut job = Job::new(video_id, video_path);
        self.run(&mut job, overrides, sink, &CancelToken::new())
    }

    /// Drive `job` to a terminal state.
    ///
    /// On error the job is marked failed with the error message and the
    /// error is returned unchanged.
    pub fn run(
        &self,
        job: &mut Job,
        overrides: &ConfigOverrides,
        sink: &mut dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<ProcessingResult> {
        let cancel = match self.job_timeout {
            Some(budget) => cancel.with_timeout(budget),
            None => cancel.clone(),
        };
        let mut progress = ProgressMapper::new(sink);
        self.execute(job, overrides, &mut progress, &cancel)
            .inspect_err(|err| job.fail(err.to_string()))
    }

    fn execute(
        &self,
        job: &mut Job,
        overrides: &ConfigOverrides,
        progress: &mut ProgressMapper<'_>,
        cancel: &CancelToken,
    ) -> Result<ProcessingResult> {
        let started_at = Utc::now();
        let clock = Instant::now();
        validate_video_id(&job.video_id)?;
        let video_path = job.video_path.clone();

        // analyzing
        job.advance(JobState::Analyzing)?;
        progress.enter(Stage::Analyzing);
        let metadata = VideoSource::probe(&video_path)?;
        let config = self.plan(&metadata, overrides);
        config.validate()?;
        log::info!(
            "KeyframePipeline: {} ({} frames, {:.1} fps, {:.1}s, {}x{}), sample_rate={}",
            job.video_id,
            metadata.frame_count,
            metadata.fps,
            metadata.duration_secs,
            metadata.width,
            metadata.height,
            config.sample_rate
        );
        progress.stage(Stage::Analyzing, 1, 1);
        cancel.check()?;

        // detecting
        job.advance(JobState::Detecting)?;
        let mut frames_seen = 0;
        let detections = self.detector.detect_with_progress(
            &video_path,
            &config,
            |done, total| {
                frames_seen = done;
                progress.stage(Stage::Detecting, done, total);
            },
            cancel,
        )?;
        let total_detections = detections.len();

        // extracting
        job.advance(JobState::Extracting)?;
        progress.enter(Stage::Extracting);
        let selector = KeyframeSelector::new(FrameGeometry::new(metadata.width, metadata.height));
        let candidates = selector.select(detections, &config);
        let output_directory = self.output_root.join(format!("video-{}", job.video_id));
        let writer = KeyframeWriter::new(output_directory.join(KEYFRAME_SUBDIR), config.jpeg_quality);
        let keyframes = writer.save_all(&video_path, &candidates, cancel, |done, total| {
            progress.stage(Stage::Extracting, done, total)
        })?;

        // finalizing
        progress.enter(Stage::Finalizing);
        let completed_at = Utc::now();
        let processing_time_seconds = clock.elapsed().as_secs_f64();
        let metadata_path = output_directory.join(METADATA_FILENAME);
        let document = MetadataDocument {
            video_id: job.video_id.clone(),
            video_path: video_path.display().to_string(),
            total_frames: frames_seen,
            total_detections,
            keyframes_extracted: keyframes.len(),
            processing_time_seconds,
            started_at,
            completed_at,
            extraction_params: Some((&config).into()),
            keyframes: keyframes.clone(),
        };
        document
            .write(&metadata_path)
            .map_err(|e| KeyframeError::processing("finalizing", e))?;

        job.advance(JobState::Completed)?;
        progress.complete();
        log::info!(
            "KeyframePipeline: {} completed: {} keyframes from {} detections in {:.2}s",
            job.video_id,
            keyframes.len(),
            total_detections,
            processing_time_seconds
        );

        Ok(ProcessingResult {
            video_id: job.video_id.clone(),
            video_path,
            total_frames_seen: frames_seen,
            total_detections,
            keyframes_extracted: keyframes.len(),
            processing_time_seconds,
            keyframe_dir: writer.dir().to_path_buf(),
            output_directory,
            metadata_path,
            started_at,
            completed_at,
            keyframes,
        })
    }
}

/// Video ids name a directory under the output root.
fn validate_video_id(video_id: &str) -> Result<()> {
    let ok = !video_id.is_empty()
        && video_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && !video_id.starts_with('.');
    if ok {
        Ok(())
    } else {
        Err(KeyframeError::InvalidConfig(format!(
            "video id '{video_id}' must be non-empty and use only [A-Za-z0-9._-]"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(frame_count: u64, fps: f64) -> VideoMetadata {
        VideoMetadata {
            fps,
            frame_count,
            width: 640,
            height: 360,
            duration_secs: frame_count as f64 / fps,
        }
    }

    #[test]
    fn short_videos_sample_every_frame() {
        let defaults = ProcessingConfig {
            sample_rate: 5,
            ..Default::default()
        };
        let plan = derive_plan(&meta(1500, 30.0), &defaults, &ConfigOverrides::default());
        assert_eq!(plan.sample_rate, 1);
    }

    #[test]
    fn long_videos_scale_stride_with_length() {
        let defaults = ProcessingConfig::default();
        let none = ConfigOverrides::default();
        // 10 minutes at 30 fps: 18000 frames -> stride 10
        assert_eq!(derive_plan(&meta(18_000, 30.0), &defaults, &none).sample_rate, 10);
        // 2 minutes: 3600 frames -> stride 2
        assert_eq!(derive_plan(&meta(3_600, 30.0), &defaults, &none).sample_rate, 2);
        // 3 hours: clamped
        assert_eq!(derive_plan(&meta(324_000, 30.0), &defaults, &none).sample_rate, 10);
    }

    #[test]
    fn overrides_beat_the_plan() {
        let overrides = ConfigOverrides {
            sample_rate: Some(3),
            max_frames: Some(20),
            ..Default::default()
        };
        let plan = derive_plan(&meta(18_000, 30.0), &ProcessingConfig::default(), &overrides);
        assert_eq!(plan.sample_rate, 3);
        assert_eq!(plan.max_frames, 20);
    }

    #[test]
    fn configured_values_survive_the_short_video_plan() {
        let configured = ConfigOverrides {
            sample_rate: Some(5),
            ..Default::default()
        };
        let pipeline = KeyframePipeline::new(
            PersonDetector::new(std::sync::Arc::new(crate::detect::ScriptedBackend::new())),
            "out",
        )
        .with_defaults(configured.apply(&ProcessingConfig::default()))
        .with_configured(configured);

        let none = ConfigOverrides::default();
        assert_eq!(pipeline.plan(&meta(900, 30.0), &none).sample_rate, 5);

        let caller = ConfigOverrides {
            sample_rate: Some(2),
            ..Default::default()
        };
        assert_eq!(pipeline.plan(&meta(900, 30.0), &caller).sample_rate, 2);
    }

    #[test]
    fn video_ids_must_be_path_safe() {
        assert!(validate_video_id("a1b2-c3_d4.v2").is_ok());
        for bad in ["", "../etc", "a/b", ".hidden"] {
            assert!(validate_video_id(bad).is_err(), "{bad}");
        }
    }
}
