//! Person Keyframe Extractor
//!
//! Turns a video into a short list of high-quality frames that contain
//! people, for human review.
//!
//! # Architecture
//!
//! Three components, leaves first:
//!
//! 1. **Detector** (`detect`, `ingest`, `track`): samples every Nth frame,
//!    runs a person detector and emits time-ordered detections.
//! 2. **Selector** (`select`, `metadata`): scores detections, enforces a
//!    minimum spacing in time, keeps the best `max_frames` and writes them
//!    as JPEGs plus `metadata.json`.
//! 3. **Orchestrator** (`pipeline`, `job`, `progress`): derives a plan from
//!    video metadata, drives the two stages, reports staged progress and
//!    turns any failure into a terminal job state.
//!
//! # Module Structure
//!
//! - `frame`: decoded frames, boxes and detections
//! - `ingest`: video sources (local files via FFmpeg, synthetic `stub://`)
//! - `detect`: backends, device preference and the person detector
//! - `config`: processing parameters and the app config loader
//! - `error`: the error taxonomy

pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod job;
pub mod metadata;
pub mod pipeline;
pub mod progress;
pub mod select;
pub mod track;

pub use config::{AppConfig, ConfigOverrides, ProcessingConfig};
pub use detect::{
    default_registry, BackendRegistry, DetectEvent, DetectionStream, DetectorBackend, Device,
    PersonDetector, ScriptedBackend,
};
pub use error::{KeyframeError, Result};
pub use frame::{BoundingBox, Detection, TrackId, VideoFrame};
pub use ingest::{VideoMetadata, VideoSource};
pub use job::{CancelToken, Job, JobState};
pub use metadata::MetadataDocument;
pub use pipeline::{derive_plan, KeyframePipeline, ProcessingResult};
pub use progress::{NoProgress, ProgressEvent, ProgressSink, Stage};
pub use select::{keyframe_filename, Candidate, Keyframe, KeyframeSelector, KeyframeWriter};
