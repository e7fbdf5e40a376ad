//! Video ingestion.
//!
//! `VideoSource` is the single decoder handle used by both the detector
//! (sequential decode) and the keyframe writer (seek + single-frame decode):
//! - Local video files (feature: ingest-ffmpeg)
//! - Synthetic `stub://` videos (tests and demos)
//!
//! A source is owned by exactly one call and released when dropped, so the
//! decoder never outlives the operation that opened it. At most one decoded
//! frame is held at a time.

pub mod file;
#[cfg(feature = "ingest-ffmpeg")]
pub(crate) mod file_ffmpeg;
mod synthetic;

pub use file::{VideoMetadata, VideoSource};
