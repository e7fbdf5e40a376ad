//! Error taxonomy for the keyframe pipeline.
//!
//! Unrecoverable conditions (missing or unreadable video) surface
//! immediately. `FrameDecode` is the per-item error the save step recovers
//! from by skipping the candidate. Everything unexpected inside a stage is
//! wrapped in `Processing`, which keeps the original cause as its source.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyframeError {
    #[error("video file not found: {}", .0.display())]
    VideoNotFound(PathBuf),

    #[error("cannot open video {}: {reason}", .path.display())]
    VideoUnreadable { path: PathBuf, reason: String },

    #[error("failed to decode frame {frame_index}: {reason}")]
    FrameDecode { frame_index: u64, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("processing cancelled")]
    Cancelled,

    #[error("processing exceeded its time budget of {0:?}")]
    TimedOut(Duration),

    #[error("{stage} failed: {source:#}")]
    Processing {
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl KeyframeError {
    pub fn unreadable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::VideoUnreadable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn frame_decode(frame_index: u64, reason: impl ToString) -> Self {
        Self::FrameDecode {
            frame_index,
            reason: reason.to_string(),
        }
    }

    pub fn processing(stage: &'static str, source: impl Into<anyhow::Error>) -> Self {
        Self::Processing {
            stage,
            source: source.into(),
        }
    }

    /// True for errors the save step may skip past.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::FrameDecode { .. })
    }
}

pub type Result<T, E = KeyframeError> = std::result::Result<T, E>;
