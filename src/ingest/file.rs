//! Video file source.
//!
//! `VideoSource` dispatches to a decoder backend chosen from the path:
//! - `stub://...` opens a deterministic synthetic video
//! - anything else is a local file decoded with FFmpeg
//!
//! Opening classifies failures at the boundary: a path that does not exist
//! is `VideoNotFound`, a file the decoder cannot open is `VideoUnreadable`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[cfg(feature = "ingest-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::synthetic::{SyntheticVideo, STUB_SCHEME};
use crate::error::{KeyframeError, Result};
use crate::frame::VideoFrame;

/// Container-level facts read without decoding the stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Average frame rate; `0.0` when the container does not report one.
    pub fps: f64,
    /// Frame count from headers (estimated from duration when absent).
    pub frame_count: u64,
    pub width: u32,
    pub height: u32,
    pub duration_secs: f64,
}

/// Scoped decoder handle over one video.
pub struct VideoSource {
    path: PathBuf,
    backend: VideoBackend,
}

enum VideoBackend {
    Synthetic(SyntheticVideo),
    #[cfg(feature = "ingest-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl VideoSource {
    pub fn open(path: &Path) -> Result<Self> {
        let raw = path.to_string_lossy();
        if raw.starts_with(STUB_SCHEME) {
            let video =
                SyntheticVideo::parse(&raw).map_err(|e| KeyframeError::unreadable(path, e))?;
            log::debug!("VideoSource: opened synthetic video '{}'", video.name());
            return Ok(Self {
                path: path.to_path_buf(),
                backend: VideoBackend::Synthetic(video),
            });
        }

        if !path.exists() {
            return Err(KeyframeError::VideoNotFound(path.to_path_buf()));
        }

        #[cfg(feature = "ingest-ffmpeg")]
        {
            let source = FfmpegFileSource::open(path)
                .map_err(|e| KeyframeError::unreadable(path, format!("{e:#}")))?;
            log::debug!("VideoSource: opened {} (ffmpeg)", path.display());
            Ok(Self {
                path: path.to_path_buf(),
                backend: VideoBackend::Ffmpeg(source),
            })
        }
        #[cfg(not(feature = "ingest-ffmpeg"))]
        {
            Err(KeyframeError::unreadable(
                path,
                "decoding video files requires the ingest-ffmpeg feature",
            ))
        }
    }

    /// Open, read metadata, release the decoder.
    pub fn probe(path: &Path) -> Result<VideoMetadata> {
        Ok(Self::open(path)?.metadata().clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metadata(&self) -> &VideoMetadata {
        match &self.backend {
            VideoBackend::Synthetic(source) => source.metadata(),
            #[cfg(feature = "ingest-ffmpeg")]
            VideoBackend::Ffmpeg(source) => source.metadata(),
        }
    }

    /// Decode the next frame in stream order. `None` at end of stream.
    pub fn next_frame(&mut self) -> Result<Option<VideoFrame>> {
        let next = match &mut self.backend {
            VideoBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-ffmpeg")]
            VideoBackend::Ffmpeg(source) => source.next_frame(),
        };
        next.map_err(|e| KeyframeError::processing("decoding", e))
    }

    /// Seek to `index` and decode that single frame.
    pub fn read_frame_at(&mut self, index: u64) -> Result<VideoFrame> {
        let frame = match &mut self.backend {
            VideoBackend::Synthetic(source) => source.read_frame_at(index),
            #[cfg(feature = "ingest-ffmpeg")]
            VideoBackend::Ffmpeg(source) => source.read_frame_at(index),
        };
        frame.map_err(|e| KeyframeError::frame_decode(index, format!("{e:#}")))
    }
}

impl Drop for VideoSource {
    fn drop(&mut self) {
        log::debug!("VideoSource: released {}", self.path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_not_found() {
        let err = VideoSource::open(Path::new("/definitely/not/here.mp4")).err().unwrap();
        assert!(matches!(err, KeyframeError::VideoNotFound(_)));
    }

    #[test]
    fn malformed_stub_is_unreadable() {
        let err = VideoSource::open(Path::new("stub://bad?fps=fast")).err().unwrap();
        assert!(matches!(err, KeyframeError::VideoUnreadable { .. }));
    }

    #[test]
    fn garbage_file_is_unreadable() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"definitely not a video container").unwrap();
        let err = VideoSource::open(file.path()).err().unwrap();
        assert!(matches!(err, KeyframeError::VideoUnreadable { .. }), "{err}");
    }

    #[test]
    fn read_past_end_is_frame_decode_error() {
        let mut source = VideoSource::open(Path::new("stub://x?frames=5")).unwrap();
        let err = source.read_frame_at(5).err().unwrap();
        assert!(matches!(err, KeyframeError::FrameDecode { frame_index: 5, .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn probe_reads_metadata() {
        let meta = VideoSource::probe(Path::new("stub://x?frames=60&fps=30")).unwrap();
        assert_eq!(meta.frame_count, 60);
        assert_eq!(meta.duration_secs, 2.0);
    }
}
