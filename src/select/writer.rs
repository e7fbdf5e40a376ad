//! Save step: decode each selected frame and write it as a JPEG.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use super::{Candidate, Keyframe};
use crate::error::{KeyframeError, Result};
use crate::frame::VideoFrame;
use crate::ingest::VideoSource;
use crate::job::CancelToken;

/// Writes keyframe images into one directory.
#[derive(Clone, Debug)]
pub struct KeyframeWriter {
    dir: PathBuf,
    quality: u8,
}

impl KeyframeWriter {
    /// Quality is clamped to the encoder's `1..=100`.
    pub fn new(dir: impl Into<PathBuf>, jpeg_quality: u8) -> Self {
        Self {
            dir: dir.into(),
            quality: jpeg_quality.clamp(1, 100),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save every candidate's frame, in the given order.
    ///
    /// A frame that fails to decode drops only that candidate. Any other
    /// failure aborts the save step.
    pub fn save_all<F>(
        &self,
        video: &Path,
        candidates: &[Candidate],
        cancel: &CancelToken,
        mut on_saved: F,
    ) -> Result<Vec<Keyframe>>
    where
        F: FnMut(u64, u64),
    {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create {}", self.dir.display()))
            .map_err(|e| KeyframeError::processing("extracting", e))?;

        let mut source = VideoSource::open(video)?;
        let total = candidates.len() as u64;
        let mut saved = Vec::with_capacity(candidates.len());

        for (i, candidate) in candidates.iter().enumerate() {
            cancel.check()?;
            match self.save_one(&mut source, candidate) {
                Ok(keyframe) => saved.push(keyframe),
                Err(err) if err.is_recoverable() => {
                    log::warn!("KeyframeWriter: skipping candidate: {}", err);
                }
                Err(err) => return Err(err),
            }
            on_saved(i as u64 + 1, total);
        }

        log::info!(
            "KeyframeWriter: saved {}/{} keyframes to {}",
            saved.len(),
            candidates.len(),
            self.dir.display()
        );
        Ok(saved)
    }

    fn save_one(&self, source: &mut VideoSource, candidate: &Candidate) -> Result<Keyframe> {
        let frame = source.read_frame_at(candidate.frame_index)?;
        let keyframe = Keyframe::from_candidate(candidate);
        let path = self.dir.join(&keyframe.filename);
        let jpeg =
            encode_jpeg(frame, self.quality).map_err(|e| KeyframeError::processing("extracting", e))?;
        fs::write(&path, jpeg)
            .with_context(|| format!("write {}", path.display()))
            .map_err(|e| KeyframeError::processing("extracting", e))?;
        log::debug!("KeyframeWriter: wrote {}", path.display());
        Ok(keyframe)
    }
}

fn encode_jpeg(frame: VideoFrame, quality: u8) -> anyhow::Result<Vec<u8>> {
    let (width, height) = (frame.width, frame.height);
    let image = RgbImage::from_raw(width, height, frame.into_pixels())
        .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", width, height))?;
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(&image)
        .context("encode JPEG")?;
    Ok(out)
}
