//! Deterministic synthetic video addressed as
//! `stub://<name>?frames=N&fps=F&width=W&height=H`.

use anyhow::{anyhow, bail, Result};

use super::file::VideoMetadata;
use crate::frame::VideoFrame;

pub(crate) const STUB_SCHEME: &str = "stub://";

const DEFAULT_FRAMES: u64 = 90;
const DEFAULT_FPS: f64 = 30.0;
const DEFAULT_WIDTH: u32 = 64;
const DEFAULT_HEIGHT: u32 = 36;

pub(crate) struct SyntheticVideo {
    name: String,
    metadata: VideoMetadata,
    next_index: u64,
}

impl SyntheticVideo {
    pub(crate) fn parse(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix(STUB_SCHEME)
            .ok_or_else(|| anyhow!("not a stub:// url"))?;
        let (name, query) = rest.split_once('?').unwrap_or((rest, ""));

        let mut frames = DEFAULT_FRAMES;
        let mut fps = DEFAULT_FPS;
        let mut width = DEFAULT_WIDTH;
        let mut height = DEFAULT_HEIGHT;

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("malformed parameter '{}'", pair))?;
            match key {
                "frames" => frames = value.parse().map_err(|_| anyhow!("bad frames '{}'", value))?,
                "fps" => fps = value.parse().map_err(|_| anyhow!("bad fps '{}'", value))?,
                "width" => width = value.parse().map_err(|_| anyhow!("bad width '{}'", value))?,
                "height" => height = value.parse().map_err(|_| anyhow!("bad height '{}'", value))?,
                other => bail!("unknown parameter '{}'", other),
            }
        }
        if width == 0 || height == 0 {
            bail!("synthetic video needs non-zero dimensions");
        }
        if !fps.is_finite() || fps < 0.0 {
            bail!("synthetic video fps must be a non-negative number");
        }

        let duration_secs = if fps > 0.0 { frames as f64 / fps } else { 0.0 };
        Ok(Self {
            name: name.to_string(),
            metadata: VideoMetadata {
                fps,
                frame_count: frames,
                width,
                height,
                duration_secs,
            },
            next_index: 0,
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<VideoFrame>> {
        if self.next_index >= self.metadata.frame_count {
            return Ok(None);
        }
        let frame = self.render(self.next_index)?;
        self.next_index += 1;
        Ok(Some(frame))
    }

    pub(crate) fn read_frame_at(&mut self, index: u64) -> Result<VideoFrame> {
        if index >= self.metadata.frame_count {
            bail!(
                "seek past end of stream ({} frames)",
                self.metadata.frame_count
            );
        }
        self.next_index = index + 1;
        self.render(index)
    }

    fn render(&self, index: u64) -> Result<VideoFrame> {
        let width = self.metadata.width;
        let height = self.metadata.height;
        let scene = index / 50;
        let mut pixels = vec![0u8; width as usize * height as usize * 3];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + index + scene) % 256) as u8;
        }
        VideoFrame::new(index, width, height, pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_parameters() {
        let video = SyntheticVideo::parse("stub://walk?frames=10&fps=5&width=8&height=4").unwrap();
        assert_eq!(video.name(), "walk");
        let meta = video.metadata();
        assert_eq!(meta.frame_count, 10);
        assert_eq!(meta.width, 8);
        assert_eq!(meta.duration_secs, 2.0);
    }

    #[test]
    fn rejects_malformed_parameters() {
        assert!(SyntheticVideo::parse("stub://x?frames=ten").is_err());
        assert!(SyntheticVideo::parse("stub://x?codec=h264").is_err());
        assert!(SyntheticVideo::parse("stub://x?width=0").is_err());
    }

    #[test]
    fn yields_frames_in_order_then_ends() {
        let mut video = SyntheticVideo::parse("stub://x?frames=3&width=2&height=2").unwrap();
        let indices: Vec<u64> = std::iter::from_fn(|| video.next_frame().unwrap())
            .map(|f| f.index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(video.read_frame_at(3).is_err());
        assert_eq!(video.read_frame_at(1).unwrap().index, 1);
    }
}
