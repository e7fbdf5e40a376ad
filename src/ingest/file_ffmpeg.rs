//! Local file video source using FFmpeg.
//!
//! Frames are decoded in stream order and converted to packed RGB24. Frame
//! ordinals count decoded frames; seeking maps presentation timestamps back
//! to ordinals through the stream's average frame rate, which is exact only
//! for constant frame rate streams.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;
use std::path::Path;

use super::file::VideoMetadata;
use crate::frame::VideoFrame;

const AV_TIME_BASE: f64 = 1_000_000.0;

pub(crate) struct FfmpegFileSource {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    time_base: f64,
    start_pts: i64,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    metadata: VideoMetadata,
    next_index: u64,
    eof_sent: bool,
}

impl FfmpegFileSource {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("failed to open '{}' with ffmpeg", path.display()))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("file has no video track"))?;
        let stream_index = input_stream.index();
        let time_base = f64::from(input_stream.time_base());
        let start_pts = input_stream.start_time().max(0);

        let mut fps = f64::from(input_stream.avg_frame_rate());
        if !fps.is_finite() || fps <= 0.0 {
            fps = f64::from(input_stream.rate());
        }
        if !fps.is_finite() || fps < 0.0 {
            fps = 0.0;
        }

        let duration_secs = if input_stream.duration() > 0 {
            input_stream.duration() as f64 * time_base
        } else if input.duration() > 0 {
            input.duration() as f64 / AV_TIME_BASE
        } else {
            0.0
        };
        let frame_count = if input_stream.frames() > 0 {
            input_stream.frames() as u64
        } else {
            (duration_secs * fps).round().max(0.0) as u64
        };

        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        let metadata = VideoMetadata {
            fps,
            frame_count,
            width: decoder.width(),
            height: decoder.height(),
            duration_secs,
        };

        Ok(Self {
            input,
            stream_index,
            time_base,
            start_pts,
            decoder,
            scaler,
            metadata,
            next_index: 0,
            eof_sent: false,
        })
    }

    pub(crate) fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<VideoFrame>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        if !self.decode_next(&mut decoded)? {
            return Ok(None);
        }
        let index = self.next_index;
        self.next_index += 1;
        self.convert(&decoded, index).map(Some)
    }

    /// Decode the frame with ordinal `index` after seeking near it.
    ///
    /// The ordinal is recovered as `(pts - start_pts) * time_base * avg_fps`,
    /// while `next_frame` counts decoded frames. The two agree on constant
    /// frame rate streams. On variable frame rate files they can drift apart,
    /// so the frame returned here may be a neighbour of the one `next_frame`
    /// produced for the same ordinal.
    pub(crate) fn read_frame_at(&mut self, index: u64) -> Result<VideoFrame> {
        if self.metadata.fps <= 0.0 {
            return Err(anyhow!("stream has no frame rate; cannot seek"));
        }
        let target_secs = index as f64 / self.metadata.fps;
        let ts = seek_target(target_secs, self.start_pts, self.time_base);
        self.input
            .seek(ts, ..ts)
            .with_context(|| format!("seek to {:.3}s", target_secs))?;
        self.decoder.flush();
        self.eof_sent = false;

        let mut decoded = ffmpeg::frame::Video::empty();
        while self.decode_next(&mut decoded)? {
            let Some(pts) = decoded.timestamp().or(decoded.pts()) else {
                continue;
            };
            let decoded_index =
                pts_ordinal(pts, self.start_pts, self.time_base, self.metadata.fps);
            if decoded_index >= index {
                self.next_index = decoded_index + 1;
                return self.convert(&decoded, index);
            }
        }
        Err(anyhow!("frame {} is past end of stream", index))
    }

    /// Pull one decoded frame, feeding packets as needed. False at end of stream.
    fn decode_next(&mut self, decoded: &mut ffmpeg::frame::Video) -> Result<bool> {
        loop {
            if self.decoder.receive_frame(decoded).is_ok() {
                return Ok(true);
            }
            if self.eof_sent {
                return Ok(false);
            }

            let mut sent = false;
            for (stream, packet) in self.input.packets() {
                if stream.index() != self.stream_index {
                    continue;
                }
                self.decoder
                    .send_packet(&packet)
                    .context("send packet to ffmpeg decoder")?;
                sent = true;
                break;
            }
            if !sent {
                self.decoder.send_eof().context("flush ffmpeg decoder")?;
                self.eof_sent = true;
            }
        }
    }

    fn convert(&mut self, decoded: &ffmpeg::frame::Video, index: u64) -> Result<VideoFrame> {
        let mut rgb_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(decoded, &mut rgb_frame)
            .context("scale frame to RGB")?;
        let (pixels, width, height) = frame_to_pixels(&rgb_frame)?;
        VideoFrame::new(index, width, height, pixels)
    }
}

/// Container seek position (`AV_TIME_BASE` units) for a time measured from
/// the first frame of the stream.
fn seek_target(target_secs: f64, start_pts: i64, time_base: f64) -> i64 {
    let start_secs = start_pts as f64 * time_base;
    ((start_secs + target_secs) * AV_TIME_BASE).round() as i64
}

fn pts_ordinal(pts: i64, start_pts: i64, time_base: f64, fps: f64) -> u64 {
    let secs = (pts - start_pts) as f64 * time_base;
    (secs * fps).round().max(0.0) as u64
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        let packed = data
            .get(..row_bytes * height as usize)
            .context("ffmpeg frame buffer is shorter than its dimensions")?;
        return Ok((packed.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}
