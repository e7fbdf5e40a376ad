//! Decoded frames and the per-frame person observations derived from them.
//!
//! - `VideoFrame`: one decoded RGB24 frame plus its ordinal in the source.
//! - `BoundingBox`: pixel-space `[x1, y1, x2, y2]` box.
//! - `Detection`: one person box in one sampled frame.
//!
//! Only one `VideoFrame` is alive at a time while detecting; detections are
//! small owned records that outlive the frame they came from.

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// VideoFrame
// ----------------------------------------------------------------------------

/// A decoded frame in packed RGB24 layout (`width * height * 3` bytes).
pub struct VideoFrame {
    /// Frame ordinal in the source video, starting at 0.
    pub index: u64,
    pub width: u32,
    pub height: u32,
    pixels: Vec<u8>,
}

impl VideoFrame {
    pub fn new(index: u64, width: u32, height: u32, pixels: Vec<u8>) -> anyhow::Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow::anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            anyhow::bail!(
                "expected {} RGB bytes for {}x{} frame, received {}",
                expected,
                width,
                height,
                pixels.len()
            );
        }
        Ok(Self {
            index,
            width,
            height,
            pixels,
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }
}

impl std::fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoFrame")
            .field("index", &self.index)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// BoundingBox
// ----------------------------------------------------------------------------

/// Axis-aligned box in pixel coordinates. Serialized as `[x1, y1, x2, y2]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
        }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// True when `x2 > x1`, `y2 > y1` and every coordinate is finite.
    pub fn is_valid(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite())
            && self.x2 > self.x1
            && self.y2 > self.y1
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let intersection = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    /// Clamp to `[0, width] x [0, height]`.
    pub fn clamp_to(&self, width: f32, height: f32) -> Self {
        Self {
            x1: self.x1.clamp(0.0, width),
            y1: self.y1.clamp(0.0, height),
            x2: self.x2.clamp(0.0, width),
            y2: self.y2.clamp(0.0, height),
        }
    }
}

impl From<[f32; 4]> for BoundingBox {
    fn from(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

// ----------------------------------------------------------------------------
// Detection
// ----------------------------------------------------------------------------

/// Identity assigned by the multi-frame tracker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub u32);

/// One person observation in one sampled frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub frame_index: u64,
    /// Seconds, `frame_index / fps`.
    pub timestamp: f64,
    pub bbox: BoundingBox,
    pub confidence: f32,
    /// Present only when tracking assigned an identity.
    pub track_id: Option<TrackId>,
}

/// `frame_index / fps`, or 0.0 when the stream reports no usable rate.
pub fn frame_timestamp(frame_index: u64, fps: f64) -> f64 {
    if fps > 0.0 && fps.is_finite() {
        frame_index as f64 / fps
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rejects_wrong_buffer_length() {
        assert!(VideoFrame::new(0, 4, 2, vec![0; 24]).is_ok());
        assert!(VideoFrame::new(0, 4, 2, vec![0; 23]).is_err());
    }

    #[test]
    fn bbox_serializes_as_array() {
        let bbox = BoundingBox::new(1.0, 2.0, 3.5, 4.0);
        let json = serde_json::to_string(&bbox).unwrap();
        assert_eq!(json, "[1.0,2.0,3.5,4.0]");
        let back: BoundingBox = serde_json::from_str(&json).unwrap();
        assert_eq!(back, bbox);
    }

    #[test]
    fn bbox_iou_and_validity() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 0.0, 15.0, 10.0);
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(a.iou(&BoundingBox::new(20.0, 20.0, 30.0, 30.0)), 0.0);
        assert!(!BoundingBox::new(5.0, 5.0, 5.0, 9.0).is_valid());
        assert!(!BoundingBox::new(0.0, 0.0, f32::NAN, 1.0).is_valid());
    }

    #[test]
    fn timestamp_handles_missing_fps() {
        assert_eq!(frame_timestamp(30, 30.0), 1.0);
        assert_eq!(frame_timestamp(30, 0.0), 0.0);
    }

    #[test]
    fn track_id_is_transparent_in_json() {
        let det = Detection {
            frame_index: 3,
            timestamp: 0.1,
            bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
            confidence: 0.9,
            track_id: Some(TrackId(7)),
        };
        let value = serde_json::to_value(&det).unwrap();
        assert_eq!(value["track_id"], 7);
    }
}
