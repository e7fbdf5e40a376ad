//! Quality score for one detection.
//!
//! ```text
//! score = 0.40 * normalize(A) + 0.30 * c + 0.20 * (1 - d) + 0.10 * s
//! ```
//!
//! `A` is the box area as a fraction of the frame, `normalize(A) =
//! min(1, A / 0.25)`, `c` the confidence, `d` the center distance over half
//! the frame diagonal (clamped to 1), and `s` the track stability term.

use crate::frame::{BoundingBox, Detection};
use crate::track::TrackSpans;

pub const AREA_WEIGHT: f32 = 0.40;
pub const CONFIDENCE_WEIGHT: f32 = 0.30;
pub const CENTER_WEIGHT: f32 = 0.20;
pub const STABILITY_WEIGHT: f32 = 0.10;

/// Area fraction at which the size term saturates.
pub const AREA_REFERENCE: f32 = 0.25;

/// Pixel dimensions of the frames detections were taken from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameGeometry {
    pub width: f32,
    pub height: f32,
}

impl FrameGeometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width as f32,
            height: height as f32,
        }
    }

    fn area(&self) -> f32 {
        self.width * self.height
    }

    fn half_diagonal(&self) -> f32 {
        self.width.hypot(self.height) / 2.0
    }

    /// Box area as a fraction of the frame, scaled into `[0, 1]`.
    pub fn size_term(&self, bbox: &BoundingBox) -> f32 {
        let frame_area = self.area();
        if frame_area <= 0.0 {
            return 0.0;
        }
        (bbox.area() / frame_area / AREA_REFERENCE).min(1.0)
    }

    /// 0 for a box centered in the frame, 1 at a corner or beyond.
    pub fn center_distance(&self, bbox: &BoundingBox) -> f32 {
        let half_diagonal = self.half_diagonal();
        if half_diagonal <= 0.0 {
            return 1.0;
        }
        let (cx, cy) = bbox.center();
        let distance = (cx - self.width / 2.0).hypot(cy - self.height / 2.0);
        (distance / half_diagonal).clamp(0.0, 1.0)
    }
}

/// Score a detection. `None` for a zero-area or malformed box.
pub fn score(det: &Detection, geometry: &FrameGeometry, tracks: &TrackSpans) -> Option<f32> {
    if !det.bbox.is_valid() {
        return None;
    }
    let size = geometry.size_term(&det.bbox);
    let centrality = 1.0 - geometry.center_distance(&det.bbox);
    let stability = tracks.stability_of(det);
    Some(
        AREA_WEIGHT * size
            + CONFIDENCE_WEIGHT * det.confidence
            + CENTER_WEIGHT * centrality
            + STABILITY_WEIGHT * stability,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::TrackId;

    const EPS: f32 = 1e-5;

    fn det(bbox: BoundingBox, confidence: f32) -> Detection {
        Detection {
            frame_index: 0,
            timestamp: 0.0,
            bbox,
            confidence,
            track_id: None,
        }
    }

    #[test]
    fn quarter_frame_centered_box_scores_full_size_and_center() {
        let geometry = FrameGeometry::new(100, 100);
        let bbox = BoundingBox::new(25.0, 25.0, 75.0, 75.0);
        let s = score(&det(bbox, 1.0), &geometry, &TrackSpans::default()).unwrap();
        assert!((s - 0.9).abs() < EPS, "{s}");
    }

    #[test]
    fn corner_box_gets_no_center_credit() {
        let geometry = FrameGeometry::new(100, 100);
        let corner = BoundingBox::new(-5.0, -5.0, 5.0, 5.0);
        assert!((geometry.center_distance(&corner) - 1.0).abs() < EPS);
        let s = score(&det(corner, 0.5), &geometry, &TrackSpans::default()).unwrap();
        let expected = AREA_WEIGHT * (100.0 / 10_000.0 / AREA_REFERENCE) + CONFIDENCE_WEIGHT * 0.5;
        assert!((s - expected).abs() < EPS, "{s} vs {expected}");
    }

    #[test]
    fn zero_area_box_is_skipped() {
        let geometry = FrameGeometry::new(100, 100);
        let flat = BoundingBox::new(10.0, 10.0, 10.0, 50.0);
        assert!(score(&det(flat, 0.9), &geometry, &TrackSpans::default()).is_none());
    }

    #[test]
    fn mid_track_detection_earns_stability_bonus() {
        let geometry = FrameGeometry::new(100, 100);
        let bbox = BoundingBox::new(25.0, 25.0, 75.0, 75.0);
        let track: Vec<Detection> = [0.0, 1.0, 2.0]
            .iter()
            .map(|&t| Detection {
                timestamp: t,
                track_id: Some(TrackId(4)),
                ..det(bbox, 0.8)
            })
            .collect();
        let spans = TrackSpans::from_detections(&track);
        let edge = score(&track[0], &geometry, &spans).unwrap();
        let middle = score(&track[1], &geometry, &spans).unwrap();
        assert!((middle - edge - STABILITY_WEIGHT).abs() < EPS);
    }
}
