//! Keyframe selection.
//!
//! Detections are scored, thinned to at most one per `time_threshold`
//! window, and cut to the `max_frames` best. The writer then persists the
//! survivors as JPEGs. Selection is pure and deterministic: identical input
//! gives identical, identically ordered output.

mod dedup;
pub mod scoring;
mod writer;

use serde::{Deserialize, Serialize};

use crate::config::ProcessingConfig;
use crate::frame::{BoundingBox, Detection, TrackId};
use crate::track::TrackSpans;

pub use dedup::{dedup_by_time, top_n};
pub use scoring::FrameGeometry;
pub use writer::KeyframeWriter;

/// A detection with its quality score.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub frame_index: u64,
    pub timestamp: f64,
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub track_id: Option<TrackId>,
    pub score: f32,
}

impl Candidate {
    pub fn new(det: Detection, score: f32) -> Self {
        Self {
            frame_index: det.frame_index,
            timestamp: det.timestamp,
            bbox: det.bbox,
            confidence: det.confidence,
            track_id: det.track_id,
            score,
        }
    }
}

/// A selected candidate whose frame was written to disk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub frame_index: u64,
    pub timestamp: f64,
    pub score: f32,
    pub bbox: BoundingBox,
    pub filename: String,
    pub track_id: Option<TrackId>,
}

impl Keyframe {
    pub fn from_candidate(candidate: &Candidate) -> Self {
        Self {
            frame_index: candidate.frame_index,
            timestamp: candidate.timestamp,
            score: candidate.score,
            bbox: candidate.bbox,
            filename: keyframe_filename(candidate.frame_index, candidate.timestamp),
            track_id: candidate.track_id,
        }
    }
}

/// `frame_00042_t1.40s.jpg`
pub fn keyframe_filename(frame_index: u64, timestamp: f64) -> String {
    format!("frame_{:05}_t{:.2}s.jpg", frame_index, timestamp)
}

/// Scores, deduplicates and ranks detections from one video.
#[derive(Clone, Debug)]
pub struct KeyframeSelector {
    geometry: FrameGeometry,
}

impl KeyframeSelector {
    pub fn new(geometry: FrameGeometry) -> Self {
        Self { geometry }
    }

    /// Score every usable detection. Zero-area boxes are dropped.
    pub fn score(&self, detections: Vec<Detection>) -> Vec<Candidate> {
        let tracks = TrackSpans::from_detections(&detections);
        detections
            .into_iter()
            .filter_map(|det| match scoring::score(&det, &self.geometry, &tracks) {
                Some(score) => Some(Candidate::new(det, score)),
                None => {
                    log::debug!(
                        "KeyframeSelector: skipping degenerate box in frame {}",
                        det.frame_index
                    );
                    None
                }
            })
            .collect()
    }

    /// Best-first, time-spaced candidates, at most `config.max_frames`.
    pub fn select(&self, detections: Vec<Detection>, config: &ProcessingConfig) -> Vec<Candidate> {
        let total = detections.len();
        let scored = self.score(detections);
        let unique = dedup_by_time(scored, config.time_threshold);
        let unique_count = unique.len();
        let selected = top_n(unique, config.max_frames);
        log::info!(
            "KeyframeSelector: {} detections -> {} after dedup -> {} selected",
            total,
            unique_count,
            selected.len()
        );
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(frame_index: u64, timestamp: f64, confidence: f32) -> Detection {
        Detection {
            frame_index,
            timestamp,
            bbox: BoundingBox::new(20.0, 10.0, 44.0, 34.0),
            confidence,
            track_id: None,
        }
    }

    fn selector() -> KeyframeSelector {
        KeyframeSelector::new(FrameGeometry::new(64, 36))
    }

    #[test]
    fn filename_encodes_index_and_time() {
        assert_eq!(keyframe_filename(42, 1.4), "frame_00042_t1.40s.jpg");
        assert_eq!(keyframe_filename(123456, 4115.2), "frame_123456_t4115.20s.jpg");
    }

    #[test]
    fn close_detections_collapse_to_the_earliest() {
        let config = ProcessingConfig::default();
        let picked = selector().select(
            vec![det(10, 0.33, 0.9), det(11, 0.37, 0.99), det(50, 1.67, 0.5)],
            &config,
        );
        let mut times: Vec<f64> = picked.iter().map(|c| c.timestamp).collect();
        times.sort_by(f64::total_cmp);
        assert_eq!(times, vec![0.33, 1.67]);
    }

    #[test]
    fn bound_and_spacing_hold_for_dense_input() {
        let config = ProcessingConfig {
            max_frames: 7,
            time_threshold: 0.5,
            ..Default::default()
        };
        let detections: Vec<Detection> = (0..300)
            .map(|i| det(i, i as f64 / 30.0, 0.5 + (i % 7) as f32 / 20.0))
            .collect();
        let picked = selector().select(detections, &config);
        assert_eq!(picked.len(), 7);

        let mut times: Vec<f64> = picked.iter().map(|c| c.timestamp).collect();
        times.sort_by(f64::total_cmp);
        assert!(times.windows(2).all(|w| w[1] - w[0] + 1e-9 >= 0.5));
        assert!(picked.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn selection_is_deterministic() {
        let config = ProcessingConfig::default();
        let detections: Vec<Detection> = (0..50)
            .map(|i| det(i * 5, i as f64 * 0.7, 0.6 + (i % 3) as f32 / 10.0))
            .collect();
        let first = selector().select(detections.clone(), &config);
        let second = selector().select(detections, &config);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_input_selects_nothing() {
        assert!(selector()
            .select(Vec::new(), &ProcessingConfig::default())
            .is_empty());
    }

    #[test]
    fn max_frames_keeps_the_best_in_order() {
        let config = ProcessingConfig {
            max_frames: 2,
            ..Default::default()
        };
        let candidates: Vec<Candidate> = [0.9, 0.7, 0.5, 0.3, 0.1]
            .iter()
            .enumerate()
            .map(|(i, &score)| Candidate::new(det(i as u64 * 60, i as f64 * 2.0, 0.9), score))
            .collect();
        let unique = dedup_by_time(candidates, config.time_threshold);
        assert_eq!(unique.len(), 5);
        let scores: Vec<f32> = top_n(unique, config.max_frames)
            .iter()
            .map(|c| c.score)
            .collect();
        assert_eq!(scores, vec![0.9, 0.7]);
    }
}
