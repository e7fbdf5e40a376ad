//! Lightweight multi-frame person tracking.
//!
//! `IouTracker` links detections across consecutive sampled frames by box
//! overlap and stamps them with a `TrackId`. `TrackSpans` summarises the
//! finished tracks so the selector can reward detections that sit mid-track.
//! This is a greedy overlap matcher, not a re-identification tracker.

use std::collections::HashMap;

use crate::frame::{BoundingBox, Detection, TrackId};

const DEFAULT_IOU_THRESHOLD: f32 = 0.3;
const DEFAULT_MAX_MISSED: u32 = 2;

struct ActiveTrack {
    id: TrackId,
    bbox: BoundingBox,
    missed: u32,
}

/// Greedy IoU matcher. Owned by one detection run; never shared.
pub struct IouTracker {
    iou_threshold: f32,
    max_missed: u32,
    next_id: u32,
    tracks: Vec<ActiveTrack>,
}

impl IouTracker {
    pub fn new() -> Self {
        Self::with_params(DEFAULT_IOU_THRESHOLD, DEFAULT_MAX_MISSED)
    }

    pub fn with_params(iou_threshold: f32, max_missed: u32) -> Self {
        Self {
            iou_threshold,
            max_missed,
            next_id: 1,
            tracks: Vec::new(),
        }
    }

    /// Assign track ids to the detections of one sampled frame.
    pub fn update(&mut self, detections: &mut [Detection]) {
        let mut pairs: Vec<(f32, usize, usize)> = Vec::new();
        for (ti, track) in self.tracks.iter().enumerate() {
            for (di, det) in detections.iter().enumerate() {
                let iou = track.bbox.iou(&det.bbox);
                if iou >= self.iou_threshold {
                    pairs.push((iou, ti, di));
                }
            }
        }
        pairs.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

        let mut track_matched = vec![false; self.tracks.len()];
        let mut det_matched = vec![false; detections.len()];
        for (_, ti, di) in pairs {
            if track_matched[ti] || det_matched[di] {
                continue;
            }
            track_matched[ti] = true;
            det_matched[di] = true;
            let track = &mut self.tracks[ti];
            track.bbox = detections[di].bbox;
            track.missed = 0;
            detections[di].track_id = Some(track.id);
        }

        for (track, matched) in self.tracks.iter_mut().zip(&track_matched) {
            if !matched {
                track.missed += 1;
            }
        }
        let max_missed = self.max_missed;
        self.tracks.retain(|track| track.missed <= max_missed);

        for (det, matched) in detections.iter_mut().zip(&det_matched) {
            if *matched {
                continue;
            }
            let id = TrackId(self.next_id);
            self.next_id += 1;
            det.track_id = Some(id);
            self.tracks.push(ActiveTrack {
                id,
                bbox: det.bbox,
                missed: 0,
            });
        }
    }
}

impl Default for IouTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Temporal extent of one track.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackSpan {
    pub start: f64,
    pub end: f64,
    pub detections: usize,
}

impl TrackSpan {
    /// 1.0 at the temporal midpoint, falling linearly to 0.0 at either end.
    /// A track observed at a single instant scores 0.5.
    pub fn stability(&self, timestamp: f64) -> f32 {
        let half_span = (self.end - self.start) / 2.0;
        if half_span <= f64::EPSILON {
            return 0.5;
        }
        let mid = self.start + half_span;
        (1.0 - ((timestamp - mid).abs() / half_span)).clamp(0.0, 1.0) as f32
    }
}

/// Spans of every track present in a detection sequence.
#[derive(Clone, Debug, Default)]
pub struct TrackSpans {
    spans: HashMap<TrackId, TrackSpan>,
}

impl TrackSpans {
    pub fn from_detections(detections: &[Detection]) -> Self {
        let mut spans: HashMap<TrackId, TrackSpan> = HashMap::new();
        for det in detections {
            let Some(id) = det.track_id else {
                continue;
            };
            spans
                .entry(id)
                .and_modify(|span| {
                    span.start = span.start.min(det.timestamp);
                    span.end = span.end.max(det.timestamp);
                    span.detections += 1;
                })
                .or_insert(TrackSpan {
                    start: det.timestamp,
                    end: det.timestamp,
                    detections: 1,
                });
        }
        Self { spans }
    }

    pub fn get(&self, id: TrackId) -> Option<&TrackSpan> {
        self.spans.get(&id)
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Stability term for a detection; 0.0 when it carries no track.
    pub fn stability_of(&self, det: &Detection) -> f32 {
        det.track_id
            .and_then(|id| self.get(id))
            .map(|span| span.stability(det.timestamp))
            .unwrap_or(0.0)
    }
}
