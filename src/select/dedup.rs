//! Temporal deduplication and final ranking.

use std::cmp::Ordering;

use super::Candidate;

/// Slack for timestamps derived as `index / fps`, so a gap of exactly the
/// threshold is not rejected by rounding (2.3 - 1.3 < 1.0 in f64).
const TIME_EPSILON: f64 = 1e-9;

/// Chronological order; equal timestamps put the stronger candidate first.
fn chronological(a: &Candidate, b: &Candidate) -> Ordering {
    a.timestamp
        .total_cmp(&b.timestamp)
        .then(b.score.total_cmp(&a.score))
        .then(a.frame_index.cmp(&b.frame_index))
        .then_with(|| bbox_order(a, b))
}

fn bbox_order(a: &Candidate, b: &Candidate) -> Ordering {
    let a: [f32; 4] = a.bbox.into();
    let b: [f32; 4] = b.bbox.into();
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| x.total_cmp(y))
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Greedy left-to-right sweep: keep a candidate only when it is at least
/// `time_threshold` seconds after the last kept one, within `TIME_EPSILON`.
pub fn dedup_by_time(mut candidates: Vec<Candidate>, time_threshold: f64) -> Vec<Candidate> {
    candidates.sort_by(chronological);
    let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match kept.last() {
            Some(last) if candidate.timestamp - last.timestamp + TIME_EPSILON < time_threshold => {}
            _ => kept.push(candidate),
        }
    }
    kept
}

/// Highest `n` scores, descending. Ties go to the earlier timestamp.
pub fn top_n(mut candidates: Vec<Candidate>, n: usize) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.timestamp.total_cmp(&b.timestamp))
            .then(a.frame_index.cmp(&b.frame_index))
    });
    candidates.truncate(n);
    candidates
}
