//! Progress events observed by callers of the pipeline.
//!
//! Each stage owns a fixed slice of the 0-100 scale. The mapper only emits a
//! percentage when it increases, and only the `completed` event carries 100.

use std::fmt;
use std::sync::mpsc;

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Analyzing,
    Detecting,
    Extracting,
    Finalizing,
    Completed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Analyzing => "analyzing",
            Stage::Detecting => "detecting",
            Stage::Extracting => "extracting",
            Stage::Finalizing => "finalizing",
            Stage::Completed => "completed",
        }
    }

    /// Percentage sub-range `[start, end]` this stage reports within.
    pub fn range(&self) -> (u8, u8) {
        match self {
            Stage::Analyzing => (0, 10),
            Stage::Detecting => (10, 60),
            Stage::Extracting => (60, 95),
            Stage::Finalizing => (95, 100),
            Stage::Completed => (100, 100),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub percent: u8,
}

/// Receiver of progress events.
pub trait ProgressSink {
    fn report(&mut self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: FnMut(ProgressEvent),
{
    fn report(&mut self, event: ProgressEvent) {
        self(event)
    }
}

/// Channel sink; a hung-up receiver is ignored.
impl ProgressSink for mpsc::Sender<ProgressEvent> {
    fn report(&mut self, event: ProgressEvent) {
        let _ = self.send(event);
    }
}

/// Sink that drops every event.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _event: ProgressEvent) {}
}

/// Maps per-stage fractions onto the global scale and filters repeats.
pub(crate) struct ProgressMapper<'a> {
    sink: &'a mut dyn ProgressSink,
    last: Option<u8>,
}

impl<'a> ProgressMapper<'a> {
    pub(crate) fn new(sink: &'a mut dyn ProgressSink) -> Self {
        Self { sink, last: None }
    }

    /// Report `done / total` of `stage`. Anything short of completion is capped at 99.
    pub(crate) fn stage(&mut self, stage: Stage, done: u64, total: u64) {
        let (start, end) = stage.range();
        let fraction = if total == 0 {
            1.0
        } else {
            (done as f64 / total as f64).clamp(0.0, 1.0)
        };
        let percent = start as f64 + fraction * f64::from(end - start);
        let percent = (percent.floor() as u8).min(99);
        self.emit(stage, percent);
    }

    /// Report the start of a stage.
    pub(crate) fn enter(&mut self, stage: Stage) {
        self.stage(stage, 0, 1);
    }

    pub(crate) fn complete(&mut self) {
        self.emit(Stage::Completed, 100);
    }

    fn emit(&mut self, stage: Stage, percent: u8) {
        if self.last.is_some_and(|last| percent <= last) {
            return;
        }
        self.last = Some(percent);
        self.sink.report(ProgressEvent { stage, percent });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_stage_fractions_onto_ranges() {
        let mut events = Vec::new();
        let mut sink = |e: ProgressEvent| events.push(e);
        let mut mapper = ProgressMapper::new(&mut sink);
        mapper.enter(Stage::Analyzing);
        mapper.stage(Stage::Detecting, 1, 2);
        mapper.stage(Stage::Detecting, 1, 2);
        mapper.stage(Stage::Extracting, 3, 3);
        mapper.stage(Stage::Finalizing, 1, 1);
        mapper.complete();

        let pairs: Vec<(Stage, u8)> = events.iter().map(|e| (e.stage, e.percent)).collect();
        assert_eq!(
            pairs,
            vec![
                (Stage::Analyzing, 0),
                (Stage::Detecting, 35),
                (Stage::Extracting, 95),
                (Stage::Finalizing, 99),
                (Stage::Completed, 100),
            ]
        );
    }

    #[test]
    fn channel_sink_forwards_events() {
        let (mut tx, rx) = mpsc::channel();
        tx.report(ProgressEvent {
            stage: Stage::Detecting,
            percent: 42,
        });
        drop(tx);
        let received: Vec<_> = rx.iter().collect();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].stage.to_string(), "detecting");
    }
}
