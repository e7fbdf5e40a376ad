use std::collections::{HashMap, HashSet};

use anyhow::{anyhow, Result};

use crate::detect::backend::{Device, DetectorBackend, ObjectBox, ObjectClass};
use crate::frame::{BoundingBox, VideoFrame};

/// Backend that replays canned boxes keyed by frame index.
///
/// Used by tests and synthetic demos. Frames without a script entry fall
/// back to the `default_boxes`, which start out empty.
#[derive(Clone, Debug)]
pub struct ScriptedBackend {
    device: Device,
    frames: HashMap<u64, Vec<ObjectBox>>,
    default_boxes: Vec<ObjectBox>,
    failing_frames: HashSet<u64>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            device: Device::Cpu,
            frames: HashMap::new(),
            default_boxes: Vec::new(),
            failing_frames: HashSet::new(),
        }
    }

    pub fn on_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Add a person box to one frame.
    pub fn with_person(mut self, frame_index: u64, bbox: BoundingBox, confidence: f32) -> Self {
        self.frames.entry(frame_index).or_default().push(ObjectBox {
            bbox,
            confidence,
            class: ObjectClass::Person,
        });
        self
    }

    /// Add an arbitrary box to one frame.
    pub fn with_box(mut self, frame_index: u64, object: ObjectBox) -> Self {
        self.frames.entry(frame_index).or_default().push(object);
        self
    }

    /// Boxes reported for every frame that has no script entry.
    pub fn with_default_person(mut self, bbox: BoundingBox, confidence: f32) -> Self {
        self.default_boxes.push(ObjectBox {
            bbox,
            confidence,
            class: ObjectClass::Person,
        });
        self
    }

    /// Make inference fail on a frame.
    pub fn failing_on(mut self, frame_index: u64) -> Self {
        self.failing_frames.insert(frame_index);
        self
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn device(&self) -> Device {
        self.device
    }

    fn detect(&self, frame: &VideoFrame) -> Result<Vec<ObjectBox>> {
        if self.failing_frames.contains(&frame.index) {
            return Err(anyhow!("scripted failure on frame {}", frame.index));
        }
        Ok(self
            .frames
            .get(&frame.index)
            .unwrap_or(&self.default_boxes)
            .clone())
    }
}
