use anyhow::{anyhow, Result};
use std::fmt;
use std::str::FromStr;

use crate::frame::{BoundingBox, VideoFrame};

/// Compute device a backend runs inference on, in preference order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Device {
    /// Dedicated accelerator (Apple Neural Engine / Metal).
    Accelerator,
    /// General-purpose GPU (CUDA).
    Gpu,
    Cpu,
}

impl Device {
    pub const PREFERENCE_ORDER: [Device; 3] = [Device::Accelerator, Device::Gpu, Device::Cpu];

    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Accelerator => "accelerator",
            Device::Gpu => "gpu",
            Device::Cpu => "cpu",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Device {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "accelerator" | "mps" => Ok(Device::Accelerator),
            "gpu" | "cuda" => Ok(Device::Gpu),
            "cpu" => Ok(Device::Cpu),
            other => Err(anyhow!(
                "unknown device '{}' (expected auto, accelerator, gpu or cpu)",
                other
            )),
        }
    }
}

#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectClass {
    Person,
    Vehicle,
    Animal,
    Unknown,
}

impl ObjectClass {
    /// Map a COCO-80 class index onto the coarse classes we care about.
    pub fn from_coco(class_id: usize) -> Self {
        match class_id {
            0 => ObjectClass::Person,
            1..=8 => ObjectClass::Vehicle,
            14..=23 => ObjectClass::Animal,
            _ => ObjectClass::Unknown,
        }
    }
}

/// Raw backend output for one object in one frame, in source pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectBox {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class: ObjectClass,
}

/// Detector backend trait.
///
/// Inference takes `&self`: a backend holds no per-call state, so one
/// instance can be shared behind an `Arc` by concurrent jobs.
pub trait DetectorBackend: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Device this instance was built for.
    fn device(&self) -> Device;

    /// Run detection on a frame. Boxes are in the frame's pixel space.
    ///
    /// Backends may apply their own low floor threshold; the caller applies
    /// the configured confidence cutoff and class restriction.
    fn detect(&self, frame: &VideoFrame) -> Result<Vec<ObjectBox>>;

    /// Optional warm-up hook.
    fn warm_up(&self) -> Result<()> {
        Ok(())
    }
}
