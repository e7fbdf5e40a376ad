//! Person detection.
//!
//! - `backend`: the inference trait and device enum
//! - `registry`: device probes and first-usable backend selection
//! - `backends`: scripted (tests/demos) and tract YOLO ONNX (feature)
//! - `detector`: sampling, class/confidence filtering, optional tracking

mod backend;
pub mod backends;
mod detector;
pub mod postprocess;
mod registry;

use std::path::Path;

pub use backend::{DetectorBackend, Device, ObjectBox, ObjectClass};
pub use backends::ScriptedBackend;
pub use detector::{DetectEvent, DetectionStream, PersonDetector};
pub use registry::{
    AcceleratorProbe, BackendBuilder, BackendRegistry, CpuProbe, DeviceProbe, FixedProbe,
    GpuProbe,
};

/// Registry with every backend compiled into this build.
///
/// With `backend-tract` the CPU slot loads the ONNX model at `model_path`
/// lazily, when selection reaches it.
pub fn default_registry(model_path: &Path) -> BackendRegistry {
    #[allow(unused_mut)]
    let mut registry = BackendRegistry::new();

    #[cfg(feature = "backend-tract")]
    {
        let model_path = model_path.to_path_buf();
        registry.register(Device::Cpu, move |_| {
            let backend = backends::TractBackend::new(&model_path)?;
            Ok(std::sync::Arc::new(backend) as std::sync::Arc<dyn DetectorBackend>)
        });
    }
    if cfg!(not(feature = "backend-tract")) {
        log::debug!(
            "default_registry: built without backend-tract; model {} is not loadable",
            model_path.display()
        );
    }

    registry
}
