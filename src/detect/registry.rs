use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use super::backend::{Device, DetectorBackend};

/// Hardware availability check for one device.
pub trait DeviceProbe: Send + Sync {
    fn device(&self) -> Device;
    fn is_available(&self) -> bool;
}

/// Apple-silicon accelerator.
pub struct AcceleratorProbe;

impl DeviceProbe for AcceleratorProbe {
    fn device(&self) -> Device {
        Device::Accelerator
    }

    fn is_available(&self) -> bool {
        cfg!(all(target_os = "macos", target_arch = "aarch64"))
    }
}

/// NVIDIA GPU, detected through the driver's device node.
pub struct GpuProbe;

impl DeviceProbe for GpuProbe {
    fn device(&self) -> Device {
        Device::Gpu
    }

    fn is_available(&self) -> bool {
        Path::new("/dev/nvidiactl").exists() || Path::new("/proc/driver/nvidia/version").exists()
    }
}

pub struct CpuProbe;

impl DeviceProbe for CpuProbe {
    fn device(&self) -> Device {
        Device::Cpu
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Probe with a fixed answer, for tests and pinned deployments.
pub struct FixedProbe {
    pub device: Device,
    pub available: bool,
}

impl DeviceProbe for FixedProbe {
    fn device(&self) -> Device {
        self.device
    }

    fn is_available(&self) -> bool {
        self.available
    }
}

pub type BackendBuilder = Box<dyn Fn(Device) -> Result<Arc<dyn DetectorBackend>> + Send + Sync>;

/// Ordered device probes plus the backend builders available per device.
///
/// Selection walks the probes in order and returns the first backend that
/// is both available on the host and successfully built. It runs once, when
/// the detector is constructed.
pub struct BackendRegistry {
    probes: Vec<Box<dyn DeviceProbe>>,
    builders: HashMap<Device, BackendBuilder>,
}

impl BackendRegistry {
    /// Registry with the standard accelerator -> gpu -> cpu probe order.
    pub fn new() -> Self {
        Self::with_probes(vec![
            Box::new(AcceleratorProbe),
            Box::new(GpuProbe),
            Box::new(CpuProbe),
        ])
    }

    pub fn with_probes(probes: Vec<Box<dyn DeviceProbe>>) -> Self {
        Self {
            probes,
            builders: HashMap::new(),
        }
    }

    /// Register a builder for a device. A later registration replaces an earlier one.
    pub fn register<F>(&mut self, device: Device, builder: F)
    where
        F: Fn(Device) -> Result<Arc<dyn DetectorBackend>> + Send + Sync + 'static,
    {
        self.builders.insert(device, Box::new(builder));
    }

    /// Register the same backend instance for a device.
    pub fn register_instance(&mut self, device: Device, backend: Arc<dyn DetectorBackend>) {
        self.register(device, move |_| Ok(backend.clone()));
    }

    /// Devices that have a builder, in probe order.
    pub fn devices(&self) -> Vec<Device> {
        self.probes
            .iter()
            .map(|probe| probe.device())
            .filter(|device| self.builders.contains_key(device))
            .collect()
    }

    /// Pick the first usable backend. `forced` restricts the walk to one device.
    pub fn select(&self, forced: Option<Device>) -> Result<Arc<dyn DetectorBackend>> {
        let mut tried = Vec::new();
        for probe in &self.probes {
            let device = probe.device();
            if forced.is_some_and(|f| f != device) {
                continue;
            }
            if !probe.is_available() {
                log::debug!("BackendRegistry: {} not available on this host", device);
                tried.push(format!("{device}: unavailable"));
                continue;
            }
            let Some(builder) = self.builders.get(&device) else {
                log::debug!("BackendRegistry: no backend compiled in for {}", device);
                tried.push(format!("{device}: no backend"));
                continue;
            };
            match builder(device) {
                Ok(backend) => {
                    log::info!(
                        "BackendRegistry: selected backend '{}' on {}",
                        backend.name(),
                        device
                    );
                    return Ok(backend);
                }
                Err(err) => {
                    log::warn!("BackendRegistry: {} backend failed to load: {:#}", device, err);
                    tried.push(format!("{device}: {err:#}"));
                }
            }
        }

        match forced {
            Some(device) if tried.is_empty() => Err(anyhow!(
                "forced device {} is not in the probe list",
                device
            )),
            _ => Err(anyhow!(
                "no usable detector backend ({})",
                if tried.is_empty() {
                    "no probes configured".to_string()
                } else {
                    tried.join("; ")
                }
            )),
        }
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::ScriptedBackend;

    fn probes(accel: bool, gpu: bool) -> Vec<Box<dyn DeviceProbe>> {
        vec![
            Box::new(FixedProbe {
                device: Device::Accelerator,
                available: accel,
            }),
            Box::new(FixedProbe {
                device: Device::Gpu,
                available: gpu,
            }),
            Box::new(CpuProbe),
        ]
    }

    fn scripted(device: Device) -> Arc<dyn DetectorBackend> {
        Arc::new(ScriptedBackend::new().on_device(device))
    }

    #[test]
    fn prefers_first_available_device() {
        let mut registry = BackendRegistry::with_probes(probes(false, true));
        registry.register(Device::Gpu, |d| Ok(scripted(d)));
        registry.register(Device::Cpu, |d| Ok(scripted(d)));

        let backend = registry.select(None).unwrap();
        assert_eq!(backend.device(), Device::Gpu);
        assert_eq!(registry.devices(), vec![Device::Gpu, Device::Cpu]);
    }

    #[test]
    fn falls_through_when_builder_fails() {
        let mut registry = BackendRegistry::with_probes(probes(true, true));
        registry.register(Device::Accelerator, |_| Err(anyhow!("driver missing")));
        registry.register(Device::Cpu, |d| Ok(scripted(d)));

        let backend = registry.select(None).unwrap();
        assert_eq!(backend.device(), Device::Cpu);
    }

    #[test]
    fn forced_device_restricts_selection() {
        let mut registry = BackendRegistry::with_probes(probes(false, true));
        registry.register(Device::Gpu, |d| Ok(scripted(d)));
        registry.register(Device::Cpu, |d| Ok(scripted(d)));

        let backend = registry.select(Some(Device::Cpu)).unwrap();
        assert_eq!(backend.device(), Device::Cpu);

        assert!(registry.select(Some(Device::Accelerator)).is_err());
    }

    #[test]
    fn empty_registry_reports_attempts() {
        let registry = BackendRegistry::with_probes(probes(false, false));
        let err = registry.select(None).err().unwrap().to_string();
        assert!(err.contains("gpu: unavailable"), "{err}");
        assert!(err.contains("cpu: no backend"), "{err}");
    }
}
