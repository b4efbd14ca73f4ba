//! Hardware detection for device selection and benchmark reports

use serde::Serialize;
use sysinfo::{ProcessesToUpdate, System};
use tracing::{debug, info};

/// Detected hardware capabilities
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HardwareCapabilities {
    /// Total system RAM in bytes
    pub total_ram_bytes: u64,
    /// Available RAM in bytes
    pub available_ram_bytes: u64,
    /// Whether a CUDA device can be opened
    pub cuda_available: bool,
    /// Whether a Metal device can be opened
    pub metal_available: bool,
    /// Number of CPU cores
    pub cpu_cores: usize,
    /// CPU brand string, if the OS reports one
    pub cpu_brand: Option<String>,
}

impl HardwareCapabilities {
    /// Returns available RAM in gigabytes
    pub fn available_ram_gb(&self) -> f64 {
        self.available_ram_bytes as f64 / (1024.0 * 1024.0 * 1024.0)
    }

    /// Returns total RAM in gigabytes
    pub fn total_ram_gb(&self) -> f64 {
        self.total_ram_bytes as f64 / (1024.0 * 1024.0 * 1024.0)
    }

    /// Returns the best available compute device
    pub fn best_device(&self) -> ComputeDevice {
        if self.cuda_available {
            ComputeDevice::Cuda
        } else if self.metal_available {
            ComputeDevice::Metal
        } else {
            ComputeDevice::Cpu
        }
    }
}

/// Available compute devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ComputeDevice {
    Cpu,
    Cuda,
    Metal,
}

impl std::fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComputeDevice::Cpu => write!(f, "CPU"),
            ComputeDevice::Cuda => write!(f, "CUDA"),
            ComputeDevice::Metal => write!(f, "Metal"),
        }
    }
}

/// Probes the machine once per call; callers that need a stable view go
/// through `runtime::hardware()`
pub struct HardwareDetector;

impl HardwareDetector {
    pub fn detect() -> HardwareCapabilities {
        let sys = System::new_all();
        let cpu_brand = sys
            .cpus()
            .first()
            .map(|cpu| cpu.brand().trim().to_string())
            .filter(|brand| !brand.is_empty());

        let capabilities = HardwareCapabilities {
            total_ram_bytes: sys.total_memory(),
            available_ram_bytes: sys.available_memory(),
            cuda_available: accelerator_available(ComputeDevice::Cuda),
            metal_available: accelerator_available(ComputeDevice::Metal),
            cpu_cores: sys.cpus().len(),
            cpu_brand,
        };

        info!(
            "Hardware detected: {:.1}GB RAM available ({:.1}GB total), {} cores, device: {}",
            capabilities.available_ram_gb(),
            capabilities.total_ram_gb(),
            capabilities.cpu_cores,
            capabilities.best_device()
        );
        debug!("Hardware capabilities: {:?}", capabilities);

        capabilities
    }

    /// Resident set size of this process in bytes
    pub fn process_memory_bytes() -> Option<u64> {
        let pid = sysinfo::get_current_pid().ok()?;
        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        sys.process(pid).map(|process| process.memory())
    }
}

/// Whether device 0 of `kind` can be opened. Accelerators whose feature is
/// not compiled in report false.
fn accelerator_available(kind: ComputeDevice) -> bool {
    let opened: Option<candle_core::Result<candle_core::Device>> = match kind {
        #[cfg(feature = "cuda")]
        ComputeDevice::Cuda => Some(candle_core::Device::new_cuda(0)),
        #[cfg(feature = "metal")]
        ComputeDevice::Metal => Some(candle_core::Device::new_metal(0)),
        _ => None,
    };
    match opened {
        Some(Ok(_)) => {
            info!("{} device detected", kind);
            true
        }
        Some(Err(e)) => {
            debug!("{} not available: {}", kind, e);
            false
        }
        None => {
            debug!("{} support not compiled in", kind);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu_only() -> HardwareCapabilities {
        HardwareCapabilities {
            total_ram_bytes: 16 * 1024 * 1024 * 1024,
            available_ram_bytes: 8 * 1024 * 1024 * 1024,
            cuda_available: false,
            metal_available: false,
            cpu_cores: 8,
            cpu_brand: None,
        }
    }

    #[test]
    fn test_hardware_detection() {
        let caps = HardwareDetector::detect();

        assert!(caps.total_ram_bytes > 0);
        assert!(caps.available_ram_bytes <= caps.total_ram_bytes);
        assert!(caps.cpu_cores > 0);
    }

    #[test]
    fn test_process_memory() {
        let rss = HardwareDetector::process_memory_bytes();
        assert!(rss.unwrap_or(1) > 0);
    }

    #[test]
    fn test_ram_gb_conversion() {
        let caps = cpu_only();
        assert!((caps.total_ram_gb() - 16.0).abs() < 0.1);
        assert!((caps.available_ram_gb() - 8.0).abs() < 0.1);
    }

    #[test]
    fn test_cpu_is_not_an_accelerator() {
        assert!(!accelerator_available(ComputeDevice::Cpu));
        assert_eq!(ComputeDevice::Cpu.to_string(), "CPU");
    }

    #[test]
    fn test_best_device_selection() {
        let cpu_caps = cpu_only();
        assert_eq!(cpu_caps.best_device(), ComputeDevice::Cpu);

        let cuda_caps = HardwareCapabilities {
            cuda_available: true,
            ..cpu_caps.clone()
        };
        assert_eq!(cuda_caps.best_device(), ComputeDevice::Cuda);

        let metal_caps = HardwareCapabilities {
            metal_available: true,
            ..cpu_caps.clone()
        };
        assert_eq!(metal_caps.best_device(), ComputeDevice::Metal);
    }
}
