//! Backends running on candle: quantized GGUF language models and Whisper

mod llama;
mod mel;
mod whisper;

pub use llama::CandleTextBackend;
pub use whisper::CandleSpeechBackend;

use crate::inference::hardware::{ComputeDevice, HardwareCapabilities};
use anyhow::Result;
use candle_core::Device;
use tracing::warn;

/// Picks the compute device. `accelerate == false` always yields the CPU.
pub(crate) fn create_device(
    accelerate: bool,
    ordinal: usize,
    capabilities: &HardwareCapabilities,
) -> Result<Device> {
    if !accelerate {
        return Ok(Device::Cpu);
    }
    match capabilities.best_device() {
        ComputeDevice::Cuda => {
            #[cfg(feature = "cuda")]
            {
                use anyhow::Context;
                Device::new_cuda(ordinal).context("Failed to create CUDA device")
            }
            #[cfg(not(feature = "cuda"))]
            {
                let _ = ordinal;
                warn!("CUDA detected but not compiled with cuda feature, falling back to CPU");
                Ok(Device::Cpu)
            }
        }
        ComputeDevice::Metal => {
            #[cfg(feature = "metal")]
            {
                use anyhow::Context;
                Device::new_metal(ordinal).context("Failed to create Metal device")
            }
            #[cfg(not(feature = "metal"))]
            {
                let _ = ordinal;
                warn!("Metal detected but not compiled with metal feature, falling back to CPU");
                Ok(Device::Cpu)
            }
        }
        ComputeDevice::Cpu => {
            warn!("GPU offload requested but no accelerator is available, using CPU");
            Ok(Device::Cpu)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu_only() -> HardwareCapabilities {
        HardwareCapabilities {
            total_ram_bytes: 1 << 34,
            available_ram_bytes: 1 << 33,
            cuda_available: false,
            metal_available: false,
            cpu_cores: 4,
            cpu_brand: None,
        }
    }

    #[test]
    fn test_cpu_device_without_acceleration() {
        assert!(create_device(false, 0, &cpu_only()).unwrap().is_cpu());
        assert!(create_device(true, 0, &cpu_only()).unwrap().is_cpu());
    }
}
