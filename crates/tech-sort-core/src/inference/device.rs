//! Device selection for inference.

use candle_core::Device;
use tracing::debug;

/// Picks the inference device.
///
/// With `prefer_gpu` set, tries Metal and then CUDA when the crate was built
/// with the matching feature; otherwise, or when no GPU is usable, runs on
/// the CPU. The models are small enough that the CPU is the normal case.
#[must_use]
pub fn select_device(prefer_gpu: bool) -> Device {
    if prefer_gpu {
        #[cfg(feature = "metal")]
        if let Ok(device) = Device::new_metal(0) {
            tracing::info!("Using Metal device for inference");
            return device;
        }

        #[cfg(feature = "cuda")]
        if let Ok(device) = Device::new_cuda(0) {
            tracing::info!("Using CUDA device for inference");
            return device;
        }

        debug!("No GPU device available");
    }
    Device::Cpu
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_when_gpu_not_wanted() {
        assert!(matches!(select_device(false), Device::Cpu));
    }

    #[test]
    fn test_prefer_gpu_always_returns_a_device() {
        let _device = select_device(true);
    }
}
