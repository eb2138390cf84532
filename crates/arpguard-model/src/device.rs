//! Compute device selection.

use candle_core::utils::{cuda_is_available, metal_is_available};
use candle_core::Device;

/// Pick the device the model trains on.
///
/// Prefers GPU ordinal 0 when the crate was built with the `cuda` or `metal`
/// feature and the device opens; otherwise trains on the CPU.
pub fn select_device() -> Device {
    if cuda_is_available() {
        match Device::new_cuda(0) {
            Ok(device) => {
                tracing::info!(backend = "cuda", "Selected compute device");
                return device;
            }
            Err(e) => tracing::warn!(error = %e, "CUDA build but device 0 unavailable"),
        }
    }

    if metal_is_available() {
        match Device::new_metal(0) {
            Ok(device) => {
                tracing::info!(backend = "metal", "Selected compute device");
                return device;
            }
            Err(e) => tracing::warn!(error = %e, "Metal build but device 0 unavailable"),
        }
    }

    tracing::info!(backend = "cpu", "Selected compute device");
    Device::Cpu
}
