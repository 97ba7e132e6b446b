use candle_core::Device;
use rowembed_core::config::DevicePreference;
use rowembed_core::types::ComputeDevice;
use tracing::info;

/// Probe for an accelerator compiled into this build, falling back to CPU.
pub fn select_device(preference: DevicePreference) -> Device {
    if preference == DevicePreference::Cpu { info!("Device: CPU (forced by config)"); return Device::Cpu; }
    #[cfg(feature = "cuda")]
    {
        if let Ok(dev) = Device::new_cuda(0) { info!("Device: CUDA GPU 0"); return dev; }
    }
    #[cfg(feature = "metal")]
    {
        if let Ok(dev) = Device::new_metal(0) { info!("Device: Metal (MPS)"); return dev; }
    }
    info!("No accelerator found. Using CPU, this will be much slower");
    Device::Cpu
}

pub fn compute_device(device: &Device) -> ComputeDevice {
    if device.is_cpu() { ComputeDevice::Cpu } else { ComputeDevice::Accelerator }
}
