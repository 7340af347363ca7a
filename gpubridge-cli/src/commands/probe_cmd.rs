use gpubridge_host::{GpuBackend, WgpuBackend};

use crate::config::Config;

pub async fn run(config: &Config) -> anyhow::Result<()> {
    let gpu = WgpuBackend::new(config.gpu.wgpu_options()?);

    let adapter = gpu.request_adapter().await?;
    let info = gpu.adapter_info(&adapter);
    println!("Adapter:      {}", info.name);
    println!("Backend:      {:?}", info.backend);
    println!("Device type:  {:?}", info.device_type);
    if !info.driver.is_empty() {
        println!("Driver:       {} {}", info.driver, info.driver_info);
    }

    let (device, _queue) = gpu.request_device(&adapter).await?;
    let limits = device.limits();
    println!("Max buffer:   {} bytes", limits.max_buffer_size);
    println!("Max texture:  {}px (2D)", limits.max_texture_dimension_2d);
    println!(
        "Frame target: {}x{} {:?}",
        config.gpu.frame_width,
        config.gpu.frame_height,
        gpu.preferred_format()
    );
    Ok(())
}
