// SPDX-License-Identifier: GPL-3.0-only

//! GPU initialization for the compute pipelines.
//!
//! A single [`GpuContext`] owns the device and queue. It is built once at
//! startup and shared by `Arc` with the texture cache, both kernel stages and
//! the dispatcher, so there is exactly one queue and submissions are serial.

use crate::config::GpuPowerPreference;
use crate::errors::{PipelineError, PipelineResult};
use std::sync::Arc;
use tracing::{debug, info};

/// Compute-only wgpu, re-exported so every module names the same crate
pub use wgpu_compute as wgpu;

/// Information about the created GPU device
#[derive(Debug, Clone)]
pub struct GpuDeviceInfo {
    /// Name of the GPU adapter
    pub adapter_name: String,
    /// Backend being used (Vulkan, Metal, DX12, etc.)
    pub backend: wgpu::Backend,
    /// Integrated, discrete, software...
    pub device_type: wgpu::DeviceType,
    /// Driver name and version as reported by the adapter
    pub driver: String,
}

/// Device, queue and adapter description shared by all pipeline stages
pub struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    info: GpuDeviceInfo,
}

impl GpuContext {
    /// Create the shared context.
    ///
    /// Failing to find an adapter or create a device is fatal; there is no
    /// CPU fallback for the live path.
    pub async fn new(label: &str, power: GpuPowerPreference) -> PipelineResult<Arc<Self>> {
        info!(label = label, "Creating GPU device for compute");

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: power.to_wgpu(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| PipelineError::NoAdapter(e.to_string()))?;

        let adapter_info = adapter.get_info();
        let adapter_limits = adapter.limits();

        info!(
            adapter = %adapter_info.name,
            backend = ?adapter_info.backend,
            device_type = ?adapter_info.device_type,
            "GPU adapter selected for compute"
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some(label),
                required_features: wgpu::Features::empty(),
                required_limits: adapter_limits,
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await
            .map_err(|e| PipelineError::DeviceRequest(e.to_string()))?;

        debug!(label = label, "GPU device ready");

        let info = GpuDeviceInfo {
            adapter_name: adapter_info.name.clone(),
            backend: adapter_info.backend,
            device_type: adapter_info.device_type,
            driver: format!("{} {}", adapter_info.driver, adapter_info.driver_info)
                .trim()
                .to_string(),
        };

        Ok(Arc::new(Self {
            device,
            queue,
            info,
        }))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn info(&self) -> &GpuDeviceInfo {
        &self.info
    }

    /// Block until every submitted command buffer has finished
    pub fn wait_idle(&self) -> PipelineResult<()> {
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map(|_| ())
            .map_err(|e| PipelineError::Readback(format!("Device poll failed: {}", e)))
    }

    /// Run completion callbacks for finished work without blocking
    pub fn poll(&self) {
        let _ = self.device.poll(wgpu::PollType::Poll);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_context() {
        // This test requires a GPU, so it may be skipped in CI
        match GpuContext::new("test_device", GpuPowerPreference::default()).await {
            Ok(ctx) => {
                println!("Created device: {:?}", ctx.info());
                assert!(!ctx.info().adapter_name.is_empty());
                ctx.wait_idle().unwrap();
            }
            Err(e) => {
                assert!(e.is_fatal());
                println!("Skipping test (no GPU): {}", e);
            }
        }
    }
}
