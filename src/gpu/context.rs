#![cfg(feature = "gpu")]

//! GPU device and queue initialization.

use crate::core::error::GpuError;

/// Owned `wgpu` runtime state shared by every mirror.
pub struct GpuContext {
    /// The selected adapter, kept for diagnostics.
    pub adapter: wgpu::Adapter,

    /// Logical device.
    pub device: wgpu::Device,

    /// Submission queue.
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Initializes the default adapter and device, blocking on the async
    /// `wgpu` setup.
    pub fn create() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());

        let adapter = pollster::block_on(instance.request_adapter(
            &wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            },
        ))
        .ok_or_else(|| GpuError {
            message: "no suitable gpu adapter found".to_string(),
        })?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("particle_store device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
            },
            None,
        ))
        .map_err(|e| GpuError {
            message: format!("device request failed: {e}"),
        })?;

        Ok(Self {
            adapter,
            device,
            queue,
        })
    }
}
