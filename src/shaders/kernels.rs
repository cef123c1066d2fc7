// SPDX-License-Identifier: GPL-3.0-only

//! Kernel library and compiled compute pipelines
//!
//! Kernels are looked up by name. Each kernel's WGSL entry point carries the
//! same name as the kernel, so a library entry fully describes what to compile.

use crate::constants::kernels;
use crate::errors::{PipelineError, PipelineResult};
use crate::gpu::{GpuContext, wgpu};
use std::collections::HashMap;
use tracing::{debug, info};

/// WGSL source for the luma/chroma to RGBA kernel
pub const NV12_TO_RGBA_SHADER: &str = include_str!("nv12_to_rgba.wgsl");

/// WGSL source for the pixelation kernel
pub const PIXELATE_SHADER: &str = include_str!("pixelate.wgsl");

/// Named kernel sources available to the pipelines
#[derive(Debug, Clone)]
pub struct KernelLibrary {
    sources: HashMap<String, &'static str>,
}

impl Default for KernelLibrary {
    fn default() -> Self {
        Self::with_kernels([
            (kernels::NV12_TO_RGBA, NV12_TO_RGBA_SHADER),
            (kernels::PIXELATE, PIXELATE_SHADER),
        ])
    }
}

impl KernelLibrary {
    pub fn with_kernels<'a>(entries: impl IntoIterator<Item = (&'a str, &'static str)>) -> Self {
        Self {
            sources: entries
                .into_iter()
                .map(|(name, source)| (name.to_string(), source))
                .collect(),
        }
    }

    /// WGSL source of a kernel; unknown names are fatal
    pub fn get(&self, name: &str) -> PipelineResult<&'static str> {
        self.sources
            .get(name)
            .copied()
            .ok_or_else(|| PipelineError::KernelNotFound(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }
}

/// A compiled kernel and its bind group layout
///
/// Created once during setup and shared by every dispatch of that kernel.
pub struct KernelPipeline {
    name: String,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl KernelPipeline {
    /// Compile `name` from the library with the given bindings
    ///
    /// Shader validation errors are caught with an error scope so a broken
    /// kernel surfaces as [`PipelineError::PipelineCreation`] instead of a
    /// device panic.
    pub async fn create(
        ctx: &GpuContext,
        library: &KernelLibrary,
        name: &str,
        entries: &[wgpu::BindGroupLayoutEntry],
    ) -> PipelineResult<Self> {
        let source = library.get(name)?;
        let device = ctx.device();

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{}_shader", name)),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("{}_bind_group_layout", name)),
            entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{}_pipeline_layout", name)),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(&format!("{}_pipeline", name)),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some(name),
            compilation_options: Default::default(),
            cache: None,
        });

        if let Some(error) = device.pop_error_scope().await {
            return Err(PipelineError::PipelineCreation {
                kernel: name.to_string(),
                reason: error.to_string(),
            });
        }

        info!(kernel = name, "Compute pipeline created");

        Ok(Self {
            name: name.to_string(),
            pipeline,
            bind_group_layout,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pipeline(&self) -> &wgpu::ComputePipeline {
        &self.pipeline
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    /// Bind group for this kernel from resources listed in binding order
    pub fn bind_group<'a>(
        &self,
        device: &wgpu::Device,
        resources: impl IntoIterator<Item = wgpu::BindingResource<'a>>,
    ) -> wgpu::BindGroup {
        let entries: Vec<wgpu::BindGroupEntry<'a>> = resources
            .into_iter()
            .enumerate()
            .map(|(binding, resource)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource,
            })
            .collect();

        debug!(kernel = %self.name, bindings = entries.len(), "Creating bind group");

        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{}_bind_group", self.name)),
            layout: &self.bind_group_layout,
            entries: &entries,
        })
    }
}

/// Sampled (non-filtered) 2D float texture
pub fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

/// Write-only RGBA8 storage texture
pub fn storage_texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format: wgpu::TextureFormat::Rgba8Unorm,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        count: None,
    }
}

pub fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}
