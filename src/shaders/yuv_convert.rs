// SPDX-License-Identifier: GPL-3.0-only

//! Color conversion stage: luma/chroma planes to RGBA on the GPU
//!
//! One dispatch of the `nv12_to_rgba` kernel covers the whole output. The
//! output texture is owned by the stage and reallocated when the frame size
//! changes; it is only read by the pixelation stage within the same command
//! buffer, so a single texture is enough.

use super::gpu_processor::{CachedDimensions, DispatchSize, GpuTexture};
use super::kernels::{KernelLibrary, KernelPipeline, storage_texture_entry, texture_entry, uniform_entry};
use super::texture_cache::PlaneTextures;
use crate::backends::camera::types::{Colorimetry, chroma_dimensions};
use crate::constants::kernels;
use crate::errors::{PipelineError, PipelineResult};
use crate::gpu::{GpuContext, wgpu};
use crate::pipelines::dispatcher::ComputeDispatcher;
use std::sync::Arc;
use tracing::debug;

/// Conversion parameters uniform (must match shader struct)
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct ConvertParams {
    width: u32,
    height: u32,
    matrix: u32,
    full_range: u32,
}

pub struct ColorConversionStage {
    ctx: Arc<GpuContext>,
    kernel: KernelPipeline,
    uniform_buffer: wgpu::Buffer,
    output: Option<GpuTexture>,
    cached_dims: CachedDimensions,
}

impl ColorConversionStage {
    pub async fn new(ctx: Arc<GpuContext>, library: &KernelLibrary) -> PipelineResult<Self> {
        // Bindings: tex_luma, tex_chroma, output, params
        let kernel = KernelPipeline::create(
            &ctx,
            library,
            kernels::NV12_TO_RGBA,
            &[
                texture_entry(0),
                texture_entry(1),
                storage_texture_entry(2),
                uniform_entry(3),
            ],
        )
        .await?;

        let uniform_buffer = ctx.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("nv12_to_rgba_uniform_buffer"),
            size: std::mem::size_of::<ConvertParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(Self {
            ctx,
            kernel,
            uniform_buffer,
            output: None,
            cached_dims: CachedDimensions::default(),
        })
    }

    fn ensure_output(&mut self, width: u32, height: u32) {
        if self.cached_dims.needs_update(width, height) {
            self.output = None;
        }
        let device = self.ctx.device();
        let cached_dims = &mut self.cached_dims;
        self.output.get_or_insert_with(|| {
            debug!(width, height, "Allocating RGBA conversion output");
            cached_dims.update(width, height);
            GpuTexture::rgba_storage(device, "nv12_to_rgba_output", width, height)
        });
    }

    /// Record the conversion of `planes` into the stage's RGBA output
    ///
    /// Without input textures the dispatch is skipped and the frame is lost;
    /// chroma that is not half the luma size is rejected before encoding.
    pub fn encode(
        &mut self,
        dispatcher: &ComputeDispatcher,
        encoder: &mut wgpu::CommandEncoder,
        planes: Option<&PlaneTextures>,
        colorimetry: Colorimetry,
    ) -> PipelineResult<&GpuTexture> {
        let planes = planes.ok_or(PipelineError::TexturesNotReady(kernels::NV12_TO_RGBA))?;
        let (width, height) = planes.luma.dimensions();

        let expected_chroma = chroma_dimensions(width, height);
        if planes.chroma.dimensions() != expected_chroma {
            return Err(PipelineError::DimensionMismatch {
                stage: kernels::NV12_TO_RGBA,
                expected: expected_chroma,
                actual: planes.chroma.dimensions(),
            });
        }

        let params = ConvertParams {
            width,
            height,
            matrix: colorimetry.gpu_matrix_code(),
            full_range: colorimetry.gpu_range_code(),
        };
        self.ctx
            .queue()
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&params));

        self.ensure_output(width, height);
        let Some(output) = self.output.as_ref() else {
            return Err(PipelineError::TexturesNotReady(kernels::NV12_TO_RGBA));
        };
        let bind_group = self.kernel.bind_group(
            self.ctx.device(),
            [
                wgpu::BindingResource::TextureView(&planes.luma.view),
                wgpu::BindingResource::TextureView(&planes.chroma.view),
                wgpu::BindingResource::TextureView(&output.view),
                self.uniform_buffer.as_entire_binding(),
            ],
        );

        dispatcher.encode_dispatch(
            encoder,
            "nv12_to_rgba_compute_pass",
            &self.kernel,
            &bind_group,
            DispatchSize::covering(width, height),
        );

        Ok(output)
    }
}
