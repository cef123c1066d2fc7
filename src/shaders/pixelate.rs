// SPDX-License-Identifier: GPL-3.0-only

//! Pixelation stage
//!
//! Each output pixel copies the top-left pixel of the block it falls in:
//! `output(x, y) = input(x - x % n, y - y % n)`. Input and output must be the
//! same size.
//!
//! The live path writes into a small ring of output textures so the texture
//! on screen is never the one being written. A slot is free when only the
//! ring holds a reference to it.

use super::gpu_processor::{CachedDimensions, DispatchSize, GpuTexture};
use super::kernels::{KernelLibrary, KernelPipeline, storage_texture_entry, texture_entry, uniform_entry};
use crate::constants::kernels;
use crate::errors::{PipelineError, PipelineResult};
use crate::gpu::{GpuContext, wgpu};
use crate::pipelines::dispatcher::ComputeDispatcher;
use crate::pipelines::parameter::BlockSize;
use image::RgbaImage;
use std::sync::Arc;
use tracing::{debug, trace};

/// Pixelation parameters uniform (must match shader struct)
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct PixelateParams {
    width: u32,
    height: u32,
    block_size: u32,
    _pad: u32,
}

pub struct PixelationStage {
    ctx: Arc<GpuContext>,
    kernel: KernelPipeline,
    uniform_buffer: wgpu::Buffer,
}

impl PixelationStage {
    pub async fn new(ctx: Arc<GpuContext>, library: &KernelLibrary) -> PipelineResult<Self> {
        // Bindings: input, output, params
        let kernel = KernelPipeline::create(
            &ctx,
            library,
            kernels::PIXELATE,
            &[texture_entry(0), storage_texture_entry(1), uniform_entry(2)],
        )
        .await?;

        let uniform_buffer = ctx.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("pixelate_uniform_buffer"),
            size: std::mem::size_of::<PixelateParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(Self {
            ctx,
            kernel,
            uniform_buffer,
        })
    }

    /// Record a pixelation of `input` into `output` with blocks of `block`
    pub fn encode(
        &self,
        dispatcher: &ComputeDispatcher,
        encoder: &mut wgpu::CommandEncoder,
        input: &GpuTexture,
        output: &GpuTexture,
        block: BlockSize,
    ) -> PipelineResult<()> {
        if input.dimensions() != output.dimensions() {
            return Err(PipelineError::DimensionMismatch {
                stage: kernels::PIXELATE,
                expected: input.dimensions(),
                actual: output.dimensions(),
            });
        }
        let (width, height) = input.dimensions();

        let params = PixelateParams {
            width,
            height,
            block_size: block.get(),
            _pad: 0,
        };
        self.ctx
            .queue()
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&params));

        let bind_group = self.kernel.bind_group(
            self.ctx.device(),
            [
                wgpu::BindingResource::TextureView(&input.view),
                wgpu::BindingResource::TextureView(&output.view),
                self.uniform_buffer.as_entire_binding(),
            ],
        );

        dispatcher.encode_dispatch(
            encoder,
            "pixelate_compute_pass",
            &self.kernel,
            &bind_group,
            DispatchSize::covering(width, height),
        );
        trace!(width, height, block_size = block.get(), "Encoded pixelation");
        Ok(())
    }
}

/// Fixed set of output textures reused round-robin by the live path
pub struct OutputRing {
    ctx: Arc<GpuContext>,
    slots: Vec<Arc<GpuTexture>>,
    size: usize,
    next: usize,
    dims: CachedDimensions,
}

impl OutputRing {
    pub fn new(ctx: Arc<GpuContext>, size: usize) -> Self {
        Self {
            ctx,
            slots: Vec::new(),
            size: size.max(1),
            next: 0,
            dims: CachedDimensions::default(),
        }
    }

    /// Next texture nobody outside the ring still holds
    ///
    /// Returns `TexturesNotReady` when every slot is in use downstream; the
    /// caller drops the frame rather than overwrite a texture being shown.
    pub fn acquire(&mut self, width: u32, height: u32) -> PipelineResult<Arc<GpuTexture>> {
        if self.dims.needs_update(width, height) {
            debug!(width, height, slots = self.size, "Allocating output ring");
            self.slots = (0..self.size)
                .map(|i| {
                    Arc::new(GpuTexture::rgba_storage(
                        self.ctx.device(),
                        &format!("pixelate_output_{}", i),
                        width,
                        height,
                    ))
                })
                .collect();
            self.next = 0;
            self.dims.update(width, height);
        }

        for offset in 0..self.slots.len() {
            let index = (self.next + offset) % self.slots.len();
            if Arc::strong_count(&self.slots[index]) == 1 {
                self.next = (index + 1) % self.slots.len();
                return Ok(Arc::clone(&self.slots[index]));
            }
        }
        Err(PipelineError::TexturesNotReady("pixelate output ring"))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// CPU reference of the pixelation kernel
pub fn pixelate_cpu(input: &RgbaImage, block: BlockSize) -> RgbaImage {
    let n = block.get();
    RgbaImage::from_fn(input.width(), input.height(), |x, y| {
        *input.get_pixel(x - x % n, y - y % n)
    })
}
