// SPDX-License-Identifier: GPL-3.0-only

//! Shared GPU resources used by every compute stage
//!
//! - [`GpuTexture`]: a texture with its default view and extent
//! - [`CachedDimensions`]: reallocation tracking for size-dependent resources
//! - [`DispatchSize`]: workgroup counts covering a texture
//! - [`ReadbackBuffer`]: texture-to-CPU copies with row alignment handled

use crate::constants::{COPY_ROW_ALIGNMENT, WORKGROUP_SIZE};
use crate::errors::{PipelineError, PipelineResult};
use crate::gpu::{GpuContext, wgpu};

/// Cached resource dimensions - avoids reallocation when dimensions match
#[derive(Default, Clone, Copy, PartialEq, Debug)]
pub struct CachedDimensions {
    pub width: u32,
    pub height: u32,
}

impl CachedDimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Check if dimensions have changed and need update
    pub fn needs_update(&self, width: u32, height: u32) -> bool {
        self.width != width || self.height != height
    }

    pub fn update(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    /// Check if dimensions are initialized (non-zero)
    pub fn is_initialized(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// A 2D texture together with its default view
#[derive(Debug)]
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
}

impl GpuTexture {
    pub fn new(
        device: &wgpu::Device,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            texture,
            view,
            width,
            height,
            format,
        }
    }

    /// RGBA texture a kernel can write to and that can be read or copied afterwards
    pub fn rgba_storage(device: &wgpu::Device, label: &str, width: u32, height: u32) -> Self {
        Self::new(
            device,
            label,
            width,
            height,
            wgpu::TextureFormat::Rgba8Unorm,
            wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
        )
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }

    /// Upload tightly or loosely packed rows into the whole texture
    pub fn write(&self, queue: &wgpu::Queue, data: &[u8], bytes_per_row: u32) {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(self.height),
            },
            self.extent(),
        );
    }
}

/// Calculate compute shader dispatch size (workgroups needed)
///
/// Rounds up so partial tiles at the right and bottom edges are covered;
/// kernels bounds-check the extra invocations.
#[inline]
pub fn compute_dispatch_size(dimension: u32, workgroup_size: u32) -> u32 {
    dimension.div_ceil(workgroup_size)
}

/// Workgroup counts for one compute dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSize {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl DispatchSize {
    /// Workgroups covering a `width` x `height` image with 16x16 groups
    pub fn covering(width: u32, height: u32) -> Self {
        Self {
            x: compute_dispatch_size(width, WORKGROUP_SIZE),
            y: compute_dispatch_size(height, WORKGROUP_SIZE),
            z: 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.x == 0 || self.y == 0 || self.z == 0
    }
}

/// Bytes per row rounded up to the copy alignment
#[inline]
pub fn padded_bytes_per_row(width: u32, bytes_per_pixel: u32) -> u32 {
    (width * bytes_per_pixel).div_ceil(COPY_ROW_ALIGNMENT) * COPY_ROW_ALIGNMENT
}

/// Staging buffer holding a copied RGBA texture until it is mapped
pub struct ReadbackBuffer {
    buffer: wgpu::Buffer,
    padded_bytes_per_row: u32,
    width: u32,
    height: u32,
}

impl ReadbackBuffer {
    /// Record a copy of `source` into a new staging buffer
    ///
    /// The copy runs when the encoder is submitted; call [`Self::read`] after.
    pub fn encode(
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        source: &GpuTexture,
    ) -> Self {
        let padded = padded_bytes_per_row(source.width, 4);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback_staging"),
            size: padded as u64 * source.height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &source.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(source.height),
                },
            },
            source.extent(),
        );

        Self {
            buffer,
            padded_bytes_per_row: padded,
            width: source.width,
            height: source.height,
        }
    }

    /// Map the staging buffer and return tightly packed RGBA rows
    pub async fn read(self, ctx: &GpuContext) -> PipelineResult<Vec<u8>> {
        let slice = self.buffer.slice(..);
        let (sender, receiver) = futures::channel::oneshot::channel();

        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });

        ctx.wait_idle()?;

        receiver
            .await
            .map_err(|_| PipelineError::Readback("Mapping callback dropped".to_string()))?
            .map_err(|e| PipelineError::Readback(format!("Failed to map buffer: {:?}", e)))?;

        let row = (self.width * 4) as usize;
        let data = slice.get_mapped_range();
        let output = unpad_rows(&data, row, self.padded_bytes_per_row as usize, self.height);
        drop(data);
        self.buffer.unmap();

        Ok(output)
    }
}

/// Copy `height` rows of `row` bytes out of a buffer with `padded` byte rows
fn unpad_rows(data: &[u8], row: usize, padded: usize, height: u32) -> Vec<u8> {
    if row == padded {
        return data[..row * height as usize].to_vec();
    }
    let mut output = Vec::with_capacity(row * height as usize);
    for chunk in data.chunks(padded).take(height as usize) {
        output.extend_from_slice(&chunk[..row]);
    }
    output
}

/// Copy a texture to the CPU in one submission
pub async fn read_texture_rgba(ctx: &GpuContext, texture: &GpuTexture) -> PipelineResult<Vec<u8>> {
    let mut encoder = ctx
        .device()
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback_encoder"),
        });
    let readback = ReadbackBuffer::encode(ctx.device(), &mut encoder, texture);
    ctx.queue().submit(std::iter::once(encoder.finish()));
    readback.read(ctx).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_dimensions() {
        let mut dims = CachedDimensions::default();
        assert!(!dims.is_initialized());
        assert!(dims.needs_update(640, 480));

        dims.update(640, 480);
        assert!(dims.is_initialized());
        assert!(!dims.needs_update(640, 480));
        assert!(dims.needs_update(1280, 720));
    }

    #[test]
    fn test_compute_dispatch_size() {
        assert_eq!(compute_dispatch_size(640, 16), 40);
        assert_eq!(compute_dispatch_size(641, 16), 41);
        assert_eq!(compute_dispatch_size(16, 16), 1);
        assert_eq!(compute_dispatch_size(1, 16), 1);
    }

    #[test]
    fn test_dispatch_covers_partial_tiles() {
        let size = DispatchSize::covering(100, 37);
        assert_eq!(size, DispatchSize { x: 7, y: 3, z: 1 });
        assert!(size.x * WORKGROUP_SIZE >= 100);
        assert!(DispatchSize::covering(0, 10).is_empty());
    }

    #[test]
    fn test_padded_rows() {
        assert_eq!(padded_bytes_per_row(64, 4), 256);
        assert_eq!(padded_bytes_per_row(65, 4), 512);
        assert_eq!(padded_bytes_per_row(3, 4), 256);
    }

    #[test]
    fn test_unpad_rows() {
        let mut data = vec![0u8; 16];
        data[..3].copy_from_slice(&[1, 2, 3]);
        data[8..11].copy_from_slice(&[4, 5, 6]);
        assert_eq!(unpad_rows(&data, 3, 8, 2), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(unpad_rows(&data, 8, 8, 1), data[..8].to_vec());
    }
}
