// SPDX-License-Identifier: GPL-3.0-only

//! Import of camera frames and still images into GPU textures
//!
//! Live frames come from a small pool of capture buffers that the capture
//! side recycles. Plane textures are cached per buffer id so a recycled
//! buffer reuses its textures (with fresh contents) instead of allocating
//! new ones every frame. The cache holds a fixed number of entries and
//! evicts the least recently used one.

use super::gpu_processor::{CachedDimensions, GpuTexture};
use crate::backends::camera::types::{
    CameraFrame, PlaneDescriptor, PlaneFormat, chroma_dimensions,
};
use crate::errors::{PipelineError, PipelineResult};
use crate::gpu::{GpuContext, wgpu};
use image::RgbaImage;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Luma and chroma textures of one imported frame
#[derive(Debug)]
pub struct PlaneTextures {
    pub luma: GpuTexture,
    pub chroma: GpuTexture,
}

struct CacheEntry {
    buffer_id: u64,
    last_used: u64,
    planes: PlaneTextures,
}

/// Bounded LRU cache of plane textures keyed by capture buffer id
pub struct TextureCache {
    ctx: Arc<GpuContext>,
    capacity: usize,
    entries: Vec<CacheEntry>,
    dims: CachedDimensions,
    clock: u64,
}

impl TextureCache {
    pub fn new(ctx: Arc<GpuContext>, capacity: usize) -> Self {
        Self {
            ctx,
            capacity: capacity.max(1),
            entries: Vec::new(),
            dims: CachedDimensions::default(),
            clock: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every cached texture
    pub fn flush(&mut self) {
        if !self.entries.is_empty() {
            debug!(entries = self.entries.len(), "Flushing texture cache");
        }
        self.entries.clear();
        self.dims = CachedDimensions::default();
    }

    /// Upload both planes of `frame` and return their textures
    ///
    /// A frame with a missing or short plane, or with chroma that is not half
    /// the luma size, is rejected before anything is written, so cached
    /// textures never hold half of a frame.
    pub fn import_frame(&mut self, frame: &CameraFrame) -> PipelineResult<&PlaneTextures> {
        let (luma, luma_bytes) = frame.luma_plane()?;
        let (chroma, chroma_bytes) = frame.chroma_plane()?;

        let expected_chroma = chroma_dimensions(luma.width, luma.height);
        if (chroma.width, chroma.height) != expected_chroma {
            return Err(PipelineError::DimensionMismatch {
                stage: "texture_cache",
                expected: expected_chroma,
                actual: (chroma.width, chroma.height),
            });
        }

        if self.dims.needs_update(luma.width, luma.height) {
            self.flush();
            self.dims.update(luma.width, luma.height);
        }

        self.clock += 1;
        let clock = self.clock;

        let index = match self
            .entries
            .iter()
            .position(|e| e.buffer_id == frame.buffer_id)
        {
            Some(index) => {
                trace!(buffer_id = frame.buffer_id, "Texture cache hit");
                index
            }
            None => self.insert(frame.buffer_id, &luma, &chroma),
        };

        let entry = &mut self.entries[index];
        entry.last_used = clock;
        write_plane(self.ctx.queue(), &entry.planes.luma, &luma, luma_bytes);
        write_plane(self.ctx.queue(), &entry.planes.chroma, &chroma, chroma_bytes);

        Ok(&self.entries[index].planes)
    }

    fn insert(&mut self, buffer_id: u64, luma: &PlaneDescriptor, chroma: &PlaneDescriptor) -> usize {
        if self.entries.len() >= self.capacity
            && let Some(oldest) = self
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(i, _)| i)
        {
            let evicted = self.entries.swap_remove(oldest);
            debug!(buffer_id = evicted.buffer_id, "Evicted plane textures");
        }

        debug!(
            buffer_id,
            width = luma.width,
            height = luma.height,
            "Allocating plane textures"
        );

        let device = self.ctx.device();
        self.entries.push(CacheEntry {
            buffer_id,
            last_used: self.clock,
            planes: PlaneTextures {
                luma: plane_texture(device, "luma_plane", luma),
                chroma: plane_texture(device, "chroma_plane", chroma),
            },
        });
        self.entries.len() - 1
    }
}

fn plane_texture(device: &wgpu::Device, label: &str, plane: &PlaneDescriptor) -> GpuTexture {
    GpuTexture::new(
        device,
        label,
        plane.width,
        plane.height,
        plane.format.texture_format(),
        wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
    )
}

fn write_plane(queue: &wgpu::Queue, texture: &GpuTexture, plane: &PlaneDescriptor, bytes: &[u8]) {
    debug_assert!(matches!(plane.format, PlaneFormat::R8 | PlaneFormat::Rg8));
    texture.write(queue, bytes, plane.stride);
}

/// Decode a still image from disk into RGBA
pub fn decode_image(path: &Path) -> PipelineResult<RgbaImage> {
    let image = image::open(path).map_err(|e| PipelineError::ImageDecode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let rgba = image.to_rgba8();
    info!(
        path = %path.display(),
        width = rgba.width(),
        height = rgba.height(),
        "Decoded still image"
    );
    Ok(rgba)
}

/// A still image on the GPU with a same-sized output texture
pub struct ImportedImage {
    pub input: GpuTexture,
    pub output: GpuTexture,
}

impl ImportedImage {
    /// Upload `image` once and allocate its output
    pub fn upload(ctx: &GpuContext, image: &RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        let input = GpuTexture::new(
            ctx.device(),
            "still_input",
            width,
            height,
            wgpu::TextureFormat::Rgba8Unorm,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        );
        input.write(ctx.queue(), image.as_raw(), width * 4);
        let output = GpuTexture::rgba_storage(ctx.device(), "still_output", width, height);

        debug!(width, height, "Imported still image");
        Self { input, output }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.input.dimensions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::Colorimetry;
    use crate::config::GpuPowerPreference;

    fn frame(width: u32, height: u32, buffer_id: u64) -> CameraFrame {
        let data = vec![128u8; CameraFrame::nv12_len(width, height)];
        CameraFrame::nv12(width, height, data, Colorimetry::default(), buffer_id, buffer_id)
    }

    #[test]
    fn test_decode_missing_image_is_fatal() {
        let err = decode_image(Path::new("/nonexistent/mosaic/input.png")).unwrap_err();
        assert!(matches!(err, PipelineError::ImageDecode { .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_cache_is_bounded_and_flushes() {
        let ctx = match GpuContext::new("cache_test", GpuPowerPreference::default()).await {
            Ok(ctx) => ctx,
            Err(e) => {
                println!("Skipping test (no GPU): {}", e);
                return;
            }
        };

        let mut cache = TextureCache::new(ctx, 2);
        for id in 0..5 {
            let planes = cache.import_frame(&frame(32, 16, id)).unwrap();
            assert_eq!(planes.luma.dimensions(), (32, 16));
            assert_eq!(planes.chroma.dimensions(), (16, 8));
        }
        assert_eq!(cache.len(), 2);

        // Same buffer again is a hit
        cache.import_frame(&frame(32, 16, 4)).unwrap();
        assert_eq!(cache.len(), 2);

        // New dimensions flush everything
        cache.import_frame(&frame(64, 64, 4)).unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_plane_is_not_cached() {
        let ctx = match GpuContext::new("cache_test", GpuPowerPreference::default()).await {
            Ok(ctx) => ctx,
            Err(e) => {
                println!("Skipping test (no GPU): {}", e);
                return;
            }
        };

        let mut cache = TextureCache::new(ctx, 3);
        let mut broken = frame(8, 8, 1);
        broken.luma = None;
        assert!(matches!(
            cache.import_frame(&broken),
            Err(PipelineError::MissingPlane { plane: "luma", .. })
        ));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_undersized_chroma_on_cached_buffer() {
        let ctx = match GpuContext::new("cache_test", GpuPowerPreference::default()).await {
            Ok(ctx) => ctx,
            Err(e) => {
                println!("Skipping test (no GPU): {}", e);
                return;
            }
        };

        let mut cache = TextureCache::new(ctx, 3);
        cache.import_frame(&frame(32, 32, 7)).unwrap();

        // Same buffer and luma size, but a 4x4 chroma plane
        let mut shrunk = frame(32, 32, 7);
        if let Some(chroma) = shrunk.chroma.as_mut() {
            chroma.width = 4;
            chroma.height = 4;
            chroma.stride = 8;
        }
        let err = cache.import_frame(&shrunk).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::DimensionMismatch {
                expected: (16, 16),
                actual: (4, 4),
                ..
            }
        ));
        assert!(!err.is_fatal());

        // The cached textures are still usable
        let planes = cache.import_frame(&frame(32, 32, 7)).unwrap();
        assert_eq!(planes.chroma.dimensions(), (16, 16));
        assert_eq!(cache.len(), 1);
    }
}
