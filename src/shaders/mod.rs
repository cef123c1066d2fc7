// SPDX-License-Identifier: GPL-3.0-only

//! Compute kernels and the GPU stages built on them
//!
//! Both stages record their dispatch into a caller-provided command encoder
//! and never submit on their own; submission belongs to the dispatcher.

mod gpu_processor;
pub mod kernels;
pub mod pixelate;
pub mod texture_cache;
pub mod yuv_convert;

pub use gpu_processor::{
    CachedDimensions, DispatchSize, GpuTexture, ReadbackBuffer, compute_dispatch_size,
    padded_bytes_per_row, read_texture_rgba,
};
pub use kernels::{KernelLibrary, KernelPipeline};
pub use pixelate::{OutputRing, PixelationStage, pixelate_cpu};
pub use texture_cache::{ImportedImage, PlaneTextures, TextureCache, decode_image};
pub use yuv_convert::ColorConversionStage;
