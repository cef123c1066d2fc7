// SPDX-License-Identifier: GPL-3.0-only

//! Mosaic - GPU pixelation for camera feeds and still images
//!
//! NV12 camera frames are imported into GPU textures, converted to RGBA by a
//! compute kernel and pixelated by a second kernel before being handed to a
//! presentation surface. Still images skip the color conversion and are read
//! back to CPU memory after pixelation.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Frame sources, the latest-frame mailbox and loop threads
//! - [`gpu`]: Adapter and device setup
//! - [`shaders`]: Kernels, texture cache and the two compute stages
//! - [`pipelines`]: Live and still pipelines, dispatcher and block size parameter
//! - [`media`]: CPU reference color conversion
//! - [`config`]: User configuration handling
//! - [`terminal`]: Half-block terminal presentation surface

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod gpu;
pub mod media;
pub mod pipelines;
pub mod shaders;
pub mod terminal;

// Re-export commonly used types
pub use backends::camera::{CameraFrame, FrameMailbox, FrameSource};
pub use config::Config;
pub use errors::{PipelineError, PipelineResult};
pub use gpu::GpuContext;
pub use pipelines::{
    BlockSize, BlockSizeParameter, ComputeDispatcher, LivePipeline, PresentationSurface,
    StillPipeline,
};
pub use shaders::KernelLibrary;
