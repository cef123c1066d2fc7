// SPDX-License-Identifier: GPL-3.0-only

//! CPU side color conversion
//!
//! Camera frames arrive in NV12 format (YUV 4:2:0). The GPU converts them on
//! the live path; [`nv12_converter`] does the same math on the CPU so tests
//! and tools have a reference to compare against, and can build NV12 frames
//! from RGBA images.

pub mod nv12_converter;

pub use nv12_converter::{nv12_to_rgba, rgba_to_nv12, ycbcr_to_rgb};
