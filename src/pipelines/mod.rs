// SPDX-License-Identifier: GPL-3.0-only

//! Processing pipelines
//!
//! # Pipeline Architecture
//!
//! ```text
//! ┌──────────────┐     ┌─────────────────────┐     ┌───────────────────┐
//! │ Camera Frame │ ──▶ │   Live Pipeline     │ ──▶ │ Presentation      │
//! │   (NV12)     │     │  - NV12→RGBA        │     │ Surface           │
//! │              │     │  - Pixelate         │     │ (no CPU copy)     │
//! └──────────────┘     └─────────────────────┘     └───────────────────┘
//!
//! ┌──────────────┐     ┌─────────────────────┐     ┌───────────────────┐
//! │ Still Image  │ ──▶ │   Still Pipeline    │ ──▶ │ RgbaImage         │
//! │   (RGBA)     │     │  - Pixelate         │     │ (CPU readback)    │
//! └──────────────┘     └─────────────────────┘     └───────────────────┘
//! ```
//!
//! Both pipelines submit through one [`ComputeDispatcher`] and read the
//! block size from a [`BlockSizeParameter`].

pub mod dispatcher;
pub mod live;
pub mod parameter;
pub mod still;
pub mod surface;

pub use dispatcher::{ComputeDispatcher, Submission};
pub use live::{FrameState, LivePipeline, PipelineStats};
pub use parameter::{BlockSize, BlockSizeParameter};
pub use still::StillPipeline;
pub use surface::{HeadlessSurface, PresentationSurface, PresentedFrame};
