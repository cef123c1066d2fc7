// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for captured frames

use crate::errors::{PipelineError, PipelineResult};
use crate::gpu::wgpu;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Frame data storage
///
/// Reference counted so the capture side can hand a frame to the mailbox
/// without copying pixels. Cloning only bumps the count.
#[derive(Clone)]
pub struct FrameData(Arc<[u8]>);

impl FrameData {
    /// Get the length of the frame data in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the frame data is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for FrameData {
    fn from(data: Vec<u8>) -> Self {
        FrameData(Arc::from(data.into_boxed_slice()))
    }
}

impl std::fmt::Debug for FrameData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FrameData({} bytes)", self.0.len())
    }
}

impl std::ops::Deref for FrameData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

/// Pixel layout of a single plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaneFormat {
    /// 8-bit single channel (luma)
    R8,
    /// 8-bit two channel, interleaved (chroma Cb/Cr)
    Rg8,
}

impl PlaneFormat {
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            Self::R8 => 1,
            Self::Rg8 => 2,
        }
    }

    /// Texture format the plane is uploaded as
    pub fn texture_format(&self) -> wgpu::TextureFormat {
        match self {
            Self::R8 => wgpu::TextureFormat::R8Unorm,
            Self::Rg8 => wgpu::TextureFormat::Rg8Unorm,
        }
    }
}

/// Location and shape of one plane inside the frame data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneDescriptor {
    pub width: u32,
    pub height: u32,
    /// Bytes per row, including any padding
    pub stride: u32,
    pub format: PlaneFormat,
    /// Byte offset of the first row within the frame data
    pub offset: usize,
}

impl PlaneDescriptor {
    /// Bytes the plane occupies; the last row does not need its padding
    pub fn required_len(&self) -> usize {
        if self.height == 0 {
            return 0;
        }
        let row = (self.width * self.format.bytes_per_pixel()) as usize;
        self.stride as usize * (self.height as usize - 1) + row
    }

    fn validate(&self, plane: &'static str, data_len: usize) -> PipelineResult<()> {
        let row = self.width * self.format.bytes_per_pixel();
        if self.width == 0 || self.height == 0 {
            return Err(PipelineError::InvalidPlane {
                plane,
                reason: format!("empty {}x{} plane", self.width, self.height),
            });
        }
        if self.stride < row {
            return Err(PipelineError::InvalidPlane {
                plane,
                reason: format!("stride {} shorter than row of {} bytes", self.stride, row),
            });
        }
        let end = self.offset + self.required_len();
        if end > data_len {
            return Err(PipelineError::InvalidPlane {
                plane,
                reason: format!("needs {} bytes, frame has {}", end, data_len),
            });
        }
        Ok(())
    }
}

/// YCbCr to RGB matrix
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorMatrix {
    /// SD video and most webcams
    #[default]
    Bt601,
    /// HD video
    Bt709,
}

/// Quantization range of the luma/chroma samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorRange {
    /// Luma 16-235, chroma 16-240
    #[default]
    Limited,
    /// All codes 0-255
    Full,
}

/// How to interpret the samples of a frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Colorimetry {
    pub matrix: ColorMatrix,
    pub range: ColorRange,
}

impl Colorimetry {
    /// Matrix code for the conversion shader (0=BT.601, 1=BT.709)
    pub fn gpu_matrix_code(&self) -> u32 {
        match self.matrix {
            ColorMatrix::Bt601 => 0,
            ColorMatrix::Bt709 => 1,
        }
    }

    /// Range code for the conversion shader (0=limited, 1=full)
    pub fn gpu_range_code(&self) -> u32 {
        match self.range {
            ColorRange::Limited => 0,
            ColorRange::Full => 1,
        }
    }
}

/// A single frame from the camera
///
/// Semi-planar 4:2:0: a full resolution luma plane and a half resolution
/// interleaved chroma plane, both inside `data`. Either plane may be absent
/// when the capture side delivers a damaged sample.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    pub data: FrameData,
    pub luma: Option<PlaneDescriptor>,
    pub chroma: Option<PlaneDescriptor>,
    pub colorimetry: Colorimetry,
    /// Identity of the capture buffer backing `data`; buffers are recycled
    /// by the capture side, so the same id shows up again with new contents
    pub buffer_id: u64,
    /// Monotonic frame counter assigned by the capture side
    pub sequence: u64,
    /// Timestamp when frame was captured (for latency diagnostics)
    pub captured_at: Instant,
}

impl CameraFrame {
    /// Build an NV12 frame with tightly packed planes
    ///
    /// `data` must hold `width * height` luma bytes followed by
    /// `2 * ceil(width/2) * ceil(height/2)` chroma bytes.
    pub fn nv12(
        width: u32,
        height: u32,
        data: impl Into<FrameData>,
        colorimetry: Colorimetry,
        buffer_id: u64,
        sequence: u64,
    ) -> Self {
        let (chroma_width, chroma_height) = chroma_dimensions(width, height);
        let luma = PlaneDescriptor {
            width,
            height,
            stride: width,
            format: PlaneFormat::R8,
            offset: 0,
        };
        let chroma = PlaneDescriptor {
            width: chroma_width,
            height: chroma_height,
            stride: chroma_width * 2,
            format: PlaneFormat::Rg8,
            offset: (width * height) as usize,
        };
        Self {
            width,
            height,
            data: data.into(),
            luma: Some(luma),
            chroma: Some(chroma),
            colorimetry,
            buffer_id,
            sequence,
            captured_at: Instant::now(),
        }
    }

    /// Size in bytes of a tightly packed NV12 frame
    pub fn nv12_len(width: u32, height: u32) -> usize {
        let (cw, ch) = chroma_dimensions(width, height);
        (width * height + cw * ch * 2) as usize
    }

    /// Luma plane descriptor and bytes, validated against the frame data
    pub fn luma_plane(&self) -> PipelineResult<(PlaneDescriptor, &[u8])> {
        self.plane("luma", self.luma, PlaneFormat::R8)
    }

    /// Chroma plane descriptor and bytes, validated against the frame data
    pub fn chroma_plane(&self) -> PipelineResult<(PlaneDescriptor, &[u8])> {
        self.plane("chroma", self.chroma, PlaneFormat::Rg8)
    }

    fn plane(
        &self,
        name: &'static str,
        descriptor: Option<PlaneDescriptor>,
        expected: PlaneFormat,
    ) -> PipelineResult<(PlaneDescriptor, &[u8])> {
        let descriptor = descriptor.ok_or(PipelineError::MissingPlane {
            plane: name,
            sequence: self.sequence,
        })?;
        if descriptor.format != expected {
            return Err(PipelineError::InvalidPlane {
                plane: name,
                reason: format!("expected {:?}, got {:?}", expected, descriptor.format),
            });
        }
        descriptor.validate(name, self.data.len())?;
        let bytes = &self.data[descriptor.offset..descriptor.offset + descriptor.required_len()];
        Ok((descriptor, bytes))
    }
}

/// Chroma plane size for 4:2:0 subsampling; odd sizes round up
#[inline]
pub fn chroma_dimensions(width: u32, height: u32) -> (u32, u32) {
    (width.div_ceil(2), height.div_ceil(2))
}
