// SPDX-License-Identifier: GPL-3.0-only

//! Still image streamed as a live camera
//!
//! The image is decoded and converted to NV12 once; every frame shares the
//! same bytes and only the buffer id and sequence change.

use crate::backends::camera::{CameraFrame, Colorimetry, FrameData, FrameSource};
use crate::constants::CAPTURE_POOL_SIZE;
use crate::errors::PipelineResult;
use crate::media::nv12_converter::rgba_to_nv12;
use crate::shaders::decode_image;
use image::RgbaImage;
use std::path::Path;
use tracing::info;

pub struct StillImageSource {
    name: String,
    width: u32,
    height: u32,
    data: FrameData,
    colorimetry: Colorimetry,
}

impl StillImageSource {
    /// Decode `path` and prepare its NV12 representation
    pub fn open(path: &Path, colorimetry: Colorimetry) -> PipelineResult<Self> {
        let image = decode_image(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::from_image(name, &image, colorimetry))
    }

    pub fn from_image(name: impl Into<String>, image: &RgbaImage, colorimetry: Colorimetry) -> Self {
        let (width, height) = image.dimensions();
        let data = FrameData::from(rgba_to_nv12(image, colorimetry));
        let name = name.into();
        info!(name = %name, width, height, "Prepared still image source");
        Self {
            name,
            width,
            height,
            data,
            colorimetry,
        }
    }
}

impl FrameSource for StillImageSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn next_frame(&mut self, sequence: u64) -> PipelineResult<CameraFrame> {
        Ok(CameraFrame::nv12(
            self.width,
            self.height,
            self.data.clone(),
            self.colorimetry,
            sequence % CAPTURE_POOL_SIZE,
            sequence,
        ))
    }
}
