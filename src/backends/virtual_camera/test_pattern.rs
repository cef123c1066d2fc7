// SPDX-License-Identifier: GPL-3.0-only

//! Moving color-bar test pattern
//!
//! Eight vertical bars scroll one step per frame over a luma ramp, so both
//! color conversion and block boundaries are easy to judge by eye.

use crate::backends::camera::{CameraFrame, Colorimetry, FrameSource};
use crate::constants::CAPTURE_POOL_SIZE;
use crate::errors::PipelineResult;
use crate::media::nv12_converter::rgba_to_nv12;
use image::{Rgba, RgbaImage};

const BARS: [[u8; 3]; 8] = [
    [235, 235, 235],
    [235, 235, 16],
    [16, 235, 235],
    [16, 235, 16],
    [235, 16, 235],
    [235, 16, 16],
    [16, 16, 235],
    [16, 16, 16],
];

/// Pixels the bars move per frame
const SCROLL_STEP: u32 = 4;

pub struct TestPatternSource {
    width: u32,
    height: u32,
    colorimetry: Colorimetry,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32, colorimetry: Colorimetry) -> Self {
        Self {
            width: width.max(2),
            height: height.max(2),
            colorimetry,
        }
    }

    /// RGBA rendering of the pattern at frame `sequence`
    pub fn render(&self, sequence: u64) -> RgbaImage {
        let bar_width = (self.width / BARS.len() as u32).max(1);
        let shift = (sequence as u32).wrapping_mul(SCROLL_STEP) % self.width;
        let lower = self.height * 3 / 4;

        RgbaImage::from_fn(self.width, self.height, |x, y| {
            if y >= lower {
                // Gray ramp along the bottom quarter
                let v = (x * 255 / (self.width - 1)) as u8;
                return Rgba([v, v, v, 255]);
            }
            let bar = (((x + shift) % self.width) / bar_width) as usize % BARS.len();
            let [r, g, b] = BARS[bar];
            Rgba([r, g, b, 255])
        })
    }
}

impl FrameSource for TestPatternSource {
    fn name(&self) -> &str {
        "test pattern"
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn next_frame(&mut self, sequence: u64) -> PipelineResult<CameraFrame> {
        let data = rgba_to_nv12(&self.render(sequence), self.colorimetry);
        Ok(CameraFrame::nv12(
            self.width,
            self.height,
            data,
            self.colorimetry,
            sequence % CAPTURE_POOL_SIZE,
            sequence,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_are_valid_nv12() {
        let mut source = TestPatternSource::new(64, 48, Colorimetry::default());
        let frame = source.next_frame(1).unwrap();
        assert_eq!((frame.width, frame.height), (64, 48));
        assert!(frame.luma_plane().is_ok());
        assert!(frame.chroma_plane().is_ok());
    }

    #[test]
    fn test_buffer_ids_cycle_through_pool() {
        let mut source = TestPatternSource::new(16, 16, Colorimetry::default());
        let ids: Vec<u64> = (1..=6)
            .map(|seq| source.next_frame(seq).unwrap().buffer_id)
            .collect();
        assert_eq!(ids, vec![1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_pattern_moves() {
        let source = TestPatternSource::new(64, 32, Colorimetry::default());
        assert_ne!(source.render(0), source.render(1));
    }
}
