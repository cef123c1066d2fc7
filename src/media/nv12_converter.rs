// SPDX-License-Identifier: GPL-3.0-only

//! CPU conversions between NV12 frames and RGBA images
//!
//! `nv12_to_rgba` mirrors the `nv12_to_rgba` kernel and serves as its
//! reference; `rgba_to_nv12` feeds still images into the live path.

use crate::backends::camera::types::{
    CameraFrame, ColorMatrix, ColorRange, Colorimetry, chroma_dimensions,
};
use crate::errors::PipelineResult;
use image::RgbaImage;
use tracing::debug;

/// Forward matrix coefficients: (Kr-derived Cr->R, Cb->G, Cr->G, Cb->B)
fn coefficients(matrix: ColorMatrix) -> (f32, f32, f32, f32) {
    match matrix {
        ColorMatrix::Bt601 => (1.402, 0.344136, 0.714136, 1.772),
        ColorMatrix::Bt709 => (1.5748, 0.1873, 0.4681, 1.8556),
    }
}

/// Luma weights (Kr, Kg, Kb)
fn luma_weights(matrix: ColorMatrix) -> (f32, f32, f32) {
    match matrix {
        ColorMatrix::Bt601 => (0.299, 0.587, 0.114),
        ColorMatrix::Bt709 => (0.2126, 0.7152, 0.0722),
    }
}

/// Convert one normalized sample triple to RGB in [0, 1]
pub fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8, colorimetry: Colorimetry) -> [f32; 3] {
    let mut y = y as f32 / 255.0;
    let mut cb = cb as f32 / 255.0 - 0.5;
    let mut cr = cr as f32 / 255.0 - 0.5;

    if colorimetry.range == ColorRange::Limited {
        y = (y - 16.0 / 255.0) * (255.0 / 219.0);
        cb *= 255.0 / 224.0;
        cr *= 255.0 / 224.0;
    }

    let (r_cr, g_cb, g_cr, b_cb) = coefficients(colorimetry.matrix);
    [
        (y + r_cr * cr).clamp(0.0, 1.0),
        (y - g_cb * cb - g_cr * cr).clamp(0.0, 1.0),
        (y + b_cb * cb).clamp(0.0, 1.0),
    ]
}

#[inline]
fn to_u8(value: f32) -> u8 {
    (value * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Convert an NV12 frame to RGBA on the CPU
pub fn nv12_to_rgba(frame: &CameraFrame) -> PipelineResult<RgbaImage> {
    let (luma, y_plane) = frame.luma_plane()?;
    let (chroma, uv_plane) = frame.chroma_plane()?;

    let width = luma.width as usize;
    let height = luma.height as usize;
    let mut rgba = vec![0u8; width * height * 4];

    for (y_idx, row) in rgba.chunks_exact_mut(width * 4).enumerate() {
        let uv_row = (y_idx / 2).min(chroma.height as usize - 1);
        process_row(
            &y_plane[y_idx * luma.stride as usize..],
            &uv_plane[uv_row * chroma.stride as usize..],
            row,
            chroma.width as usize,
            frame.colorimetry,
        );
    }

    debug!(width, height, "Converted NV12 frame on CPU");
    Ok(RgbaImage::from_raw(luma.width, luma.height, rgba)
        .unwrap_or_else(|| RgbaImage::new(luma.width, luma.height)))
}

fn process_row(
    y_row: &[u8],
    uv_row: &[u8],
    rgba_row: &mut [u8],
    chroma_width: usize,
    colorimetry: Colorimetry,
) {
    for (x_idx, pixel) in rgba_row.chunks_exact_mut(4).enumerate() {
        let uv_col = (x_idx / 2).min(chroma_width - 1) * 2;
        let [r, g, b] = ycbcr_to_rgb(
            y_row[x_idx],
            uv_row[uv_col],
            uv_row[uv_col + 1],
            colorimetry,
        );
        pixel.copy_from_slice(&[to_u8(r), to_u8(g), to_u8(b), 255]);
    }
}

/// Encode an RGBA image as tightly packed NV12
///
/// Chroma is averaged over each 2x2 block; odd edges reuse the last row or
/// column.
pub fn rgba_to_nv12(image: &RgbaImage, colorimetry: Colorimetry) -> Vec<u8> {
    let (width, height) = image.dimensions();
    let (chroma_width, chroma_height) = chroma_dimensions(width, height);
    let (kr, kg, kb) = luma_weights(colorimetry.matrix);
    let limited = colorimetry.range == ColorRange::Limited;

    let to_ycbcr = |px: &image::Rgba<u8>| -> (f32, f32, f32) {
        let [r, g, b, _] = px.0.map(|c| c as f32 / 255.0);
        let y = kr * r + kg * g + kb * b;
        let cb = (b - y) / (2.0 * (1.0 - kb));
        let cr = (r - y) / (2.0 * (1.0 - kr));
        (y, cb, cr)
    };
    let encode_luma = |y: f32| {
        if limited {
            to_u8((16.0 + 219.0 * y) / 255.0)
        } else {
            to_u8(y)
        }
    };
    let encode_chroma = |c: f32| {
        if limited {
            to_u8((128.0 + 224.0 * c) / 255.0)
        } else {
            to_u8(c + 0.5)
        }
    };

    let mut data = Vec::with_capacity(CameraFrame::nv12_len(width, height));
    for (_, _, px) in image.enumerate_pixels() {
        data.push(encode_luma(to_ycbcr(px).0));
    }

    for cy in 0..chroma_height {
        for cx in 0..chroma_width {
            let (mut cb_sum, mut cr_sum) = (0.0, 0.0);
            for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                let x = (cx * 2 + dx).min(width - 1);
                let y = (cy * 2 + dy).min(height - 1);
                let (_, cb, cr) = to_ycbcr(image.get_pixel(x, y));
                cb_sum += cb;
                cr_sum += cr;
            }
            data.push(encode_chroma(cb_sum / 4.0));
            data.push(encode_chroma(cr_sum / 4.0));
        }
    }

    data
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_frame(width: u32, height: u32, y: u8, cb: u8, cr: u8) -> CameraFrame {
        let luma_len = (width * height) as usize;
        let mut data = vec![y; luma_len];
        let (cw, ch) = chroma_dimensions(width, height);
        for _ in 0..cw * ch {
            data.extend_from_slice(&[cb, cr]);
        }
        CameraFrame::nv12(width, height, data, Colorimetry::default(), 0, 0)
    }

    #[test]
    fn test_flat_gray_limited_range() {
        // Y=126 limited range is ~128 in full range, neutral chroma
        let image = nv12_to_rgba(&flat_frame(16, 16, 126, 128, 128)).unwrap();
        for px in image.pixels() {
            for c in &px.0[..3] {
                assert!((*c as i32 - 128).abs() <= 2, "got {:?}", px);
            }
            assert_eq!(px.0[3], 255);
        }
    }

    #[test]
    fn test_limited_black_and_white() {
        let black = nv12_to_rgba(&flat_frame(4, 4, 16, 128, 128)).unwrap();
        assert_eq!(black.get_pixel(0, 0).0, [0, 0, 0, 255]);
        let white = nv12_to_rgba(&flat_frame(4, 4, 235, 128, 128)).unwrap();
        assert_eq!(white.get_pixel(3, 3).0, [255, 255, 255, 255]);
    }

    #[test]
    fn test_odd_dimensions() {
        let image = nv12_to_rgba(&flat_frame(5, 3, 128, 128, 128)).unwrap();
        assert_eq!(image.dimensions(), (5, 3));
    }

    #[test]
    fn test_rgba_to_nv12_round_trips_primaries() {
        let colorimetry = Colorimetry::default();
        let image = RgbaImage::from_fn(8, 8, |x, _| {
            if x < 4 {
                image::Rgba([200, 40, 40, 255])
            } else {
                image::Rgba([40, 40, 200, 255])
            }
        });
        let data = rgba_to_nv12(&image, colorimetry);
        assert_eq!(data.len(), CameraFrame::nv12_len(8, 8));

        let frame = CameraFrame::nv12(8, 8, data, colorimetry, 0, 0);
        let back = nv12_to_rgba(&frame).unwrap();
        for (a, b) in image.pixels().zip(back.pixels()) {
            for c in 0..3 {
                assert!((a.0[c] as i32 - b.0[c] as i32).abs() <= 3);
            }
        }
    }
}
