use image::{Rgba, RgbaImage};

use super::map_pixels;
use crate::cancel::CancellationFlag;
use crate::error::OpResult;

pub fn brightness_contrast(
    input: &RgbaImage,
    brightness: i32,
    contrast: i32,
    cancel: &CancellationFlag,
) -> OpResult<RgbaImage> {
    let lut = build_brightness_contrast_lut(brightness, contrast);
    map_pixels(input, cancel, |px| {
        let [r, g, b, a] = px.0;
        Rgba([lut[r as usize], lut[g as usize], lut[b as usize], a])
    })
}

/// Brightness shifts by up to a full channel range; contrast uses the
/// classic 259-based factor around mid-grey.
fn build_brightness_contrast_lut(brightness: i32, contrast: i32) -> [u8; 256] {
    let offset = brightness as f32 * 255.0 / 100.0;
    let c = contrast as f32 * 2.55;
    let factor = (259.0 * (c + 255.0)) / (255.0 * (259.0 - c));

    let mut lut = [0u8; 256];
    for (value, slot) in lut.iter_mut().enumerate() {
        let shifted = value as f32 + offset;
        let out = factor * (shifted - 128.0) + 128.0;
        *slot = out.round().clamp(0.0, 255.0) as u8;
    }
    lut
}

pub fn grayscale(input: &RgbaImage, cancel: &CancellationFlag) -> OpResult<RgbaImage> {
    map_pixels(input, cancel, |px| {
        let [r, g, b, a] = px.0;
        let luma = (299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000;
        let l = luma.min(255) as u8;
        Rgba([l, l, l, a])
    })
}

pub fn invert(input: &RgbaImage, cancel: &CancellationFlag) -> OpResult<RgbaImage> {
    map_pixels(input, cancel, |px| {
        let [r, g, b, a] = px.0;
        Rgba([255 - r, 255 - g, 255 - b, a])
    })
}
