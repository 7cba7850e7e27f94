use image::{Rgba, RgbaImage};

use super::Quality;
use crate::cancel::CancellationFlag;
use crate::error::OpResult;

/// Three box passes approximate a gaussian; previews settle for one.
fn passes(quality: Quality) -> u32 {
    match quality {
        Quality::Full => 3,
        Quality::Preview => 1,
    }
}

pub fn blur(
    input: &RgbaImage,
    radius: u32,
    quality: Quality,
    cancel: &CancellationFlag,
) -> OpResult<RgbaImage> {
    box_blur(input, radius, passes(quality), cancel)
}

/// Unsharp mask: push every colour channel away from its blurred value.
pub fn sharpen(
    input: &RgbaImage,
    amount: f32,
    radius: u32,
    quality: Quality,
    cancel: &CancellationFlag,
) -> OpResult<RgbaImage> {
    let blurred = box_blur(input, radius, passes(quality), cancel)?;
    let mut out = input.clone();
    for (y, row) in out.enumerate_rows_mut() {
        cancel.check()?;
        for (x, _, px) in row {
            let soft = blurred.get_pixel(x, y);
            for channel in 0..3 {
                let orig = px[channel] as f32;
                let detail = orig - soft[channel] as f32;
                px[channel] = (orig + amount * detail).round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    Ok(out)
}

pub(crate) fn box_blur(
    input: &RgbaImage,
    radius: u32,
    passes: u32,
    cancel: &CancellationFlag,
) -> OpResult<RgbaImage> {
    let mut img = input.clone();
    for _ in 0..passes {
        img = blur_pass(&img, radius, Direction::Horizontal, cancel)?;
        img = blur_pass(&img, radius, Direction::Vertical, cancel)?;
    }
    Ok(img)
}

#[derive(Clone, Copy)]
enum Direction {
    Horizontal,
    Vertical,
}

/// One separable sliding-window pass with clamped edges. Each scanline along
/// `direction` is a cancellation safe point.
fn blur_pass(
    src: &RgbaImage,
    radius: u32,
    direction: Direction,
    cancel: &CancellationFlag,
) -> OpResult<RgbaImage> {
    let (w, h) = src.dimensions();
    let (len, lines) = match direction {
        Direction::Horizontal => (w, h),
        Direction::Vertical => (h, w),
    };
    let at = |line: u32, i: u32| match direction {
        Direction::Horizontal => (i, line),
        Direction::Vertical => (line, i),
    };
    let clamp = |i: i64| i.clamp(0, len as i64 - 1) as u32;

    let r = radius as i64;
    let window = 2 * radius + 1;
    let mut out = RgbaImage::new(w, h);

    for line in 0..lines {
        cancel.check()?;

        let mut sum = [0u32; 4];
        for offset in -r..=r {
            let (x, y) = at(line, clamp(offset));
            add(&mut sum, src.get_pixel(x, y));
        }

        for i in 0..len {
            let (x, y) = at(line, i);
            out.put_pixel(x, y, Rgba(sum.map(|s| ((s + window / 2) / window) as u8)));

            let (lx, ly) = at(line, clamp(i as i64 - r));
            let (ex, ey) = at(line, clamp(i as i64 + r + 1));
            sub(&mut sum, src.get_pixel(lx, ly));
            add(&mut sum, src.get_pixel(ex, ey));
        }
    }
    Ok(out)
}

fn add(sum: &mut [u32; 4], px: &Rgba<u8>) {
    for (acc, value) in sum.iter_mut().zip(px.0) {
        *acc += value as u32;
    }
}

fn sub(sum: &mut [u32; 4], px: &Rgba<u8>) {
    for (acc, value) in sum.iter_mut().zip(px.0) {
        *acc -= value as u32;
    }
}
