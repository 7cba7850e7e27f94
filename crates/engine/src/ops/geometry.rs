use image::imageops::{self, FilterType};
use image::RgbaImage;
use serde::{Deserialize, Serialize};

use super::Quality;
use crate::cancel::CancellationFlag;
use crate::error::{OpResult, OperationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlipAxis {
    Horizontal,
    Vertical,
}

pub fn crop(
    input: &RgbaImage,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    cancel: &CancellationFlag,
) -> OpResult<RgbaImage> {
    let (w, h) = input.dimensions();
    let fits = x.checked_add(width).is_some_and(|right| right <= w)
        && y.checked_add(height).is_some_and(|bottom| bottom <= h);
    if !fits {
        return Err(OperationError::invalid(format!(
            "crop region {width}×{height} at ({x}, {y}) exceeds {w}×{h} image"
        )));
    }

    let mut out = RgbaImage::new(width, height);
    for row in 0..height {
        cancel.check()?;
        for col in 0..width {
            out.put_pixel(col, row, *input.get_pixel(x + col, y + row));
        }
    }
    Ok(out)
}

pub fn flip(input: &RgbaImage, axis: FlipAxis, cancel: &CancellationFlag) -> OpResult<RgbaImage> {
    let out = match axis {
        FlipAxis::Horizontal => imageops::flip_horizontal(input),
        FlipAxis::Vertical => imageops::flip_vertical(input),
    };
    cancel.check()?;
    Ok(out)
}

pub fn rotate(input: &RgbaImage, degrees: u32, cancel: &CancellationFlag) -> OpResult<RgbaImage> {
    let out = match degrees {
        90 => imageops::rotate90(input),
        180 => imageops::rotate180(input),
        270 => imageops::rotate270(input),
        other => {
            return Err(OperationError::invalid(format!(
                "rotation of {other}° is not a quarter turn"
            )))
        }
    };
    cancel.check()?;
    Ok(out)
}

pub fn resize(
    input: &RgbaImage,
    width: u32,
    height: u32,
    quality: Quality,
    cancel: &CancellationFlag,
) -> OpResult<RgbaImage> {
    let filter = match quality {
        Quality::Full => FilterType::Lanczos3,
        Quality::Preview => FilterType::Nearest,
    };
    let out = imageops::resize(input, width, height, filter);
    cancel.check()?;
    Ok(out)
}
