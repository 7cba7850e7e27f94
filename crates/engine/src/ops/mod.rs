//! The operation contract shared by history, live preview and macros.
//!
//! An [`Operation`] is an immutable set of parameters plus three behaviours:
//! a full-quality [`Operation::apply`], a cheaper cancellable
//! [`Operation::preview`], and a human-readable [`Operation::describe`].
//! Operations never hold a reference to the image they act on.

use std::fmt;

use core_types::Color;
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::cancel::CancellationFlag;
use crate::error::{OpResult, OperationError};

pub mod adjust;
pub mod convolve;
pub mod geometry;
pub mod shape;

pub use geometry::FlipAxis;
pub use shape::Shape;

/// Largest edge accepted for any operation that creates a new canvas size.
pub const MAX_DIMENSION: u32 = 16_384;

/// Largest blur radius accepted, in pixels.
pub const MAX_BLUR_RADIUS: u32 = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Crop {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    Flip {
        axis: FlipAxis,
    },
    /// Clockwise rotation; only quarter turns are supported.
    Rotate {
        degrees: u32,
    },
    Resize {
        width: u32,
        height: u32,
    },
    /// Both parameters range over -100..=100.
    BrightnessContrast {
        brightness: i32,
        contrast: i32,
    },
    Grayscale,
    Invert,
    Blur {
        radius: u32,
    },
    Sharpen {
        amount: f32,
        radius: u32,
    },
    DrawShape {
        shape: Shape,
        color: Color,
        #[serde(default = "default_stroke")]
        stroke: u32,
        #[serde(default)]
        filled: bool,
    },
}

fn default_stroke() -> u32 {
    1
}

/// The "tool" an operation belongs to. Two operations of the same kind differ
/// only in their parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Crop,
    Flip,
    Rotate,
    Resize,
    BrightnessContrast,
    Grayscale,
    Invert,
    Blur,
    Sharpen,
    DrawShape,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Crop => "crop",
            OperationKind::Flip => "flip",
            OperationKind::Rotate => "rotate",
            OperationKind::Resize => "resize",
            OperationKind::BrightnessContrast => "brightness/contrast",
            OperationKind::Grayscale => "grayscale",
            OperationKind::Invert => "invert",
            OperationKind::Blur => "blur",
            OperationKind::Sharpen => "sharpen",
            OperationKind::DrawShape => "shape",
        };
        f.write_str(name)
    }
}

/// Rendering fidelity requested from a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Full,
    Preview,
}

impl Operation {
    /// Full-quality transformation. Never cancelled.
    pub fn apply(&self, input: &RgbaImage) -> OpResult<RgbaImage> {
        self.run(input, Quality::Full, &CancellationFlag::new())
    }

    /// Fast, possibly lower-quality transformation. Returns
    /// [`OperationError::Cancelled`] once `cancel` is raised. Pixel, filter and
    /// drawing kernels poll it per scanline; flip, rotate and resize delegate
    /// to `imageops` and only check before and after the whole pass.
    pub fn preview(&self, input: &RgbaImage, cancel: &CancellationFlag) -> OpResult<RgbaImage> {
        self.run(input, Quality::Preview, cancel)
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Crop { .. } => OperationKind::Crop,
            Operation::Flip { .. } => OperationKind::Flip,
            Operation::Rotate { .. } => OperationKind::Rotate,
            Operation::Resize { .. } => OperationKind::Resize,
            Operation::BrightnessContrast { .. } => OperationKind::BrightnessContrast,
            Operation::Grayscale => OperationKind::Grayscale,
            Operation::Invert => OperationKind::Invert,
            Operation::Blur { .. } => OperationKind::Blur,
            Operation::Sharpen { .. } => OperationKind::Sharpen,
            Operation::DrawShape { .. } => OperationKind::DrawShape,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Operation::Crop {
                x,
                y,
                width,
                height,
            } => format!("Crop to {width}×{height} at ({x}, {y})"),
            Operation::Flip { axis } => match axis {
                FlipAxis::Horizontal => "Flip horizontally".to_string(),
                FlipAxis::Vertical => "Flip vertically".to_string(),
            },
            Operation::Rotate { degrees } => format!("Rotate {degrees}°"),
            Operation::Resize { width, height } => format!("Resize to {width}×{height}"),
            Operation::BrightnessContrast {
                brightness,
                contrast,
            } => format!("Brightness {brightness:+}, contrast {contrast:+}"),
            Operation::Grayscale => "Grayscale".to_string(),
            Operation::Invert => "Invert colours".to_string(),
            Operation::Blur { radius } => format!("Blur (radius {radius})"),
            Operation::Sharpen { amount, radius } => {
                format!("Sharpen (amount {amount:.2}, radius {radius})")
            }
            Operation::DrawShape {
                shape,
                color,
                filled,
                ..
            } => {
                let style = if *filled { "filled " } else { "" };
                format!("Draw {style}{} in {color}", shape.name())
            }
        }
    }

    /// Parameter checks that do not depend on the input buffer.
    pub fn validate(&self) -> OpResult<()> {
        match self {
            Operation::Crop { width, height, .. } => {
                if *width == 0 || *height == 0 {
                    return Err(OperationError::invalid("crop region is empty"));
                }
            }
            Operation::Rotate { degrees } => {
                if !matches!(degrees, 90 | 180 | 270) {
                    return Err(OperationError::invalid(format!(
                        "rotation of {degrees}° is not a quarter turn"
                    )));
                }
            }
            Operation::Resize { width, height } => {
                if *width == 0 || *height == 0 {
                    return Err(OperationError::invalid("resize target has a zero dimension"));
                }
                if *width > MAX_DIMENSION || *height > MAX_DIMENSION {
                    return Err(OperationError::invalid(format!(
                        "resize target {width}×{height} exceeds {MAX_DIMENSION} pixels"
                    )));
                }
            }
            Operation::BrightnessContrast {
                brightness,
                contrast,
            } => {
                if !(-100..=100).contains(brightness) || !(-100..=100).contains(contrast) {
                    return Err(OperationError::invalid(
                        "brightness and contrast must lie within -100..=100",
                    ));
                }
            }
            Operation::Blur { radius } => check_radius(*radius)?,
            Operation::Sharpen { amount, radius } => {
                if !amount.is_finite() || *amount <= 0.0 || *amount > 10.0 {
                    return Err(OperationError::invalid(format!(
                        "sharpen amount {amount} outside (0, 10]"
                    )));
                }
                check_radius(*radius)?;
            }
            Operation::DrawShape { shape, stroke, .. } => {
                if *stroke == 0 || *stroke > MAX_DIMENSION {
                    return Err(OperationError::invalid(format!(
                        "stroke width {stroke} is out of range"
                    )));
                }
                shape.validate()?;
            }
            Operation::Flip { .. } | Operation::Grayscale | Operation::Invert => {}
        }
        Ok(())
    }

    fn run(
        &self,
        input: &RgbaImage,
        quality: Quality,
        cancel: &CancellationFlag,
    ) -> OpResult<RgbaImage> {
        if input.width() == 0 || input.height() == 0 {
            return Err(OperationError::invalid("input image is empty"));
        }
        self.validate()?;
        cancel.check()?;

        match self {
            Operation::Crop {
                x,
                y,
                width,
                height,
            } => geometry::crop(input, *x, *y, *width, *height, cancel),
            Operation::Flip { axis } => geometry::flip(input, *axis, cancel),
            Operation::Rotate { degrees } => geometry::rotate(input, *degrees, cancel),
            Operation::Resize { width, height } => {
                geometry::resize(input, *width, *height, quality, cancel)
            }
            Operation::BrightnessContrast {
                brightness,
                contrast,
            } => adjust::brightness_contrast(input, *brightness, *contrast, cancel),
            Operation::Grayscale => adjust::grayscale(input, cancel),
            Operation::Invert => adjust::invert(input, cancel),
            Operation::Blur { radius } => convolve::blur(input, *radius, quality, cancel),
            Operation::Sharpen { amount, radius } => {
                convolve::sharpen(input, *amount, *radius, quality, cancel)
            }
            Operation::DrawShape {
                shape,
                color,
                stroke,
                filled,
            } => shape::draw(input, shape, *color, *stroke, *filled, cancel),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

fn check_radius(radius: u32) -> OpResult<()> {
    if radius == 0 || radius > MAX_BLUR_RADIUS {
        return Err(OperationError::invalid(format!(
            "radius {radius} outside 1..={MAX_BLUR_RADIUS}"
        )));
    }
    Ok(())
}

/// Fold `ops` over `original` from scratch.
pub fn fold(original: &RgbaImage, ops: &[Operation]) -> OpResult<RgbaImage> {
    let mut current = original.clone();
    for op in ops {
        current = op.apply(&current)?;
    }
    Ok(current)
}

/// Per-pixel map over a copy of `input`, polling `cancel` once per row.
pub(crate) fn map_pixels<F>(input: &RgbaImage, cancel: &CancellationFlag, f: F) -> OpResult<RgbaImage>
where
    F: Fn(Rgba<u8>) -> Rgba<u8>,
{
    let mut out = input.clone();
    for (_, row) in out.enumerate_rows_mut() {
        cancel.check()?;
        for (_, _, px) in row {
            *px = f(*px);
        }
    }
    Ok(out)
}
