use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

bitflags::bitflags! {
    /// Notification kinds published by an open image and the macro recorder.
    /// Subscribers pass a mask of the kinds they want delivered.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ChangeFlags: u8 {
        const IMAGE_STATUS  = 0b0000_0001;
        const IMAGE_CONTENT = 0b0000_0010;
        const HISTORY       = 0b0000_0100;
        const OPERATIONS    = 0b0000_1000;
        const MACRO         = 0b0001_0000;
    }
}

/// Integer pixel coordinate. May lie outside the image; drawing clips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Straight (non-premultiplied) RGBA8 colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    #[serde(default = "opaque")]
    pub a: u8,
}

fn opaque() -> u8 {
    255
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a == 255 {
            write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            write!(f, "#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ColorParseError {
    #[error("invalid colour '{0}'. Expected #rrggbb or #rrggbbaa")]
    Length(String),

    #[error("invalid colour '{0}'")]
    Digit(String),
}

impl FromStr for Color {
    type Err = ColorParseError;

    /// Accepts `#rrggbb` or `#rrggbbaa`; the leading `#` is optional.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let hex = value.trim().trim_start_matches('#');
        if !hex.is_ascii() || (hex.len() != 6 && hex.len() != 8) {
            return Err(ColorParseError::Length(value.to_string()));
        }
        let channel = |idx: usize| {
            u8::from_str_radix(&hex[idx..idx + 2], 16)
                .map_err(|_| ColorParseError::Digit(value.to_string()))
        };
        let a = if hex.len() == 8 { channel(6)? } else { 255 };
        Ok(Color::rgba(channel(0)?, channel(2)?, channel(4)?, a))
    }
}
