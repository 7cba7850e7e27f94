use core_types::{Color, Point};
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::cancel::CancellationFlag;
use crate::error::{OpResult, OperationError};

const MAX_FREEHAND_POINTS: usize = 65_536;

/// Total pen travel of a freehand stroke, in Bresenham steps.
const MAX_FREEHAND_STEPS: i64 = 1 << 24;

/// Shapes may start off-canvas, but not absurdly far away.
const COORD_LIMIT: i32 = 1 << 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Shape {
    Line {
        from: Point,
        to: Point,
    },
    Rectangle {
        origin: Point,
        width: u32,
        height: u32,
    },
    Ellipse {
        center: Point,
        rx: u32,
        ry: u32,
    },
    /// Polyline through the recorded pointer positions.
    Freehand {
        points: Vec<Point>,
    },
}

impl Shape {
    pub fn name(&self) -> &'static str {
        match self {
            Shape::Line { .. } => "line",
            Shape::Rectangle { .. } => "rectangle",
            Shape::Ellipse { .. } => "ellipse",
            Shape::Freehand { .. } => "freehand stroke",
        }
    }

    fn anchors(&self) -> Vec<Point> {
        match self {
            Shape::Line { from, to } => vec![*from, *to],
            Shape::Rectangle { origin, .. } => vec![*origin],
            Shape::Ellipse { center, .. } => vec![*center],
            Shape::Freehand { points } => points.clone(),
        }
    }

    pub(crate) fn validate(&self) -> OpResult<()> {
        let out_of_range = |p: &Point| p.x.abs() > COORD_LIMIT || p.y.abs() > COORD_LIMIT;
        if self.anchors().iter().any(out_of_range) {
            return Err(OperationError::invalid(format!(
                "{} coordinates exceed ±{COORD_LIMIT}",
                self.name()
            )));
        }
        match self {
            Shape::Rectangle { width, height, .. } if *width == 0 || *height == 0 => {
                Err(OperationError::invalid("rectangle has a zero dimension"))
            }
            Shape::Rectangle { width, height, .. }
                if *width > COORD_LIMIT as u32 || *height > COORD_LIMIT as u32 =>
            {
                Err(OperationError::invalid("rectangle is too large"))
            }
            Shape::Ellipse { rx, ry, .. } if *rx == 0 || *ry == 0 => {
                Err(OperationError::invalid("ellipse has a zero radius"))
            }
            Shape::Ellipse { rx, ry, .. }
                if *rx > COORD_LIMIT as u32 || *ry > COORD_LIMIT as u32 =>
            {
                Err(OperationError::invalid("ellipse is too large"))
            }
            Shape::Freehand { points } if points.is_empty() => {
                Err(OperationError::invalid("freehand stroke has no points"))
            }
            Shape::Freehand { points } if points.len() > MAX_FREEHAND_POINTS => Err(
                OperationError::invalid(format!("freehand stroke exceeds {MAX_FREEHAND_POINTS} points")),
            ),
            Shape::Freehand { points } if path_steps(points) > MAX_FREEHAND_STEPS => Err(
                OperationError::invalid("freehand stroke is too long"),
            ),
            _ => Ok(()),
        }
    }
}

fn path_steps(points: &[Point]) -> i64 {
    points
        .windows(2)
        .map(|pair| {
            let dx = (i64::from(pair[1].x) - i64::from(pair[0].x)).abs();
            let dy = (i64::from(pair[1].y) - i64::from(pair[0].y)).abs();
            dx.max(dy)
        })
        .sum()
}

/// Rasterise `shape` into a coverage mask, then blend the brush colour once
/// per covered pixel, so overlaps never darken a translucent colour twice.
/// Loops are clipped to the canvas.
pub fn draw(
    input: &RgbaImage,
    shape: &Shape,
    color: Color,
    stroke: u32,
    filled: bool,
    cancel: &CancellationFlag,
) -> OpResult<RgbaImage> {
    let (w, h) = input.dimensions();
    let mut coverage = Coverage::new(w, h);
    let stroke = i64::from(stroke);

    match shape {
        Shape::Line { from, to } => coverage.line(*from, *to, stroke, cancel)?,
        Shape::Rectangle {
            origin,
            width,
            height,
        } => {
            let (left, top) = (i64::from(origin.x), i64::from(origin.y));
            let right = left + i64::from(*width) - 1;
            let bottom = top + i64::from(*height) - 1;
            if filled {
                coverage.fill_rect(left, top, right, bottom, cancel)?;
            } else {
                // Four bands inset by the stroke width, so corners are square.
                let inset = stroke - 1;
                coverage.fill_rect(left, top, right, top + inset, cancel)?;
                coverage.fill_rect(left, bottom - inset, right, bottom, cancel)?;
                coverage.fill_rect(left, top, left + inset, bottom, cancel)?;
                coverage.fill_rect(right - inset, top, right, bottom, cancel)?;
            }
        }
        Shape::Ellipse { center, rx, ry } => {
            let ring = if filled { None } else { Some(stroke) };
            coverage.ellipse(*center, *rx, *ry, ring, cancel)?
        }
        Shape::Freehand { points } => {
            if let [only] = points.as_slice() {
                coverage.stamp(*only, stroke, cancel)?;
            }
            for pair in points.windows(2) {
                coverage.line(pair[0], pair[1], stroke, cancel)?;
            }
        }
    }

    coverage.paint(input, color, cancel)
}

/// Offsets of a square brush of side `stroke`, centred on the pen position.
fn brush(stroke: i64) -> (i64, i64) {
    let lo = -((stroke - 1) / 2);
    (lo, lo + stroke - 1)
}

struct Coverage {
    width: i64,
    height: i64,
    hits: Vec<bool>,
}

impl Coverage {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width: i64::from(width),
            height: i64::from(height),
            hits: vec![false; width as usize * height as usize],
        }
    }

    fn mark(&mut self, x: i64, y: i64) {
        if x >= 0 && y >= 0 && x < self.width && y < self.height {
            self.hits[(y * self.width + x) as usize] = true;
        }
    }

    /// Inclusive horizontal run on row `y`, clipped.
    fn mark_span(&mut self, y: i64, x0: i64, x1: i64) {
        if y < 0 || y >= self.height {
            return;
        }
        let (left, right) = (x0.max(0), x1.min(self.width - 1));
        if left > right {
            return;
        }
        let row = (y * self.width) as usize;
        self.hits[row + left as usize..=row + right as usize].fill(true);
    }

    fn fill_rect(
        &mut self,
        x0: i64,
        y0: i64,
        x1: i64,
        y1: i64,
        cancel: &CancellationFlag,
    ) -> OpResult<()> {
        let (top, bottom) = (y0.min(y1).max(0), y0.max(y1).min(self.height - 1));
        for y in top..=bottom {
            cancel.check()?;
            self.mark_span(y, x0.min(x1), x0.max(x1));
        }
        Ok(())
    }

    fn stamp(&mut self, p: Point, stroke: i64, cancel: &CancellationFlag) -> OpResult<()> {
        let (lo, hi) = brush(stroke);
        let (x, y) = (i64::from(p.x), i64::from(p.y));
        self.fill_rect(x + lo, y + lo, x + hi, y + hi, cancel)
    }

    /// Bresenham walk with a square brush. Along one segment the pen moves at
    /// most one pixel per step, so the brush covers a single run on every
    /// row; only those runs are collected, clipped to the canvas.
    fn line(&mut self, from: Point, to: Point, stroke: i64, cancel: &CancellationFlag) -> OpResult<()> {
        if stroke == 1 {
            for (step, (x, y)) in Bresenham::new(from, to).enumerate() {
                if step % 4096 == 0 {
                    cancel.check()?;
                }
                self.mark(x, y);
            }
            return Ok(());
        }

        let (lo, hi) = brush(stroke);
        let (fy, ty) = (i64::from(from.y), i64::from(to.y));
        let top = (fy.min(ty) + lo).max(0);
        let bottom = (fy.max(ty) + hi).min(self.height - 1);
        if top > bottom {
            return Ok(());
        }

        let mut runs: Vec<Option<(i64, i64)>> = vec![None; (bottom - top + 1) as usize];
        for (x, y) in Bresenham::new(from, to) {
            let (first, last) = ((y + lo).max(top), (y + hi).min(bottom));
            if first > last {
                continue;
            }
            cancel.check()?;
            for row in first..=last {
                let run = &mut runs[(row - top) as usize];
                *run = Some(match *run {
                    Some((l, r)) => (l.min(x + lo), r.max(x + hi)),
                    None => (x + lo, x + hi),
                });
            }
        }
        for (offset, run) in runs.into_iter().enumerate() {
            if let Some((l, r)) = run {
                self.mark_span(top + offset as i64, l, r);
            }
        }
        Ok(())
    }

    /// Filled when `ring` is `None`, otherwise a band `ring` pixels thick.
    fn ellipse(
        &mut self,
        center: Point,
        rx: u32,
        ry: u32,
        ring: Option<i64>,
        cancel: &CancellationFlag,
    ) -> OpResult<()> {
        let (rx_f, ry_f) = (f64::from(rx), f64::from(ry));
        let inner = ring.map(|s| ((rx_f - s as f64).max(0.0), (ry_f - s as f64).max(0.0)));
        let inside = |dx: f64, dy: f64, a: f64, b: f64| {
            a > 0.0 && b > 0.0 && (dx * dx) / (a * a) + (dy * dy) / (b * b) <= 1.0
        };

        let (cx, cy) = (i64::from(center.x), i64::from(center.y));
        let (rx, ry) = (i64::from(rx), i64::from(ry));
        let (dy_lo, dy_hi) = ((-ry).max(-cy), ry.min(self.height - 1 - cy));
        let (dx_lo, dx_hi) = ((-rx).max(-cx), rx.min(self.width - 1 - cx));

        for dy in dy_lo..=dy_hi {
            cancel.check()?;
            for dx in dx_lo..=dx_hi {
                let (fx, fy) = (dx as f64, dy as f64);
                if !inside(fx, fy, rx_f, ry_f) {
                    continue;
                }
                if let Some((ix, iy)) = inner {
                    if inside(fx, fy, ix, iy) {
                        continue;
                    }
                }
                self.mark(cx + dx, cy + dy);
            }
        }
        Ok(())
    }

    fn paint(&self, input: &RgbaImage, color: Color, cancel: &CancellationFlag) -> OpResult<RgbaImage> {
        let mut out = input.clone();
        let width = self.width as usize;
        for (y, row) in out.enumerate_rows_mut() {
            cancel.check()?;
            for (x, _, px) in row {
                if self.hits[y as usize * width + x as usize] {
                    *px = blend(*px, color);
                }
            }
        }
        Ok(out)
    }
}

fn blend(dst: Rgba<u8>, color: Color) -> Rgba<u8> {
    let a = color.a as u32;
    if a == 255 {
        return Rgba(color.to_array());
    }
    if a == 0 {
        return dst;
    }
    let [dr, dg, db, da] = dst.0.map(u32::from);
    let inv = 255 - a;
    let out_a = a + da * inv / 255;
    let mix = |s: u8, d: u32| {
        if out_a == 0 {
            0
        } else {
            ((s as u32 * a + d * da * inv / 255) / out_a).min(255) as u8
        }
    };
    Rgba([
        mix(color.r, dr),
        mix(color.g, dg),
        mix(color.b, db),
        out_a.min(255) as u8,
    ])
}

/// Lazily yields every pixel on the segment, endpoints included.
struct Bresenham {
    x: i64,
    y: i64,
    x1: i64,
    y1: i64,
    dx: i64,
    dy: i64,
    sx: i64,
    sy: i64,
    err: i64,
    done: bool,
}

impl Bresenham {
    fn new(from: Point, to: Point) -> Self {
        let (x, y) = (i64::from(from.x), i64::from(from.y));
        let (x1, y1) = (i64::from(to.x), i64::from(to.y));
        let dx = (x1 - x).abs();
        let dy = -(y1 - y).abs();
        Self {
            x,
            y,
            x1,
            y1,
            dx,
            dy,
            sx: if x < x1 { 1 } else { -1 },
            sy: if y < y1 { 1 } else { -1 },
            err: dx + dy,
            done: false,
        }
    }
}

impl Iterator for Bresenham {
    type Item = (i64, i64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let point = (self.x, self.y);
        if self.x == self.x1 && self.y == self.y1 {
            self.done = true;
            return Some(point);
        }
        let e2 = 2 * self.err;
        if e2 >= self.dy {
            self.err += self.dy;
            self.x += self.sx;
        }
        if e2 <= self.dx {
            self.err += self.dx;
            self.y += self.sy;
        }
        Some(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    const RED: Color = Color::rgb(255, 0, 0);

    fn blank(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255]))
    }

    fn is_red(img: &RgbaImage, x: u32, y: u32) -> bool {
        img.get_pixel(x, y) == &Rgba([255, 0, 0, 255])
    }

    #[test]
    fn diagonal_line_hits_both_endpoints() {
        let shape = Shape::Line {
            from: Point::new(0, 0),
            to: Point::new(4, 4),
        };
        let out = draw(&blank(5, 5), &shape, RED, 1, false, &CancellationFlag::new()).unwrap();
        for i in 0..5 {
            assert!(is_red(&out, i, i));
        }
        assert!(!is_red(&out, 4, 0));
    }

    #[test]
    fn outlined_rectangle_leaves_interior() {
        let shape = Shape::Rectangle {
            origin: Point::new(1, 1),
            width: 5,
            height: 5,
        };
        let out = draw(&blank(7, 7), &shape, RED, 1, false, &CancellationFlag::new()).unwrap();
        assert!(is_red(&out, 1, 1));
        assert!(is_red(&out, 5, 3));
        assert!(!is_red(&out, 3, 3));
        assert!(!is_red(&out, 0, 0));
    }

    #[test]
    fn filled_ellipse_covers_center_not_corners() {
        let shape = Shape::Ellipse {
            center: Point::new(5, 5),
            rx: 4,
            ry: 3,
        };
        let out = draw(&blank(11, 11), &shape, RED, 1, true, &CancellationFlag::new()).unwrap();
        assert!(is_red(&out, 5, 5));
        assert!(is_red(&out, 9, 5));
        assert!(!is_red(&out, 9, 8));
    }

    #[test]
    fn shapes_clip_at_image_edges() {
        let shape = Shape::Line {
            from: Point::new(-10, 2),
            to: Point::new(20, 2),
        };
        let out = draw(&blank(4, 4), &shape, RED, 3, false, &CancellationFlag::new()).unwrap();
        assert!(is_red(&out, 0, 1));
        assert!(is_red(&out, 3, 3));
        assert!(!is_red(&out, 0, 0));
    }

    #[test]
    fn translucent_thick_line_blends_once() {
        let shape = Shape::Freehand {
            points: vec![Point::new(0, 1), Point::new(2, 1), Point::new(3, 1)],
        };
        let color = Color::rgba(0, 0, 0, 128);
        let out = draw(&blank(4, 3), &shape, color, 3, false, &CancellationFlag::new()).unwrap();
        let first = *out.get_pixel(0, 1);
        assert_eq!(out.get_pixel(2, 1), &first);
        assert_eq!(out.get_pixel(1, 0), &first);
    }

    #[test]
    fn translucent_thin_freehand_blends_joints_once() {
        let shape = Shape::Freehand {
            points: vec![Point::new(0, 0), Point::new(1, 0), Point::new(3, 0)],
        };
        let color = Color::rgba(0, 0, 0, 128);
        let out = draw(&blank(4, 2), &shape, color, 1, false, &CancellationFlag::new()).unwrap();
        let first = *out.get_pixel(0, 0);
        assert_ne!(first, Rgba([255, 255, 255, 255]));
        for x in 1..4 {
            assert_eq!(out.get_pixel(x, 0), &first);
        }
        assert_eq!(out.get_pixel(0, 1), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn translucent_rectangle_corners_blend_once() {
        let shape = Shape::Rectangle {
            origin: Point::new(0, 0),
            width: 6,
            height: 6,
        };
        let color = Color::rgba(0, 0, 0, 128);
        let out = draw(&blank(6, 6), &shape, color, 2, false, &CancellationFlag::new()).unwrap();
        let edge = *out.get_pixel(3, 0);
        for (x, y) in [(0, 0), (1, 1), (5, 0), (0, 5), (5, 5), (4, 4)] {
            assert_eq!(out.get_pixel(x, y), &edge, "({x}, {y})");
        }
        assert_eq!(out.get_pixel(2, 2), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn oversized_shapes_on_tiny_canvas_finish_quickly() {
        let started = Instant::now();
        let ellipse = Shape::Ellipse {
            center: Point::new(2, 2),
            rx: COORD_LIMIT as u32,
            ry: COORD_LIMIT as u32,
        };
        assert!(ellipse.validate().is_ok());
        let out = draw(&blank(4, 4), &ellipse, RED, 1, true, &CancellationFlag::new()).unwrap();
        assert!(out.pixels().all(|px| px == &Rgba([255, 0, 0, 255])));

        // The band lies far outside the canvas.
        let ring = draw(&blank(4, 4), &ellipse, RED, 16_384, false, &CancellationFlag::new()).unwrap();
        assert_eq!(ring, blank(4, 4));

        let line = Shape::Line {
            from: Point::new(-COORD_LIMIT, 1),
            to: Point::new(COORD_LIMIT, 2),
        };
        let out = draw(&blank(4, 4), &line, RED, 16_384, false, &CancellationFlag::new()).unwrap();
        assert!(out.pixels().all(|px| px == &Rgba([255, 0, 0, 255])));

        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn empty_freehand_is_rejected() {
        assert!(Shape::Freehand { points: vec![] }.validate().is_err());
    }

    #[test]
    fn overlong_freehand_is_rejected() {
        let points = (0..64)
            .map(|i| Point::new(if i % 2 == 0 { -COORD_LIMIT } else { COORD_LIMIT }, 0))
            .collect();
        assert!(Shape::Freehand { points }.validate().is_err());
    }
}
