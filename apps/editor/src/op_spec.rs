//! Command-line shorthand for operations, e.g. `crop:0,0,64,64` or
//! `rect:4,4,10,6,#ff0000,fill`.

use core_types::{Color, ColorParseError, Point};
use engine::{FlipAxis, Operation, Shape};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OpSpecError {
    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("'{name}' expects {expected}")]
    Arguments {
        name: String,
        expected: &'static str,
    },

    #[error("invalid number '{0}'")]
    Number(String),

    #[error("invalid flip axis '{0}'. Expected h or v")]
    Axis(String),

    #[error(transparent)]
    Color(#[from] ColorParseError),
}

/// Parse one `name[:arg,arg,...]` spec into an operation. Range checks are
/// left to the engine so the messages match what an interactive edit shows.
pub fn parse_op(spec: &str) -> Result<Operation, OpSpecError> {
    let (name, rest) = match spec.split_once(':') {
        Some((name, rest)) => (name.trim(), rest),
        None => (spec.trim(), ""),
    };
    let args: Vec<&str> = if rest.trim().is_empty() {
        Vec::new()
    } else {
        rest.split(',').map(str::trim).collect()
    };
    let name = name.to_ascii_lowercase();
    let arity = |expected: &'static str| OpSpecError::Arguments {
        name: name.clone(),
        expected,
    };

    let op = match name.as_str() {
        "crop" => {
            let [x, y, w, h] = args[..] else {
                return Err(arity("x,y,width,height"));
            };
            Operation::Crop {
                x: number(x)?,
                y: number(y)?,
                width: number(w)?,
                height: number(h)?,
            }
        }
        "flip" => {
            let [axis] = args[..] else {
                return Err(arity("h or v"));
            };
            let axis = match axis.to_ascii_lowercase().as_str() {
                "h" | "horizontal" => FlipAxis::Horizontal,
                "v" | "vertical" => FlipAxis::Vertical,
                _ => return Err(OpSpecError::Axis(axis.to_string())),
            };
            Operation::Flip { axis }
        }
        "rotate" => {
            let [degrees] = args[..] else {
                return Err(arity("degrees"));
            };
            Operation::Rotate {
                degrees: number(degrees)?,
            }
        }
        "resize" => {
            let [w, h] = args[..] else {
                return Err(arity("width,height"));
            };
            Operation::Resize {
                width: number(w)?,
                height: number(h)?,
            }
        }
        "brightness" => {
            let [b, c] = args[..] else {
                return Err(arity("brightness,contrast"));
            };
            Operation::BrightnessContrast {
                brightness: number(b)?,
                contrast: number(c)?,
            }
        }
        "grayscale" | "greyscale" if args.is_empty() => Operation::Grayscale,
        "invert" if args.is_empty() => Operation::Invert,
        "grayscale" | "greyscale" | "invert" => return Err(arity("no arguments")),
        "blur" => {
            let [radius] = args[..] else {
                return Err(arity("radius"));
            };
            Operation::Blur {
                radius: number(radius)?,
            }
        }
        "sharpen" => match args[..] {
            [amount] => Operation::Sharpen {
                amount: number(amount)?,
                radius: 1,
            },
            [amount, radius] => Operation::Sharpen {
                amount: number(amount)?,
                radius: number(radius)?,
            },
            _ => return Err(arity("amount[,radius]")),
        },
        "line" => {
            let (stroke, coords) = match args[..] {
                [x0, y0, x1, y1, color] => (1, [x0, y0, x1, y1, color]),
                [x0, y0, x1, y1, color, width] => (number(width)?, [x0, y0, x1, y1, color]),
                _ => return Err(arity("x0,y0,x1,y1,#rrggbb[,width]")),
            };
            let [x0, y0, x1, y1, color] = coords;
            Operation::DrawShape {
                shape: Shape::Line {
                    from: Point::new(number(x0)?, number(y0)?),
                    to: Point::new(number(x1)?, number(y1)?),
                },
                color: color_arg(color)?,
                stroke,
                filled: false,
            }
        }
        "rect" | "ellipse" => {
            let (filled, fields) = match args[..] {
                [a, b, c, d, color] => (false, [a, b, c, d, color]),
                [a, b, c, d, color, flag] if flag.eq_ignore_ascii_case("fill") => {
                    (true, [a, b, c, d, color])
                }
                _ if name == "rect" => return Err(arity("x,y,width,height,#rrggbb[,fill]")),
                _ => return Err(arity("cx,cy,rx,ry,#rrggbb[,fill]")),
            };
            let [a, b, c, d, color] = fields;
            let anchor = Point::new(number(a)?, number(b)?);
            let shape = if name == "rect" {
                Shape::Rectangle {
                    origin: anchor,
                    width: number(c)?,
                    height: number(d)?,
                }
            } else {
                Shape::Ellipse {
                    center: anchor,
                    rx: number(c)?,
                    ry: number(d)?,
                }
            };
            Operation::DrawShape {
                shape,
                color: color_arg(color)?,
                stroke: 1,
                filled,
            }
        }
        _ => return Err(OpSpecError::UnknownOperation(name.clone())),
    };
    Ok(op)
}

fn number<T: FromStr>(raw: &str) -> Result<T, OpSpecError> {
    raw.parse().map_err(|_| OpSpecError::Number(raw.to_string()))
}

fn color_arg(raw: &str) -> Result<Color, OpSpecError> {
    Ok(raw.parse::<Color>()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_geometry_specs() {
        assert_eq!(
            parse_op("crop:0,1,5,6").unwrap(),
            Operation::Crop {
                x: 0,
                y: 1,
                width: 5,
                height: 6
            }
        );
        assert_eq!(
            parse_op("flip:h").unwrap(),
            Operation::Flip {
                axis: FlipAxis::Horizontal
            }
        );
        assert_eq!(
            parse_op("FLIP:vertical").unwrap(),
            Operation::Flip {
                axis: FlipAxis::Vertical
            }
        );
        assert_eq!(parse_op("rotate:270").unwrap(), Operation::Rotate { degrees: 270 });
        assert_eq!(
            parse_op("resize: 64, 32").unwrap(),
            Operation::Resize {
                width: 64,
                height: 32
            }
        );
    }

    #[test]
    fn parses_adjustments_and_filters() {
        assert_eq!(parse_op("invert").unwrap(), Operation::Invert);
        assert_eq!(parse_op("grayscale").unwrap(), Operation::Grayscale);
        assert_eq!(
            parse_op("brightness:-20,15").unwrap(),
            Operation::BrightnessContrast {
                brightness: -20,
                contrast: 15
            }
        );
        assert_eq!(parse_op("blur:4").unwrap(), Operation::Blur { radius: 4 });
        assert_eq!(
            parse_op("sharpen:1.5").unwrap(),
            Operation::Sharpen {
                amount: 1.5,
                radius: 1
            }
        );
        assert_eq!(
            parse_op("sharpen:2,3").unwrap(),
            Operation::Sharpen {
                amount: 2.0,
                radius: 3
            }
        );
    }

    #[test]
    fn parses_shapes() {
        assert_eq!(
            parse_op("line:0,0,9,9,#ff0000,3").unwrap(),
            Operation::DrawShape {
                shape: Shape::Line {
                    from: Point::new(0, 0),
                    to: Point::new(9, 9)
                },
                color: Color::rgb(255, 0, 0),
                stroke: 3,
                filled: false,
            }
        );
        assert_eq!(
            parse_op("rect:-2,4,10,6,#00ff00,fill").unwrap(),
            Operation::DrawShape {
                shape: Shape::Rectangle {
                    origin: Point::new(-2, 4),
                    width: 10,
                    height: 6
                },
                color: Color::rgb(0, 255, 0),
                stroke: 1,
                filled: true,
            }
        );
        assert_eq!(
            parse_op("ellipse:5,5,3,2,#0000ff").unwrap(),
            Operation::DrawShape {
                shape: Shape::Ellipse {
                    center: Point::new(5, 5),
                    rx: 3,
                    ry: 2
                },
                color: Color::rgb(0, 0, 255),
                stroke: 1,
                filled: false,
            }
        );
    }

    #[test]
    fn rejects_malformed_specs() {
        assert_eq!(
            parse_op("sepia"),
            Err(OpSpecError::UnknownOperation("sepia".into()))
        );
        assert!(matches!(
            parse_op("crop:1,2,3"),
            Err(OpSpecError::Arguments { .. })
        ));
        assert!(matches!(parse_op("invert:1"), Err(OpSpecError::Arguments { .. })));
        assert_eq!(parse_op("blur:big"), Err(OpSpecError::Number("big".into())));
        assert_eq!(parse_op("flip:x"), Err(OpSpecError::Axis("x".into())));
        assert!(matches!(
            parse_op("rect:0,0,4,4,#zzzzzz"),
            Err(OpSpecError::Color(_))
        ));
        assert!(matches!(
            parse_op("rect:0,0,4,4,#000000,hollow"),
            Err(OpSpecError::Arguments { .. })
        ));
    }
}
