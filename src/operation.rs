//! Abstract image operations, independent of any IIIF version.
//!
//! An [`OperationList`] is what the request parameters compile to and what
//! the processor in [`crate::image_ops`] executes, in order.

use std::collections::BTreeMap;
use std::fmt;

use crate::format::Format;
use crate::geometry::{Dimension, Rectangle, ScaleConstraint};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Crop {
    /// Fractions of the full size, `0.0..=1.0`.
    ByPercent {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
    ByPixels {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    /// The largest centered square.
    ToSquare,
}

impl Crop {
    pub fn full() -> Self {
        Self::ByPercent {
            x: 0.0,
            y: 0.0,
            width: 1.0,
            height: 1.0,
        }
    }

    /// The area of an image of `full_size` selected by the crop.
    pub fn rectangle(&self, full_size: &Dimension) -> Rectangle {
        let rect = match *self {
            Self::ByPercent {
                x,
                y,
                width,
                height,
            } => Rectangle::new(
                x * full_size.width(),
                y * full_size.height(),
                width * full_size.width(),
                height * full_size.height(),
            ),
            Self::ByPixels {
                x,
                y,
                width,
                height,
            } => Rectangle::new(
                f64::from(x),
                f64::from(y),
                f64::from(width),
                f64::from(height),
            ),
            Self::ToSquare => {
                let side = full_size.width().min(full_size.height());
                Rectangle::new(
                    (full_size.width() - side) / 2.0,
                    (full_size.height() - side) / 2.0,
                    side,
                    side,
                )
            }
        };
        rect.clipped_to(full_size)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Scale {
    /// A factor where `1.0` is the full size.
    ByPercent(f64),
    AspectFitWidth(u32),
    AspectFitHeight(u32),
    AspectFitInside { width: u32, height: u32 },
    NonAspectFill { width: u32, height: u32 },
}

impl Scale {
    pub fn resulting_size(&self, full_size: &Dimension) -> Dimension {
        let (fw, fh) = (full_size.width(), full_size.height());
        match *self {
            Self::ByPercent(pct) => full_size.scaled(pct),
            Self::AspectFitWidth(width) => {
                let width = f64::from(width);
                Dimension::new(width, fh * width / fw)
            }
            Self::AspectFitHeight(height) => {
                let height = f64::from(height);
                Dimension::new(fw * height / fh, height)
            }
            Self::AspectFitInside { width, height } => {
                let factor =
                    (f64::from(width) / fw).min(f64::from(height) / fh);
                full_size.scaled(factor)
            }
            Self::NonAspectFill { width, height } => {
                Dimension::from_ints(width, height)
            }
        }
    }

    /// Whether applying the scale to `full_size` enlarges either side.
    pub fn is_up(&self, full_size: &Dimension) -> bool {
        let result = self.resulting_size(full_size);
        result.int_width() > full_size.int_width()
            || result.int_height() > full_size.int_height()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transpose {
    Horizontal,
}

/// Clockwise rotation in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rotate {
    degrees: f64,
}

impl Rotate {
    pub fn new(degrees: f64) -> Self {
        Self { degrees }
    }

    pub fn degrees(&self) -> f64 {
        self.degrees
    }

    /// Bounding box of an image of `size` after rotation.
    pub fn resulting_size(&self, size: &Dimension) -> Dimension {
        let radians = self.degrees.to_radians();
        let (sin, cos) = (radians.sin().abs(), radians.cos().abs());
        Dimension::new(
            size.width() * cos + size.height() * sin,
            size.width() * sin + size.height() * cos,
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorTransform {
    Gray,
    Bitonal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Encode {
    format: Format,
}

impl Encode {
    pub fn new(format: Format) -> Self {
        Self { format }
    }

    pub fn format(&self) -> Format {
        self.format
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Operation {
    Crop(Crop),
    Scale(Scale),
    Transpose(Transpose),
    Rotate(Rotate),
    ColorTransform(ColorTransform),
    Encode(Encode),
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Crop(crop) => write!(f, "crop({crop:?})"),
            Self::Scale(scale) => write!(f, "scale({scale:?})"),
            Self::Transpose(_) => f.write_str("transpose"),
            Self::Rotate(rotate) => write!(f, "rotate({})", rotate.degrees()),
            Self::ColorTransform(ct) => write!(f, "color({ct:?})"),
            Self::Encode(encode) => write!(f, "encode({})", encode.format()),
        }
    }
}

/// An ordered pipeline of operations to apply to one page of an image.
#[derive(Clone, Debug, PartialEq)]
pub struct OperationList {
    identifier: String,
    page_index: usize,
    scale_constraint: ScaleConstraint,
    options: BTreeMap<String, String>,
    operations: Vec<Operation>,
}

impl OperationList {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            page_index: 0,
            scale_constraint: ScaleConstraint::default(),
            options: BTreeMap::new(),
            operations: Vec::new(),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn with_page_index(mut self, page_index: usize) -> Self {
        self.page_index = page_index;
        self
    }

    pub fn scale_constraint(&self) -> ScaleConstraint {
        self.scale_constraint
    }

    pub fn with_scale_constraint(mut self, sc: ScaleConstraint) -> Self {
        self.scale_constraint = sc;
        self
    }

    pub fn options(&self) -> &BTreeMap<String, String> {
        &self.options
    }

    pub fn insert_option(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.options.insert(key.into(), value.into());
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn push(&mut self, operation: Operation) {
        self.operations.push(operation);
    }

    pub fn scale(&self) -> Option<&Scale> {
        self.operations.iter().find_map(|op| match op {
            Operation::Scale(scale) => Some(scale),
            _ => None,
        })
    }

    /// Replaces the scale operation, inserting one right after any crop when
    /// none is present.
    pub fn replace_scale(&mut self, scale: Scale) {
        if let Some(op) = self
            .operations
            .iter_mut()
            .find(|op| matches!(op, Operation::Scale(_)))
        {
            *op = Operation::Scale(scale);
            return;
        }
        let index = self
            .operations
            .iter()
            .position(|op| matches!(op, Operation::Crop(_)))
            .map_or(0, |i| i + 1);
        self.operations.insert(index, Operation::Scale(scale));
    }

    pub fn output_format(&self) -> Option<Format> {
        self.operations.iter().find_map(|op| match op {
            Operation::Encode(encode) => Some(encode.format()),
            _ => None,
        })
    }

    /// Size of the image produced by crop and scale, before rotation.
    pub fn scaled_size(&self, full_size: &Dimension) -> Dimension {
        self.operations.iter().fold(*full_size, |size, op| match op {
            Operation::Crop(crop) => crop.rectangle(&size).size(),
            Operation::Scale(scale) => scale.resulting_size(&size),
            _ => size,
        })
    }

    /// Size of the final image, including the rotation bounding box.
    pub fn resulting_size(&self, full_size: &Dimension) -> Dimension {
        self.operations.iter().fold(*full_size, |size, op| match op {
            Operation::Crop(crop) => crop.rectangle(&size).size(),
            Operation::Scale(scale) => scale.resulting_size(&size),
            Operation::Rotate(rotate) => rotate.resulting_size(&size),
            _ => size,
        })
    }
}
