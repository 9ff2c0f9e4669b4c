use std::fmt;

use image::metadata::Orientation as ImageOrientation;

use crate::error::IiifError;

/// Width and height in possibly fractional pixels.
///
/// Fractional values arise from scale constraints and percentage requests;
/// [`Dimension::int_width`] and [`Dimension::int_height`] round to the nearest
/// whole pixel.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Dimension {
    width: f64,
    height: f64,
}

impl Dimension {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width: width.max(0.0),
            height: height.max(0.0),
        }
    }

    pub fn from_ints(width: u32, height: u32) -> Self {
        Self::new(f64::from(width), f64::from(height))
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn int_width(&self) -> u32 {
        round_to_u32(self.width)
    }

    pub fn int_height(&self) -> u32 {
        round_to_u32(self.height)
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Scales both sides in place.
    pub fn scale(&mut self, amount: f64) {
        self.width *= amount;
        self.height *= amount;
    }

    pub fn scaled(mut self, amount: f64) -> Self {
        self.scale(amount);
        self
    }

    /// Swaps width and height.
    pub fn inverted(self) -> Self {
        Self::new(self.height, self.width)
    }

    pub fn is_empty(&self) -> bool {
        self.width < 1.0 || self.height < 1.0
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Rounds half away from zero and saturates into `u32`.
pub(crate) fn round_to_u32(value: f64) -> u32 {
    let rounded = value.round();
    if rounded <= 0.0 {
        0
    } else if rounded >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        rounded as u32
    }
}

/// An axis-aligned region of an image, already clipped to its bounds.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rectangle {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rectangle {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Clips the rectangle so that it lies within `bounds`.
    pub fn clipped_to(self, bounds: &Dimension) -> Self {
        let x = self.x.clamp(0.0, bounds.width());
        let y = self.y.clamp(0.0, bounds.height());
        let width = self.width.min(bounds.width() - x).max(0.0);
        let height = self.height.min(bounds.height() - y).max(0.0);
        Self::new(x, y, width, height)
    }

    pub fn size(&self) -> Dimension {
        Dimension::new(self.width, self.height)
    }

    pub fn int_x(&self) -> u32 {
        round_to_u32(self.x)
    }

    pub fn int_y(&self) -> u32 {
        round_to_u32(self.y)
    }

    pub fn int_width(&self) -> u32 {
        round_to_u32(self.width)
    }

    pub fn int_height(&self) -> u32 {
        round_to_u32(self.height)
    }
}

/// Orientation of the stored image relative to how it should be displayed.
///
/// Only the quarter turns matter for geometry; mirrored EXIF orientations are
/// folded into the rotation with the same footprint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Orientation {
    #[default]
    Rotate0,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl Orientation {
    /// Maps an EXIF `Orientation` tag value. Values carrying a mirror are not
    /// represented and yield `None`.
    pub fn from_exif(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::Rotate0),
            6 => Some(Self::Rotate90),
            3 => Some(Self::Rotate180),
            8 => Some(Self::Rotate270),
            _ => None,
        }
    }

    pub fn degrees(self) -> u16 {
        match self {
            Self::Rotate0 => 0,
            Self::Rotate90 => 90,
            Self::Rotate180 => 180,
            Self::Rotate270 => 270,
        }
    }

    /// Size of an image of `size` once displayed in this orientation.
    pub fn adjusted_size(self, size: Dimension) -> Dimension {
        match self {
            Self::Rotate90 | Self::Rotate270 => size.inverted(),
            Self::Rotate0 | Self::Rotate180 => size,
        }
    }
}

impl From<ImageOrientation> for Orientation {
    fn from(orientation: ImageOrientation) -> Self {
        match orientation {
            ImageOrientation::NoTransforms
            | ImageOrientation::FlipHorizontal
            | ImageOrientation::FlipVertical => Self::Rotate0,
            ImageOrientation::Rotate90 | ImageOrientation::Rotate90FlipH => {
                Self::Rotate90
            }
            ImageOrientation::Rotate180 => Self::Rotate180,
            ImageOrientation::Rotate270 | ImageOrientation::Rotate270FlipH => {
                Self::Rotate270
            }
        }
    }
}

/// A server-imposed downscale of the source expressed as `n/d`, `1 <= n <= d`.
///
/// Clients address a constrained image through an identifier suffix such as
/// `-1:2`; every size the client sees is then relative to the constrained
/// ("virtual") size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScaleConstraint {
    numerator: u64,
    denominator: u64,
}

impl ScaleConstraint {
    pub fn new(numerator: u64, denominator: u64) -> Result<Self, IiifError> {
        if numerator < 1 {
            return Err(IiifError::invalid(
                "Scale constraint numerator must be at least 1",
            ));
        }
        if numerator > denominator {
            return Err(IiifError::invalid(
                "Scale constraint numerator must not exceed the denominator",
            ));
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    pub fn numerator(&self) -> u64 {
        self.numerator
    }

    pub fn denominator(&self) -> u64 {
        self.denominator
    }

    pub fn rational(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    pub fn has_effect(&self) -> bool {
        self.numerator != self.denominator
    }

    pub fn reduced(&self) -> Self {
        let divisor = gcd(self.numerator, self.denominator);
        Self {
            numerator: self.numerator / divisor,
            denominator: self.denominator / divisor,
        }
    }

    pub fn constrained_size(&self, full_size: &Dimension) -> Dimension {
        full_size.scaled(self.rational())
    }

    pub fn to_identifier_suffix(&self, delimiter: &str) -> String {
        format!("{delimiter}{self}")
    }
}

impl Default for ScaleConstraint {
    fn default() -> Self {
        Self {
            numerator: 1,
            denominator: 1,
        }
    }
}

impl fmt::Display for ScaleConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.numerator, self.denominator)
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_rounding() {
        let size = Dimension::new(749.5, 599.4);
        assert_eq!(size.int_width(), 750);
        assert_eq!(size.int_height(), 599);
        assert_eq!(Dimension::new(-3.0, 2.0).width(), 0.0);
    }

    #[test]
    fn test_dimension_scale() {
        let mut size = Dimension::from_ints(1500, 1200);
        size.scale(0.5);
        assert_eq!(size, Dimension::new(750.0, 600.0));
        assert_eq!(size.area(), 450_000.0);
    }

    #[test]
    fn test_rectangle_clipping() {
        let bounds = Dimension::from_ints(100, 80);
        let clipped = Rectangle::new(90.0, 70.0, 50.0, 50.0).clipped_to(&bounds);
        assert_eq!(clipped, Rectangle::new(90.0, 70.0, 10.0, 10.0));

        let outside = Rectangle::new(120.0, 0.0, 10.0, 10.0).clipped_to(&bounds);
        assert!(outside.size().is_empty());
    }

    #[test]
    fn test_orientation_from_exif() {
        assert_eq!(Orientation::from_exif(1), Some(Orientation::Rotate0));
        assert_eq!(Orientation::from_exif(6), Some(Orientation::Rotate90));
        assert_eq!(Orientation::from_exif(3), Some(Orientation::Rotate180));
        assert_eq!(Orientation::from_exif(8), Some(Orientation::Rotate270));
        assert_eq!(Orientation::from_exif(2), None);
    }

    #[test]
    fn test_orientation_adjusted_size() {
        let size = Dimension::from_ints(1500, 1200);
        assert_eq!(Orientation::Rotate0.adjusted_size(size), size);
        assert_eq!(Orientation::Rotate180.adjusted_size(size), size);
        assert_eq!(
            Orientation::Rotate90.adjusted_size(size),
            Dimension::from_ints(1200, 1500)
        );
        assert_eq!(
            Orientation::from(ImageOrientation::Rotate270FlipH)
                .adjusted_size(size),
            Dimension::from_ints(1200, 1500)
        );
    }

    #[test]
    fn test_scale_constraint_bounds() {
        assert!(ScaleConstraint::new(1, 2).is_ok());
        assert!(ScaleConstraint::new(2, 2).is_ok());
        assert!(ScaleConstraint::new(3, 2).is_err());
        assert!(ScaleConstraint::new(0, 2).is_err());
    }

    #[test]
    fn test_scale_constraint_effect_and_reduction() {
        let sc = ScaleConstraint::new(2, 4).unwrap();
        assert!(sc.has_effect());
        assert_eq!(sc.reduced(), ScaleConstraint::new(1, 2).unwrap());
        assert!(!ScaleConstraint::new(3, 3).unwrap().has_effect());
        assert!(!ScaleConstraint::default().has_effect());
    }

    #[test]
    fn test_scale_constraint_size_and_suffix() {
        let sc = ScaleConstraint::new(1, 2).unwrap();
        assert_eq!(
            sc.constrained_size(&Dimension::from_ints(1499, 1199)),
            Dimension::new(749.5, 599.5)
        );
        assert_eq!(sc.to_string(), "1:2");
        assert_eq!(sc.to_identifier_suffix("-"), "-1:2");
    }
}
