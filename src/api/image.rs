//! Request components shared by the Image API 2 and 3 URI syntaxes: region,
//! rotation, quality and output format, plus the nom primitives the
//! version-specific size parsers build on.

use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

use nom::{
    Finish, IResult, Parser,
    branch::alt,
    bytes::complete::{tag, tag_no_case},
    character::complete::{char, digit0, digit1},
    combinator::{all_consuming, map, map_res, opt, recognize},
    sequence::preceded,
};

use crate::error::IiifError;
use crate::format::Format;
use crate::geometry::{Dimension, round_to_u32};
use crate::operation::{ColorTransform, Crop, Rotate, Transpose};

/// Tolerance for comparing numeric request values.
pub const DELTA: f64 = 1e-8;

/// Parse from text a floating point number that disallows Inf, NaN, e and
/// negatives
pub(crate) fn parse_iiif_float(input: &str) -> IResult<&str, f64> {
    map_res(
        alt((
            recognize((digit0, char('.'), digit1)),
            recognize(digit1::<&str, _>),
        )),
        str::parse,
    )
    .parse(input)
}

/// Like [`parse_iiif_float`] but accepts a leading minus, so that range
/// checks can report negative values precisely.
fn parse_signed_float(input: &str) -> IResult<&str, f64> {
    map_res(recognize((opt(char('-')), parse_iiif_float)), str::parse)
        .parse(input)
}

pub(crate) fn parse_unsigned<T: FromStr>(input: &str) -> IResult<&str, T> {
    map_res(digit1, |s: &str| s.parse()).parse(input)
}

fn parse_float_quad(input: &str) -> IResult<&str, (f64, f64, f64, f64)> {
    (
        parse_signed_float,
        preceded(tag(","), parse_signed_float),
        preceded(tag(","), parse_signed_float),
        preceded(tag(","), parse_signed_float),
    )
        .parse(input)
}

/// Renders a float without a trailing `.0`.
pub(crate) fn format_float(value: f64) -> String {
    format!("{value}")
}

/// Rounds a computed pixel length, never below one pixel.
pub(crate) fn positive_round(value: f64) -> u32 {
    round_to_u32(value).max(1)
}

pub(crate) fn nonzero(value: u32, what: &str) -> Result<NonZeroU32, IiifError> {
    NonZeroU32::new(value)
        .ok_or_else(|| IiifError::invalid(format!("{what} must be greater than 0")))
}

/// The numeric part of a region, valid by construction.
#[derive(Clone, Copy, Debug)]
pub struct RegionRect {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

impl RegionRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Result<Self, IiifError> {
        if ![x, y, width, height].iter().all(|v| v.is_finite()) {
            return Err(IiifError::invalid("Region values must be finite"));
        }
        if x < 0.0 {
            return Err(IiifError::invalid("X must be a positive float"));
        }
        if y < 0.0 {
            return Err(IiifError::invalid("Y must be a positive float"));
        }
        if width <= 0.0 {
            return Err(IiifError::invalid("Width must be a positive float"));
        }
        if height <= 0.0 {
            return Err(IiifError::invalid("Height must be a positive float"));
        }
        Ok(Self {
            x,
            y,
            width,
            height,
        })
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    fn approx_eq(&self, other: &Self) -> bool {
        (self.x - other.x).abs() < DELTA
            && (self.y - other.y).abs() < DELTA
            && (self.width - other.width).abs() < DELTA
            && (self.height - other.height).abs() < DELTA
    }
}

/// The region URI component: `full`, `square`, `x,y,w,h` or `pct:x,y,w,h`.
#[derive(Clone, Copy, Debug)]
pub enum Region {
    Full,
    Square,
    Percent(RegionRect),
    Pixels(RegionRect),
}

impl Region {
    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full)
    }

    pub fn to_crop(&self) -> Crop {
        match self {
            Self::Full => Crop::full(),
            Self::Square => Crop::ToSquare,
            Self::Percent(r) => Crop::ByPercent {
                x: r.x / 100.0,
                y: r.y / 100.0,
                width: r.width / 100.0,
                height: r.height / 100.0,
            },
            Self::Pixels(r) => Crop::ByPixels {
                x: round_to_u32(r.x),
                y: round_to_u32(r.y),
                width: positive_round(r.width),
                height: positive_round(r.height),
            },
        }
    }

    /// Canonical form relative to an image of `full_size`: keywords stay
    /// as they are, everything else becomes whole pixels.
    pub fn to_canonical_string(&self, full_size: &Dimension) -> String {
        match self {
            Self::Full | Self::Square => self.to_string(),
            Self::Percent(r) => format!(
                "{},{},{},{}",
                round_to_u32(r.x / 100.0 * full_size.width()),
                round_to_u32(r.y / 100.0 * full_size.height()),
                positive_round(r.width / 100.0 * full_size.width()),
                positive_round(r.height / 100.0 * full_size.height()),
            ),
            Self::Pixels(r) => format!(
                "{},{},{},{}",
                round_to_u32(r.x),
                round_to_u32(r.y),
                positive_round(r.width),
                positive_round(r.height),
            ),
        }
    }
}

impl PartialEq for Region {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Full, Self::Full) | (Self::Square, Self::Square) => true,
            (Self::Percent(a), Self::Percent(b))
            | (Self::Pixels(a), Self::Pixels(b)) => a.approx_eq(b),
            _ => false,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => f.write_str("full"),
            Self::Square => f.write_str("square"),
            Self::Percent(r) => write!(
                f,
                "pct:{},{},{},{}",
                format_float(r.x),
                format_float(r.y),
                format_float(r.width),
                format_float(r.height)
            ),
            Self::Pixels(r) => write!(
                f,
                "{},{},{},{}",
                round_to_u32(r.x),
                round_to_u32(r.y),
                format_float(r.width),
                format_float(r.height)
            ),
        }
    }
}

enum RawRegion {
    Full,
    Square,
    Percent((f64, f64, f64, f64)),
    Pixels((f64, f64, f64, f64)),
}

fn parse_region(input: &str) -> IResult<&str, RawRegion> {
    alt((
        map(tag("full"), |_| RawRegion::Full),
        map(tag("square"), |_| RawRegion::Square),
        map(preceded(tag("pct:"), parse_float_quad), RawRegion::Percent),
        map(parse_float_quad, RawRegion::Pixels),
    ))
    .parse(input)
}

impl FromStr for Region {
    type Err = IiifError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (_, raw) = all_consuming(parse_region)
            .parse(s)
            .finish()
            .map_err(|_| IiifError::invalid(format!("Invalid region: {s}")))?;
        match raw {
            RawRegion::Full => Ok(Self::Full),
            RawRegion::Square => Ok(Self::Square),
            RawRegion::Percent((x, y, w, h)) => {
                RegionRect::new(x, y, w, h).map(Self::Percent)
            }
            RawRegion::Pixels((x, y, w, h)) => {
                RegionRect::new(x, y, w, h).map(Self::Pixels)
            }
        }
    }
}

/// The rotation URI component: an optional `!` (mirror) and clockwise
/// degrees in `[0, 360)`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rotation {
    degrees: f64,
    mirror: bool,
}

impl Rotation {
    pub fn new(degrees: f64, mirror: bool) -> Result<Self, IiifError> {
        if !(0.0..360.0).contains(&degrees) {
            return Err(IiifError::invalid(
                "Degrees must be between 0 and 360",
            ));
        }
        Ok(Self { degrees, mirror })
    }

    pub fn degrees(&self) -> f64 {
        self.degrees
    }

    pub fn is_mirrored(&self) -> bool {
        self.mirror
    }

    pub fn is_zero(&self) -> bool {
        self.degrees.abs() < DELTA || (self.degrees - 360.0).abs() < DELTA
    }

    pub fn to_rotate(&self) -> Rotate {
        Rotate::new(self.degrees)
    }

    pub fn to_transpose(&self) -> Option<Transpose> {
        self.mirror.then_some(Transpose::Horizontal)
    }

    pub fn to_canonical_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mirror {
            f.write_str("!")?;
        }
        f.write_str(&format_float(self.degrees))
    }
}

fn parse_rotation(input: &str) -> IResult<&str, (bool, f64)> {
    map((opt(tag("!")), parse_iiif_float), |(m, deg)| (m.is_some(), deg))
        .parse(input)
}

impl FromStr for Rotation {
    type Err = IiifError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (_, (mirror, degrees)) = all_consuming(parse_rotation)
            .parse(s)
            .finish()
            .map_err(|_| IiifError::invalid(format!("Invalid rotation: {s}")))?;
        Self::new(degrees, mirror)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Quality {
    Bitonal,
    Color,
    Default,
    Gray,
}

impl Quality {
    pub const ALL: [Quality; 4] =
        [Quality::Bitonal, Quality::Color, Quality::Default, Quality::Gray];

    pub fn name(self) -> &'static str {
        match self {
            Self::Bitonal => "bitonal",
            Self::Color => "color",
            Self::Default => "default",
            Self::Gray => "gray",
        }
    }

    pub fn to_color_transform(self) -> Option<ColorTransform> {
        match self {
            Self::Gray => Some(ColorTransform::Gray),
            Self::Bitonal => Some(ColorTransform::Bitonal),
            Self::Color | Self::Default => None,
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn parse_quality(input: &str) -> IResult<&str, Quality> {
    alt((
        map(tag_no_case("color"), |_| Quality::Color),
        map(tag_no_case("gray"), |_| Quality::Gray),
        map(tag_no_case("bitonal"), |_| Quality::Bitonal),
        map(tag_no_case("default"), |_| Quality::Default),
    ))
    .parse(input)
}

impl FromStr for Quality {
    type Err = IiifError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (_, quality) =
            all_consuming(parse_quality).parse(s).finish().map_err(|_| {
                let available: Vec<_> =
                    Self::ALL.iter().map(|q| q.name()).collect();
                IiifError::invalid(format!(
                    "Unsupported quality. Available qualities are: {}",
                    available.join(", ")
                ))
            })?;
        Ok(quality)
    }
}

/// Output formats addressable through the `format` URI component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Gif,
    Jp2,
    Jpg,
    Pdf,
    Png,
    Tif,
    Webp,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 7] = [
        OutputFormat::Gif,
        OutputFormat::Jp2,
        OutputFormat::Jpg,
        OutputFormat::Pdf,
        OutputFormat::Png,
        OutputFormat::Tif,
        OutputFormat::Webp,
    ];

    pub fn to_format(self) -> Format {
        match self {
            Self::Gif => Format::Gif,
            Self::Jp2 => Format::Jp2,
            Self::Jpg => Format::Jpg,
            Self::Pdf => Format::Pdf,
            Self::Png => Format::Png,
            Self::Tif => Format::Tif,
            Self::Webp => Format::Webp,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_format().preferred_extension())
    }
}

impl FromStr for OutputFormat {
    type Err = IiifError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.to_format().key().eq_ignore_ascii_case(s))
            .ok_or_else(|| IiifError::UnsupportedFormat(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: f64, y: f64, w: f64, h: f64) -> RegionRect {
        RegionRect::new(x, y, w, h).unwrap()
    }

    #[test]
    fn test_parse_iiif_float() {
        assert_eq!(parse_iiif_float("25.5"), Ok(("", 25.5)));
        assert_eq!(parse_iiif_float(".5"), Ok(("", 0.5)));
        assert!(parse_iiif_float("inf").is_err());
        assert!(parse_iiif_float("-1").is_err());
    }

    #[test]
    fn test_parse_region_keywords() {
        assert_eq!("full".parse::<Region>(), Ok(Region::Full));
        assert_eq!("square".parse::<Region>(), Ok(Region::Square));
        assert!("fullish".parse::<Region>().is_err());
    }

    #[test]
    fn test_parse_region_numeric() {
        assert_eq!(
            "pct:10,20,50.5,30".parse::<Region>(),
            Ok(Region::Percent(rect(10.0, 20.0, 50.5, 30.0)))
        );
        assert_eq!(
            "0,0,200,200".parse::<Region>(),
            Ok(Region::Pixels(rect(0.0, 0.0, 200.0, 200.0)))
        );
        assert!("10,20,30".parse::<Region>().is_err());
        assert!("a,b,c,d".parse::<Region>().is_err());
        assert!("pct:a,20,30,40".parse::<Region>().is_err());
    }

    #[test]
    fn test_region_invariants() {
        assert!("-1,0,10,10".parse::<Region>().is_err());
        assert!("0,-1,10,10".parse::<Region>().is_err());
        assert!("0,0,0,10".parse::<Region>().is_err());
        assert!("0,0,10,0".parse::<Region>().is_err());
        assert!(RegionRect::new(0.0, 0.0, f64::NAN, 1.0).is_err());
    }

    #[test]
    fn test_region_equality() {
        assert_eq!(Region::Full, Region::Full);
        assert_ne!(Region::Full, Region::Square);
        assert_eq!(
            Region::Pixels(rect(1.0, 2.0, 3.0, 4.0)),
            Region::Pixels(rect(1.0, 2.0, 3.0, 4.0 + 1e-10))
        );
        assert_ne!(
            Region::Pixels(rect(1.0, 2.0, 3.0, 4.0)),
            Region::Percent(rect(1.0, 2.0, 3.0, 4.0))
        );
    }

    #[test]
    fn test_region_to_crop() {
        assert_eq!(Region::Full.to_crop(), Crop::full());
        assert_eq!(Region::Square.to_crop(), Crop::ToSquare);
        assert_eq!(
            "pct:50,25,50,50".parse::<Region>().unwrap().to_crop(),
            Crop::ByPercent {
                x: 0.5,
                y: 0.25,
                width: 0.5,
                height: 0.5
            }
        );
        assert_eq!(
            "10.4,10.6,20.5,30".parse::<Region>().unwrap().to_crop(),
            Crop::ByPixels {
                x: 10,
                y: 11,
                width: 21,
                height: 30
            }
        );
    }

    #[test]
    fn test_region_to_string() {
        for s in ["full", "square", "pct:10,20,50.5,30", "0,0,200,200"] {
            assert_eq!(s.parse::<Region>().unwrap().to_string(), s);
        }
        assert_eq!(
            "pct:10.0,20,50.50,30".parse::<Region>().unwrap().to_string(),
            "pct:10,20,50.5,30"
        );
    }

    #[test]
    fn test_region_canonical_string() {
        let full = Dimension::from_ints(1000, 800);
        assert_eq!(Region::Full.to_canonical_string(&full), "full");
        assert_eq!(Region::Square.to_canonical_string(&full), "square");
        assert_eq!(
            "pct:10,10,50,50"
                .parse::<Region>()
                .unwrap()
                .to_canonical_string(&full),
            "100,80,500,400"
        );
        assert_eq!(
            "10.4,0,50.6,20"
                .parse::<Region>()
                .unwrap()
                .to_canonical_string(&full),
            "10,0,51,20"
        );
    }

    #[test]
    fn test_parse_rotation() {
        assert_eq!("0".parse(), Rotation::new(0.0, false));
        assert_eq!("!25.5".parse(), Rotation::new(25.5, true));
        assert!("flip".parse::<Rotation>().is_err());
        assert!("-180".parse::<Rotation>().is_err());
        assert!("360".parse::<Rotation>().is_err());
    }

    #[test]
    fn test_rotation_operations() {
        let rotation: Rotation = "!90".parse().unwrap();
        assert_eq!(rotation.to_transpose(), Some(Transpose::Horizontal));
        assert_eq!(rotation.to_rotate(), Rotate::new(90.0));
        assert!(!rotation.is_zero());

        let rotation: Rotation = "0".parse().unwrap();
        assert!(rotation.is_zero());
        assert_eq!(rotation.to_transpose(), None);
        assert_eq!("!90.50".parse::<Rotation>().unwrap().to_string(), "!90.5");
    }

    #[test]
    fn test_parse_quality() {
        assert_eq!("gray".parse(), Ok(Quality::Gray));
        assert_eq!("DEFAULT".parse(), Ok(Quality::Default));
        let err = "grey".parse::<Quality>().unwrap_err();
        assert!(matches!(err, IiifError::InvalidArgument(msg) if msg.contains("bitonal, color, default, gray")));
    }

    #[test]
    fn test_quality_color_transform() {
        assert_eq!(Quality::Gray.to_color_transform(), Some(ColorTransform::Gray));
        assert_eq!(
            Quality::Bitonal.to_color_transform(),
            Some(ColorTransform::Bitonal)
        );
        assert_eq!(Quality::Color.to_color_transform(), None);
        assert_eq!(Quality::Default.to_color_transform(), None);
    }

    #[test]
    fn test_parse_output_format() {
        assert_eq!("jpg".parse(), Ok(OutputFormat::Jpg));
        assert_eq!("PNG".parse(), Ok(OutputFormat::Png));
        assert_eq!(OutputFormat::Tif.to_format(), Format::Tif);
        assert_eq!(
            "bogus".parse::<OutputFormat>(),
            Err(IiifError::UnsupportedFormat("bogus".into()))
        );
    }
}
