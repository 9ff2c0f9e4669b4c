use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

use nom::{
    Finish, IResult, Parser,
    branch::alt,
    bytes::complete::tag,
    combinator::{all_consuming, map},
    sequence::{preceded, separated_pair, terminated},
};

use crate::api::image::{format_float, nonzero, parse_iiif_float, parse_unsigned, positive_round};
use crate::api::parameters::SizeComponent;
use crate::error::IiifError;
use crate::geometry::Dimension;
use crate::operation::Scale;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SizeKind {
    Full,
    Max,
    Percent(f64),
    AspectFitWidth(NonZeroU32),
    AspectFitHeight(NonZeroU32),
    NonAspectFill { width: NonZeroU32, height: NonZeroU32 },
    AspectFitInside { width: NonZeroU32, height: NonZeroU32 },
}

/// The Image API 2 size component. There is no upscaling prefix; sizes
/// above the full size are requested directly.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Size {
    kind: SizeKind,
}

impl Size {
    pub fn new(kind: SizeKind) -> Result<Self, IiifError> {
        if let SizeKind::Percent(pct) = kind {
            if !pct.is_finite() || pct <= 0.0 {
                return Err(IiifError::invalid("Percent must be greater than 0"));
            }
        }
        Ok(Self { kind })
    }

    pub fn kind(&self) -> SizeKind {
        self.kind
    }
}

impl SizeComponent for Size {
    fn is_identity(&self) -> bool {
        matches!(self.kind, SizeKind::Full | SizeKind::Max)
    }

    fn is_max(&self) -> bool {
        self.kind == SizeKind::Max
    }

    fn is_upscaling_allowed(&self) -> bool {
        true
    }

    fn to_scale(&self, _max_scale: f64) -> Scale {
        match self.kind {
            SizeKind::Full | SizeKind::Max => Scale::ByPercent(1.0),
            SizeKind::Percent(pct) => Scale::ByPercent(pct / 100.0),
            SizeKind::AspectFitWidth(w) => Scale::AspectFitWidth(w.get()),
            SizeKind::AspectFitHeight(h) => Scale::AspectFitHeight(h.get()),
            SizeKind::NonAspectFill { width, height } => Scale::NonAspectFill {
                width: width.get(),
                height: height.get(),
            },
            SizeKind::AspectFitInside { width, height } => Scale::AspectFitInside {
                width: width.get(),
                height: height.get(),
            },
        }
    }

    /// `full`, `max` and `w,h` are kept; every aspect-preserving form
    /// becomes `w,` with the width it resolves to.
    fn to_canonical_string(&self, full_size: &Dimension) -> String {
        let (fw, fh) = (full_size.width(), full_size.height());
        let width = match self.kind {
            SizeKind::Full | SizeKind::Max | SizeKind::NonAspectFill { .. } => {
                return self.to_string();
            }
            SizeKind::Percent(pct) => positive_round(fw * pct / 100.0),
            SizeKind::AspectFitWidth(w) => w.get(),
            SizeKind::AspectFitHeight(h) => positive_round(fw * f64::from(h.get()) / fh),
            SizeKind::AspectFitInside { width, height } => {
                let factor = (f64::from(width.get()) / fw).min(f64::from(height.get()) / fh);
                positive_round(fw * factor)
            }
        };
        format!("{width},")
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SizeKind::Full => f.write_str("full"),
            SizeKind::Max => f.write_str("max"),
            SizeKind::Percent(pct) => write!(f, "pct:{}", format_float(pct)),
            SizeKind::AspectFitWidth(w) => write!(f, "{w},"),
            SizeKind::AspectFitHeight(h) => write!(f, ",{h}"),
            SizeKind::NonAspectFill { width, height } => write!(f, "{width},{height}"),
            SizeKind::AspectFitInside { width, height } => {
                write!(f, "!{width},{height}")
            }
        }
    }
}

enum RawSize {
    Full,
    Max,
    Percent(f64),
    Width(u32),
    Height(u32),
    Exact(u32, u32),
    Confined(u32, u32),
}

fn parse_pair(input: &str) -> IResult<&str, (u32, u32)> {
    separated_pair(parse_unsigned, tag(","), parse_unsigned).parse(input)
}

fn parse_size(input: &str) -> IResult<&str, RawSize> {
    alt((
        all_consuming(map(tag("full"), |_| RawSize::Full)),
        all_consuming(map(tag("max"), |_| RawSize::Max)),
        all_consuming(map(preceded(tag("pct:"), parse_iiif_float), RawSize::Percent)),
        all_consuming(map(preceded(tag("!"), parse_pair), |(w, h)| {
            RawSize::Confined(w, h)
        })),
        all_consuming(map(parse_pair, |(w, h)| RawSize::Exact(w, h))),
        all_consuming(map(terminated(parse_unsigned, tag(",")), RawSize::Width)),
        all_consuming(map(preceded(tag(","), parse_unsigned), RawSize::Height)),
    ))
    .parse(input)
}

impl FromStr for Size {
    type Err = IiifError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (_, raw) = parse_size(s)
            .finish()
            .map_err(|_| IiifError::invalid(format!("Invalid size: {s}")))?;
        let kind = match raw {
            RawSize::Full => SizeKind::Full,
            RawSize::Max => SizeKind::Max,
            RawSize::Percent(pct) => SizeKind::Percent(pct),
            RawSize::Width(w) => SizeKind::AspectFitWidth(nonzero(w, "Width")?),
            RawSize::Height(h) => SizeKind::AspectFitHeight(nonzero(h, "Height")?),
            RawSize::Exact(w, h) => SizeKind::NonAspectFill {
                width: nonzero(w, "Width")?,
                height: nonzero(h, "Height")?,
            },
            RawSize::Confined(w, h) => SizeKind::AspectFitInside {
                width: nonzero(w, "Width")?,
                height: nonzero(h, "Height")?,
            },
        };
        Self::new(kind)
    }
}
