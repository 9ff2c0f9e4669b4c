use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

use nom::{
    Finish, IResult, Parser,
    branch::alt,
    bytes::complete::tag,
    combinator::{all_consuming, map, opt},
    sequence::{preceded, separated_pair, terminated},
};

use percent_encoding::percent_decode_str;

use crate::api::image::{format_float, nonzero, parse_iiif_float, parse_unsigned, positive_round};
use crate::api::parameters::SizeComponent;
use crate::error::IiifError;
use crate::geometry::Dimension;
use crate::operation::Scale;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SizeKind {
    /// `max`: the largest size the server allows.
    Max,
    /// `pct:n`: a percentage of the region, `n > 0`.
    Percent(f64),
    /// `w,`
    AspectFitWidth(NonZeroU32),
    /// `,h`
    AspectFitHeight(NonZeroU32),
    /// `w,h`
    NonAspectFill { width: NonZeroU32, height: NonZeroU32 },
    /// `!w,h`
    AspectFitInside { width: NonZeroU32, height: NonZeroU32 },
}

/// The Image API 3 size component, including the `^` upscaling prefix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Size {
    kind: SizeKind,
    upscaling_allowed: bool,
}

impl Size {
    pub fn new(kind: SizeKind, upscaling_allowed: bool) -> Result<Self, IiifError> {
        if let SizeKind::Percent(pct) = kind {
            if !pct.is_finite() || pct <= 0.0 {
                return Err(IiifError::invalid("Percent must be greater than 0"));
            }
        }
        Ok(Self {
            kind,
            upscaling_allowed,
        })
    }

    pub fn kind(&self) -> SizeKind {
        self.kind
    }
}

impl SizeComponent for Size {
    fn is_identity(&self) -> bool {
        self.kind == SizeKind::Max && !self.upscaling_allowed
    }

    fn is_max(&self) -> bool {
        self.kind == SizeKind::Max
    }

    fn is_upscaling_allowed(&self) -> bool {
        self.upscaling_allowed
    }

    fn to_scale(&self, max_scale: f64) -> Scale {
        match self.kind {
            SizeKind::Percent(pct) => Scale::ByPercent(pct / 100.0),
            SizeKind::Max if self.upscaling_allowed => Scale::ByPercent(max_scale),
            SizeKind::Max => Scale::ByPercent(1.0),
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

    /// `max` and `^max` are kept; every other form is resolved against
    /// `full_size` to an explicit `w,h`, prefixed with `^` when the result
    /// is larger than `full_size` in either dimension.
    fn to_canonical_string(&self, full_size: &Dimension) -> String {
        let (fw, fh) = (full_size.width(), full_size.height());
        let (width, height) = match self.kind {
            SizeKind::Max => return self.to_string(),
            SizeKind::Percent(pct) => (
                positive_round(fw * pct / 100.0),
                positive_round(fh * pct / 100.0),
            ),
            SizeKind::AspectFitWidth(w) => {
                (w.get(), positive_round(fh * f64::from(w.get()) / fw))
            }
            SizeKind::AspectFitHeight(h) => {
                (positive_round(fw * f64::from(h.get()) / fh), h.get())
            }
            SizeKind::NonAspectFill { width, height }
            | SizeKind::AspectFitInside { width, height } => (width.get(), height.get()),
        };
        let up = f64::from(width) > fw || f64::from(height) > fh;
        format!("{}{width},{height}", if up { "^" } else { "" })
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.upscaling_allowed {
            f.write_str("^")?;
        }
        match self.kind {
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

fn parse_size_kind(input: &str) -> IResult<&str, RawSize> {
    alt((
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

fn parse_size(input: &str) -> IResult<&str, (bool, RawSize)> {
    (map(opt(tag("^")), |up| up.is_some()), parse_size_kind).parse(input)
}

impl FromStr for Size {
    type Err = IiifError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decoded = percent_decode_str(s)
            .decode_utf8()
            .map_err(|_| IiifError::invalid(format!("Invalid size: {s}")))?;
        let (_, (upscaling_allowed, raw)) = parse_size(&decoded)
            .finish()
            .map_err(|_| IiifError::invalid(format!("Invalid size: {s}")))?;
        let kind = match raw {
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
        Self::new(kind, upscaling_allowed)
    }
}
