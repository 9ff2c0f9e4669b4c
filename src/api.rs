pub mod identifier;
pub mod image;
pub mod info;
pub mod parameters;
pub mod query;
pub mod v2;
pub mod v3;

use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::api::info::SizeEntry;
use crate::geometry::Dimension;
use crate::operation::{Operation, OperationList, Scale};

/// Largest width or height the server will produce, whatever the limits.
pub const MAX_OUTPUT_DIMENSION: u32 = 65_500;

pub static UPSCALING_MESSAGE: &str = "Requests for scales in excess of 100% must prefix \
     the size path component with a ^ character.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ApiVersion {
    V2,
    V3,
}

impl ApiVersion {
    pub fn path_segment(self) -> &'static str {
        match self {
            Self::V2 => "2",
            Self::V3 => "3",
        }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

/// A request rejected by a server limit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LimitError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Forbidden(String),
}

/// Server limits applied to image requests.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RequestLimits {
    pub max_pixels: u64,
    pub max_scale: f64,
    pub restrict_to_sizes: bool,
}

fn region_size(ops: &OperationList, virtual_size: &Dimension) -> Dimension {
    ops.operations()
        .iter()
        .find_map(|op| match op {
            Operation::Crop(crop) => Some(crop.rectangle(virtual_size).size()),
            _ => None,
        })
        .unwrap_or(*virtual_size)
}

/// Shrinks the scale of `ops` so that its output fits in `max_pixels` (0 for
/// no limit) and within [`MAX_OUTPUT_DIMENSION`]. Used for `max` sizes, which
/// ask for "as large as allowed".
pub fn constrain_to_max_pixels(ops: &mut OperationList, virtual_size: &Dimension, max_pixels: u64) {
    let fits = |size: &Dimension| {
        let (width, height) = (size.int_width(), size.int_height());
        width <= MAX_OUTPUT_DIMENSION
            && height <= MAX_OUTPUT_DIMENSION
            && (max_pixels == 0 || u64::from(width) * u64::from(height) <= max_pixels)
    };
    if fits(&ops.scaled_size(virtual_size)) {
        return;
    }
    let region = region_size(ops, virtual_size);
    if region.is_empty() {
        return;
    }
    let mut pct = f64::from(MAX_OUTPUT_DIMENSION) / region.width().max(region.height());
    if max_pixels > 0 {
        pct = pct.min((max_pixels as f64 / region.area()).sqrt());
    }
    while pct > 0.0 && !fits(&region.scaled(pct)) {
        pct *= 0.999;
    }
    debug!(pct, max_pixels, "constraining max size to the pixel limit");
    ops.replace_scale(Scale::ByPercent(pct));
}

/// Checks the output of `ops` against the server limits.
pub fn validate_request(
    ops: &OperationList,
    virtual_size: &Dimension,
    upscaling_allowed: bool,
    limits: &RequestLimits,
    advertised_sizes: &[SizeEntry],
) -> Result<(), LimitError> {
    let region = region_size(ops, virtual_size);
    if region.is_empty() {
        return Err(LimitError::BadRequest(
            "Region is outside the bounds of the image".into(),
        ));
    }
    let result = ops.scaled_size(virtual_size);
    let (width, height) = (result.int_width(), result.int_height());
    if width == 0 || height == 0 {
        return Err(LimitError::BadRequest("Resulting image would be empty".into()));
    }
    if width > MAX_OUTPUT_DIMENSION || height > MAX_OUTPUT_DIMENSION {
        return Err(LimitError::BadRequest(format!(
            "Resulting image would exceed {MAX_OUTPUT_DIMENSION} pixels on a side"
        )));
    }
    let is_up = width > region.int_width() || height > region.int_height();
    if is_up && !upscaling_allowed {
        return Err(LimitError::BadRequest(UPSCALING_MESSAGE.into()));
    }
    let scale = (result.width() / region.width()).max(result.height() / region.height());
    if scale > limits.max_scale + self::image::DELTA {
        return Err(LimitError::BadRequest(format!(
            "Requested scale exceeds the maximum of {}",
            limits.max_scale
        )));
    }
    if limits.max_pixels > 0 && u64::from(width) * u64::from(height) > limits.max_pixels {
        return Err(LimitError::Forbidden(format!(
            "Request exceeds the maximum of {} pixels",
            limits.max_pixels
        )));
    }
    if limits.restrict_to_sizes
        && !advertised_sizes
            .iter()
            .any(|s| s.width == width && s.height == height)
    {
        return Err(LimitError::Forbidden(
            "Requested size is not one of the available sizes".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::parameters::SizeComponent;

    const NO_LIMITS: RequestLimits = RequestLimits {
        max_pixels: 0,
        max_scale: f64::MAX,
        restrict_to_sizes: false,
    };

    fn ops_for(uri: &str, max_scale: f64) -> (OperationList, bool) {
        let params: v3::Parameters = uri.parse().unwrap();
        (params.to_operation_list(max_scale), params.size().is_upscaling_allowed())
    }

    #[test]
    fn test_upscaling_requires_caret() {
        let full = Dimension::from_ints(1000, 800);
        let (ops, up) = ops_for("img/full/2000,/0/default.jpg", 1.0);
        assert_eq!(
            validate_request(&ops, &full, up, &NO_LIMITS, &[]),
            Err(LimitError::BadRequest(UPSCALING_MESSAGE.into()))
        );
        let (ops, up) = ops_for("img/full/^2000,/0/default.jpg", 1.0);
        assert_eq!(validate_request(&ops, &full, up, &NO_LIMITS, &[]), Ok(()));
    }

    #[test]
    fn test_max_scale() {
        let full = Dimension::from_ints(1000, 800);
        let limits = RequestLimits {
            max_scale: 1.5,
            ..NO_LIMITS
        };
        let (ops, up) = ops_for("img/full/^pct:200/0/default.jpg", 1.5);
        assert!(matches!(
            validate_request(&ops, &full, up, &limits, &[]),
            Err(LimitError::BadRequest(_))
        ));
        let (ops, up) = ops_for("img/full/^pct:150/0/default.jpg", 1.5);
        assert_eq!(validate_request(&ops, &full, up, &limits, &[]), Ok(()));
    }

    #[test]
    fn test_max_pixels_forbidden() {
        let full = Dimension::from_ints(1000, 800);
        let limits = RequestLimits {
            max_pixels: 10_000,
            ..NO_LIMITS
        };
        let (ops, up) = ops_for("img/full/500,/0/default.jpg", 1.0);
        assert!(matches!(
            validate_request(&ops, &full, up, &limits, &[]),
            Err(LimitError::Forbidden(_))
        ));
    }

    #[test]
    fn test_max_size_is_constrained() {
        let full = Dimension::from_ints(1000, 800);
        let (mut ops, up) = ops_for("img/full/max/0/default.jpg", 1.0);
        constrain_to_max_pixels(&mut ops, &full, 10_000);
        let result = ops.scaled_size(&full);
        assert!(u64::from(result.int_width()) * u64::from(result.int_height()) <= 10_000);
        let limits = RequestLimits {
            max_pixels: 10_000,
            ..NO_LIMITS
        };
        assert_eq!(validate_request(&ops, &full, up, &limits, &[]), Ok(()));
    }

    #[test]
    fn test_unbounded_upscaled_max_is_capped() {
        let full = Dimension::from_ints(1000, 800);
        let (mut ops, up) = ops_for("img/full/^max/0/default.jpg", f64::MAX);
        constrain_to_max_pixels(&mut ops, &full, 0);
        let result = ops.scaled_size(&full);
        assert!(result.int_width() <= MAX_OUTPUT_DIMENSION);
        assert!(result.int_width() > 60_000);
        assert_eq!(validate_request(&ops, &full, up, &NO_LIMITS, &[]), Ok(()));
    }

    #[test]
    fn test_restrict_to_sizes() {
        let full = Dimension::from_ints(1000, 800);
        let limits = RequestLimits {
            restrict_to_sizes: true,
            ..NO_LIMITS
        };
        let sizes = [SizeEntry::new(500, 400), SizeEntry::new(1000, 800)];
        let (ops, up) = ops_for("img/full/500,/0/default.jpg", 1.0);
        assert_eq!(validate_request(&ops, &full, up, &limits, &sizes), Ok(()));
        let (ops, up) = ops_for("img/full/501,/0/default.jpg", 1.0);
        assert!(matches!(
            validate_request(&ops, &full, up, &limits, &sizes),
            Err(LimitError::Forbidden(_))
        ));
    }

    #[test]
    fn test_region_outside_image() {
        let full = Dimension::from_ints(1000, 800);
        let (ops, up) = ops_for("img/2000,0,10,10/max/0/default.jpg", 1.0);
        assert!(matches!(
            validate_request(&ops, &full, up, &NO_LIMITS, &[]),
            Err(LimitError::BadRequest(_))
        ));
    }
}
