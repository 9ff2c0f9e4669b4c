//! IIIF Image API 3.0.

mod info;
mod size;

use serde::Serialize;

pub use info::{ImageInfo, ImageInfoFactory};
pub use size::{Size, SizeKind};

pub static IMAGE_3_CONTEXT: &str = "http://iiif.io/api/image/3/context.json";

/// An image request addressed with the 3.0 URI syntax.
pub type Parameters = crate::api::parameters::Parameters<Size>;

/// Optional features advertised in `extraFeatures`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Feature {
    BaseUriRedirect,
    CanonicalLinkHeader,
    Cors,
    JsonldMediaType,
    Mirroring,
    ProfileLinkHeader,
    RegionByPct,
    RegionByPx,
    RegionSquare,
    RotationArbitrary,
    RotationBy90s,
    SizeByConfinedWh,
    SizeByH,
    SizeByPct,
    SizeByW,
    SizeByWh,
    SizeUpscaling,
}

impl Feature {
    pub const ALL: [Feature; 17] = [
        Feature::BaseUriRedirect,
        Feature::CanonicalLinkHeader,
        Feature::Cors,
        Feature::JsonldMediaType,
        Feature::Mirroring,
        Feature::ProfileLinkHeader,
        Feature::RegionByPct,
        Feature::RegionByPx,
        Feature::RegionSquare,
        Feature::RotationArbitrary,
        Feature::RotationBy90s,
        Feature::SizeByConfinedWh,
        Feature::SizeByH,
        Feature::SizeByPct,
        Feature::SizeByW,
        Feature::SizeByWh,
        Feature::SizeUpscaling,
    ];
}
