//! IIIF Image API 2.1.

mod info;
mod size;

use serde::Serialize;

pub use info::{ImageInfo, ImageInfoFactory};
pub use size::{Size, SizeKind};

pub static IMAGE_2_CONTEXT: &str = "http://iiif.io/api/image/2/context.json";

/// An image request addressed with the 2.1 URI syntax.
pub type Parameters = crate::api::parameters::Parameters<Size>;

/// Features listed under `supports` in the profile description.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Feature {
    BaseUriRedirect,
    CanonicalLinkHeader,
    Cors,
    JsonldMediaType,
    ProfileLinkHeader,
    SizeByWhListed,
    Mirroring,
    RegionByPct,
    RegionByPx,
    RegionSquare,
    RotationArbitrary,
    RotationBy90s,
    SizeAboveFull,
    SizeByConfinedWh,
    SizeByDistortedWh,
    SizeByH,
    SizeByPct,
    SizeByW,
    SizeByWh,
    SizeByForcedWh,
}

impl Feature {
    pub const ALL: [Feature; 20] = [
        Feature::BaseUriRedirect,
        Feature::CanonicalLinkHeader,
        Feature::Cors,
        Feature::JsonldMediaType,
        Feature::ProfileLinkHeader,
        Feature::SizeByWhListed,
        Feature::Mirroring,
        Feature::RegionByPct,
        Feature::RegionByPx,
        Feature::RegionSquare,
        Feature::RotationArbitrary,
        Feature::RotationBy90s,
        Feature::SizeAboveFull,
        Feature::SizeByConfinedWh,
        Feature::SizeByDistortedWh,
        Feature::SizeByH,
        Feature::SizeByPct,
        Feature::SizeByW,
        Feature::SizeByWh,
        Feature::SizeByForcedWh,
    ];
}
