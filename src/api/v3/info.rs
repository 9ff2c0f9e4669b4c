use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::error;

use super::{Feature, IMAGE_3_CONTEXT};
use crate::api::ApiVersion;
use crate::api::image::Quality;
use crate::api::info::{
    ComplianceLevel, InfoLimits, PROTOCOL, SizeEntry, TileEntry, merge_extra_keys, virtual_size,
};
use crate::delegate::Delegate;
use crate::error::IiifError;
use crate::format::Format;
use crate::geometry::ScaleConstraint;
use crate::info::Info;

static TYPE: &str = "ImageService3";

/// Keys of the document that delegate keys may not replace.
const RESERVED_KEYS: [&str; 15] = [
    "@context",
    "id",
    "type",
    "protocol",
    "profile",
    "width",
    "height",
    "maxArea",
    "maxWidth",
    "maxHeight",
    "sizes",
    "tiles",
    "extraQualities",
    "extraFormats",
    "extraFeatures",
];

/// The Image API 3 information document (`info.json`).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInfo {
    #[serde(rename = "@context")]
    context: &'static str,
    id: String,
    #[serde(rename = "type")]
    type_: &'static str,
    protocol: &'static str,
    profile: ComplianceLevel,
    width: u32,
    height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_area: Option<u64>,
    sizes: Vec<SizeEntry>,
    tiles: Vec<TileEntry>,
    extra_qualities: Vec<&'static str>,
    extra_formats: Vec<&'static str>,
    extra_features: Vec<Feature>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl ImageInfo {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn sizes(&self) -> &[SizeEntry] {
        &self.sizes
    }
}

/// Builds [`ImageInfo`] documents from a source's [`Info`].
#[derive(Clone, Default)]
pub struct ImageInfoFactory {
    limits: InfoLimits,
    delegate: Option<Arc<dyn Delegate>>,
}

impl ImageInfoFactory {
    pub fn new(limits: InfoLimits) -> Self {
        Self {
            limits,
            delegate: None,
        }
    }

    pub fn with_delegate(mut self, delegate: Arc<dyn Delegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn limits(&self) -> &InfoLimits {
        &self.limits
    }

    /// `processor_formats` are the formats the processor can write;
    /// `image_uri` becomes the document's `id`.
    pub fn new_image_info(
        &self,
        processor_formats: &BTreeSet<Format>,
        image_uri: &str,
        info: &Info,
        page_index: usize,
        scale_constraint: Option<ScaleConstraint>,
    ) -> Result<ImageInfo, IiifError> {
        let sc = scale_constraint.unwrap_or_default();
        let virtual_size = virtual_size(info, page_index, &sc)?;
        let max_pixels = self.limits.effective_max_pixels(&virtual_size);

        let extra_qualities = Quality::ALL
            .into_iter()
            .filter(|q| *q != Quality::Default)
            .map(Quality::name)
            .collect();
        let extra_formats = processor_formats
            .iter()
            .filter(|f| !matches!(f, Format::Jpg | Format::Png))
            .map(|f| f.preferred_extension())
            .collect();
        let upscaling = self.limits.upscaling_advertised(&sc);
        let extra_features = Feature::ALL
            .into_iter()
            .filter(|f| upscaling || *f != Feature::SizeUpscaling)
            .collect();

        let mut extra = Map::new();
        if let Some(delegate) = &self.delegate {
            match delegate.extra_info_keys(ApiVersion::V3, image_uri) {
                Ok(keys) => merge_extra_keys(&mut extra, keys, &RESERVED_KEYS),
                Err(e) => error!("extra information keys unavailable: {e}"),
            }
        }

        Ok(ImageInfo {
            context: IMAGE_3_CONTEXT,
            id: image_uri.to_owned(),
            type_: TYPE,
            protocol: PROTOCOL,
            profile: ComplianceLevel::Level2,
            width: virtual_size.int_width(),
            height: virtual_size.int_height(),
            max_area: (max_pixels > 0).then_some(max_pixels),
            sizes: self.limits.sizes(&virtual_size),
            tiles: self.limits.tiles(info, &virtual_size, &sc),
            extra_qualities,
            extra_formats,
            extra_features,
            extra,
        })
    }
}
