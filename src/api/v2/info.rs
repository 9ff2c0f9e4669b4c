use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::error;

use super::{Feature, IMAGE_2_CONTEXT};
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

const RESERVED_KEYS: [&str; 8] = [
    "@context", "@id", "protocol", "width", "height", "sizes", "tiles", "profile",
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileDescription {
    formats: Vec<&'static str>,
    qualities: Vec<&'static str>,
    supports: Vec<Feature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_area: Option<u64>,
}

/// The Image API 2 information document (`info.json`).
#[derive(Debug, Serialize)]
pub struct ImageInfo {
    #[serde(rename = "@context")]
    context: &'static str,
    #[serde(rename = "@id")]
    id: String,
    protocol: &'static str,
    width: u32,
    height: u32,
    sizes: Vec<SizeEntry>,
    tiles: Vec<TileEntry>,
    profile: (&'static str, ProfileDescription),
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl ImageInfo {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sizes(&self) -> &[SizeEntry] {
        &self.sizes
    }
}

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
        let upscaling = self.limits.upscaling_advertised(&sc);

        let description = ProfileDescription {
            formats: processor_formats.iter().map(|f| f.preferred_extension()).collect(),
            qualities: Quality::ALL.into_iter().map(Quality::name).collect(),
            supports: Feature::ALL
                .into_iter()
                .filter(|f| upscaling || *f != Feature::SizeAboveFull)
                .collect(),
            max_area: (max_pixels > 0).then_some(max_pixels),
        };

        let mut extra = Map::new();
        if let Some(delegate) = &self.delegate {
            match delegate.extra_info_keys(ApiVersion::V2, image_uri) {
                Ok(keys) => merge_extra_keys(&mut extra, keys, &RESERVED_KEYS),
                Err(e) => error!("extra information keys unavailable: {e}"),
            }
        }

        Ok(ImageInfo {
            context: IMAGE_2_CONTEXT,
            id: image_uri.to_owned(),
            protocol: PROTOCOL,
            width: virtual_size.int_width(),
            height: virtual_size.int_height(),
            sizes: self.limits.sizes(&virtual_size),
            tiles: self.limits.tiles(info, &virtual_size, &sc),
            profile: (ComplianceLevel::Level2.v2_profile_uri(), description),
            extra,
        })
    }
}
