//! Machinery shared by the Image API 2 and 3 information documents: the
//! virtual size of a source, its downscaled `sizes` and its `tiles`.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::config::IiifConfig;
use crate::error::IiifError;
use crate::geometry::{Dimension, ScaleConstraint};
use crate::info::Info;

pub static PROTOCOL: &str = "http://iiif.io/api/image";

/// Halving steps after which the reduction factor search gives up.
const MAX_REDUCTION_FACTOR: u32 = 31;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ComplianceLevel {
    #[default]
    Level2,
}

impl ComplianceLevel {
    pub fn v2_profile_uri(self) -> &'static str {
        match self {
            Self::Level2 => "http://iiif.io/api/image/2/level2.json",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SizeEntry {
    pub width: u32,
    pub height: u32,
}

impl SizeEntry {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TileEntry {
    pub width: u32,
    pub height: u32,
    pub scale_factors: Vec<u32>,
}

/// Server limits that shape an information document.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InfoLimits {
    /// Largest pixel area the server will deliver; 0 for no limit.
    pub max_pixels: u64,
    /// Largest scale relative to the virtual size.
    pub max_scale: f64,
    /// Smallest side of an advertised size.
    pub min_size: u32,
    /// Smallest side of an advertised tile.
    pub min_tile_size: u32,
}

impl Default for InfoLimits {
    fn default() -> Self {
        Self {
            max_pixels: 0,
            max_scale: f64::MAX,
            min_size: 64,
            min_tile_size: 512,
        }
    }
}

impl InfoLimits {
    pub fn from_config(config: &IiifConfig) -> Self {
        Self {
            max_pixels: config.max_pixels,
            max_scale: config.effective_max_scale(),
            min_size: config.min_size,
            min_tile_size: config.min_tile_size,
        }
    }

    /// Whether the document may advertise sizes above the virtual size.
    pub fn upscaling_advertised(&self, scale_constraint: &ScaleConstraint) -> bool {
        !scale_constraint.has_effect() && self.max_scale > 1.0
    }

    /// `min(area × max_scale, max_pixels)`; 0 means no limit.
    pub fn effective_max_pixels(&self, virtual_size: &Dimension) -> u64 {
        let limit = (virtual_size.area() * self.max_scale).min(self.max_pixels as f64);
        if limit.is_finite() && limit > 0.0 {
            limit as u64
        } else {
            0
        }
    }

    /// Downscaled sizes of the virtual image, smallest first.
    pub fn sizes(&self, virtual_size: &Dimension) -> Vec<SizeEntry> {
        let max_rf = max_reduction_factor(virtual_size, self.min_size);
        let max_pixels = self.effective_max_pixels(virtual_size);
        let min_rf = if max_pixels > 0 {
            min_reduction_factor(virtual_size, max_pixels)
        } else {
            0
        };
        (min_rf..=max_rf)
            .rev()
            .map(|rf| {
                let size = virtual_size.scaled(1.0 / f64::from(1u32 << rf));
                SizeEntry::new(size.int_width(), size.int_height())
            })
            .filter(|s| s.width >= self.min_size && s.height >= self.min_size)
            .collect()
    }

    /// One tile entry per distinct tile size among the source's pages.
    pub fn tiles(
        &self,
        info: &Info,
        virtual_size: &Dimension,
        scale_constraint: &ScaleConstraint,
    ) -> Vec<TileEntry> {
        let max_rf = max_reduction_factor(virtual_size, self.min_size);
        let scale_factors: Vec<u32> = (0..=max_rf).map(|rf| 1u32 << rf).collect();
        let mut tiles: Vec<TileEntry> = Vec::new();
        for image in info.images() {
            let native = info.orientation().adjusted_size(image.tile_size());
            let virtual_tile = scale_constraint.constrained_size(&native);
            let tile = tile_size(virtual_size, &virtual_tile, self.min_tile_size);
            let (width, height) = (tile.width().ceil() as u32, tile.height().ceil() as u32);
            if !tiles.iter().any(|t| t.width == width && t.height == height) {
                tiles.push(TileEntry {
                    width,
                    height,
                    scale_factors: scale_factors.clone(),
                });
            }
        }
        tiles
    }
}

/// Size of page `page_index` as the client sees it: orientation applied,
/// then the scale constraint.
pub fn virtual_size(
    info: &Info,
    page_index: usize,
    scale_constraint: &ScaleConstraint,
) -> Result<Dimension, IiifError> {
    let size = info.size(page_index).ok_or_else(|| {
        IiifError::invalid(format!("Page index {} is out of bounds", page_index + 1))
    })?;
    let oriented = info.orientation().adjusted_size(size);
    Ok(scale_constraint.constrained_size(&oriented))
}

/// Number of times the shorter side of `full_size` can be halved while
/// staying at least `min_dimension`.
pub fn max_reduction_factor(full_size: &Dimension, min_dimension: u32) -> u32 {
    if min_dimension == 0 {
        return 0;
    }
    let mut next = full_size.width().min(full_size.height());
    for factor in 0..MAX_REDUCTION_FACTOR {
        next /= 2.0;
        if next < f64::from(min_dimension) {
            return factor;
        }
    }
    MAX_REDUCTION_FACTOR
}

/// Number of halvings of `full_size` needed to bring its area down to
/// `max_pixels`.
pub fn min_reduction_factor(full_size: &Dimension, max_pixels: u64) -> u32 {
    if max_pixels == 0 {
        return 0;
    }
    let mut next = *full_size;
    let mut factor = 0;
    while next.area() > max_pixels as f64 && factor < MAX_REDUCTION_FACTOR {
        next.scale(0.5);
        factor += 1;
    }
    factor
}

/// Tile size to advertise for an image of `full_size` whose native tiles
/// are `tile`.
///
/// An untiled image (one tile covering it) gets `min_tile_size` tiles,
/// clamped to the image. Native tiles are doubled until they reach
/// `min_tile_size` (or the image side), then clamped to the image.
pub fn tile_size(full_size: &Dimension, tile: &Dimension, min_tile_size: u32) -> Dimension {
    let min_tile = f64::from(min_tile_size);
    let floor_w = min_tile.min(full_size.width());
    let floor_h = min_tile.min(full_size.height());
    let untiled = tile.width() >= full_size.width() && tile.height() >= full_size.height();
    if untiled || tile.width() <= 0.0 || tile.height() <= 0.0 {
        return Dimension::new(floor_w, floor_h);
    }
    let mut size = *tile;
    while size.width() < floor_w || size.height() < floor_h {
        size.scale(2.0);
    }
    Dimension::new(
        size.width().min(full_size.width()),
        size.height().min(full_size.height()),
    )
}

/// Merges delegate-supplied keys into `target`, keeping built-in keys.
pub fn merge_extra_keys(target: &mut Map<String, Value>, extra: Map<String, Value>, reserved: &[&str]) {
    for (key, value) in extra {
        if reserved.contains(&key.as_str()) {
            warn!(%key, "ignoring delegate key that collides with a built-in key");
            continue;
        }
        target.insert(key, value);
    }
}
