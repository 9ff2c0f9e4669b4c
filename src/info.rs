use crate::format::Format;
use crate::geometry::{Dimension, Orientation};

/// Geometry of one page (or resolution level) of a source image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InfoImage {
    width: u32,
    height: u32,
    tile_width: Option<u32>,
    tile_height: Option<u32>,
}

impl InfoImage {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            tile_width: None,
            tile_height: None,
        }
    }

    pub fn with_tile_size(mut self, width: u32, height: u32) -> Self {
        self.tile_width = Some(width);
        self.tile_height = Some(height);
        self
    }

    pub fn size(&self) -> Dimension {
        Dimension::from_ints(self.width, self.height)
    }

    /// Native tile size; an untiled image is one tile the size of the image.
    pub fn tile_size(&self) -> Dimension {
        Dimension::from_ints(
            self.tile_width.unwrap_or(self.width),
            self.tile_height.unwrap_or(self.height),
        )
    }
}

/// What the server knows about a source image without decoding its pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct Info {
    images: Vec<InfoImage>,
    orientation: Orientation,
    num_resolutions: Option<u32>,
    source_format: Option<Format>,
}

impl Info {
    pub fn builder() -> InfoBuilder {
        InfoBuilder::default()
    }

    pub fn images(&self) -> &[InfoImage] {
        &self.images
    }

    /// Raw size of the page at `page_index`, or `None` past the last page.
    pub fn size(&self, page_index: usize) -> Option<Dimension> {
        self.images.get(page_index).map(InfoImage::size)
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn num_resolutions(&self) -> Option<u32> {
        self.num_resolutions
    }

    pub fn source_format(&self) -> Option<Format> {
        self.source_format
    }

    pub fn num_pages(&self) -> usize {
        self.images.len()
    }
}

#[derive(Debug, Default)]
pub struct InfoBuilder {
    images: Vec<InfoImage>,
    orientation: Orientation,
    num_resolutions: Option<u32>,
    source_format: Option<Format>,
}

impl InfoBuilder {
    pub fn with_image(mut self, image: InfoImage) -> Self {
        self.images.push(image);
        self
    }

    pub fn with_size(self, width: u32, height: u32) -> Self {
        self.with_image(InfoImage::new(width, height))
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn with_num_resolutions(mut self, num_resolutions: u32) -> Self {
        self.num_resolutions = Some(num_resolutions);
        self
    }

    pub fn with_format(mut self, format: Option<Format>) -> Self {
        self.source_format = format;
        self
    }

    pub fn build(self) -> Info {
        Info {
            images: self.images,
            orientation: self.orientation,
            num_resolutions: self.num_resolutions,
            source_format: self.source_format,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untiled_image_is_one_tile() {
        let image = InfoImage::new(1500, 1200);
        assert_eq!(image.tile_size(), Dimension::from_ints(1500, 1200));
        assert_eq!(
            image.with_tile_size(256, 256).tile_size(),
            Dimension::from_ints(256, 256)
        );
    }

    #[test]
    fn test_page_lookup() {
        let info = Info::builder()
            .with_size(100, 80)
            .with_size(50, 40)
            .build();
        assert_eq!(info.num_pages(), 2);
        assert_eq!(info.size(1), Some(Dimension::from_ints(50, 40)));
        assert_eq!(info.size(2), None);
        assert_eq!(info.orientation(), Orientation::Rotate0);
    }
}
