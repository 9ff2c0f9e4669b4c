use std::fmt;

use image::ImageFormat;

/// An image encoding known to the server, either as a source or as an
/// output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Format {
    Bmp,
    Gif,
    Jp2,
    Jpg,
    Pdf,
    Png,
    Tif,
    Webp,
}

impl Format {
    pub const ALL: [Format; 8] = [
        Format::Bmp,
        Format::Gif,
        Format::Jp2,
        Format::Jpg,
        Format::Pdf,
        Format::Png,
        Format::Tif,
        Format::Webp,
    ];

    /// Short identifier of the format.
    pub fn key(self) -> &'static str {
        match self {
            Self::Bmp => "bmp",
            Self::Gif => "gif",
            Self::Jp2 => "jp2",
            Self::Jpg => "jpg",
            Self::Pdf => "pdf",
            Self::Png => "png",
            Self::Tif => "tif",
            Self::Webp => "webp",
        }
    }

    pub fn preferred_extension(self) -> &'static str {
        self.key()
    }

    pub fn media_type(self) -> &'static str {
        match self {
            Self::Bmp => "image/bmp",
            Self::Gif => "image/gif",
            Self::Jp2 => "image/jp2",
            Self::Jpg => "image/jpeg",
            Self::Pdf => "application/pdf",
            Self::Png => "image/png",
            Self::Tif => "image/tiff",
            Self::Webp => "image/webp",
        }
    }

    /// The `image` crate codec for this format, if there is one.
    pub fn image_format(self) -> Option<ImageFormat> {
        match self {
            Self::Bmp => Some(ImageFormat::Bmp),
            Self::Gif => Some(ImageFormat::Gif),
            Self::Jpg => Some(ImageFormat::Jpeg),
            Self::Png => Some(ImageFormat::Png),
            Self::Tif => Some(ImageFormat::Tiff),
            Self::Webp => Some(ImageFormat::WebP),
            Self::Jp2 | Self::Pdf => None,
        }
    }

    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.image_format() == Some(format))
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
