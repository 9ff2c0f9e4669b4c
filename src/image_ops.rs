use std::collections::BTreeSet;
use std::io::Cursor;

use image::{DynamicImage, GenericImageView, Rgba, RgbaImage, imageops, imageops::FilterType};
use imageproc::geometric_transformations::{Interpolation, rotate_about_center};
use thiserror::Error;
use tracing::debug;

use crate::format::Format;
use crate::geometry::{Dimension, round_to_u32};
use crate::operation::{ColorTransform, Operation, OperationList, Rotate, Scale, Transpose};

const FILTER: FilterType = FilterType::Triangle;
const BITONAL_THRESHOLD: u8 = 128;

#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(Format),
    #[error("Cannot encode image: {0}")]
    Encode(#[from] image::ImageError),
}

/// Formats this processor can write.
pub fn available_output_formats() -> BTreeSet<Format> {
    BTreeSet::from([Format::Gif, Format::Jpg, Format::Png, Format::Tif, Format::Webp])
}

fn dimension_of(image: &DynamicImage) -> Dimension {
    Dimension::from_ints(image.width(), image.height())
}

/// Runs `ops` on a decoded, orientation-corrected source image. Encoding is
/// left to [`encode`].
pub fn apply(mut image: DynamicImage, ops: &OperationList) -> DynamicImage {
    let sc = ops.scale_constraint();
    if sc.has_effect() {
        let size = sc.constrained_size(&dimension_of(&image));
        image = image.resize_exact(
            size.int_width().max(1),
            size.int_height().max(1),
            FILTER,
        );
    }
    for op in ops.operations() {
        debug!(%op, "applying operation");
        image = match op {
            Operation::Crop(crop) => {
                let rect = crop.rectangle(&dimension_of(&image));
                image.crop_imm(
                    rect.int_x(),
                    rect.int_y(),
                    rect.int_width().max(1),
                    rect.int_height().max(1),
                )
            }
            Operation::Scale(scale) => scale_image(image, scale),
            Operation::Transpose(Transpose::Horizontal) => image.fliph(),
            Operation::Rotate(rotate) => rotate_image(image, rotate),
            Operation::ColorTransform(transform) => color_transform(image, *transform),
            Operation::Encode(_) => image,
        };
    }
    image
}

fn scale_image(image: DynamicImage, scale: &Scale) -> DynamicImage {
    let size = scale.resulting_size(&dimension_of(&image));
    let (width, height) = (size.int_width().max(1), size.int_height().max(1));
    if (width, height) == image.dimensions() {
        return image;
    }
    image.resize_exact(width, height, FILTER)
}

fn rotate_image(image: DynamicImage, rotate: &Rotate) -> DynamicImage {
    let degrees = rotate.degrees().rem_euclid(360.0);
    match degrees {
        d if d == 0.0 => image,
        d if d == 90.0 => image.rotate90(),
        d if d == 180.0 => image.rotate180(),
        d if d == 270.0 => image.rotate270(),
        _ => {
            // Arbitrary angles expand the canvas to the bounding box; the
            // uncovered corners stay transparent.
            let bounds = rotate.resulting_size(&dimension_of(&image));
            let (width, height) = (
                round_to_u32(bounds.width()).max(1),
                round_to_u32(bounds.height()).max(1),
            );
            let mut canvas = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]));
            let x = (i64::from(width) - i64::from(image.width())) / 2;
            let y = (i64::from(height) - i64::from(image.height())) / 2;
            imageops::overlay(&mut canvas, &image.to_rgba8(), x, y);
            let rotated = rotate_about_center(
                &canvas,
                degrees.to_radians() as f32,
                Interpolation::Bilinear,
                Rgba([0, 0, 0, 0]),
            );
            DynamicImage::ImageRgba8(rotated)
        }
    }
}

fn color_transform(image: DynamicImage, transform: ColorTransform) -> DynamicImage {
    match transform {
        ColorTransform::Gray => DynamicImage::ImageLuma8(image.to_luma8()),
        ColorTransform::Bitonal => {
            let mut luma = image.to_luma8();
            for pixel in luma.pixels_mut() {
                pixel.0[0] = if pixel.0[0] >= BITONAL_THRESHOLD { 255 } else { 0 };
            }
            DynamicImage::ImageLuma8(luma)
        }
    }
}

/// Encodes `image` as `format`.
pub fn encode(image: &DynamicImage, format: Format) -> Result<Vec<u8>, ProcessingError> {
    let image_format = format
        .image_format()
        .filter(|_| available_output_formats().contains(&format))
        .ok_or(ProcessingError::UnsupportedFormat(format))?;
    // JPEG has no alpha channel and GIF no 16-bit samples.
    let converted;
    let image = match format {
        Format::Jpg => {
            converted = DynamicImage::ImageRgb8(image.to_rgb8());
            &converted
        }
        Format::Gif | Format::Webp => {
            converted = DynamicImage::ImageRgba8(image.to_rgba8());
            &converted
        }
        _ => image,
    };
    let mut data = Cursor::new(Vec::new());
    image.write_to(&mut data, image_format)?;
    Ok(data.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::v3;
    use crate::geometry::ScaleConstraint;
    use image::{Luma, Rgb, RgbImage};

    fn source() -> DynamicImage {
        let mut image = RgbImage::from_pixel(100, 80, Rgb([255, 255, 255]));
        for x in 0..50 {
            for y in 0..80 {
                image.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
        DynamicImage::ImageRgb8(image)
    }

    fn run(uri: &str) -> DynamicImage {
        let params: v3::Parameters = uri.parse().unwrap();
        apply(source(), &params.to_operation_list(f64::MAX))
    }

    #[test]
    fn test_crop_and_scale() {
        let image = run("img/50,0,50,40/25,/0/default.png");
        assert_eq!(image.dimensions(), (25, 20));
        assert_eq!(image.to_rgb8().get_pixel(10, 10), &Rgb([255, 255, 255]));

        let image = run("img/square/max/0/default.png");
        assert_eq!(image.dimensions(), (80, 80));

        let image = run("img/full/!50,50/0/default.png");
        assert_eq!(image.dimensions(), (50, 40));

        let image = run("img/full/^200,10/0/default.png");
        assert_eq!(image.dimensions(), (200, 10));
    }

    #[test]
    fn test_mirror_and_quarter_turns() {
        let image = run("img/full/max/!0/default.png");
        assert_eq!(image.to_rgb8().get_pixel(0, 0), &Rgb([255, 255, 255]));

        let image = run("img/full/max/90/default.png");
        assert_eq!(image.dimensions(), (80, 100));
        // The left half (black) ends up on top.
        assert_eq!(image.to_rgb8().get_pixel(40, 10), &Rgb([0, 0, 0]));
        assert_eq!(image.to_rgb8().get_pixel(40, 90), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_arbitrary_rotation_expands_canvas() {
        let image = run("img/full/max/45/default.png");
        let expected = Rotate::new(45.0).resulting_size(&Dimension::from_ints(100, 80));
        assert_eq!(image.width(), round_to_u32(expected.width()));
        assert_eq!(image.height(), round_to_u32(expected.height()));
        assert_eq!(image.to_rgba8().get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn test_quality() {
        let image = run("img/full/max/0/gray.png");
        assert!(matches!(image, DynamicImage::ImageLuma8(_)));

        let mut gray = image::GrayImage::from_pixel(4, 1, Luma([0]));
        gray.put_pixel(1, 0, Luma([127]));
        gray.put_pixel(2, 0, Luma([128]));
        gray.put_pixel(3, 0, Luma([250]));
        let bitonal = color_transform(DynamicImage::ImageLuma8(gray), ColorTransform::Bitonal);
        let values: Vec<u8> = bitonal.to_luma8().pixels().map(|p| p.0[0]).collect();
        assert_eq!(values, [0, 0, 255, 255]);
    }

    #[test]
    fn test_scale_constraint_applies_first() {
        let params: v3::Parameters = "img/0,0,25,20/max/0/default.png".parse().unwrap();
        let ops = params
            .to_operation_list(f64::MAX)
            .with_scale_constraint(ScaleConstraint::new(1, 2).unwrap());
        let image = apply(source(), &ops);
        assert_eq!(image.dimensions(), (25, 20));
        // Region coordinates address the half-size image, so this stays black.
        assert_eq!(image.to_rgb8().get_pixel(20, 10), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_encode() {
        let image = run("img/full/50,/0/default.png");
        for format in available_output_formats() {
            let data = encode(&image, format).unwrap();
            let decoded = image::load_from_memory(&data).unwrap();
            assert_eq!(decoded.dimensions(), (50, 40), "{format}");
        }
        assert!(matches!(
            encode(&image, Format::Jp2),
            Err(ProcessingError::UnsupportedFormat(Format::Jp2))
        ));
        assert!(matches!(
            encode(&image, Format::Bmp),
            Err(ProcessingError::UnsupportedFormat(Format::Bmp))
        ));
    }
}
