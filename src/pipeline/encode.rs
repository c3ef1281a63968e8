//! Image encoding: rendered RGBA raster → PNG or JPEG bytes.
//!
//! PNG keeps the raster as-is (alpha included). JPEG has no alpha channel, so
//! the raster is flattened onto white first, matching the paper colour pdfium
//! paints behind page content.

use crate::config::{ConversionSettings, OutputFormat};
use crate::document::PageImage;
use crate::error::EncodeError;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage, RgbaImage};
use tracing::debug;

/// Encode a rendered page with the run's format and quality.
///
/// Takes the raster by value; it is freed when this returns.
pub fn encode_page(
    page_number: usize,
    raster: RgbaImage,
    settings: &ConversionSettings,
) -> Result<PageImage, EncodeError> {
    let (width, height) = raster.dimensions();
    let mut buf = Vec::new();

    let result = match settings.format {
        OutputFormat::Png => PngEncoder::new(&mut buf).write_image(
            raster.as_raw(),
            width,
            height,
            ExtendedColorType::Rgba8,
        ),
        OutputFormat::Jpeg => {
            let rgb = flatten_onto_white(&raster);
            drop(raster);
            JpegEncoder::new_with_quality(&mut buf, settings.quality_percent()).write_image(
                rgb.as_raw(),
                width,
                height,
                ExtendedColorType::Rgb8,
            )
        }
    };

    result.map_err(|e| EncodeError {
        page: page_number,
        format: match settings.format {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpeg",
        },
        detail: e.to_string(),
    })?;

    debug!(
        "Encoded page {} as {} → {} bytes",
        page_number,
        settings.format,
        buf.len()
    );
    Ok(PageImage::new(settings.format, width, height, buf))
}

fn flatten_onto_white(raster: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(raster.width(), raster.height(), |x, y| {
        let [r, g, b, a] = raster.get_pixel(x, y).0;
        let a = u16::from(a);
        let blend = |c: u8| ((u16::from(c) * a + 255 * (255 - a) + 127) / 255) as u8;
        image::Rgb([blend(r), blend(g), blend(b)])
    })
}
