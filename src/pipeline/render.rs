//! Page rasterisation: surface size → RGBA target → paint.
//!
//! The target is allocated here, not by the adapter, so its size is exactly
//! the rounded surface size and the caps below apply to every backend.

use crate::adapter::DecodedDocument;
use crate::error::RenderError;
use image::{Rgba, RgbaImage};
use tracing::debug;

/// Longest raster side accepted. A3 at scale 3.0 is about 3 600 px.
pub const MAX_SURFACE_SIDE: u32 = 16_384;

/// Pixel budget for one page (4 bytes each, so at most 1 GiB of RGBA).
pub const MAX_SURFACE_PIXELS: u64 = 268_435_456;

/// Render one page at `scale` into a freshly allocated raster.
pub fn render_page<D>(doc: &D, page_number: usize, scale: f32) -> Result<RgbaImage, RenderError>
where
    D: DecodedDocument + ?Sized,
{
    let surface = doc.page_surface(page_number, scale)?;
    let (width, height) = surface.pixel_dimensions();

    if width > MAX_SURFACE_SIDE
        || height > MAX_SURFACE_SIDE
        || u64::from(width) * u64::from(height) > MAX_SURFACE_PIXELS
    {
        return Err(RenderError::SurfaceTooLarge {
            page: page_number,
            width,
            height,
            limit: MAX_SURFACE_SIDE,
        });
    }

    let mut target = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
    doc.paint(page_number, scale, &mut target)?;

    debug!("Rendered page {} → {}x{} px", page_number, width, height);
    Ok(target)
}
