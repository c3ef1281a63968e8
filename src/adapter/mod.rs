//! Decoder adapter: the boundary between the pipeline and a PDF library.
//!
//! The pipeline only ever talks to these two traits. [`pdfium`] implements
//! them on top of `pdfium-render`; tests substitute a fake that produces
//! deterministic surfaces and injected failures.
//!
//! ## Contract
//!
//! | Operation | Failure |
//! |-----------|---------|
//! | [`PdfDecoder::open`] | [`LoadError`] — fatal to the run |
//! | [`DecodedDocument::page_count`] | — |
//! | [`DecodedDocument::page_surface`] | [`RenderError`] — page-local |
//! | [`DecodedDocument::paint`] | [`RenderError`] — page-local |
//! | [`DecodedDocument::close`] | — |
//!
//! `close` consumes the handle, so a document is released at most once;
//! dropping a handle releases it as well.

pub mod pdfium;

use crate::error::{LoadError, RenderError};
use image::RgbaImage;

pub use self::pdfium::{PdfiumDecoder, PdfiumDocument};

/// Page dimensions in pixels at a given scale, before rounding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceSize {
    pub width: f32,
    pub height: f32,
}

impl SurfaceSize {
    /// Raster target size: each side rounded to the nearest integer, at least 1.
    pub fn pixel_dimensions(&self) -> (u32, u32) {
        (round_side(self.width), round_side(self.height))
    }
}

fn round_side(v: f32) -> u32 {
    // NaN.max(1.0) is 1.0; +inf saturates to u32::MAX and trips the size limit.
    v.round().max(1.0) as u32
}

/// An opened document.
///
/// Handles are used from the single render worker that opened them and are
/// never shared across threads.
pub trait DecodedDocument {
    /// Number of pages, fixed at open time.
    fn page_count(&self) -> usize;

    /// Size of page `page_number` (1-based) at `scale`.
    fn page_surface(&self, page_number: usize, scale: f32) -> Result<SurfaceSize, RenderError>;

    /// Paint page `page_number` at `scale` onto `target`, whose dimensions
    /// are [`SurfaceSize::pixel_dimensions`] of the same page and scale.
    fn paint(&self, page_number: usize, scale: f32, target: &mut RgbaImage)
        -> Result<(), RenderError>;

    /// Release the underlying native resources.
    fn close(self)
    where
        Self: Sized,
    {
        drop(self);
    }
}

/// Opens raw document bytes.
///
/// Decoders are shared with the render worker, hence `Send + Sync + 'static`.
pub trait PdfDecoder: Send + Sync + 'static {
    type Document: DecodedDocument;

    fn open(&self, bytes: Vec<u8>) -> Result<Self::Document, LoadError>;
}
