//! Per-page stages of a conversion run.
//!
//! ## Data Flow
//!
//! ```text
//! DecodedDocument ──▶ render ──▶ encode ──▶ PageImage
//!   (adapter)        (RGBA)     (PNG/JPEG)
//! ```
//!
//! 1. [`render`]: size a raster target from the page surface and paint it
//! 2. [`encode`]: compress the raster into the configured format; the raster
//!    is consumed, so at most one page buffer is alive at a time
//!
//! [`input`] sits in front of the pipeline for the CLI: it turns a path or URL
//! into `(source_name, bytes)`.

pub mod encode;
pub mod input;
pub mod render;
