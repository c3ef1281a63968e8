//! Progress-callback trait for per-page conversion events.
//!
//! Attach an [`Arc<dyn ConversionProgressCallback>`] with
//! [`crate::ConversionPipeline::with_progress_callback`] to receive events as
//! the pipeline processes each page. Events fire on the render worker thread,
//! in page order, and only while the run has not been reset.
//!
//! The snapshot stream returned by `convert` carries the same information;
//! the callback suits terminal progress bars and log sinks that do not want
//! to drive a `Stream`.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2img::ConversionProgressCallback;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, page_num: usize, total_pages: usize, bytes: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {}/{} done ({} bytes)", page_num, total_pages, bytes);
//!     }
//! }
//! ```

use std::sync::Arc;

/// Called by the conversion pipeline as it processes each page.
///
/// All methods have no-op defaults so implementations only override what
/// they need.
pub trait ConversionProgressCallback: Send + Sync {
    /// The document loaded; `total_pages` pages will be rendered.
    fn on_conversion_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// The document could not be loaded; no page events follow.
    fn on_load_error(&self, error: &str) {
        let _ = error;
    }

    /// Page `page_num` (1-indexed) entered `rendering`.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Page `page_num` completed; `bytes` is the encoded payload size.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, bytes: usize) {
        let _ = (page_num, total_pages, bytes);
    }

    /// Page `page_num` failed to render or encode.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Every page reached a terminal status.
    fn on_conversion_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// A callback that ignores every event.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Shared callback handle as stored by the pipeline.
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
