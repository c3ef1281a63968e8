//! # edgequake-pdf2img
//!
//! Convert PDF documents into one PNG or JPEG image per page.
//!
//! Pages are rendered strictly one after another on a single worker, and
//! after every state change the pipeline publishes an immutable
//! [`Snapshot`]: run status, overall progress, the page being rendered and
//! the per-page records (pending, rendering, complete with an image, or
//! error). A page that fails to render is recorded and skipped; only a
//! document that cannot be opened fails the run.
//!
//! ## Pipeline Overview
//!
//! ```text
//! bytes
//!  │
//!  ├─ 1. Load     open via the decoder adapter (pdfium)      → loading
//!  ├─ 2. Render   page N at scale × 72 DPI into an RGBA raster → converting
//!  ├─ 3. Encode   PNG (lossless) or JPEG (quality, on white)
//!  └─ 4. Publish  snapshot after each transition, then        → complete
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2img::{convert_to_completion, output, ConversionPipeline,
//!     ConversionSettings, OutputFormat, PdfiumDecoder};
//! use pdfium_runtime::RuntimeConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let decoder = PdfiumDecoder::install(&RuntimeConfig::from_env())?;
//!     let mut pipeline = ConversionPipeline::new(decoder);
//!
//!     let settings = ConversionSettings::builder()
//!         .format(OutputFormat::Jpeg)
//!         .quality(0.85)
//!         .build()?;
//!     let bytes = std::fs::read("document.pdf")?;
//!     let result = convert_to_completion(&mut pipeline, "document.pdf", bytes, settings).await?;
//!
//!     output::save_all(std::path::Path::new("out"), &result.document)?;
//!     eprintln!("{} pages, {} failed", result.stats.total_pages, result.stats.failed_pages);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2img` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdf2img = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod adapter;
pub mod config;
pub mod convert;
pub mod document;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use adapter::{DecodedDocument, PdfDecoder, PdfiumDecoder, PdfiumDocument, SurfaceSize};
pub use config::{ConversionSettings, ConversionSettingsBuilder, OutputFormat};
pub use convert::{convert_sync, convert_to_completion, ConversionOutput, ConversionStats};
pub use document::{Document, PageImage, PageRecord, PageStatus, RunStatus, Snapshot};
pub use error::{EncodeError, LoadError, PageError, Pdf2ImgError, RenderError};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{ConversionPipeline, SnapshotStream};
