//! Error types for the edgequake-pdf2img library.
//!
//! Failures split along the same line as a conversion run does:
//!
//! * [`LoadError`]: the document itself could not be opened. Fatal to the
//!   run: the pipeline publishes a `RunStatus::Error` snapshot carrying the
//!   message and processes no pages.
//!
//! * [`RenderError`] / [`EncodeError`]: one page could not be painted or
//!   encoded. Folded into [`PageError`] and stored on that page's record; the
//!   remaining pages are unaffected and the run still completes.
//!
//! * [`Pdf2ImgError`]: everything a caller gets back as `Err(..)`: invalid
//!   settings, misuse of the pipeline (a second `convert` while a run is in
//!   flight), missing runtime, CLI input resolution and output writing.

use std::path::PathBuf;
use thiserror::Error;

/// Errors returned as `Err(..)` by the public API.
#[derive(Debug, Error)]
pub enum Pdf2ImgError {
    // ── Settings / lifecycle ──────────────────────────────────────────────
    /// Settings outside their documented ranges.
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// `convert` was called while the previous run is still in flight.
    #[error("A conversion is already running; call reset() before starting another")]
    RunInProgress,

    /// `convert` needs a Tokio runtime to host the render worker.
    #[error("No Tokio runtime available: {0}")]
    NoRuntime(String),

    /// The PDF decoder runtime has not been bound.
    #[error("PDF engine is not available: {0}")]
    EngineUnavailable(String),

    /// The document failed to load (eager API only; the stream API reports
    /// this as a `RunStatus::Error` snapshot).
    #[error("Failed to load '{source_name}': {message}")]
    LoadFailed { source_name: String, message: String },

    // ── Input errors ──────────────────────────────────────────────────────
    #[error("PDF file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    #[error("Input '{name}' is {size} bytes; the limit is {limit} bytes")]
    InputTooLarge { name: String, size: u64, limit: u64 },

    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Output errors ─────────────────────────────────────────────────────
    #[error("Failed to write '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build archive: {0}")]
    Archive(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// The document could not be opened.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("The file is empty")]
    Empty,

    #[error("The document is encrypted and requires a password")]
    PasswordRequired,

    #[error("Not a readable PDF document: {0}")]
    Malformed(String),

    #[error("Unsupported document: {0}")]
    Unsupported(String),
}

/// A single page could not be painted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("Page {page} does not exist (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    #[error("Page {page} surface of {width}x{height} px exceeds the {limit} px limit")]
    SurfaceTooLarge {
        page: usize,
        width: u32,
        height: u32,
        limit: u32,
    },

    #[error("Page {page} could not be rendered: {detail}")]
    Paint { page: usize, detail: String },
}

/// A rendered page could not be encoded.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Page {page}: {format} encoding failed: {detail}")]
pub struct EncodeError {
    pub page: usize,
    pub format: &'static str,
    pub detail: String,
}

/// A non-fatal failure attached to one page record.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PageError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Encode(#[from] EncodeError),
}
