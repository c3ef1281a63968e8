//! Eager (whole-document) conversion entry points.
//!
//! These wrap the snapshot stream for callers that only want the final
//! result: every intermediate snapshot is discarded and the terminal one is
//! turned into a [`ConversionOutput`]. Use [`ConversionPipeline::convert`]
//! directly to observe per-page progress or to abandon a run midway.

use crate::adapter::PdfDecoder;
use crate::config::ConversionSettings;
use crate::document::{Document, RunStatus};
use crate::error::Pdf2ImgError;
use crate::stream::{last_snapshot, ConversionPipeline};
use serde::Serialize;
use std::time::Instant;
use tracing::info;

/// A finished run.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionOutput {
    /// Every page in a terminal state: complete with an image, or error.
    pub document: Document,
    pub stats: ConversionStats,
}

/// Summary figures for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConversionStats {
    pub total_pages: usize,
    pub converted_pages: usize,
    pub failed_pages: usize,
    /// Sum of encoded image sizes.
    pub total_bytes: u64,
    pub duration_ms: u64,
}

impl ConversionStats {
    fn from_document(document: &Document, duration_ms: u64) -> Self {
        Self {
            total_pages: document.page_count,
            converted_pages: document.completed_pages().count(),
            failed_pages: document.failed_count(),
            total_bytes: document
                .completed_pages()
                .map(|(_, img)| img.len() as u64)
                .sum(),
            duration_ms,
        }
    }
}

/// Run a conversion to the end and return the finished document.
///
/// # Returns
/// `Ok(ConversionOutput)` once the run completes, even if some pages failed
/// (check `output.stats.failed_pages`).
///
/// # Errors
/// * [`Pdf2ImgError::LoadFailed`] when the document cannot be opened.
/// * Any error [`ConversionPipeline::convert`] returns.
/// * [`Pdf2ImgError::Internal`] when the run ended without a terminal
///   snapshot, which only happens if it was reset from another task.
pub async fn convert_to_completion<D: PdfDecoder>(
    pipeline: &mut ConversionPipeline<D>,
    source_name: impl Into<String>,
    bytes: Vec<u8>,
    settings: ConversionSettings,
) -> Result<ConversionOutput, Pdf2ImgError> {
    let started = Instant::now();
    let source_name = source_name.into();
    let stream = pipeline.convert(source_name.clone(), bytes, settings)?;

    let last = last_snapshot(stream).await.ok_or_else(|| {
        Pdf2ImgError::Internal("conversion ended without publishing any state".into())
    })?;

    match (last.status, last.document) {
        (RunStatus::Complete, Some(document)) => {
            let stats =
                ConversionStats::from_document(&document, started.elapsed().as_millis() as u64);
            info!(
                "'{}': {}/{} pages converted, {} bytes",
                source_name, stats.converted_pages, stats.total_pages, stats.total_bytes
            );
            Ok(ConversionOutput { document, stats })
        }
        (RunStatus::Error, _) => Err(Pdf2ImgError::LoadFailed {
            source_name,
            message: last.error.unwrap_or_else(|| "unknown error".into()),
        }),
        (status, _) => Err(Pdf2ImgError::Internal(format!(
            "conversion stopped in state {:?}",
            status
        ))),
    }
}

/// Blocking version of [`convert_to_completion`] for non-async callers.
///
/// Creates a temporary Tokio runtime. Do not call from inside an existing
/// runtime.
pub fn convert_sync<D: PdfDecoder>(
    decoder: D,
    source_name: impl Into<String>,
    bytes: Vec<u8>,
    settings: ConversionSettings,
) -> Result<ConversionOutput, Pdf2ImgError> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2ImgError::Internal(format!("Failed to create tokio runtime: {}", e)))?;
    runtime.block_on(async {
        let mut pipeline = ConversionPipeline::new(decoder);
        convert_to_completion(&mut pipeline, source_name, bytes, settings).await
    })
}
