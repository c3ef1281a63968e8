//! [`PdfDecoder`] backed by pdfium through `pdfium-render`.
//!
//! The pdfium library itself is bound once per process by the
//! `pdfium-runtime` crate; this adapter only borrows that `'static`
//! instance. Documents are opened from an owned byte buffer and painted with
//! an explicit target size so the bitmap matches the pipeline's raster
//! target exactly.

use super::{DecodedDocument, PdfDecoder, SurfaceSize};
use crate::error::{LoadError, Pdf2ImgError, RenderError};
use image::RgbaImage;
use pdfium_render::prelude::*;
use pdfium_runtime::RuntimeConfig;
use tracing::{debug, warn};

/// Opens documents with the process-wide pdfium runtime.
#[derive(Clone)]
pub struct PdfiumDecoder {
    pdfium: &'static Pdfium,
    password: Option<String>,
}

impl std::fmt::Debug for PdfiumDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfiumDecoder")
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl PdfiumDecoder {
    pub fn new(pdfium: &'static Pdfium) -> Self {
        Self {
            pdfium,
            password: None,
        }
    }

    /// Use the runtime bound earlier with [`pdfium_runtime::install`].
    pub fn from_runtime() -> Result<Self, Pdf2ImgError> {
        pdfium_runtime::installed()
            .map(Self::new)
            .ok_or_else(|| Pdf2ImgError::EngineUnavailable("pdfium runtime not installed".into()))
    }

    /// Bind the runtime (downloading it if needed) and build a decoder.
    pub fn install(config: &RuntimeConfig) -> Result<Self, Pdf2ImgError> {
        pdfium_runtime::install(config, None)
            .map(Self::new)
            .map_err(|e| Pdf2ImgError::EngineUnavailable(e.to_string()))
    }

    /// User password for encrypted documents.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

impl PdfDecoder for PdfiumDecoder {
    type Document = PdfiumDocument;

    fn open(&self, bytes: Vec<u8>) -> Result<PdfiumDocument, LoadError> {
        if bytes.is_empty() {
            return Err(LoadError::Empty);
        }
        let doc = self
            .pdfium
            .load_pdf_from_byte_vec(bytes, self.password.as_deref())
            .map_err(|e| classify_load_error(&format!("{:?}", e)))?;
        debug!("pdfium opened document: {} pages", doc.pages().len());
        Ok(PdfiumDocument { doc })
    }
}

fn classify_load_error(detail: &str) -> LoadError {
    if detail.contains("Password") || detail.contains("password") {
        LoadError::PasswordRequired
    } else if detail.contains("Security") {
        LoadError::Unsupported(detail.to_string())
    } else {
        LoadError::Malformed(detail.to_string())
    }
}

/// A document opened by [`PdfiumDecoder`]; dropping it closes it in pdfium.
pub struct PdfiumDocument {
    doc: PdfDocument<'static>,
}

impl PdfiumDocument {
    fn page(&self, page_number: usize) -> Result<PdfPage<'static>, RenderError> {
        let total = self.page_count();
        if page_number == 0 || page_number > total {
            return Err(RenderError::PageOutOfRange {
                page: page_number,
                total,
            });
        }
        self.doc
            .pages()
            .get((page_number - 1) as u16)
            .map_err(|e| RenderError::Paint {
                page: page_number,
                detail: format!("{:?}", e),
            })
    }
}

impl DecodedDocument for PdfiumDocument {
    fn page_count(&self) -> usize {
        self.doc.pages().len() as usize
    }

    fn page_surface(&self, page_number: usize, scale: f32) -> Result<SurfaceSize, RenderError> {
        let page = self.page(page_number)?;
        Ok(SurfaceSize {
            width: page.width().value * scale,
            height: page.height().value * scale,
        })
    }

    fn paint(
        &self,
        page_number: usize,
        _scale: f32,
        target: &mut RgbaImage,
    ) -> Result<(), RenderError> {
        let page = self.page(page_number)?;
        let (width, height) = target.dimensions();

        let render_config = PdfRenderConfig::new().set_target_size(width as i32, height as i32);
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| RenderError::Paint {
                page: page_number,
                detail: format!("{:?}", e),
            })?;

        let rendered = bitmap.as_image().to_rgba8();
        if rendered.dimensions() != (width, height) {
            warn!(
                "Page {}: pdfium produced {}x{} for a {}x{} target",
                page_number,
                rendered.width(),
                rendered.height(),
                width,
                height
            );
        }
        image::imageops::replace(target, &rendered, 0, 0);
        Ok(())
    }
}
