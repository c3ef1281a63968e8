//! Run state published by the conversion pipeline.
//!
//! Every value here is an immutable snapshot from the caller's point of view.
//! Only the pipeline mutates a [`Document`], through the crate-private
//! transition methods, which enforce the page lifecycle:
//!
//! ```text
//! pending ──▶ rendering ──▶ complete   (image bytes, width, height)
//!                      └──▶ error      (message)
//! ```
//!
//! Encoded payloads are shared (`Arc<[u8]>`), so cloning a snapshot after
//! every transition never copies image bytes.

use crate::config::OutputFormat;
use crate::error::PageError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Serialize, Serializer};
use std::sync::Arc;

/// One encoded page image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageImage {
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
    /// Serialised as its byte length; payloads stay out of JSON manifests.
    #[serde(rename = "bytes", serialize_with = "serialize_len")]
    data: Arc<[u8]>,
}

fn serialize_len<S: Serializer>(data: &Arc<[u8]>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(data.len() as u64)
}

impl PageImage {
    pub fn new(format: OutputFormat, width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            format,
            width,
            height,
            data: data.into(),
        }
    }

    /// The encoded file contents.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// `data:image/...;base64,...` URL for embedding the page in HTML.
    pub fn data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.format.mime_type(),
            STANDARD.encode(&self.data)
        )
    }
}

/// Lifecycle status of one page.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PageStatus {
    #[default]
    Pending,
    Rendering,
    Complete { image: PageImage },
    Error { message: String },
}

impl PageStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PageStatus::Complete { .. } | PageStatus::Error { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            PageStatus::Pending => "pending",
            PageStatus::Rendering => "rendering",
            PageStatus::Complete { .. } => "complete",
            PageStatus::Error { .. } => "error",
        }
    }
}

/// State of a single page, addressed by its 1-based number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageRecord {
    pub page_number: usize,
    #[serde(flatten)]
    pub status: PageStatus,
}

impl PageRecord {
    fn pending(page_number: usize) -> Self {
        Self {
            page_number,
            status: PageStatus::Pending,
        }
    }

    /// The encoded image, present only once the page is complete.
    pub fn image(&self) -> Option<&PageImage> {
        match &self.status {
            PageStatus::Complete { image } => Some(image),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.status {
            PageStatus::Error { message } => Some(message),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// One loaded PDF and the state of each of its pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    pub source_name: String,
    pub page_count: usize,
    pub pages: Vec<PageRecord>,
}

impl Document {
    /// A document whose pages are all pending.
    pub(crate) fn new(source_name: impl Into<String>, page_count: usize) -> Self {
        Self {
            source_name: source_name.into(),
            page_count,
            pages: (1..=page_count).map(PageRecord::pending).collect(),
        }
    }

    /// Page by 1-based number.
    pub fn page(&self, page_number: usize) -> Option<&PageRecord> {
        page_number
            .checked_sub(1)
            .and_then(|idx| self.pages.get(idx))
    }

    fn page_mut(&mut self, page_number: usize) -> Option<&mut PageRecord> {
        page_number
            .checked_sub(1)
            .and_then(|idx| self.pages.get_mut(idx))
    }

    /// `pending → rendering`. Returns `false` (and changes nothing) for any
    /// other starting status.
    pub(crate) fn begin_page(&mut self, page_number: usize) -> bool {
        match self.page_mut(page_number) {
            Some(page) if page.status == PageStatus::Pending => {
                page.status = PageStatus::Rendering;
                true
            }
            _ => false,
        }
    }

    /// `rendering → complete | error`. Returns `false` (and changes nothing)
    /// unless the page is currently rendering.
    pub(crate) fn finish_page(
        &mut self,
        page_number: usize,
        outcome: Result<PageImage, PageError>,
    ) -> bool {
        match self.page_mut(page_number) {
            Some(page) if page.status == PageStatus::Rendering => {
                page.status = match outcome {
                    Ok(image) => PageStatus::Complete { image },
                    Err(e) => PageStatus::Error {
                        message: e.to_string(),
                    },
                };
                true
            }
            _ => false,
        }
    }

    /// Pages that reached a terminal status.
    pub fn finished_count(&self) -> usize {
        self.pages.iter().filter(|p| p.is_terminal()).count()
    }

    /// Pages that completed successfully, in page order.
    pub fn completed_pages(&self) -> impl Iterator<Item = (usize, &PageImage)> {
        self.pages
            .iter()
            .filter_map(|p| p.image().map(|img| (p.page_number, img)))
    }

    pub fn failed_count(&self) -> usize {
        self.pages
            .iter()
            .filter(|p| p.error_message().is_some())
            .count()
    }

    pub fn is_finished(&self) -> bool {
        self.pages.iter().all(PageRecord::is_terminal)
    }
}

/// Status of the conversion run as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Idle,
    Loading,
    Converting,
    Complete,
    Error,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Complete | RunStatus::Error)
    }
}

/// Immutable view of a run, emitted after every state transition.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Snapshot {
    pub status: RunStatus,
    /// Terminal pages over page count, 0–100, non-decreasing within a run.
    pub progress: u8,
    /// Page currently being rendered.
    pub current_page: Option<usize>,
    /// Absent until the page count is known, and after a load failure.
    pub document: Option<Document>,
    /// Load failure message, set only with [`RunStatus::Error`].
    pub error: Option<String>,
}

impl Snapshot {
    /// The state of a pipeline with no run.
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// `round(100 × finished / total)`, held at 99 until every page is terminal.
pub fn progress_percent(finished: usize, total: usize) -> u8 {
    if total == 0 || finished >= total {
        return 100;
    }
    let rounded = (finished * 200 + total) / (total * 2);
    rounded.min(99) as u8
}
