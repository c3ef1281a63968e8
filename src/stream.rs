//! The conversion pipeline: a sequential per-page state machine that
//! publishes an immutable [`Snapshot`] after every transition.
//!
//! ## Run lifecycle
//!
//! ```text
//! idle ─▶ loading ─┬─▶ converting ─(page 1..=N)─▶ complete
//!                  └─▶ error   (document failed to load)
//! ```
//!
//! Each run executes on one Tokio blocking-pool thread; pages are rendered
//! strictly in order and the raster of page N is freed before page N+1 is
//! allocated. Snapshots travel through an unbounded channel, so the worker
//! never waits on a slow consumer, and the latest one is mirrored in the
//! pipeline for [`ConversionPipeline::snapshot`].
//!
//! ## Reset
//!
//! [`ConversionPipeline::reset`] abandons the run: under the same lock the
//! worker publishes through, it marks the run cancelled and clears the
//! mirrored state to `idle`. No snapshot is published after that point. The
//! worker notices the flag at the top of its next page iteration (or right
//! after the page in flight) and releases the document handle.
//!
//! Workers hold a per-pipeline run lock from before loading until the handle
//! is closed. A run started right after a reset therefore queues behind the
//! abandoned worker and never has two documents open at once.

use crate::adapter::{DecodedDocument, PdfDecoder};
use crate::config::ConversionSettings;
use crate::document::{progress_percent, Document, PageImage, RunStatus, Snapshot};
use crate::error::{Pdf2ImgError, PageError, RenderError};
use crate::pipeline::{encode, render};
use crate::progress::{ConversionProgressCallback, ProgressCallback};
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;
use tracing::{debug, info, warn};

/// A boxed stream of run snapshots, ending after the terminal snapshot
/// (`complete` or `error`) or when the run is reset.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = Snapshot> + Send>>;

fn lock<T>(state: &Mutex<T>) -> MutexGuard<'_, T> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

// ── Publisher ────────────────────────────────────────────────────────────

/// Worker-side end of a run: publishes snapshots unless the run was reset.
struct Publisher {
    latest: Arc<Mutex<Snapshot>>,
    cancelled: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<Snapshot>,
    callback: Option<ProgressCallback>,
}

impl Publisher {
    /// Returns `false` once the run has been abandoned; nothing is published then.
    fn publish(&self, snapshot: Snapshot) -> bool {
        let mut latest = lock(&self.latest);
        if self.cancelled.load(Ordering::SeqCst) {
            return false;
        }
        *latest = snapshot.clone();
        // A dropped receiver only means nobody is listening; keep converting.
        let _ = self.tx.send(snapshot);
        true
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn notify(&self, event: impl FnOnce(&dyn ConversionProgressCallback)) {
        if let Some(cb) = &self.callback {
            event(cb.as_ref());
        }
    }
}

// ── Pipeline ─────────────────────────────────────────────────────────────

struct ActiveRun {
    cancelled: Arc<AtomicBool>,
    worker: JoinHandle<()>,
}

/// Owns the decoder, the current run and its latest published state.
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdf2img::{ConversionPipeline, ConversionSettings, PdfiumDecoder, RunStatus};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let decoder = PdfiumDecoder::install(&pdfium_runtime::RuntimeConfig::from_env())?;
/// let mut pipeline = ConversionPipeline::new(decoder);
/// let bytes = std::fs::read("report.pdf")?;
///
/// let mut snapshots = pipeline.convert("report.pdf", bytes, ConversionSettings::default())?;
/// while let Some(snap) = snapshots.next().await {
///     println!("{:?} {}%", snap.status, snap.progress);
///     if snap.status == RunStatus::Complete {
///         let doc = snap.document.expect("complete runs carry a document");
///         println!("{} pages converted", doc.completed_pages().count());
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct ConversionPipeline<D: PdfDecoder> {
    decoder: Arc<D>,
    callback: Option<ProgressCallback>,
    latest: Arc<Mutex<Snapshot>>,
    active: Option<ActiveRun>,
    /// Held by a worker from before `open` until after `close`.
    run_lock: Arc<Mutex<()>>,
}

impl<D: PdfDecoder> ConversionPipeline<D> {
    pub fn new(decoder: D) -> Self {
        Self {
            decoder: Arc::new(decoder),
            callback: None,
            latest: Arc::new(Mutex::new(Snapshot::idle())),
            active: None,
            run_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Receive per-page events in addition to the snapshot stream.
    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// The most recently published snapshot (`idle` before any run and after reset).
    pub fn snapshot(&self) -> Snapshot {
        lock(&self.latest).clone()
    }

    /// Whether a run is in flight: started, not reset, and without a
    /// terminal snapshot yet.
    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|run| !run.worker.is_finished())
            && !lock(&self.latest).is_terminal()
    }

    /// Start converting `bytes` and return the stream of snapshots.
    ///
    /// Must be called from within a Tokio runtime. Fails with
    /// [`Pdf2ImgError::RunInProgress`] while a previous run is still
    /// executing; call [`reset`](Self::reset) first. A finished run is
    /// replaced wholesale.
    pub fn convert(
        &mut self,
        source_name: impl Into<String>,
        bytes: Vec<u8>,
        settings: ConversionSettings,
    ) -> Result<SnapshotStream, Pdf2ImgError> {
        settings.validate()?;
        if self.is_running() {
            return Err(Pdf2ImgError::RunInProgress);
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Pdf2ImgError::NoRuntime(e.to_string()))?;

        *lock(&self.latest) = Snapshot::idle();

        let cancelled = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::unbounded_channel();
        let publisher = Publisher {
            latest: Arc::clone(&self.latest),
            cancelled: Arc::clone(&cancelled),
            tx,
            callback: self.callback.clone(),
        };

        let decoder = Arc::clone(&self.decoder);
        let run_lock = Arc::clone(&self.run_lock);
        let source_name = source_name.into();
        let worker = runtime.spawn_blocking(move || {
            // An abandoned worker may still hold its document open.
            let _run = lock(&run_lock);
            execute(decoder.as_ref(), source_name, bytes, settings, &publisher)
        });

        self.active = Some(ActiveRun { cancelled, worker });
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    /// Abandon the current run (if any) and return to `idle`.
    ///
    /// Safe at any point. No snapshot is delivered after this returns, and
    /// at most the progress callback event already in flight still fires.
    /// Page records in earlier snapshots are untouched.
    /// The abandoned worker is detached. A following [`convert`](Self::convert)
    /// returns at once, but its worker starts loading only after the old
    /// document is closed.
    pub fn reset(&mut self) {
        drop(self.abandon());
    }

    /// [`reset`](Self::reset), then wait for the abandoned worker to release
    /// its document.
    pub async fn reset_and_wait(&mut self) {
        if let Some(worker) = self.abandon() {
            if let Err(e) = worker.await {
                warn!("Conversion worker ended abnormally: {}", e);
            }
        }
    }

    fn abandon(&mut self) -> Option<JoinHandle<()>> {
        let mut latest = lock(&self.latest);
        let worker = self.active.take().map(|run| {
            run.cancelled.store(true, Ordering::SeqCst);
            if !run.worker.is_finished() {
                info!("Conversion run abandoned");
            }
            run.worker
        });
        *latest = Snapshot::idle();
        worker
    }
}

impl<D: PdfDecoder> Drop for ConversionPipeline<D> {
    fn drop(&mut self) {
        if let Some(run) = self.active.take() {
            run.cancelled.store(true, Ordering::SeqCst);
        }
    }
}

// ── Worker ───────────────────────────────────────────────────────────────

fn converting(progress: u8, current_page: Option<usize>, document: &Document) -> Snapshot {
    Snapshot {
        status: RunStatus::Converting,
        progress,
        current_page,
        document: Some(document.clone()),
        error: None,
    }
}

/// One complete run, executed on the blocking worker.
fn execute<D: PdfDecoder + ?Sized>(
    decoder: &D,
    source_name: String,
    bytes: Vec<u8>,
    settings: ConversionSettings,
    out: &Publisher,
) {
    let started = Instant::now();
    info!("Loading '{}' ({} bytes)", source_name, bytes.len());

    if !out.publish(Snapshot {
        status: RunStatus::Loading,
        ..Snapshot::idle()
    }) {
        return;
    }

    // ── Load ─────────────────────────────────────────────────────────────
    let handle = match decoder.open(bytes) {
        Ok(handle) => handle,
        Err(e) => {
            let message = e.to_string();
            warn!("Failed to load '{}': {}", source_name, message);
            if out.publish(Snapshot {
                status: RunStatus::Error,
                error: Some(message.clone()),
                ..Snapshot::idle()
            }) {
                out.notify(|cb| cb.on_load_error(&message));
            }
            return;
        }
    };

    let total = handle.page_count();
    info!("PDF loaded: {} pages", total);
    let mut document = Document::new(source_name, total);
    let mut progress = 0u8;

    if !out.publish(converting(progress, None, &document)) {
        handle.close();
        return;
    }
    out.notify(|cb| cb.on_conversion_start(total));

    // ── Pages, strictly in order ─────────────────────────────────────────
    let mut last_page = None;
    for page_number in 1..=total {
        if out.is_cancelled() {
            debug!("Run abandoned before page {}", page_number);
            handle.close();
            return;
        }

        document.begin_page(page_number);
        if !out.publish(converting(progress, Some(page_number), &document)) {
            handle.close();
            return;
        }
        out.notify(|cb| cb.on_page_start(page_number, total));

        let outcome = convert_page(&handle, page_number, &settings);
        match &outcome {
            Ok(image) => debug!(
                "Page {}/{} complete: {}x{}, {} bytes",
                page_number,
                total,
                image.width,
                image.height,
                image.len()
            ),
            Err(e) => warn!("Page {}/{} failed: {}", page_number, total, e),
        }
        let event = PageEvent::from_outcome(page_number, &outcome);
        document.finish_page(page_number, outcome);

        // The last page is reported by the complete snapshot.
        if page_number == total {
            last_page = Some(event);
            break;
        }

        progress = progress.max(progress_percent(document.finished_count(), total));
        if !out.publish(converting(progress, None, &document)) {
            handle.close();
            return;
        }
        out.notify(|cb| event.report(cb, total));
    }

    handle.close();

    // ── Finish ───────────────────────────────────────────────────────────
    let success = document.completed_pages().count();
    info!(
        "Conversion complete: {}/{} pages in {}ms",
        success,
        total,
        started.elapsed().as_millis()
    );
    if out.publish(Snapshot {
        status: RunStatus::Complete,
        progress: 100,
        current_page: None,
        document: Some(document),
        error: None,
    }) {
        if let Some(event) = &last_page {
            out.notify(|cb| event.report(cb, total));
        }
        out.notify(|cb| cb.on_conversion_complete(total, success));
    }
}

/// Callback payload for a finished page.
struct PageEvent {
    page_number: usize,
    outcome: Result<usize, String>,
}

impl PageEvent {
    fn from_outcome(page_number: usize, outcome: &Result<PageImage, PageError>) -> Self {
        Self {
            page_number,
            outcome: outcome
                .as_ref()
                .map(PageImage::len)
                .map_err(ToString::to_string),
        }
    }

    fn report(&self, cb: &dyn ConversionProgressCallback, total: usize) {
        match &self.outcome {
            Ok(bytes) => cb.on_page_complete(self.page_number, total, *bytes),
            Err(message) => cb.on_page_error(self.page_number, total, message),
        }
    }
}

/// Render and encode one page. Panics inside the adapter or encoder are
/// contained to this page.
fn convert_page<T: DecodedDocument>(
    handle: &T,
    page_number: usize,
    settings: &ConversionSettings,
) -> Result<PageImage, PageError> {
    let attempt = panic::catch_unwind(AssertUnwindSafe(|| {
        let raster = render::render_page(handle, page_number, settings.scale)?;
        let image = encode::encode_page(page_number, raster, settings)?;
        Ok::<_, PageError>(image)
    }));

    attempt.unwrap_or_else(|payload| {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "renderer panicked".to_string());
        Err(RenderError::Paint {
            page: page_number,
            detail,
        }
        .into())
    })
}

/// Drain a snapshot stream and return its last snapshot.
pub async fn last_snapshot(mut stream: SnapshotStream) -> Option<Snapshot> {
    use futures::StreamExt;

    let mut last = None;
    while let Some(snapshot) = stream.next().await {
        last = Some(snapshot);
    }
    last
}
