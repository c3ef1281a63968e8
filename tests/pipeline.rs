//! Pipeline integration tests driven by an in-memory fake decoder.
//!
//! The fake produces deterministic page surfaces, injects per-page failures
//! and panics, and can hold a page's paint until the test releases it, which
//! is how the reset scenarios pin the worker to a known page.

use edgequake_pdf2img::stream::last_snapshot;
use edgequake_pdf2img::{
    convert_sync, convert_to_completion, ConversionPipeline, ConversionProgressCallback,
    ConversionSettings, DecodedDocument, LoadError, OutputFormat, PageStatus, PdfDecoder,
    Pdf2ImgError, RenderError, RunStatus, Snapshot, SnapshotStream, SurfaceSize,
};
use futures::StreamExt;
use image::{GenericImageView, Rgba, RgbaImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

const MAGIC: &[u8] = b"%FAKE-PDF";

// ── Fake decoder ─────────────────────────────────────────────────────────────

#[derive(Clone)]
enum Behaviour {
    Ok,
    Fail(&'static str),
    Panic(&'static str),
}

#[derive(Clone)]
struct FakePage {
    width: f32,
    height: f32,
    behaviour: Behaviour,
}

fn letter() -> FakePage {
    FakePage {
        width: 612.0,
        height: 792.0,
        behaviour: Behaviour::Ok,
    }
}

fn broken(detail: &'static str) -> FakePage {
    FakePage {
        behaviour: Behaviour::Fail(detail),
        ..letter()
    }
}

#[derive(Clone, Default)]
struct Tracker {
    painted: Arc<Mutex<Vec<usize>>>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    open_now: Arc<AtomicUsize>,
    peak_open: Arc<AtomicUsize>,
}

impl Tracker {
    fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Most documents ever open at the same time.
    fn peak_open(&self) -> usize {
        self.peak_open.load(Ordering::SeqCst)
    }

    fn painted(&self) -> Vec<usize> {
        self.painted.lock().unwrap().clone()
    }

    fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Holds `page`'s paint until the test sends on the paired sender.
struct Gate {
    page: usize,
    release: Arc<Mutex<mpsc::Receiver<()>>>,
}

struct FakeDecoder {
    pages: Vec<FakePage>,
    gate: Option<Gate>,
    tracker: Tracker,
}

impl FakeDecoder {
    fn new(pages: Vec<FakePage>) -> (Self, Tracker) {
        let tracker = Tracker::default();
        let decoder = Self {
            pages,
            gate: None,
            tracker: tracker.clone(),
        };
        (decoder, tracker)
    }

    fn gated(pages: Vec<FakePage>, page: usize) -> (Self, Tracker, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let (mut decoder, tracker) = Self::new(pages);
        decoder.gate = Some(Gate {
            page,
            release: Arc::new(Mutex::new(rx)),
        });
        (decoder, tracker, tx)
    }
}

struct FakeDocument {
    pages: Vec<FakePage>,
    gate: Option<(usize, Arc<Mutex<mpsc::Receiver<()>>>)>,
    tracker: Tracker,
}

impl Drop for FakeDocument {
    fn drop(&mut self) {
        self.tracker.open_now.fetch_sub(1, Ordering::SeqCst);
        self.tracker.closed.fetch_add(1, Ordering::SeqCst);
    }
}

impl PdfDecoder for FakeDecoder {
    type Document = FakeDocument;

    fn open(&self, bytes: Vec<u8>) -> Result<FakeDocument, LoadError> {
        if bytes.is_empty() {
            return Err(LoadError::Empty);
        }
        if !bytes.starts_with(MAGIC) {
            return Err(LoadError::Malformed("missing %PDF header".into()));
        }
        self.tracker.opened.fetch_add(1, Ordering::SeqCst);
        let now = self.tracker.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.tracker.peak_open.fetch_max(now, Ordering::SeqCst);
        Ok(FakeDocument {
            pages: self.pages.clone(),
            gate: self
                .gate
                .as_ref()
                .map(|g| (g.page, Arc::clone(&g.release))),
            tracker: self.tracker.clone(),
        })
    }
}

impl FakeDocument {
    fn get(&self, page: usize) -> Result<&FakePage, RenderError> {
        page.checked_sub(1)
            .and_then(|i| self.pages.get(i))
            .ok_or(RenderError::PageOutOfRange {
                page,
                total: self.pages.len(),
            })
    }
}

impl DecodedDocument for FakeDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_surface(&self, page: usize, scale: f32) -> Result<SurfaceSize, RenderError> {
        let p = self.get(page)?;
        Ok(SurfaceSize {
            width: p.width * scale,
            height: p.height * scale,
        })
    }

    fn paint(&self, page: usize, _scale: f32, target: &mut RgbaImage) -> Result<(), RenderError> {
        self.tracker.painted.lock().unwrap().push(page);
        if let Some((gated, release)) = &self.gate {
            if *gated == page {
                let _ = release.lock().unwrap().recv();
            }
        }
        match self.get(page)?.behaviour {
            Behaviour::Ok => {
                target.put_pixel(0, 0, Rgba([(page * 10) as u8, 0, 0, 255]));
                Ok(())
            }
            Behaviour::Fail(detail) => Err(RenderError::Paint {
                page,
                detail: detail.into(),
            }),
            Behaviour::Panic(msg) => panic!("{}", msg),
        }
    }
}

fn pdf_bytes() -> Vec<u8> {
    let mut bytes = MAGIC.to_vec();
    bytes.extend_from_slice(b"\n%%EOF");
    bytes
}

async fn collect(stream: SnapshotStream) -> Vec<Snapshot> {
    stream.collect().await
}

// ── Happy path ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn three_pages_png_at_double_scale() {
    let (decoder, tracker) = FakeDecoder::new(vec![letter(), letter(), letter()]);
    let mut pipeline = ConversionPipeline::new(decoder);
    let settings = ConversionSettings::default();

    let stream = pipeline.convert("three.pdf", pdf_bytes(), settings).unwrap();
    let snapshots = collect(stream).await;

    let last = snapshots.last().unwrap();
    assert_eq!(last.status, RunStatus::Complete);
    assert_eq!(last.progress, 100);
    assert_eq!(last.current_page, None);

    let doc = last.document.as_ref().unwrap();
    assert_eq!(doc.page_count, 3);
    assert_eq!(doc.completed_pages().count(), 3);
    for (n, img) in doc.completed_pages() {
        assert_eq!((img.width, img.height), (1224, 1584), "page {n}");
        assert_eq!(img.format, OutputFormat::Png);
        let decoded = image::load_from_memory(img.bytes()).unwrap();
        assert_eq!(decoded.dimensions(), (1224, 1584));
        assert_eq!(decoded.get_pixel(0, 0), Rgba([(n * 10) as u8, 0, 0, 255]));
        assert_eq!(decoded.get_pixel(5, 5), Rgba([255, 255, 255, 255]));
    }

    assert_eq!(tracker.painted(), vec![1, 2, 3]);
    assert_eq!(tracker.closed(), 1);
    assert_eq!(pipeline.snapshot(), *last);
}

#[tokio::test]
async fn jpeg_pages_are_jpeg() {
    let (decoder, _) = FakeDecoder::new(vec![letter()]);
    let mut pipeline = ConversionPipeline::new(decoder);
    let settings = ConversionSettings::new(OutputFormat::Jpeg, 0.8, 1.0).unwrap();

    let out = convert_to_completion(&mut pipeline, "one.pdf", pdf_bytes(), settings)
        .await
        .unwrap();

    let img = out.document.page(1).unwrap().image().unwrap();
    assert_eq!(&img.bytes()[..2], &[0xFF, 0xD8]);
    assert_eq!((img.width, img.height), (612, 792));
    assert_eq!(out.stats.converted_pages, 1);
    assert_eq!(out.stats.total_bytes, img.len() as u64);
}

// ── Snapshot sequence invariants ─────────────────────────────────────────────

#[tokio::test]
async fn snapshots_follow_run_and_page_lifecycle() {
    let (decoder, _) = FakeDecoder::new(vec![letter(), broken("bad stream"), letter()]);
    let mut pipeline = ConversionPipeline::new(decoder);

    let stream = pipeline
        .convert("mixed.pdf", pdf_bytes(), ConversionSettings::default())
        .unwrap();
    let snapshots = collect(stream).await;

    assert_eq!(snapshots[0].status, RunStatus::Loading);
    assert!(snapshots[0].document.is_none());

    let first_doc = snapshots[1].document.as_ref().unwrap();
    assert_eq!(snapshots[1].status, RunStatus::Converting);
    assert_eq!(first_doc.pages.len(), 3);
    assert!(first_doc.pages.iter().all(|p| p.status == PageStatus::Pending));

    // Progress never goes backwards and only reaches 100 at the end.
    for pair in snapshots.windows(2) {
        assert!(pair[0].progress <= pair[1].progress);
    }
    let hundred = snapshots.iter().position(|s| s.progress == 100).unwrap();
    assert_eq!(hundred, snapshots.len() - 1);
    assert_eq!(snapshots[hundred].status, RunStatus::Complete);

    // Each page goes pending → rendering → terminal, each state exactly once.
    for n in 1..=3 {
        let mut labels: Vec<&str> = snapshots
            .iter()
            .filter_map(|s| s.document.as_ref())
            .map(|d| d.page(n).unwrap().status.label())
            .collect();
        labels.dedup();
        let expected = if n == 2 { "error" } else { "complete" };
        assert_eq!(labels, vec!["pending", "rendering", expected], "page {n}");
    }

    // current_page points at the page in the rendering state.
    for snap in &snapshots {
        if let (Some(n), Some(doc)) = (snap.current_page, &snap.document) {
            assert_eq!(doc.page(n).unwrap().status, PageStatus::Rendering);
        }
    }
}

#[tokio::test]
async fn last_page_is_finished_by_the_complete_snapshot() {
    let (decoder, _) = FakeDecoder::new(vec![letter(), letter(), broken("bad xref")]);
    let mut pipeline = ConversionPipeline::new(decoder);

    let stream = pipeline
        .convert("tail.pdf", pdf_bytes(), ConversionSettings::default())
        .unwrap();
    let snapshots = collect(stream).await;

    // No converting snapshot shows the last page finished.
    for snap in snapshots.iter().filter(|s| s.status == RunStatus::Converting) {
        let doc = snap.document.as_ref().unwrap();
        assert!(!doc.page(3).unwrap().status.is_terminal(), "{snap:?}");
        assert!(snap.progress < 100);
    }

    // The snapshot right after page 3 starts rendering is the complete one.
    let rendering_last = snapshots
        .iter()
        .position(|s| s.current_page == Some(3))
        .unwrap();
    assert_eq!(rendering_last, snapshots.len() - 2);
    let last = &snapshots[rendering_last + 1];
    assert_eq!(last.status, RunStatus::Complete);
    assert_eq!(last.progress, 100);
    assert!(last.document.as_ref().unwrap().page(3).unwrap().error_message().is_some());
}

#[tokio::test]
async fn failing_page_does_not_affect_others() {
    let (decoder, _) = FakeDecoder::new(vec![broken("unsupported shading")]);
    let mut pipeline = ConversionPipeline::new(decoder);

    let stream = pipeline
        .convert("broken.pdf", pdf_bytes(), ConversionSettings::default())
        .unwrap();
    let last = last_snapshot(stream).await.unwrap();

    assert_eq!(last.status, RunStatus::Complete);
    assert_eq!(last.progress, 100);
    let page = last.document.as_ref().unwrap().page(1).unwrap();
    let message = page.error_message().unwrap();
    assert!(!message.is_empty());
    assert!(message.contains("unsupported shading"));
}

#[tokio::test]
async fn panicking_page_is_recorded_as_error() {
    let page = FakePage {
        behaviour: Behaviour::Panic("glyph cache exploded"),
        ..letter()
    };
    let (decoder, tracker) = FakeDecoder::new(vec![page, letter()]);
    let mut pipeline = ConversionPipeline::new(decoder);

    let out = convert_to_completion(
        &mut pipeline,
        "panic.pdf",
        pdf_bytes(),
        ConversionSettings::default(),
    )
    .await
    .unwrap();

    let msg = out.document.page(1).unwrap().error_message().unwrap();
    assert!(msg.contains("glyph cache exploded"), "got: {msg}");
    assert!(out.document.page(2).unwrap().image().is_some());
    assert_eq!(out.stats.failed_pages, 1);
    assert_eq!(tracker.closed(), 1);
}

#[tokio::test]
async fn zero_page_document_completes_immediately() {
    let (decoder, _) = FakeDecoder::new(vec![]);
    let mut pipeline = ConversionPipeline::new(decoder);

    let out = convert_to_completion(
        &mut pipeline,
        "empty.pdf",
        pdf_bytes(),
        ConversionSettings::default(),
    )
    .await
    .unwrap();

    assert_eq!(out.document.page_count, 0);
    assert!(out.document.pages.is_empty());
    assert_eq!(pipeline.snapshot().progress, 100);
}

// ── Load failures ────────────────────────────────────────────────────────────

#[tokio::test]
async fn corrupt_bytes_end_in_error_without_document() {
    let (decoder, tracker) = FakeDecoder::new(vec![letter()]);
    let mut pipeline = ConversionPipeline::new(decoder);

    let stream = pipeline
        .convert("junk.pdf", b"not a pdf at all".to_vec(), ConversionSettings::default())
        .unwrap();
    let snapshots = collect(stream).await;

    let statuses: Vec<RunStatus> = snapshots.iter().map(|s| s.status).collect();
    assert_eq!(statuses, vec![RunStatus::Loading, RunStatus::Error]);

    let last = snapshots.last().unwrap();
    assert!(last.document.is_none());
    assert!(last.error.as_deref().unwrap().contains("PDF header"));
    assert!(tracker.painted().is_empty());
}

#[tokio::test]
async fn eager_api_reports_load_failure() {
    let (decoder, _) = FakeDecoder::new(vec![letter()]);
    let mut pipeline = ConversionPipeline::new(decoder);

    let err = convert_to_completion(&mut pipeline, "empty.pdf", Vec::new(), Default::default())
        .await
        .unwrap_err();

    match err {
        Pdf2ImgError::LoadFailed {
            source_name,
            message,
        } => {
            assert_eq!(source_name, "empty.pdf");
            assert_eq!(message, LoadError::Empty.to_string());
        }
        other => panic!("expected LoadFailed, got {other:?}"),
    }
}

// ── Reset / lifecycle ────────────────────────────────────────────────────────

#[tokio::test]
async fn reset_during_page_two_stops_the_run() {
    let pages = vec![letter(); 5];
    let (decoder, tracker, release) = FakeDecoder::gated(pages, 2);
    let mut pipeline = ConversionPipeline::new(decoder);

    let mut stream = pipeline
        .convert("five.pdf", pdf_bytes(), ConversionSettings::default())
        .unwrap();

    // Wait until page 2 is rendering.
    loop {
        let snap = stream.next().await.expect("run ended before page 2");
        if snap.current_page == Some(2) {
            let doc = snap.document.as_ref().unwrap();
            assert!(doc.page(1).unwrap().image().is_some());
            assert_eq!(doc.page(3).unwrap().status, PageStatus::Pending);
            break;
        }
    }

    pipeline.reset();
    assert_eq!(pipeline.snapshot(), Snapshot::idle());
    assert!(!pipeline.is_running());

    release.send(()).unwrap();
    let after: Vec<Snapshot> = stream.collect().await;
    assert!(after.is_empty(), "published after reset: {after:?}");

    assert_eq!(tracker.painted(), vec![1, 2]);
    assert_eq!(tracker.closed(), 1);
    assert_eq!(pipeline.snapshot(), Snapshot::idle());
}

#[tokio::test]
async fn new_run_after_reset_waits_for_the_abandoned_document() {
    let (decoder, tracker, release) = FakeDecoder::gated(vec![letter(); 5], 2);
    let mut pipeline = ConversionPipeline::new(decoder);

    let mut first = pipeline
        .convert("old.pdf", pdf_bytes(), ConversionSettings::default())
        .unwrap();
    while let Some(snap) = first.next().await {
        if snap.current_page == Some(2) {
            break;
        }
    }

    pipeline.reset();
    let mut second = pipeline
        .convert("new.pdf", pdf_bytes(), ConversionSettings::default())
        .unwrap();
    assert!(pipeline.is_running());

    // The old worker is still inside page 2 and keeps its document.
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(tracker.opened(), 1);
    assert_eq!(tracker.closed(), 0);
    assert_eq!(tracker.painted(), vec![1, 2]);

    release.send(()).unwrap();
    loop {
        let snap = second.next().await.expect("second run ended before page 2");
        if snap.current_page == Some(2) {
            assert_eq!(snap.document.as_ref().unwrap().source_name, "new.pdf");
            break;
        }
    }
    assert_eq!(tracker.closed(), 1);
    assert_eq!(tracker.painted(), vec![1, 2, 1, 2]);

    release.send(()).unwrap();
    let last = last_snapshot(second).await.unwrap();
    assert_eq!(last.status, RunStatus::Complete);
    assert!(collect(first).await.is_empty());
    assert_eq!(tracker.opened(), 2);
    assert_eq!(tracker.closed(), 2);
    assert_eq!(tracker.peak_open(), 1);
}

#[tokio::test]
async fn reset_and_wait_releases_the_document() {
    let (decoder, tracker, release) = FakeDecoder::gated(vec![letter(); 3], 1);
    let mut pipeline = ConversionPipeline::new(decoder);

    let mut stream = pipeline
        .convert("three.pdf", pdf_bytes(), ConversionSettings::default())
        .unwrap();
    while let Some(snap) = stream.next().await {
        if snap.current_page == Some(1) {
            break;
        }
    }

    let releaser = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        release.send(()).unwrap();
    });
    pipeline.reset_and_wait().await;
    releaser.join().unwrap();

    assert_eq!(tracker.closed(), 1);
    assert_eq!(tracker.painted(), vec![1]);
    assert_eq!(pipeline.snapshot(), Snapshot::idle());
}

#[tokio::test]
async fn second_convert_while_running_is_rejected() {
    let (decoder, _, release) = FakeDecoder::gated(vec![letter()], 1);
    let mut pipeline = ConversionPipeline::new(decoder);
    let settings = ConversionSettings::default();

    let first = pipeline.convert("a.pdf", pdf_bytes(), settings).unwrap();
    assert!(pipeline.is_running());

    let err = pipeline.convert("b.pdf", pdf_bytes(), settings).err().unwrap();
    assert!(matches!(err, Pdf2ImgError::RunInProgress));

    release.send(()).unwrap();
    let last = last_snapshot(first).await.unwrap();
    assert_eq!(last.status, RunStatus::Complete);
    assert!(!pipeline.is_running());
}

#[tokio::test]
async fn finished_run_is_replaced_by_the_next() {
    let (decoder, tracker) = FakeDecoder::new(vec![letter(), letter()]);
    let mut pipeline = ConversionPipeline::new(decoder);
    let settings = ConversionSettings::default();

    let first = convert_to_completion(&mut pipeline, "a.pdf", pdf_bytes(), settings)
        .await
        .unwrap();
    let second = convert_to_completion(&mut pipeline, "b.pdf", pdf_bytes(), settings)
        .await
        .unwrap();

    assert_eq!(first.document.source_name, "a.pdf");
    assert_eq!(second.document.source_name, "b.pdf");
    assert_eq!(tracker.closed(), 2);
}

#[tokio::test]
async fn invalid_settings_are_rejected_before_loading() {
    let (decoder, _) = FakeDecoder::new(vec![letter()]);
    let mut pipeline = ConversionPipeline::new(decoder);
    let settings = ConversionSettings {
        scale: 5.0,
        ..Default::default()
    };

    let err = pipeline.convert("a.pdf", pdf_bytes(), settings).err().unwrap();
    assert!(matches!(err, Pdf2ImgError::InvalidSettings(_)));
    assert_eq!(pipeline.snapshot(), Snapshot::idle());
}

#[test]
fn convert_outside_runtime_fails() {
    let (decoder, _) = FakeDecoder::new(vec![letter()]);
    let mut pipeline = ConversionPipeline::new(decoder);
    let err = pipeline
        .convert("a.pdf", pdf_bytes(), ConversionSettings::default())
        .err()
        .unwrap();
    assert!(matches!(err, Pdf2ImgError::NoRuntime(_)));
}

#[test]
fn convert_sync_runs_to_completion() {
    let (decoder, _) = FakeDecoder::new(vec![letter(), broken("x")]);
    let out = convert_sync(decoder, "sync.pdf", pdf_bytes(), ConversionSettings::default()).unwrap();
    assert_eq!(out.stats.total_pages, 2);
    assert_eq!(out.stats.converted_pages, 1);
    assert_eq!(out.stats.failed_pages, 1);
}

// ── Progress callback ────────────────────────────────────────────────────────

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl ConversionProgressCallback for Recorder {
    fn on_conversion_start(&self, total_pages: usize) {
        self.push(format!("start {total_pages}"));
    }
    fn on_load_error(&self, _error: &str) {
        self.push("load_error".into());
    }
    fn on_page_start(&self, page_num: usize, _total: usize) {
        self.push(format!("page_start {page_num}"));
    }
    fn on_page_complete(&self, page_num: usize, _total: usize, bytes: usize) {
        assert!(bytes > 0);
        self.push(format!("page_complete {page_num}"));
    }
    fn on_page_error(&self, page_num: usize, _total: usize, _error: &str) {
        self.push(format!("page_error {page_num}"));
    }
    fn on_conversion_complete(&self, total_pages: usize, success_count: usize) {
        self.push(format!("complete {success_count}/{total_pages}"));
    }
}

#[tokio::test]
async fn progress_callback_sees_events_in_order() {
    let recorder = Arc::new(Recorder::default());
    let (decoder, _) = FakeDecoder::new(vec![letter(), broken("bad")]);
    let mut pipeline = ConversionPipeline::new(decoder).with_progress_callback(recorder.clone());

    convert_to_completion(&mut pipeline, "cb.pdf", pdf_bytes(), Default::default())
        .await
        .unwrap();

    assert_eq!(
        *recorder.events.lock().unwrap(),
        vec![
            "start 2",
            "page_start 1",
            "page_complete 1",
            "page_start 2",
            "page_error 2",
            "complete 1/2",
        ]
    );
}

#[tokio::test]
async fn progress_callback_reports_load_error() {
    let recorder = Arc::new(Recorder::default());
    let (decoder, _) = FakeDecoder::new(vec![letter()]);
    let mut pipeline = ConversionPipeline::new(decoder).with_progress_callback(recorder.clone());

    let stream = pipeline
        .convert("bad.pdf", b"garbage".to_vec(), Default::default())
        .unwrap();
    last_snapshot(stream).await;

    assert_eq!(*recorder.events.lock().unwrap(), vec!["load_error"]);
}
