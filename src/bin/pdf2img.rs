//! CLI binary for edgequake-pdf2img.
//!
//! A thin shim over the library crate: resolves the input, maps flags to
//! `ConversionSettings`, runs the pipeline and writes page images or an
//! archive.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2img::pipeline::input::{self, DEFAULT_MAX_INPUT_BYTES};
use edgequake_pdf2img::{
    convert_to_completion, output, ConversionPipeline, ConversionProgressCallback,
    ConversionSettings, OutputFormat, PdfiumDecoder, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use pdfium_runtime::RuntimeConfig;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

fn human_bytes(n: usize) -> String {
    match n {
        n if n >= 1 << 20 => format!("{:.1} MiB", n as f64 / (1 << 20) as f64),
        n if n >= 1 << 10 => format!("{:.1} KiB", n as f64 / (1 << 10) as f64),
        n => format!("{n} B"),
    }
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar with one log line per finished page.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Start of the page currently rendering; pages run one at a time.
    page_started: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    /// Spinner until `on_conversion_start` reports the page count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Loading");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            page_started: Mutex::new(None),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Converting");
        self.bar.reset_eta();
    }

    fn page_elapsed(&self) -> f64 {
        self.page_started
            .lock()
            .ok()
            .and_then(|mut t| t.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Rendering {total_pages} pages…"))
        ));
    }

    fn on_load_error(&self, error: &str) {
        self.bar.finish_and_clear();
        eprintln!("{} {}", red("✘"), red(error));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut t) = self.page_started.lock() {
            *t = Some(Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, bytes: usize) {
        let elapsed = self.page_elapsed();
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<10}  {}",
            green("✓"),
            page_num,
            total,
            dim(&human_bytes(bytes)),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let elapsed = self.page_elapsed();

        // Keep long messages to one line.
        let msg = match error.char_indices().nth(79) {
            Some((cut, _)) => format!("{}\u{2026}", &error[..cut]),
            None => error.to_string(),
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_conversion_complete(&self, total_pages: usize, success_count: usize) {
        let failed = total_pages.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} pages converted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages converted  ({} failed)",
                if failed == total_pages {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One PNG per page at 144 DPI, next to the input
  pdf2img document.pdf

  # JPEG at 85% quality, 216 DPI, into ./images
  pdf2img --format jpeg --quality 0.85 --scale 3 -o images document.pdf

  # Single ZIP archive instead of loose files
  pdf2img --zip report.pdf

  # Only write pages 1, 3, 4 and 5 (loose files or archive)
  pdf2img --pages 1,3-5 report.pdf

  # Convert from URL
  pdf2img https://arxiv.org/pdf/1706.03762.pdf -o attention

  # Machine-readable manifest (page status, sizes; no image bytes)
  pdf2img --json document.pdf > manifest.json

OUTPUT NAMING:
  Pages     {name}_page{N}.png | {name}_page{N}.jpg
  Archive   {name}_images.zip
  ({name} is the input file name without its .pdf extension)

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH           Path to an existing libpdfium; skips auto-download
  PDFIUM_RUNTIME_CACHE_DIR  Override the default pdfium cache directory
  PDFIUM_RUNTIME_OFFLINE    Never download pdfium (1/true)
  RUST_LOG                  Override the log filter (e.g. edgequake_pdf2img=debug)

SETUP:
  PDFium (~30 MB) is downloaded automatically on first run and cached in
  ~/.cache/pdf2img/pdfium-7690/. No manual library setup is required.
"#;

/// Convert PDF pages to PNG or JPEG images.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2img",
    version,
    about = "Convert PDF pages to PNG or JPEG images",
    long_about = "Render every page of a PDF document (local file or URL) to a PNG or JPEG \
image. Pages are rendered one at a time; a page that fails is reported and skipped while the \
rest of the document is still converted.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Directory for the images [default: the input's directory, or . for URLs].
    #[arg(short, long, env = "PDF2IMG_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Image format.
    #[arg(short, long, env = "PDF2IMG_FORMAT", value_enum, default_value = "png")]
    format: FormatArg,

    /// JPEG quality in (0.0, 1.0]; ignored for PNG.
    #[arg(long, env = "PDF2IMG_QUALITY", default_value_t = 0.92)]
    quality: f32,

    /// Resolution multiplier in [1.0, 3.0]; 1.0 = 72 DPI.
    #[arg(short, long, env = "PDF2IMG_SCALE", default_value_t = 2.0)]
    scale: f32,

    /// Write a single {name}_images.zip instead of one file per page.
    #[arg(long, env = "PDF2IMG_ZIP")]
    zip: bool,

    /// Pages to write: "all", a page, a range or a list (e.g. "1,3-5").
    #[arg(long, env = "PDF2IMG_PAGES", default_value = "all")]
    pages: String,

    /// Print the final run state as JSON on stdout.
    #[arg(long, env = "PDF2IMG_JSON")]
    json: bool,

    /// Refuse inputs larger than this many MiB.
    #[arg(long, env = "PDF2IMG_MAX_SIZE_MB", default_value_t = DEFAULT_MAX_INPUT_BYTES / (1024 * 1024))]
    max_size_mb: u64,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2IMG_PASSWORD")]
    password: Option<String>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2IMG_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Disable progress bar.
    #[arg(long, env = "PDF2IMG_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2IMG_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2IMG_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Png,
    #[value(alias = "jpg")]
    Jpeg,
}

impl From<FormatArg> for OutputFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Png => OutputFormat::Png,
            FormatArg::Jpeg => OutputFormat::Jpeg,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let settings = ConversionSettings::new(cli.format.into(), cli.quality, cli.scale)
        .context("Invalid conversion settings")?;
    let selection = parse_pages(&cli.pages)?;

    // ── Ensure PDFium engine is available ────────────────────────────────
    let decoder = install_engine(&cli)?;
    let decoder = match &cli.password {
        Some(password) => decoder.with_password(password.clone()),
        None => decoder,
    };

    // ── Resolve input ────────────────────────────────────────────────────
    let max_bytes = cli.max_size_mb.saturating_mul(1024 * 1024);
    let resolved = input::resolve_input(&cli.input, max_bytes, cli.download_timeout)
        .await
        .with_context(|| format!("Failed to read input '{}'", cli.input))?;

    // ── Run conversion ───────────────────────────────────────────────────
    let mut pipeline = ConversionPipeline::new(decoder);
    if show_progress {
        let cb: ProgressCallback = CliProgressCallback::new_dynamic();
        pipeline = pipeline.with_progress_callback(cb);
    }

    let result = convert_to_completion(&mut pipeline, resolved.source_name, resolved.bytes, settings)
        .await
        .context("Conversion failed")?;

    // ── Write output ─────────────────────────────────────────────────────
    let out_dir = cli
        .output_dir
        .clone()
        .unwrap_or_else(|| input::default_output_dir(&cli.input));

    let document = &result.document;
    if let Some(pages) = &selection {
        let missing: Vec<usize> = pages
            .iter()
            .copied()
            .filter(|&n| n > document.page_count)
            .collect();
        if !missing.is_empty() && !cli.quiet {
            eprintln!(
                "{} document has {} pages; ignoring {:?}",
                cyan("⚠"),
                document.page_count,
                missing
            );
        }
    }

    let written = match (&selection, cli.zip) {
        (None, true) => {
            vec![output::save_archive(&out_dir, document).context("Failed to write archive")?]
        }
        (Some(pages), true) => vec![output::save_archive_pages(&out_dir, document, pages)
            .context("Failed to write archive")?],
        (None, false) => {
            output::save_all(&out_dir, document).context("Failed to write page images")?
        }
        (Some(pages), false) => output::save_pages(&out_dir, document, pages)
            .context("Failed to write page images")?,
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&result).context("Failed to serialise output")?;
        println!("{json}");
    }

    if !cli.quiet {
        let stats = &result.stats;
        eprintln!(
            "{}  {}/{} pages  {}  {}ms  →  {}",
            if stats.failed_pages == 0 {
                green("✔")
            } else {
                cyan("⚠")
            },
            stats.converted_pages,
            stats.total_pages,
            dim(&human_bytes(stats.total_bytes as usize)),
            stats.duration_ms,
            bold(&out_dir.display().to_string()),
        );
        if !show_progress {
            for path in &written {
                eprintln!("   {}", dim(&path.display().to_string()));
            }
        }
    }

    Ok(())
}

/// Bind PDFium, showing a download bar on first run.
fn install_engine(cli: &Cli) -> Result<PdfiumDecoder> {
    let config = RuntimeConfig::from_env();

    if cli.quiet || config.locate().is_some() {
        // Already cached (or quiet): any download happens silently.
        let pdfium = tokio::task::block_in_place(|| pdfium_runtime::install(&config, None))
            .context("Failed to load the PDFium engine")?;
        return Ok(PdfiumDecoder::new(pdfium));
    }

    let dl_bar = ProgressBar::new(0);
    dl_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS),
    );
    dl_bar.set_prefix("PDF engine");
    dl_bar.set_message("Connecting…");
    dl_bar.enable_steady_tick(Duration::from_millis(80));

    let bar = dl_bar.clone();
    let pdfium = tokio::task::block_in_place(|| {
        pdfium_runtime::install(
            &config,
            Some(&|downloaded, total| {
                if let Some(t) = total {
                    if bar.length().unwrap_or(0) != t {
                        bar.set_length(t);
                    }
                }
                bar.set_position(downloaded);
            }),
        )
    })
    .context("Failed to load the PDFium engine")?;

    dl_bar.finish_and_clear();
    Ok(PdfiumDecoder::new(pdfium))
}

/// Parse a page selection: "all" (`None`), "3", "2-6" or a comma-separated
/// mix such as "1,3-5". Pages are 1-indexed.
fn parse_pages(s: &str) -> Result<Option<Vec<usize>>> {
    let s = s.trim().to_lowercase();
    if s == "all" {
        return Ok(None);
    }

    let mut pages = Vec::new();
    for part in s.split(',').map(str::trim) {
        if part.is_empty() {
            anyhow::bail!("Empty entry in page selection '{}'", s);
        }
        // Range: "3-15"
        if let Some((start, end)) = part.split_once('-') {
            let start: usize = start
                .trim()
                .parse()
                .context(format!("Invalid start page in range '{}'", part))?;
            let end: usize = end
                .trim()
                .parse()
                .context(format!("Invalid end page in range '{}'", part))?;
            if start < 1 {
                anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
            }
            if start > end {
                anyhow::bail!("Invalid page range '{}': start must be <= end", part);
            }
            pages.extend(start..=end);
            continue;
        }

        let page: usize = part
            .parse()
            .context(format!("Invalid page number: '{}'", part))?;
        if page < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
        }
        pages.push(page);
    }

    pages.sort_unstable();
    pages.dedup();
    Ok(Some(pages))
}
