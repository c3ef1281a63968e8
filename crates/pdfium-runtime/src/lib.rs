//! # pdfium-runtime
//!
//! Process-wide runtime for [`pdfium_render`]: find a usable libpdfium, fetch
//! it from [bblanchon/pdfium-binaries](https://github.com/bblanchon/pdfium-binaries)
//! when nothing is installed, and bind it **once** into a `'static`
//! [`Pdfium`] that every document opened afterwards borrows from.
//!
//! ## Resolution order
//!
//! [`install`] walks these sources and binds the first that works:
//!
//! 1. `RuntimeConfig::library_path` (`PDFIUM_LIB_PATH`), when the file exists.
//! 2. The per-version cache, `{cache_dir}/pdfium-{VERSION}/{lib}`.
//! 3. The system library search path (`Pdfium::bind_to_system_library`).
//! 4. A fresh download into the cache, unless `offline` is set.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pdfium_runtime::{install, RuntimeConfig};
//!
//! let pdfium = install(&RuntimeConfig::from_env(), None).expect("PDFium unavailable");
//! let doc = pdfium.load_pdf_from_byte_vec(std::fs::read("a.pdf").unwrap(), None);
//! ```
//!
//! ## Environment variables
//!
//! - `PDFIUM_LIB_PATH`: explicit library file.
//! - `PDFIUM_RUNTIME_CACHE_DIR`: cache root (default: platform cache dir).
//! - `PDFIUM_RUNTIME_OFFLINE`: any non-empty value disables downloads.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use pdfium_render::prelude::Pdfium;
use thiserror::Error;
use tracing::{debug, info, warn};

/// pdfium-binaries release tag fetched on demand.
pub const PDFIUM_VERSION: &str = "7690";

const RELEASE_BASE_URL: &str = "https://github.com/bblanchon/pdfium-binaries/releases/download";

/// Receives `(bytes_downloaded, total_bytes)` while the library is fetched.
pub type DownloadProgress<'a> = &'a dyn Fn(u64, Option<u64>);

// ── Errors ───────────────────────────────────────────────────────────────────

/// Failures while preparing the PDFium runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("No prebuilt PDFium for {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("Cannot prepare cache directory '{path}': {source}")]
    CacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("PDFium download failed: {0}")]
    Download(String),

    #[error("PDFium archive could not be unpacked: {0}")]
    Extract(String),

    #[error(
        "PDFium is not installed and downloads are disabled.\n\
Set PDFIUM_LIB_PATH or place the library in '{cache_dir}'."
    )]
    Offline { cache_dir: PathBuf },

    #[error("Failed to bind PDFium from '{path}': {reason}")]
    Bind { path: PathBuf, reason: String },
}

// ── Configuration ────────────────────────────────────────────────────────────

/// Where and how the runtime looks for libpdfium.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Explicit library file; skipped when it does not exist.
    pub library_path: Option<PathBuf>,
    /// Root of the download cache. The version directory is appended.
    pub cache_root: PathBuf,
    /// Never touch the network.
    pub offline: bool,
    /// Try the system loader before downloading.
    pub allow_system: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            library_path: None,
            cache_root: default_cache_root(),
            offline: false,
            allow_system: true,
        }
    }
}

impl RuntimeConfig {
    /// Build a config from `PDFIUM_LIB_PATH`, `PDFIUM_RUNTIME_CACHE_DIR` and
    /// `PDFIUM_RUNTIME_OFFLINE`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(path) = non_empty_env("PDFIUM_LIB_PATH") {
            config.library_path = Some(PathBuf::from(path));
        }
        if let Some(dir) = non_empty_env("PDFIUM_RUNTIME_CACHE_DIR") {
            config.cache_root = PathBuf::from(dir);
        }
        config.offline = non_empty_env("PDFIUM_RUNTIME_OFFLINE").is_some();
        config
    }

    /// Directory holding the library for [`PDFIUM_VERSION`].
    pub fn version_dir(&self) -> PathBuf {
        self.cache_root.join(format!("pdfium-{PDFIUM_VERSION}"))
    }

    /// Path of an already-available library file, without binding or downloading.
    pub fn locate(&self) -> Option<PathBuf> {
        if let Some(path) = self.library_path.as_ref().filter(|p| p.exists()) {
            return Some(path.clone());
        }
        let platform = Platform::current().ok()?;
        let cached = self.version_dir().join(platform.lib_name);
        cached.exists().then_some(cached)
    }

    /// Download and unpack the platform library into the cache.
    ///
    /// Returns the cached path immediately when it is already present.
    pub fn fetch(&self, on_progress: Option<DownloadProgress<'_>>) -> Result<PathBuf, RuntimeError> {
        let platform = Platform::current()?;
        let dir = self.version_dir();
        let dest = dir.join(platform.lib_name);
        if dest.exists() {
            return Ok(dest);
        }
        if self.offline {
            return Err(RuntimeError::Offline { cache_dir: dir });
        }

        std::fs::create_dir_all(&dir).map_err(|source| RuntimeError::CacheDir {
            path: dir.clone(),
            source,
        })?;

        let url = format!(
            "{RELEASE_BASE_URL}/chromium%2F{PDFIUM_VERSION}/{}",
            platform.archive_name
        );
        info!("Fetching PDFium {} from {}", PDFIUM_VERSION, url);
        let archive = download(&url, on_progress)?;
        unpack_member(&archive, platform.member, &dest)?;
        info!("PDFium cached at {}", dest.display());
        Ok(dest)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .unwrap_or_else(std::env::temp_dir)
        .join("pdf2img")
}

// ── Platform table ───────────────────────────────────────────────────────────

struct Platform {
    archive_name: &'static str,
    member: &'static str,
    lib_name: &'static str,
}

impl Platform {
    fn current() -> Result<Self, RuntimeError> {
        Self::for_target(std::env::consts::OS, std::env::consts::ARCH)
    }

    fn for_target(os: &str, arch: &str) -> Result<Self, RuntimeError> {
        let (archive_name, member, lib_name) = match (os, arch) {
            ("macos", "aarch64") => ("pdfium-mac-arm64.tgz", "lib/libpdfium.dylib", "libpdfium.dylib"),
            ("macos", "x86_64") => ("pdfium-mac-x64.tgz", "lib/libpdfium.dylib", "libpdfium.dylib"),
            ("linux", "x86_64") => ("pdfium-linux-x64.tgz", "lib/libpdfium.so", "libpdfium.so"),
            ("linux", "aarch64") => ("pdfium-linux-arm64.tgz", "lib/libpdfium.so", "libpdfium.so"),
            ("windows", "x86_64") => ("pdfium-win-x64.tgz", "bin/pdfium.dll", "pdfium.dll"),
            ("windows", "aarch64") => ("pdfium-win-arm64.tgz", "bin/pdfium.dll", "pdfium.dll"),
            ("windows", "x86") => ("pdfium-win-x86.tgz", "bin/pdfium.dll", "pdfium.dll"),
            _ => {
                return Err(RuntimeError::UnsupportedPlatform {
                    os: os.to_string(),
                    arch: arch.to_string(),
                })
            }
        };
        Ok(Self {
            archive_name,
            member,
            lib_name,
        })
    }
}

// ── Process-wide binding ─────────────────────────────────────────────────────

static RUNTIME: OnceLock<Pdfium> = OnceLock::new();
static INSTALL_LOCK: Mutex<()> = Mutex::new(());

/// The bound runtime, if [`install`] has succeeded in this process.
pub fn installed() -> Option<&'static Pdfium> {
    RUNTIME.get()
}

/// Bind PDFium for the whole process, fetching it first when necessary.
///
/// Later calls return the same instance and ignore `config`.
pub fn install(
    config: &RuntimeConfig,
    on_progress: Option<DownloadProgress<'_>>,
) -> Result<&'static Pdfium, RuntimeError> {
    if let Some(pdfium) = RUNTIME.get() {
        return Ok(pdfium);
    }

    let _guard = INSTALL_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(pdfium) = RUNTIME.get() {
        return Ok(pdfium);
    }

    let pdfium = bind(config, on_progress)?;
    Ok(RUNTIME.get_or_init(|| pdfium))
}

fn bind(
    config: &RuntimeConfig,
    on_progress: Option<DownloadProgress<'_>>,
) -> Result<Pdfium, RuntimeError> {
    if let Some(path) = &config.library_path {
        if !path.exists() {
            warn!("PDFIUM_LIB_PATH '{}' does not exist; ignoring", path.display());
        }
    }

    if let Some(path) = config.locate() {
        return bind_path(&path);
    }

    if config.allow_system {
        match Pdfium::bind_to_system_library() {
            Ok(bindings) => {
                debug!("Bound system PDFium library");
                return Ok(Pdfium::new(bindings));
            }
            Err(e) => debug!("No system PDFium library: {}", e),
        }
    }

    let path = config.fetch(on_progress)?;
    bind_path(&path)
}

fn bind_path(path: &Path) -> Result<Pdfium, RuntimeError> {
    debug!("Binding PDFium from {}", path.display());
    Pdfium::bind_to_library(path)
        .map(Pdfium::new)
        .map_err(|e| RuntimeError::Bind {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

// ── Download / unpack ────────────────────────────────────────────────────────

fn download(url: &str, on_progress: Option<DownloadProgress<'_>>) -> Result<Vec<u8>, RuntimeError> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("pdfium-runtime/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| RuntimeError::Download(e.to_string()))?;

    let mut response = client
        .get(url)
        .send()
        .map_err(|e| RuntimeError::Download(format!("GET {url}: {e}")))?;

    if !response.status().is_success() {
        return Err(RuntimeError::Download(format!(
            "HTTP {} for {url}",
            response.status()
        )));
    }

    let total = response.content_length();
    let mut body = Vec::with_capacity(total.unwrap_or(0) as usize);
    let mut chunk = [0u8; 64 * 1024];
    loop {
        match response.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                body.extend_from_slice(&chunk[..n]);
                if let Some(report) = on_progress {
                    report(body.len() as u64, total);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(RuntimeError::Download(format!("read: {e}"))),
        }
    }
    Ok(body)
}

/// Copy one member of a `.tgz` archive to `dest`, via a sibling temp file so a
/// half-written library is never picked up by [`RuntimeConfig::locate`].
fn unpack_member(archive: &[u8], member: &str, dest: &Path) -> Result<(), RuntimeError> {
    use flate2::read::GzDecoder;
    use tar::Archive;

    let mut tarball = Archive::new(GzDecoder::new(archive));
    let entries = tarball
        .entries()
        .map_err(|e| RuntimeError::Extract(e.to_string()))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| RuntimeError::Extract(e.to_string()))?;
        let matches = entry
            .path()
            .map(|p| p.to_string_lossy() == member)
            .map_err(|e| RuntimeError::Extract(e.to_string()))?;
        if !matches {
            continue;
        }

        let partial = dest.with_extension("partial");
        entry
            .unpack(&partial)
            .map_err(|e| RuntimeError::Extract(format!("{member}: {e}")))?;
        std::fs::rename(&partial, dest).map_err(|e| RuntimeError::Extract(e.to_string()))?;
        return Ok(());
    }

    Err(RuntimeError::Extract(format!("'{member}' not in archive")))
}

// ── Tests ────────────────────────────────────────────────────────────────────
