//! Input resolution for the CLI: local path or URL → `(source_name, bytes)`.
//!
//! The pipeline itself only ever sees bytes. This module reads them from
//! disk or fetches them over HTTP(S), enforcing a size limit the same way an
//! upload form would. It deliberately does not sniff the content: a file
//! that is not a PDF is reported by the decoder as a load failure.

use crate::error::Pdf2ImgError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default upper bound on input size: 50 MiB.
pub const DEFAULT_MAX_INPUT_BYTES: u64 = 50 * 1024 * 1024;

/// A fully read input document.
#[derive(Debug, Clone)]
pub struct ResolvedInput {
    /// File name shown to the user and used for output naming.
    pub source_name: String,
    pub bytes: Vec<u8>,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Read a local file or download a URL.
pub async fn resolve_input(
    input: &str,
    max_bytes: u64,
    timeout_secs: u64,
) -> Result<ResolvedInput, Pdf2ImgError> {
    if is_url(input) {
        download_url(input, max_bytes, timeout_secs).await
    } else {
        read_local(Path::new(input), max_bytes).await
    }
}

async fn read_local(path: &Path, max_bytes: u64) -> Result<ResolvedInput, Pdf2ImgError> {
    let map_io = |e: std::io::Error| match e.kind() {
        std::io::ErrorKind::PermissionDenied => Pdf2ImgError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => Pdf2ImgError::FileNotFound {
            path: path.to_path_buf(),
        },
    };

    let source_name = file_name_of(path);
    let meta = tokio::fs::metadata(path).await.map_err(map_io)?;
    if !meta.is_file() {
        return Err(Pdf2ImgError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    check_size(&source_name, meta.len(), max_bytes)?;

    let bytes = tokio::fs::read(path).await.map_err(map_io)?;
    debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(ResolvedInput { source_name, bytes })
}

async fn download_url(
    url: &str,
    max_bytes: u64,
    timeout_secs: u64,
) -> Result<ResolvedInput, Pdf2ImgError> {
    info!("Downloading PDF from: {}", url);
    let failed = |reason: String| Pdf2ImgError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            Pdf2ImgError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let source_name = url_file_name(url);
    if let Some(len) = response.content_length() {
        check_size(&source_name, len, max_bytes)?;
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    check_size(&source_name, bytes.len() as u64, max_bytes)?;

    info!("Downloaded {} bytes", bytes.len());
    Ok(ResolvedInput {
        source_name,
        bytes: bytes.to_vec(),
    })
}

fn check_size(name: &str, size: u64, limit: u64) -> Result<(), Pdf2ImgError> {
    if size > limit {
        return Err(Pdf2ImgError::InputTooLarge {
            name: name.to_string(),
            size,
            limit,
        });
    }
    Ok(())
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.pdf".to_string())
}

/// Last non-empty URL path segment containing a dot, else `downloaded.pdf`.
fn url_file_name(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty() && last.contains('.'))
        .unwrap_or_else(|| "downloaded.pdf".to_string())
}

/// Default output directory for an input: next to a local file, or the
/// current directory for URLs.
pub fn default_output_dir(input: &str) -> PathBuf {
    if is_url(input) {
        return PathBuf::from(".");
    }
    Path::new(input)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}
