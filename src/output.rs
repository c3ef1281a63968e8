//! Output naming and persistence for converted pages.
//!
//! | Artifact | Name |
//! |----------|------|
//! | one page | `{base}_page{N}.{png,jpg}` |
//! | archive  | `{base}_images.zip` |
//!
//! `base` is the source name with a trailing `.pdf` (any case) removed.
//! Only complete pages are ever written; failed pages have no artifact.
//! The `*_pages` variants take a page selection (1-based, any order,
//! duplicates allowed) and write the selected complete pages in page order.

use crate::document::{Document, PageImage};
use crate::error::Pdf2ImgError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

static PDF_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\.pdf$").unwrap());

/// Source name without its trailing `.pdf` extension.
pub fn base_name(source_name: &str) -> String {
    PDF_SUFFIX.replace(source_name, "").into_owned()
}

/// File name for one page image, e.g. `report_page3.jpg`.
pub fn page_file_name(base: &str, page_number: usize, image: &PageImage) -> String {
    format!("{}_page{}.{}", base, page_number, image.format.extension())
}

/// File name for the archive of all pages, e.g. `report_images.zip`.
pub fn archive_file_name(base: &str) -> String {
    format!("{}_images.zip", base)
}

/// Build a ZIP archive holding every complete page of `document`.
///
/// Entries use [`page_file_name`] and are stored uncompressed; PNG and JPEG
/// payloads do not shrink further.
pub fn write_archive(document: &Document) -> Result<Vec<u8>, Pdf2ImgError> {
    build_archive(document, document.completed_pages())
}

/// Like [`write_archive`], restricted to `pages`. Pages that do not exist or
/// did not complete are skipped.
pub fn write_archive_pages(document: &Document, pages: &[usize]) -> Result<Vec<u8>, Pdf2ImgError> {
    build_archive(document, selected_pages(document, pages))
}

/// Complete pages among `pages`, ascending and without repeats.
fn selected_pages<'a>(
    document: &'a Document,
    pages: &[usize],
) -> impl Iterator<Item = (usize, &'a PageImage)> + 'a {
    let mut wanted = pages.to_vec();
    wanted.sort_unstable();
    wanted.dedup();
    wanted
        .into_iter()
        .filter_map(move |n| document.page(n)?.image().map(|image| (n, image)))
}

fn build_archive<'a>(
    document: &Document,
    pages: impl Iterator<Item = (usize, &'a PageImage)>,
) -> Result<Vec<u8>, Pdf2ImgError> {
    let base = base_name(&document.source_name);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    for (page_number, image) in pages {
        let name = page_file_name(&base, page_number, image);
        zip.start_file(name.as_str(), options)
            .map_err(|e| Pdf2ImgError::Archive(format!("{}: {}", name, e)))?;
        zip.write_all(image.bytes())
            .map_err(|e| Pdf2ImgError::Archive(format!("{}: {}", name, e)))?;
    }

    let bytes = zip
        .finish()
        .map_err(|e| Pdf2ImgError::Archive(e.to_string()))?
        .into_inner();
    debug!("Archive for '{}': {} bytes", document.source_name, bytes.len());
    Ok(bytes)
}

/// Write `bytes` to `path` via a temporary sibling and a rename, so a reader
/// never sees a partially written file.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Pdf2ImgError> {
    let failed = |source| Pdf2ImgError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, bytes).map_err(failed)?;
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        failed(e)
    })
}

fn ensure_dir(dir: &Path) -> Result<(), Pdf2ImgError> {
    std::fs::create_dir_all(dir).map_err(|source| Pdf2ImgError::OutputWriteFailed {
        path: dir.to_path_buf(),
        source,
    })
}

/// Write one page image into `dir` and return its path.
pub fn save_page(
    dir: &Path,
    base: &str,
    page_number: usize,
    image: &PageImage,
) -> Result<PathBuf, Pdf2ImgError> {
    ensure_dir(dir)?;
    let path = dir.join(page_file_name(base, page_number, image));
    write_atomic(&path, image.bytes())?;
    Ok(path)
}

/// Write every complete page of `document` into `dir`, in page order.
pub fn save_all(dir: &Path, document: &Document) -> Result<Vec<PathBuf>, Pdf2ImgError> {
    save_each(dir, document, document.completed_pages())
}

/// Write the selected complete pages of `document` into `dir`, in page order.
pub fn save_pages(
    dir: &Path,
    document: &Document,
    pages: &[usize],
) -> Result<Vec<PathBuf>, Pdf2ImgError> {
    save_each(dir, document, selected_pages(document, pages))
}

fn save_each<'a>(
    dir: &Path,
    document: &Document,
    pages: impl Iterator<Item = (usize, &'a PageImage)>,
) -> Result<Vec<PathBuf>, Pdf2ImgError> {
    let base = base_name(&document.source_name);
    let paths = pages
        .map(|(n, image)| save_page(dir, &base, n, image))
        .collect::<Result<Vec<_>, _>>()?;
    info!("Wrote {} page images to {}", paths.len(), dir.display());
    Ok(paths)
}

/// Write the archive of `document` into `dir` and return its path.
pub fn save_archive(dir: &Path, document: &Document) -> Result<PathBuf, Pdf2ImgError> {
    let bytes = write_archive(document)?;
    store_archive(dir, document, &bytes)
}

/// Write the archive of the selected pages into `dir` and return its path.
pub fn save_archive_pages(
    dir: &Path,
    document: &Document,
    pages: &[usize],
) -> Result<PathBuf, Pdf2ImgError> {
    let bytes = write_archive_pages(document, pages)?;
    store_archive(dir, document, &bytes)
}

fn store_archive(dir: &Path, document: &Document, bytes: &[u8]) -> Result<PathBuf, Pdf2ImgError> {
    ensure_dir(dir)?;
    let path = dir.join(archive_file_name(&base_name(&document.source_name)));
    write_atomic(&path, bytes)?;
    info!("Wrote {}", path.display());
    Ok(path)
}
