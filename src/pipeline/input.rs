//! Input resolution: turn a path, URL or upload into a [`SourceDocument`].
//!
//! ## Why load everything into memory?
//!
//! Uploads arrive as bytes anyway, and rasterising from a byte slice lets
//! each render worker open its own pdfium document handle without sharing a
//! file cursor. The decompression-bomb guard lives in the rasteriser, which
//! is where the expensive allocation happens; the encoded input is small by
//! comparison.

use crate::error::OcrError;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Magic bytes at the start of every PDF.
const PDF_MAGIC: &[u8] = b"%PDF";

/// An input document held in memory, classified as PDF or image.
#[derive(Clone)]
pub struct SourceDocument {
    bytes: Arc<[u8]>,
    filename: String,
    is_pdf: bool,
}

impl std::fmt::Debug for SourceDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceDocument")
            .field("filename", &self.filename)
            .field("is_pdf", &self.is_pdf)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl SourceDocument {
    /// Wrap uploaded bytes. A source is a PDF when the filename ends in
    /// `.pdf` (any case) or the payload starts with `%PDF`.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>, filename: impl Into<String>) -> Self {
        let bytes: Vec<u8> = bytes.into();
        let bytes: Arc<[u8]> = Arc::from(bytes);
        let filename = filename.into();
        let is_pdf = filename.to_ascii_lowercase().ends_with(".pdf") || bytes.starts_with(PDF_MAGIC);
        Self {
            bytes,
            filename,
            is_pdf,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Cheap shared handle on the payload, for render workers.
    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn is_pdf(&self) -> bool {
        self.is_pdf
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a local path or an HTTP(S) URL to an in-memory document.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<SourceDocument, OcrError> {
    if input.trim().is_empty() {
        return Err(OcrError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(Path::new(input)).await
    }
}

async fn read_local(path: &Path) -> Result<SourceDocument, OcrError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => OcrError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => OcrError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    debug!("Read local input {} ({} bytes)", path.display(), bytes.len());
    Ok(SourceDocument::from_bytes(bytes, filename))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<SourceDocument, OcrError> {
    info!("Downloading input from: {}", url);

    let failed = |reason: String| OcrError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            OcrError::DownloadTimeout {
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

    let filename = filename_from_url(url);
    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;

    info!("Downloaded {} bytes as '{}'", bytes.len(), filename);
    Ok(SourceDocument::from_bytes(bytes.to_vec(), filename))
}

/// Last path segment of the URL if it looks like a file name.
fn filename_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty() && last.contains('.'))
        .unwrap_or_else(|| "download".to_string())
}
