//! Error types for the edgequake-ocr library.
//!
//! Two kinds of failure flow through the pipeline:
//!
//! * [`OcrError`] — **Fatal**: the request cannot produce a document
//!   (unreadable input, engine not ready, engine call failed). Returned as
//!   `Err(OcrError)` from every public entry point. No partial documents are
//!   returned: one failed page fails the request.
//!
//! * [`MalformedDetection`] — **Recovered**: one detection block or box in the
//!   engine output could not be parsed. The detection parser logs it and
//!   skips that block; it never escapes [`crate::pipeline::detect`].
//!
//! Undecodable images during export surface as
//! [`OcrError::UnsupportedContent`] internally, are logged, and the image is
//! omitted from the exported document.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-ocr library.
#[derive(Debug, Error)]
pub enum OcrError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Rasterisation errors ──────────────────────────────────────────────
    /// The input could not be parsed as a PDF or as an image.
    #[error("Unreadable document: {detail}")]
    UnreadableDocument { detail: String },

    /// A page or image would exceed the decompression-bomb pixel ceiling.
    #[error("Refusing to rasterise {}: {pixels} pixels exceeds the limit of {limit}", page_label(.page))]
    PixelLimitExceeded {
        page: Option<usize>,
        pixels: u64,
        limit: u64,
    },

    /// pdfium returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    // ── Engine errors ─────────────────────────────────────────────────────
    /// The recognition engine has not been installed or is not ready.
    #[error("Recognition engine is not ready.\n{hint}")]
    EngineUnavailable { hint: String },

    /// The recognition engine raised while processing a page.
    #[error("Recognition engine failed on {}: {detail}", page_label(.page))]
    EngineFailure { page: Option<usize>, detail: String },

    // ── Export errors ─────────────────────────────────────────────────────
    /// An embedded image payload could not be decoded during export.
    #[error("Unsupported content: {detail}")]
    UnsupportedContent { detail: String },

    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn page_label(page: &Option<usize>) -> String {
    match page {
        Some(p) => format!("page {p}"),
        None => "image".to_string(),
    }
}

impl OcrError {
    /// HTTP status an API layer should answer with for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            OcrError::FileNotFound { .. }
            | OcrError::InvalidInput { .. }
            | OcrError::UnreadableDocument { .. } => 400,
            OcrError::PermissionDenied { .. } => 403,
            OcrError::PixelLimitExceeded { .. } => 413,
            OcrError::EngineUnavailable { .. } => 503,
            OcrError::DownloadTimeout { .. } => 504,
            _ => 500,
        }
    }

    /// Serialisable error body carrying the human-readable message.
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            detail: self.to_string(),
        }
    }
}

/// JSON error body: `{"detail": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

/// A detection block or box that could not be parsed.
///
/// Never returned from a public function; logged and skipped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MalformedDetection {
    /// The coordinate payload is not a valid list literal.
    #[error("detection '{label}': invalid coordinate literal {payload:?}: {detail}")]
    InvalidLiteral {
        label: String,
        payload: String,
        detail: String,
    },

    /// The payload parsed but is neither a list of boxes nor one flat box.
    #[error("detection '{label}': unsupported coordinate structure {payload:?}")]
    UnsupportedShape { label: String, payload: String },

    /// One box inside a block has fewer than four numeric elements.
    #[error("detection '{label}': skipping invalid box #{index}: {value}")]
    InvalidBox {
        label: String,
        index: usize,
        value: String,
    },
}
