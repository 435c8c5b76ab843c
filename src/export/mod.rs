//! Document export: Markdown, HTML and DOCX renderings of extracted pages.
//!
//! ## Input Shape
//!
//! Every exporter consumes the same ordered list of [`ExportPage`]s: the
//! page's display text plus any figure crops (base64 PNG/JPEG). Figures are
//! referenced from the text by `[IMAGE_i]` placeholders, `i` being the
//! 0-based figure index on that page.
//!
//! ## Why a shared block model?
//!
//! Recognition output is loosely Markdown-flavoured. HTML and DOCX both need
//! to know where headings, tables and code are; reading the text once in
//! [`blocks`] keeps the two formats in agreement about structure. Markdown
//! export needs no reconstruction and passes text through.
//!
//! ## Failure Policy
//!
//! An image payload that cannot be decoded is logged as
//! [`OcrError::UnsupportedContent`] and left out; the rest of the document
//! is still produced.

pub mod blocks;
pub mod docx;
pub mod html;
pub mod markdown;

use crate::error::OcrError;
use crate::output::DocumentResult;
use crate::pipeline::postprocess::tidy_text;
use base64::{engine::general_purpose::STANDARD, Engine};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Title used by the HTML and DOCX renderings.
pub const DOCUMENT_TITLE: &str = "OCR Results";

/// Output document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Markdown,
    Html,
    Docx,
}

impl ExportFormat {
    /// Conventional file extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Markdown => "md",
            ExportFormat::Html => "html",
            ExportFormat::Docx => "docx",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::Markdown => "text/markdown; charset=utf-8",
            ExportFormat::Html => "text/html; charset=utf-8",
            ExportFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
        }
    }
}

impl FromStr for ExportFormat {
    type Err = OcrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            "html" | "htm" => Ok(ExportFormat::Html),
            "docx" | "word" => Ok(ExportFormat::Docx),
            other => Err(OcrError::InvalidConfig(format!(
                "unknown export format '{other}' (expected markdown, html or docx)"
            ))),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportFormat::Markdown => "markdown",
            ExportFormat::Html => "html",
            ExportFormat::Docx => "docx",
        })
    }
}

/// One page of exporter input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportPage {
    pub text: String,
    /// Base64-encoded figures, referenced as `[IMAGE_i]` from `text`.
    pub images: Vec<String>,
}

impl ExportPage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            images: Vec::new(),
        }
    }

    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = images;
        self
    }

    /// Exporter input for an aggregated result: one entry per page when
    /// multi-page, otherwise a single entry from the top-level text.
    pub fn from_result(result: &DocumentResult) -> Vec<ExportPage> {
        match &result.pages {
            Some(pages) => pages
                .iter()
                .map(|p| ExportPage::new(p.text.as_str()).with_images(p.figures.clone()))
                .collect(),
            None => vec![ExportPage::new(result.text.as_str()).with_images(result.figures.clone())],
        }
    }
}

/// Render `pages` in `format`.
///
/// Text goes through [`tidy_text`] first. With `include_images` off,
/// placeholders are removed and no figure data is embedded.
pub fn export(
    pages: &[ExportPage],
    format: ExportFormat,
    include_images: bool,
) -> Result<Vec<u8>, OcrError> {
    let tidied: Vec<ExportPage> = pages
        .iter()
        .map(|p| ExportPage {
            text: tidy_text(&p.text),
            images: if include_images {
                p.images.clone()
            } else {
                Vec::new()
            },
        })
        .collect();
    debug!("Exporting {} page(s) as {}", tidied.len(), format);

    match format {
        ExportFormat::Markdown => Ok(markdown::render(&tidied).into_bytes()),
        ExportFormat::Html => Ok(html::render(&tidied).into_bytes()),
        ExportFormat::Docx => docx::render(&tidied),
    }
}

// ── Figure placeholders ──────────────────────────────────────────────────

static RE_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[IMAGE_(\d+)\]").unwrap());

/// Placeholder token for the figure at `index`.
pub fn placeholder(index: usize) -> String {
    format!("[IMAGE_{index}]")
}

/// Figure index when `line` is nothing but a placeholder.
pub(crate) fn standalone_placeholder(line: &str) -> Option<usize> {
    let caps = RE_PLACEHOLDER.captures(line.trim())?;
    let whole = caps.get(0)?;
    if whole.as_str().len() != line.trim().len() {
        return None;
    }
    caps[1].parse().ok()
}

/// Figure indices referenced anywhere in `text`, in order of appearance.
pub(crate) fn referenced_figures(text: &str) -> Vec<usize> {
    RE_PLACEHOLDER
        .captures_iter(text)
        .filter_map(|c| c[1].parse().ok())
        .collect()
}

/// Replace each placeholder with `render(index, payload)`.
///
/// Placeholders naming a figure that does not exist are removed. A render
/// error is logged and the placeholder removed.
pub(crate) fn substitute_figures<F>(text: &str, images: &[String], render: F) -> String
where
    F: Fn(usize, &str) -> Result<String, OcrError>,
{
    RE_PLACEHOLDER
        .replace_all(text, |caps: &Captures| {
            let Some(payload) = caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|i| images.get(i).map(|p| (i, p)))
            else {
                return String::new();
            };
            match render(payload.0, payload.1) {
                Ok(s) => s,
                Err(e) => {
                    warn!("Skipping figure: {e}");
                    String::new()
                }
            }
        })
        .into_owned()
}

/// Decode a base64 figure payload.
pub(crate) fn decode_figure(index: usize, payload: &str) -> Result<Vec<u8>, OcrError> {
    STANDARD
        .decode(payload.trim())
        .map_err(|e| OcrError::UnsupportedContent {
            detail: format!("figure {} is not valid base64: {e}", index + 1),
        })
}

/// MIME type of a base64 image payload, sniffed from its leading bytes.
pub(crate) fn image_mime(payload: &str) -> &'static str {
    let p = payload.trim_start();
    if p.starts_with("/9j/") {
        "image/jpeg"
    } else if p.starts_with("R0lGOD") {
        "image/gif"
    } else if p.starts_with("UklGR") {
        "image/webp"
    } else {
        "image/png"
    }
}

/// `data:` URI for a figure, validating the payload first.
pub(crate) fn data_uri(index: usize, payload: &str) -> Result<String, OcrError> {
    decode_figure(index, payload)?;
    Ok(format!(
        "data:{};base64,{}",
        image_mime(payload),
        payload.trim()
    ))
}
