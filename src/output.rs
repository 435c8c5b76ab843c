//! Output types for extraction results.
//!
//! Field names follow the JSON shape API clients consume: detections
//! serialise as `boxes`, each with a `label` and a `box` of four pixel
//! coordinates.

use crate::request::ExtractionMode;
use serde::{Deserialize, Serialize};

/// One labelled region located by the engine, in page pixel coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    /// Label text, trimmed.
    pub label: String,

    /// `[x1, y1, x2, y2]`. Order is not normalised (x1 may exceed x2).
    #[serde(rename = "box")]
    pub bbox: [u32; 4],
}

impl Detection {
    pub fn new(label: impl Into<String>, bbox: [u32; 4]) -> Self {
        Self {
            label: label.into(),
            bbox,
        }
    }
}

/// Pixel dimensions of a rasterised page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImageDims {
    pub w: u32,
    pub h: u32,
}

/// Result for one page (or for the single image of an image input).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-indexed page number; `None` for image inputs.
    pub page: Option<usize>,

    /// Display text with detection markup stripped.
    pub text: String,

    /// Engine output exactly as normalised, markup intact.
    pub raw_text: String,

    #[serde(rename = "boxes")]
    pub detections: Vec<Detection>,

    pub image_dims: ImageDims,

    /// Base64 PNG crops of `image`-labelled detections, in detection order.
    /// Populated only when figure cropping is enabled.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub figures: Vec<String>,
}

/// Request echo attached to every [`DocumentResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub mode: ExtractionMode,
    /// Grounding as applied, including modes that force it.
    pub grounding: bool,
    pub base_size: u32,
    pub image_size: u32,
    pub crop_mode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<usize>,
}

/// Result for a whole request.
///
/// Single-page shape: `text`/`raw_text`/`boxes` come from the one page and
/// `pages` is absent. Multi-page shape: `text`/`raw_text` are the per-page
/// texts joined with `--- Page N ---` separators, `boxes` is empty and the
/// per-page results live in `pages`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentResult {
    pub success: bool,
    pub text: String,
    pub raw_text: String,
    pub boxes: Vec<Detection>,
    pub image_dims: ImageDims,
    pub is_pdf: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<Vec<PageResult>>,
    /// Figure crops of the single page; multi-page results keep them per page.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub figures: Vec<String>,
    pub metadata: ResultMetadata,
}

impl DocumentResult {
    pub fn is_multi_page(&self) -> bool {
        self.pages.is_some()
    }
}
