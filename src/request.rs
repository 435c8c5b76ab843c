//! Extraction request: what the caller wants read from the document.
//!
//! One [`ExtractionRequest`] is built per API call and shared, read-only, by
//! every page of that call. Field names and defaults mirror the HTTP form
//! fields so a request deserialises straight from a submitted form.

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Named extraction intent governing instruction compilation.
///
/// Unknown mode strings are preserved as [`ExtractionMode::Other`] rather
/// than rejected; they compile to the generic OCR instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ExtractionMode {
    #[default]
    PlainOcr,
    Markdown,
    TablesCsv,
    TablesMd,
    KvJson,
    FigureChart,
    FindRef,
    LayoutMap,
    PiiRedact,
    Multilingual,
    Describe,
    Freeform,
    /// Any mode string not in the fixed enumeration.
    Other(String),
}

impl ExtractionMode {
    /// Wire name of the mode (e.g. `"plain_ocr"`).
    pub fn as_str(&self) -> &str {
        match self {
            ExtractionMode::PlainOcr => "plain_ocr",
            ExtractionMode::Markdown => "markdown",
            ExtractionMode::TablesCsv => "tables_csv",
            ExtractionMode::TablesMd => "tables_md",
            ExtractionMode::KvJson => "kv_json",
            ExtractionMode::FigureChart => "figure_chart",
            ExtractionMode::FindRef => "find_ref",
            ExtractionMode::LayoutMap => "layout_map",
            ExtractionMode::PiiRedact => "pii_redact",
            ExtractionMode::Multilingual => "multilingual",
            ExtractionMode::Describe => "describe",
            ExtractionMode::Freeform => "freeform",
            ExtractionMode::Other(s) => s,
        }
    }

    /// Modes whose instruction only makes sense with grounding enabled.
    pub fn requires_grounding(&self) -> bool {
        matches!(
            self,
            ExtractionMode::FindRef | ExtractionMode::LayoutMap | ExtractionMode::PiiRedact
        )
    }
}

impl From<&str> for ExtractionMode {
    fn from(s: &str) -> Self {
        match s {
            "plain_ocr" => ExtractionMode::PlainOcr,
            "markdown" => ExtractionMode::Markdown,
            "tables_csv" => ExtractionMode::TablesCsv,
            "tables_md" => ExtractionMode::TablesMd,
            "kv_json" => ExtractionMode::KvJson,
            "figure_chart" => ExtractionMode::FigureChart,
            "find_ref" => ExtractionMode::FindRef,
            "layout_map" => ExtractionMode::LayoutMap,
            "pii_redact" => ExtractionMode::PiiRedact,
            "multilingual" => ExtractionMode::Multilingual,
            "describe" => ExtractionMode::Describe,
            "freeform" => ExtractionMode::Freeform,
            other => ExtractionMode::Other(other.to_string()),
        }
    }
}

impl From<String> for ExtractionMode {
    fn from(s: String) -> Self {
        ExtractionMode::from(s.as_str())
    }
}

impl From<ExtractionMode> for String {
    fn from(mode: ExtractionMode) -> Self {
        match mode {
            ExtractionMode::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl FromStr for ExtractionMode {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ExtractionMode::from(s.trim()))
    }
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of one extraction call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionRequest {
    pub mode: ExtractionMode,
    /// Free-text prompt, used verbatim by `freeform` mode.
    pub prompt: String,
    pub grounding: bool,
    pub include_caption: bool,
    /// Search term for `find_ref` mode.
    pub find_term: Option<String>,
    /// JSON schema text for `kv_json` mode.
    pub schema: Option<String>,
    /// Passed through to the engine unmodified.
    pub base_size: u32,
    /// Passed through to the engine unmodified.
    pub image_size: u32,
    /// Passed through to the engine unmodified.
    pub crop_mode: bool,
    /// Passed through to the engine unmodified.
    pub test_compress: bool,
}

impl Default for ExtractionRequest {
    fn default() -> Self {
        Self {
            mode: ExtractionMode::PlainOcr,
            prompt: String::new(),
            grounding: false,
            include_caption: false,
            find_term: None,
            schema: None,
            base_size: 1024,
            image_size: 640,
            crop_mode: true,
            test_compress: false,
        }
    }
}

impl ExtractionRequest {
    pub fn new(mode: impl Into<ExtractionMode>) -> Self {
        Self {
            mode: mode.into(),
            ..Self::default()
        }
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn grounding(mut self, v: bool) -> Self {
        self.grounding = v;
        self
    }

    pub fn include_caption(mut self, v: bool) -> Self {
        self.include_caption = v;
        self
    }

    pub fn find_term(mut self, term: impl Into<String>) -> Self {
        self.find_term = Some(term.into());
        self
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn base_size(mut self, px: u32) -> Self {
        self.base_size = px;
        self
    }

    pub fn image_size(mut self, px: u32) -> Self {
        self.image_size = px;
        self
    }

    pub fn crop_mode(mut self, v: bool) -> Self {
        self.crop_mode = v;
        self
    }

    /// Grounding as actually applied: the caller's flag OR a mode that
    /// always needs it.
    pub fn effective_grounding(&self) -> bool {
        self.grounding || self.mode.requires_grounding()
    }
}
