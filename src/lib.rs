//! # edgequake-ocr
//!
//! Grounded OCR for images and PDFs: rasterise every page, ask a
//! recognition engine to read it, and turn the engine's tagged answer into
//! text, labelled pixel boxes and exportable documents.
//!
//! ## Why grounding?
//!
//! Plain OCR returns words; grounded OCR also says *where* they are. The
//! engine marks regions inline as
//! `<|ref|>Total<|/ref|><|det|>[[x1, y1, x2, y2]]<|/det|>` with coordinates
//! on a 0–999 grid. This crate parses that markup tolerantly, rescales the
//! boxes to page pixels and strips the tags for display.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image / PDF
//!  │
//!  ├─ 1. Input       local path, HTTP(S) URL or in-memory upload
//!  ├─ 2. Render      rasterise pages via pdfium (spawn_blocking, bounded fan-out)
//!  ├─ 3. Instruction compile the mode-specific prompt once per request
//!  ├─ 4. Engine      one call per page, strictly in page order
//!  ├─ 5. Detect      parse <|ref|>/<|det|> into Detection boxes
//!  ├─ 6. Aggregate   merge pages into a DocumentResult
//!  └─ 7. Export      Markdown, HTML or DOCX
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_ocr::{
//!     EngineHandle, ExtractionConfig, ExtractionRequest, Extractor, VlmEngine, VlmSettings,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let engine = VlmEngine::from_settings(VlmSettings::default())?;
//!     let extractor = Extractor::new(EngineHandle::ready(Arc::new(engine)), ExtractionConfig::default());
//!
//!     let request = ExtractionRequest::new("find_ref").find_term("Total");
//!     let result = extractor.extract("invoice.pdf", &request).await?;
//!     for det in &result.boxes {
//!         println!("{} at {:?}", det.label, det.bbox);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Bringing Your Own Engine
//!
//! Any model that reads an image file plus an instruction can back the
//! pipeline: implement [`RecognitionEngine`] and install it in an
//! [`EngineHandle`]. Until installed, every request fails fast with
//! [`OcrError::EngineUnavailable`].
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `edgeocr` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-ocr = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod request;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, VlmSettings};
pub use error::{ErrorBody, MalformedDetection, OcrError};
pub use export::{export, ExportFormat, ExportPage};
pub use extract::Extractor;
pub use output::{Detection, DocumentResult, ImageDims, PageResult, ResultMetadata};
pub use pipeline::engine::{EngineHandle, EngineOutput, InferenceRequest, RecognitionEngine};
pub use pipeline::input::SourceDocument;
pub use pipeline::render::{Page, PageRenderer, PdfiumRenderer};
pub use pipeline::vlm::VlmEngine;
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use prompts::compile_instruction;
pub use request::{ExtractionMode, ExtractionRequest};
pub use stream::PageStream;
