//! Page orchestration: run each rasterised page through the engine.
//!
//! One [`PageOrchestrator`] serves one request. It compiles the instruction
//! once, owns the request's working directory and drives pages strictly one
//! at a time, because nothing promises the engine tolerates concurrent calls.
//!
//! Transient files are RAII handles: each page PNG is deleted as soon as its
//! engine call returns, and the working directory goes when the orchestrator
//! is dropped. Both happen on error paths too.

use crate::config::ExtractionConfig;
use crate::error::OcrError;
use crate::output::{Detection, ImageDims, PageResult};
use crate::pipeline::detect;
use crate::pipeline::encode::{base64_png, write_page_file};
use crate::pipeline::engine::{InferenceRequest, RecognitionEngine};
use crate::pipeline::render::Page;
use crate::progress::ProgressCallback;
use crate::prompts::compile_instruction;
use crate::request::ExtractionRequest;
use image::imageops;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Display text used when the engine produced nothing at all.
pub const NO_TEXT_SENTINEL: &str = "No text returned by model.";

/// Artifact some engines write into the working directory instead of
/// returning text.
pub const FALLBACK_ARTIFACT: &str = "result.mmd";

/// Prefix of the per-request working directory.
pub const WORKDIR_PREFIX: &str = "dsocr_";

/// Drives the pages of one request through the engine.
pub struct PageOrchestrator {
    engine: Arc<dyn RecognitionEngine>,
    request: ExtractionRequest,
    instruction: String,
    workdir: TempDir,
    is_pdf: bool,
    total_pages: usize,
    crop_figures: bool,
    progress: Option<ProgressCallback>,
}

impl PageOrchestrator {
    /// Compile the instruction and create the working directory.
    pub fn new(
        engine: Arc<dyn RecognitionEngine>,
        request: &ExtractionRequest,
        config: &ExtractionConfig,
        is_pdf: bool,
        total_pages: usize,
    ) -> Result<Self, OcrError> {
        let workdir = tempfile::Builder::new()
            .prefix(WORKDIR_PREFIX)
            .tempdir()
            .map_err(|e| OcrError::Internal(format!("Failed to create working directory: {e}")))?;
        let instruction = compile_instruction(request);
        debug!("Compiled instruction for mode '{}': {:?}", request.mode, instruction);

        Ok(Self {
            engine,
            request: request.clone(),
            instruction,
            workdir,
            is_pdf,
            total_pages,
            crop_figures: config.crop_figures,
            progress: config.progress_callback.clone(),
        })
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    /// Process every page in order. The first failure aborts the request.
    pub async fn process_all(&self, pages: Vec<Page>) -> Result<Vec<PageResult>, OcrError> {
        self.notify_start();

        let mut results = Vec::with_capacity(pages.len());
        for page in pages {
            results.push(self.process(&page).await?);
        }

        self.notify_complete();
        info!("Recognised {} page(s)", results.len());
        Ok(results)
    }

    /// Report the page count to the progress callback, if any.
    pub fn notify_start(&self) {
        if let Some(cb) = &self.progress {
            cb.on_extraction_start(self.total_pages);
        }
    }

    /// Report that every page was recognised.
    pub fn notify_complete(&self) {
        if let Some(cb) = &self.progress {
            cb.on_extraction_complete(self.total_pages);
        }
    }

    /// Recognise one page and assemble its [`PageResult`].
    pub async fn process(&self, page: &Page) -> Result<PageResult, OcrError> {
        let page_num = page.index();
        if let Some(cb) = &self.progress {
            cb.on_page_start(page_num, self.total_pages);
        }

        let raw_text = match self.recognise(page).await {
            Ok(text) => text,
            Err(e) => {
                if let Some(cb) = &self.progress {
                    cb.on_page_error(page_num, self.total_pages, e.to_string());
                }
                return Err(e);
            }
        };

        let (width, height) = (page.width(), page.height());
        let detections = if detect::has_detection_markup(&raw_text) {
            detect::extract_detections(&raw_text, width.max(1), height.max(1))
        } else {
            Vec::new()
        };

        let (text, figures) = if self.crop_figures {
            (
                detect::display_text_with_figures(&raw_text, &detections, width, height),
                crop_figures(page, &detections)?,
            )
        } else {
            (detect::display_text(&raw_text, &detections), Vec::new())
        };

        if let Some(cb) = &self.progress {
            cb.on_page_complete(page_num, self.total_pages, text.len(), detections.len());
        }
        debug!(
            "Page {}: {} chars, {} detections, {} figures",
            page_num,
            text.len(),
            detections.len(),
            figures.len()
        );

        Ok(PageResult {
            page: self.is_pdf.then_some(page_num),
            text,
            raw_text,
            detections,
            image_dims: ImageDims {
                w: width,
                h: height,
            },
            figures,
        })
    }

    /// Persist the page, call the engine and normalise its answer.
    async fn recognise(&self, page: &Page) -> Result<String, OcrError> {
        let page_label = self.is_pdf.then_some(page.index());
        let artifact = self.workdir.path().join(FALLBACK_ARTIFACT);
        // A stale artifact from the previous page must not be mistaken for this one's.
        if let Err(e) = tokio::fs::remove_file(&artifact).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Could not remove stale {}: {}", artifact.display(), e);
            }
        }

        let page_file = write_page_file(page, self.workdir.path())?;
        let request = InferenceRequest {
            instruction: self.instruction.clone(),
            image_path: page_file.path().to_path_buf(),
            output_dir: self.workdir.path().to_path_buf(),
            base_size: self.request.base_size,
            image_size: self.request.image_size,
            crop_mode: self.request.crop_mode,
            test_compress: self.request.test_compress,
        };

        let output = self.engine.infer(&request).await;
        drop(page_file);
        let text = output.map_err(|e| attribute_page(e, page_label))?.into_text();

        if !text.is_empty() {
            return Ok(text);
        }
        match tokio::fs::read_to_string(&artifact).await {
            Ok(contents) if !contents.trim().is_empty() => {
                debug!("Page {}: using {}", page.index(), FALLBACK_ARTIFACT);
                Ok(contents.trim().to_string())
            }
            _ => {
                warn!("Page {}: engine returned no text", page.index());
                Ok(NO_TEXT_SENTINEL.to_string())
            }
        }
    }
}

/// Attach the page number to an engine failure that lacks one.
fn attribute_page(e: OcrError, page: Option<usize>) -> OcrError {
    match e {
        OcrError::EngineFailure { page: None, detail } => OcrError::EngineFailure { page, detail },
        other => other,
    }
}

/// Crop every figure box out of the page as base64 PNG, in detection order.
fn crop_figures(page: &Page, detections: &[Detection]) -> Result<Vec<String>, OcrError> {
    detections
        .iter()
        .filter(|d| detect::is_figure(&d.label))
        .filter_map(|d| detect::figure_region(d.bbox, page.width(), page.height()))
        .map(|(x, y, w, h)| base64_png(&imageops::crop_imm(page.image(), x, y, w, h).to_image()))
        .collect()
}
