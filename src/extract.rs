//! Eager (full-document) extraction entry points.
//!
//! ## Why eager vs. streaming?
//!
//! [`Extractor::extract`] waits for every page, aggregates, and returns one
//! [`DocumentResult`]. Use [`Extractor::extract_stream`] instead when pages
//! should be shown as they finish.
//!
//! ## Request Lifecycle
//!
//! ```text
//! engine ready? ──▶ resolve input ──▶ rasterise ──▶ orchestrate ──▶ aggregate
//!      │ no                                          (one page at a time)
//!      └──▶ EngineUnavailable, nothing touched on disk
//! ```
//!
//! The orchestrator owns the request's working directory; it is dropped
//! (and the directory removed) before the result is returned, on error
//! paths as well.

use crate::config::ExtractionConfig;
use crate::error::OcrError;
use crate::export::{export, ExportFormat, ExportPage};
use crate::output::DocumentResult;
use crate::pipeline::aggregate::aggregate;
use crate::pipeline::engine::{EngineHandle, RecognitionEngine};
use crate::pipeline::input::{resolve_input, SourceDocument};
use crate::pipeline::orchestrate::PageOrchestrator;
use crate::pipeline::render::{rasterize, PageRenderer, PdfiumRenderer};
use crate::request::ExtractionRequest;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Runs extraction requests against one recognition engine.
///
/// Cheap to clone; clones share the engine handle and renderer.
#[derive(Clone)]
pub struct Extractor {
    engine: EngineHandle,
    renderer: Arc<dyn PageRenderer>,
    config: ExtractionConfig,
}

impl Extractor {
    /// An extractor rendering PDFs with pdfium.
    pub fn new(engine: EngineHandle, config: ExtractionConfig) -> Self {
        Self {
            engine,
            renderer: Arc::new(PdfiumRenderer),
            config,
        }
    }

    /// Replace the PDF renderer.
    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Extract from a local path or an HTTP(S) URL.
    pub async fn extract(
        &self,
        input: impl AsRef<str>,
        request: &ExtractionRequest,
    ) -> Result<DocumentResult, OcrError> {
        let engine = self.engine.get()?;
        let source = resolve_input(input.as_ref(), self.config.download_timeout_secs).await?;
        self.run(engine, &source, request).await
    }

    /// Extract from an in-memory upload.
    pub async fn extract_bytes(
        &self,
        bytes: impl Into<Vec<u8>>,
        filename: impl Into<String>,
        request: &ExtractionRequest,
    ) -> Result<DocumentResult, OcrError> {
        let engine = self.engine.get()?;
        let source = SourceDocument::from_bytes(bytes, filename);
        self.run(engine, &source, request).await
    }

    /// Extract from an already-resolved source.
    pub async fn extract_source(
        &self,
        source: &SourceDocument,
        request: &ExtractionRequest,
    ) -> Result<DocumentResult, OcrError> {
        let engine = self.engine.get()?;
        self.run(engine, source, request).await
    }

    /// Extract, export in `format` and write the result to `path`.
    ///
    /// The file is written to a sibling temp file and renamed into place, so
    /// a failure never leaves a partial document behind.
    pub async fn extract_to_file(
        &self,
        input: impl AsRef<str>,
        request: &ExtractionRequest,
        path: impl AsRef<Path>,
        format: ExportFormat,
    ) -> Result<DocumentResult, OcrError> {
        let result = self.extract(input, request).await?;
        let bytes = export(&ExportPage::from_result(&result), format, true)?;
        write_atomic(path.as_ref(), &bytes).await?;
        Ok(result)
    }

    /// Blocking wrapper around [`Extractor::extract`].
    ///
    /// Creates a temporary tokio runtime internally; do not call from
    /// inside an async context.
    pub fn extract_sync(
        &self,
        input: impl AsRef<str>,
        request: &ExtractionRequest,
    ) -> Result<DocumentResult, OcrError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| OcrError::Internal(format!("Failed to create tokio runtime: {e}")))?
            .block_on(self.extract(input, request))
    }

    pub(crate) fn renderer(&self) -> Arc<dyn PageRenderer> {
        Arc::clone(&self.renderer)
    }

    async fn run(
        &self,
        engine: Arc<dyn RecognitionEngine>,
        source: &SourceDocument,
        request: &ExtractionRequest,
    ) -> Result<DocumentResult, OcrError> {
        let start = Instant::now();
        info!(
            "Starting extraction: {} (mode: {}, engine: {})",
            source.filename(),
            request.mode,
            engine.name()
        );

        // ── Step 1: Rasterise ────────────────────────────────────────────
        let render_start = Instant::now();
        let pages = rasterize(source, self.renderer(), &self.config).await?;
        debug!(
            "Rasterised {} page(s) in {:?}",
            pages.len(),
            render_start.elapsed()
        );

        // ── Step 2: Recognise, one page at a time ────────────────────────
        let results = {
            let orchestrator =
                PageOrchestrator::new(engine, request, &self.config, source.is_pdf(), pages.len())?;
            orchestrator.process_all(pages).await?
        };

        // ── Step 3: Aggregate ────────────────────────────────────────────
        let result = aggregate(results, source.is_pdf(), request)?;
        info!(
            "Extraction complete: {} page(s), {} chars, {:?}",
            result.pages.as_ref().map_or(1, Vec::len),
            result.text.len(),
            start.elapsed()
        );
        Ok(result)
    }
}

/// Write `bytes` to `path` via a temp file and rename.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), OcrError> {
    let write_err = |e: std::io::Error| OcrError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);
    tokio::fs::write(&tmp_path, bytes).await.map_err(write_err)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e));
    }
    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unready_engine_fails_before_reading_input() {
        let extractor = Extractor::new(EngineHandle::empty(), ExtractionConfig::default());
        // The path does not exist; readiness must be reported first.
        let err = extractor
            .extract("/definitely/not/here.pdf", &ExtractionRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OcrError::EngineUnavailable { .. }), "got: {err:?}");
        assert_eq!(err.http_status(), 503);
    }

    #[tokio::test]
    async fn atomic_write_creates_parents_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.md");
        write_atomic(&path, b"# Page 1\n").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# Page 1\n");
        assert!(!dir.path().join("nested/out.md.tmp").exists());
    }
}
