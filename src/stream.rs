//! Streaming extraction: emit pages as they are recognised.
//!
//! ## Why stream?
//!
//! Recognition is the slow step and runs one page at a time. A stream lets
//! callers show each page as soon as it is done instead of waiting for the
//! whole document.
//!
//! Rasterisation still happens up front (pages are rendered concurrently
//! and re-ordered), so the stream yields pages **in document order**. The
//! first error ends the stream; no pages follow it.
//!
//! Progress callbacks see the same events as eager extraction: start once
//! the stream is built, completion when the last page has been yielded.

use crate::error::OcrError;
use crate::extract::Extractor;
use crate::output::PageResult;
use crate::pipeline::input::{resolve_input, SourceDocument};
use crate::pipeline::orchestrate::PageOrchestrator;
use crate::pipeline::render::rasterize;
use crate::request::ExtractionRequest;
use futures::stream;
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of page results.
pub type PageStream = Pin<Box<dyn Stream<Item = Result<PageResult, OcrError>> + Send>>;

impl Extractor {
    /// Stream the pages of `source` in document order.
    ///
    /// # Returns
    /// - `Ok(PageStream)` — one `Result<PageResult, OcrError>` per page,
    ///   ending early after the first `Err`
    /// - `Err(OcrError)` — engine not ready or document unreadable
    pub async fn extract_stream(
        &self,
        source: &SourceDocument,
        request: &ExtractionRequest,
    ) -> Result<PageStream, OcrError> {
        let engine = self.engine().get()?;
        let pages = rasterize(source, self.renderer(), self.config()).await?;
        info!(
            "Streaming extraction: {} ({} page(s))",
            source.filename(),
            pages.len()
        );

        // Moved into the stream state; the working directory lives as long
        // as the stream does.
        let orchestrator = PageOrchestrator::new(
            engine,
            request,
            self.config(),
            source.is_pdf(),
            pages.len(),
        )?;

        orchestrator.notify_start();

        // The failure flag is checked before the next page is pulled, so no
        // engine call happens after an error.
        let s = stream::unfold(
            (pages.into_iter(), orchestrator, false),
            |(mut pages, orchestrator, failed)| async move {
                if failed {
                    return None;
                }
                let Some(page) = pages.next() else {
                    orchestrator.notify_complete();
                    return None;
                };
                let item = orchestrator.process(&page).await;
                let failed = item.is_err();
                Some((item, (pages, orchestrator, failed)))
            },
        );

        Ok(Box::pin(s))
    }

    /// [`Extractor::extract_stream`] for a local path or HTTP(S) URL.
    pub async fn extract_stream_from(
        &self,
        input: impl AsRef<str>,
        request: &ExtractionRequest,
    ) -> Result<PageStream, OcrError> {
        self.engine().get()?;
        let source = resolve_input(input.as_ref(), self.config().download_timeout_secs).await?;
        self.extract_stream(&source, request).await
    }
}
