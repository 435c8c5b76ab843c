//! Progress-callback trait for per-page extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the pipeline rasterises and recognises each page. Callers can
//! forward them to a channel, a WebSocket or a terminal progress bar without
//! the library knowing how the host application communicates.
//!
//! # Example
//!
//! ```rust
//! use edgequake_ocr::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, page_num: usize, total_pages: usize, text_len: usize, detections: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {page_num}/{total_pages}: {text_len} chars, {detections} boxes");
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { completed: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it processes a document.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Recognition is sequential, so page events arrive
/// in page order; implementations must still be `Send + Sync` because the
/// config is shared across tasks.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once rasterisation has finished and the page count is known.
    fn on_extraction_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before the engine is invoked for a page.
    ///
    /// # Arguments
    /// * `page_num`    — 1-indexed page number
    /// * `total_pages` — total pages in the document
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page has been recognised and parsed.
    ///
    /// # Arguments
    /// * `text_len`   — byte length of the display text
    /// * `detections` — number of boxes parsed from the page
    fn on_page_complete(
        &self,
        page_num: usize,
        total_pages: usize,
        text_len: usize,
        detections: usize,
    ) {
        let _ = (page_num, total_pages, text_len, detections);
    }

    /// Called when the engine fails on a page. The request fails right after.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: String) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once every page has been recognised.
    fn on_extraction_complete(&self, total_pages: usize) {
        let _ = total_pages;
    }
}

/// A no-op implementation. Useful as a default or in tests.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience type alias for a shared, type-erased callback.
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
    }

    impl ExtractionProgressCallback for Counter {
        fn on_page_start(&self, _: usize, _: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }
        fn on_page_complete(&self, _: usize, _: usize, _: usize, _: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }
        fn on_page_error(&self, _: usize, _: usize, _: String) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_extraction_start(10);
        cb.on_page_start(1, 10);
        cb.on_page_complete(1, 10, 500, 2);
        cb.on_page_error(2, 10, "oops".to_string());
        cb.on_extraction_complete(10);
    }

    #[test]
    fn counting_callback_as_trait_object() {
        let counter = Arc::new(Counter {
            starts: AtomicUsize::new(0),
            completes: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        });
        let cb: ProgressCallback = counter.clone();

        cb.on_page_start(1, 2);
        cb.on_page_complete(1, 2, 10, 0);
        cb.on_page_start(2, 2);
        cb.on_page_error(2, 2, "fail".into());

        assert_eq!(counter.starts.load(Ordering::SeqCst), 2);
        assert_eq!(counter.completes.load(Ordering::SeqCst), 1);
        assert_eq!(counter.errors.load(Ordering::SeqCst), 1);
    }
}
