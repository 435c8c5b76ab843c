//! Rasterisation: turn a PDF or image into an ordered list of [`Page`]s.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto a dedicated thread pool
//! thread designed for blocking operations, preventing the Tokio worker
//! threads from stalling during CPU-heavy rendering.
//!
//! ## Why indexed slots instead of a sorted stream?
//!
//! Pages of a multi-page PDF render concurrently and finish in any order.
//! Each finished render is dropped into the slot for its page index, and
//! pages are emitted by walking the slots. The page index, never arrival
//! time, decides the order.
//!
//! ## Why a pixel ceiling?
//!
//! A crafted PDF can declare a page of several square metres; at 144 DPI that
//! is billions of pixels. Pages and images larger than
//! [`ExtractionConfig::max_image_pixels`] are refused before any pixel
//! buffer is allocated.

use crate::config::ExtractionConfig;
use crate::error::OcrError;
use crate::pipeline::input::SourceDocument;
use futures::stream::{self, StreamExt};
use image::{DynamicImage, ImageReader, Rgb, RgbImage};
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, info};

/// One rasterised page. Immutable once built.
#[derive(Debug, Clone)]
pub struct Page {
    index: usize,
    image: RgbImage,
}

impl Page {
    /// Build a page from any decoded image, flattening alpha onto white.
    pub fn new(index: usize, image: DynamicImage) -> Self {
        Self {
            index,
            image: flatten_alpha(image),
        }
    }

    /// 1-based position in the source document.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// PDF backend used by [`rasterize`].
///
/// Implementations are called from blocking worker threads, one call per
/// page, and must open their own document handle per call.
pub trait PageRenderer: Send + Sync {
    /// Number of pages in the PDF.
    fn page_count(&self, pdf: &[u8]) -> Result<usize, OcrError>;

    /// Render page `index` (0-based) at `dpi`, refusing rasters larger than
    /// `max_pixels`.
    fn render_page(
        &self,
        pdf: &[u8],
        index: usize,
        dpi: u32,
        max_pixels: u64,
    ) -> Result<DynamicImage, OcrError>;
}

/// [`PageRenderer`] backed by the pdfium shared library.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfiumRenderer;

impl PdfiumRenderer {
    fn bind() -> Result<Pdfium, OcrError> {
        Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map(Pdfium::new)
            .map_err(|e| OcrError::Internal(format!("Failed to load pdfium library: {e:?}")))
    }
}

fn unreadable(e: PdfiumError) -> OcrError {
    OcrError::UnreadableDocument {
        detail: format!("{e:?}"),
    }
}

impl PageRenderer for PdfiumRenderer {
    fn page_count(&self, pdf: &[u8]) -> Result<usize, OcrError> {
        let pdfium = Self::bind()?;
        let document = pdfium.load_pdf_from_byte_slice(pdf, None).map_err(unreadable)?;
        Ok(document.pages().len() as usize)
    }

    fn render_page(
        &self,
        pdf: &[u8],
        index: usize,
        dpi: u32,
        max_pixels: u64,
    ) -> Result<DynamicImage, OcrError> {
        let pdfium = Self::bind()?;
        let document = pdfium.load_pdf_from_byte_slice(pdf, None).map_err(unreadable)?;

        let failed = |e: PdfiumError| OcrError::RasterisationFailed {
            page: index + 1,
            detail: format!("{e:?}"),
        };

        let page_index = u16::try_from(index).map_err(|_| OcrError::RasterisationFailed {
            page: index + 1,
            detail: "page index exceeds pdfium limits".into(),
        })?;
        let page = document.pages().get(page_index).map_err(failed)?;

        let zoom = dpi as f32 / 72.0;
        let width = (page.width().value * zoom).ceil().max(0.0) as u64;
        let height = (page.height().value * zoom).ceil().max(0.0) as u64;
        let pixels = width.saturating_mul(height);
        if pixels > max_pixels {
            return Err(OcrError::PixelLimitExceeded {
                page: Some(index + 1),
                pixels,
                limit: max_pixels,
            });
        }

        let render_config = PdfRenderConfig::new().scale_page_by_factor(zoom);
        let bitmap = page.render_with_config(&render_config).map_err(failed)?;
        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            index + 1,
            image.width(),
            image.height()
        );
        Ok(image)
    }
}

/// Rasterise `source` into pages in document order.
///
/// Images yield exactly one page. A single-page PDF renders on one blocking
/// task; longer PDFs fan out over `min(max_workers, page_count)` concurrent
/// renders.
pub async fn rasterize(
    source: &SourceDocument,
    renderer: Arc<dyn PageRenderer>,
    config: &ExtractionConfig,
) -> Result<Vec<Page>, OcrError> {
    let bytes = source.shared_bytes();
    let max_pixels = config.max_image_pixels;

    if !source.is_pdf() {
        let image = tokio::task::spawn_blocking(move || decode_image(&bytes, max_pixels))
            .await
            .map_err(|e| OcrError::Internal(format!("Decode task panicked: {e}")))??;
        return Ok(vec![Page::new(1, image)]);
    }

    let count = {
        let (renderer, bytes) = (Arc::clone(&renderer), Arc::clone(&bytes));
        tokio::task::spawn_blocking(move || renderer.page_count(&bytes))
            .await
            .map_err(|e| OcrError::Internal(format!("Render task panicked: {e}")))??
    };
    if count == 0 {
        return Err(OcrError::UnreadableDocument {
            detail: "PDF has no pages".into(),
        });
    }
    info!("PDF loaded: {} pages", count);

    let dpi = config.dpi;
    if count == 1 {
        let image = tokio::task::spawn_blocking(move || renderer.render_page(&bytes, 0, dpi, max_pixels))
            .await
            .map_err(|e| OcrError::Internal(format!("Render task panicked: {e}")))??;
        return Ok(vec![Page::new(1, image)]);
    }

    let workers = config.max_workers.clamp(1, count);
    debug!("Rendering {} pages on {} workers", count, workers);

    let mut renders = stream::iter(0..count)
        .map(|idx| {
            let renderer = Arc::clone(&renderer);
            let bytes = Arc::clone(&bytes);
            async move {
                let joined = tokio::task::spawn_blocking(move || {
                    renderer.render_page(&bytes, idx, dpi, max_pixels)
                })
                .await;
                (idx, joined)
            }
        })
        .buffer_unordered(workers);

    let mut slots: Vec<Option<DynamicImage>> = (0..count).map(|_| None).collect();
    while let Some((idx, joined)) = renders.next().await {
        let image = joined.map_err(|e| OcrError::Internal(format!("Render task panicked: {e}")))??;
        slots[idx] = Some(image);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(idx, slot)| {
            slot.map(|image| Page::new(idx + 1, image))
                .ok_or_else(|| OcrError::Internal(format!("Page {} was never rendered", idx + 1)))
        })
        .collect()
}

/// Decode an image payload, checking its declared size first.
fn decode_image(bytes: &[u8], max_pixels: u64) -> Result<DynamicImage, OcrError> {
    let reader = || {
        ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| OcrError::UnreadableDocument {
                detail: e.to_string(),
            })
    };

    let (width, height) = reader()?
        .into_dimensions()
        .map_err(|e| OcrError::UnreadableDocument {
            detail: e.to_string(),
        })?;
    let pixels = width as u64 * height as u64;
    if pixels > max_pixels {
        return Err(OcrError::PixelLimitExceeded {
            page: None,
            pixels,
            limit: max_pixels,
        });
    }

    let mut reader = reader()?;
    reader.no_limits();
    let image = reader.decode().map_err(|e| OcrError::UnreadableDocument {
        detail: e.to_string(),
    })?;
    debug!("Decoded image → {}x{} px", image.width(), image.height());
    Ok(image)
}

/// Convert to RGB, compositing any alpha channel onto white.
pub fn flatten_alpha(image: DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.into_rgb8();
    }
    let rgba = image.into_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, px) in rgba.enumerate_pixels() {
        let [r, g, b, a] = px.0;
        let a = a as u32;
        let blend = |c: u8| ((c as u32 * a + 255 * (255 - a) + 127) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Renders solid pages whose width encodes the page index; later pages
    /// finish first.
    struct SlowFirstRenderer {
        pages: usize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl PageRenderer for SlowFirstRenderer {
        fn page_count(&self, _: &[u8]) -> Result<usize, OcrError> {
            Ok(self.pages)
        }

        fn render_page(&self, _: &[u8], index: usize, _: u32, _: u64) -> Result<DynamicImage, OcrError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(((self.pages - index) * 15) as u64));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(DynamicImage::new_rgb8(10 + index as u32, 5))
        }
    }

    fn pdf_source() -> SourceDocument {
        SourceDocument::from_bytes(b"%PDF-1.4 fake".to_vec(), "doc.pdf")
    }

    fn png_bytes(img: DynamicImage) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        buf
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn pages_come_back_in_document_order() {
        let renderer = Arc::new(SlowFirstRenderer {
            pages: 6,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let config = ExtractionConfig::builder().max_workers(3).build().unwrap();
        let pages = rasterize(&pdf_source(), renderer.clone(), &config).await.unwrap();

        let indices: Vec<_> = pages.iter().map(Page::index).collect();
        assert_eq!(indices, [1, 2, 3, 4, 5, 6]);
        for page in &pages {
            assert_eq!(page.width(), 10 + page.index() as u32 - 1);
        }
        assert!(renderer.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn empty_pdf_is_unreadable() {
        let renderer = Arc::new(SlowFirstRenderer {
            pages: 0,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let err = rasterize(&pdf_source(), renderer, &ExtractionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OcrError::UnreadableDocument { .. }));
    }

    #[tokio::test]
    async fn image_input_is_single_rgb_page() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 3, Rgba([0, 0, 0, 0])));
        let source = SourceDocument::from_bytes(png_bytes(img), "scan.png");
        let pages = rasterize(&source, Arc::new(PdfiumRenderer), &ExtractionConfig::default())
            .await
            .unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!((pages[0].width(), pages[0].height()), (4, 3));
        // Fully transparent black becomes white.
        assert_eq!(pages[0].image().get_pixel(0, 0), &Rgb([255, 255, 255]));
    }

    #[tokio::test]
    async fn oversized_image_refused() {
        let source = SourceDocument::from_bytes(png_bytes(DynamicImage::new_rgb8(20, 20)), "big.png");
        let config = ExtractionConfig::builder().max_image_pixels(100).build().unwrap();
        let err = rasterize(&source, Arc::new(PdfiumRenderer), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, OcrError::PixelLimitExceeded { pixels: 400, .. }));
    }

    #[tokio::test]
    async fn garbage_image_is_unreadable() {
        let source = SourceDocument::from_bytes(b"not an image".to_vec(), "x.png");
        let err = rasterize(&source, Arc::new(PdfiumRenderer), &ExtractionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OcrError::UnreadableDocument { .. }));
    }

    #[test]
    fn flatten_alpha_blends_half_transparent() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 128])));
        let px = *flatten_alpha(img).get_pixel(0, 0);
        assert_eq!(px, Rgb([127, 127, 127]));
    }
}
