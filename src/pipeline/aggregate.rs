//! Result aggregation: merge per-page results into one [`DocumentResult`].
//!
//! Boxes are never merged across pages; page coordinate spaces differ and
//! there is no meaningful document-level box. Multi-page callers read the
//! per-page detections from [`DocumentResult::pages`].

use crate::error::OcrError;
use crate::output::{DocumentResult, PageResult, ResultMetadata};
use crate::request::ExtractionRequest;

/// Separator line placed before each page's text in a multi-page result.
pub fn page_separator(page_num: usize) -> String {
    format!("--- Page {page_num} ---")
}

/// Merge `pages` (already in document order) into a document result.
///
/// The multi-page shape is used only for PDFs with more than one page;
/// single images and one-page PDFs pass their page straight through.
pub fn aggregate(
    pages: Vec<PageResult>,
    is_pdf: bool,
    request: &ExtractionRequest,
) -> Result<DocumentResult, OcrError> {
    let first = pages
        .first()
        .ok_or_else(|| OcrError::Internal("no pages to aggregate".into()))?;
    let image_dims = first.image_dims;
    let multi_page = is_pdf && pages.len() > 1;

    let metadata = ResultMetadata {
        mode: request.mode.clone(),
        grounding: request.effective_grounding(),
        base_size: request.base_size,
        image_size: request.image_size,
        crop_mode: request.crop_mode,
        total_pages: multi_page.then_some(pages.len()),
    };

    if !multi_page {
        let mut pages = pages;
        let page = pages.swap_remove(0);
        return Ok(DocumentResult {
            success: true,
            text: page.text,
            raw_text: page.raw_text,
            boxes: page.detections,
            image_dims,
            is_pdf,
            pages: None,
            figures: page.figures,
            metadata,
        });
    }

    let section = |i: usize, p: &PageResult, body: &str| {
        format!("\n{}\n{}", page_separator(p.page.unwrap_or(i + 1)), body)
    };
    let text = pages
        .iter()
        .enumerate()
        .map(|(i, p)| section(i, p, &p.text))
        .collect::<Vec<_>>()
        .join("\n");
    let raw_text = pages
        .iter()
        .enumerate()
        .map(|(i, p)| section(i, p, &p.raw_text))
        .collect::<Vec<_>>()
        .join("\n");

    Ok(DocumentResult {
        success: true,
        text,
        raw_text,
        boxes: Vec::new(),
        image_dims,
        is_pdf,
        pages: Some(pages),
        figures: Vec::new(),
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{Detection, ImageDims};

    fn page(n: usize, text: &str, w: u32) -> PageResult {
        PageResult {
            page: Some(n),
            text: text.to_string(),
            raw_text: format!("<|ref|>{text}<|/ref|>"),
            detections: vec![Detection::new(text, [n as u32, 0, 1, 1])],
            image_dims: ImageDims { w, h: 10 },
            figures: vec![],
        }
    }

    #[test]
    fn three_pages_combined_in_order() {
        let request = ExtractionRequest::new("layout_map");
        let doc = aggregate(
            vec![page(1, "alpha", 100), page(2, "beta", 200), page(3, "gamma", 300)],
            true,
            &request,
        )
        .unwrap();

        assert_eq!(
            doc.text,
            "\n--- Page 1 ---\nalpha\n\n--- Page 2 ---\nbeta\n\n--- Page 3 ---\ngamma"
        );
        let positions: Vec<_> = (1..=3)
            .map(|n| doc.raw_text.find(&page_separator(n)).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));

        assert!(doc.boxes.is_empty());
        assert_eq!(doc.image_dims.w, 100);
        let pages = doc.pages.as_ref().unwrap();
        assert_eq!(pages[2].detections[0].label, "gamma");

        assert_eq!(doc.metadata.total_pages, Some(3));
        assert!(doc.metadata.grounding);
    }

    #[test]
    fn single_page_passes_through() {
        let doc = aggregate(vec![page(1, "solo", 50)], true, &ExtractionRequest::default()).unwrap();
        assert_eq!(doc.text, "solo");
        assert_eq!(doc.boxes.len(), 1);
        assert!(doc.is_pdf);
        assert!(doc.pages.is_none());
        assert_eq!(doc.metadata.total_pages, None);

        let json = serde_json::to_value(&doc).unwrap();
        assert!(json.get("pages").is_none());
        assert!(json["metadata"].get("total_pages").is_none());
    }

    #[test]
    fn image_input_is_not_pdf() {
        let mut p = page(1, "img", 5);
        p.page = None;
        p.figures = vec!["aGVsbG8=".into()];
        let doc = aggregate(vec![p], false, &ExtractionRequest::default()).unwrap();
        assert!(!doc.is_pdf);
        assert_eq!(doc.raw_text, "<|ref|>img<|/ref|>");
        assert_eq!(doc.figures, ["aGVsbG8="]);
    }

    #[test]
    fn no_pages_is_an_error() {
        assert!(aggregate(vec![], true, &ExtractionRequest::default()).is_err());
    }
}
