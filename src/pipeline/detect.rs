//! Detection parsing: turn grounding markup in engine output into boxes.
//!
//! A detection block looks like
//!
//! ```text
//! <|ref|>Total<|/ref|><|det|>[[100, 200, 300, 400]]<|/det|>
//! ```
//!
//! The payload is either one flat box `[x1, y1, x2, y2]` or a list of boxes.
//! Coordinates are on a fixed 0–999 scale for both axes and are rescaled to
//! the page's pixel space here.
//!
//! ## Why a tolerant scanner?
//!
//! Engine output is free text that merely *contains* markup; models drop
//! brackets, emit three-number boxes or leave words where numbers belong.
//! One bad block must not cost the caller every other block on the page, so
//! each block and each box is parsed independently and failures are logged
//! as [`MalformedDetection`] values, never returned.

use crate::error::MalformedDetection;
use crate::output::Detection;
use crate::prompts::GROUNDING_TOKEN;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use tracing::{debug, warn};

/// Upper bound of the engine's normalised coordinate scale.
pub const COORDINATE_SCALE: f64 = 999.0;

/// Label the engine uses for figures, photos and charts.
pub const FIGURE_LABEL: &str = "image";

/// One detection block. The label cannot contain `<|`, which keeps adjacent
/// blocks apart. The payload runs greedily to the last `]` before the
/// closing tag so nested lists are captured whole.
static RE_DETECTION_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?s)<\|ref\|>(?P<label>(?:[^<]|<[^|])*?)<\|/ref\|>\s*<\|det\|>\s*(?P<coords>\[[^<]*\])\s*<\|/det\|>",
    )
    .unwrap()
});

/// True when `text` contains any detection markup worth scanning.
pub fn has_detection_markup(text: &str) -> bool {
    text.contains("<|det|>") || text.contains("<|ref|>")
}

/// Extract every valid box from `text`, scaled to a `width` × `height` page.
///
/// Detections keep document order: block by block, box by box. Labels are
/// trimmed. Malformed blocks and boxes are skipped with a warning.
pub fn extract_detections(text: &str, width: u32, height: u32) -> Vec<Detection> {
    let mut detections = Vec::new();

    for caps in RE_DETECTION_BLOCK.captures_iter(text) {
        let label = caps["label"].trim();
        let boxes = match parse_block(label, &caps["coords"]) {
            Ok(boxes) => boxes,
            Err(e) => {
                warn!("{e}");
                continue;
            }
        };
        for raw in boxes {
            detections.push(Detection::new(label, scale_box(raw, width, height)));
        }
    }

    debug!(
        "Parsed {} detections for {}x{} page",
        detections.len(),
        width,
        height
    );
    detections
}

/// Strip detection markup, leaving each block's label in its place, and
/// remove any standalone grounding marker. The result is trimmed.
pub fn clean(text: &str) -> String {
    let replaced = RE_DETECTION_BLOCK.replace_all(text, |caps: &Captures| caps["label"].to_string());
    replaced.replace(GROUNDING_TOKEN, "").trim().to_string()
}

/// Display text for a page, given its normalised raw text and parsed boxes.
///
/// Markup is stripped only when present. If nothing but markup was emitted
/// the labels, comma-joined, become the display text.
pub fn display_text(raw: &str, detections: &[Detection]) -> String {
    let cleaned = if raw.contains("<|ref|>") || raw.contains(GROUNDING_TOKEN) {
        clean(raw)
    } else {
        raw.to_string()
    };

    if cleaned.is_empty() && !detections.is_empty() {
        return label_summary(detections);
    }
    cleaned
}

fn label_summary(detections: &[Detection]) -> String {
    detections
        .iter()
        .map(|d| d.label.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

// ── Figure placeholders ──────────────────────────────────────────────────

/// Whether a detection names a figure.
pub fn is_figure(label: &str) -> bool {
    label.trim().eq_ignore_ascii_case(FIGURE_LABEL)
}

/// Crop rectangle `(x, y, w, h)` of a figure box clamped to the page, or
/// `None` when nothing of it is left.
pub fn figure_region(bbox: [u32; 4], width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let [x1, y1, x2, y2] = bbox;
    let (left, right) = (x1.min(x2).min(width), x1.max(x2).min(width));
    let (top, bottom) = (y1.min(y2).min(height), y1.max(y2).min(height));
    if right <= left || bottom <= top {
        return None;
    }
    Some((left, top, right - left, bottom - top))
}

/// Like [`display_text`], but every figure block becomes `[IMAGE_i]`
/// placeholders, one per croppable box, numbered from 0 across the page.
///
/// Numbering matches the order in which [`figure_region`] yields regions
/// for the detections of [`extract_detections`], so placeholder `i` refers
/// to the page's `i`-th cropped figure.
pub fn display_text_with_figures(
    raw: &str,
    detections: &[Detection],
    width: u32,
    height: u32,
) -> String {
    if !raw.contains("<|ref|>") && !raw.contains(GROUNDING_TOKEN) {
        return display_text(raw, detections);
    }

    let mut next_index = 0usize;
    let replaced = RE_DETECTION_BLOCK.replace_all(raw, |caps: &Captures| {
        let label = &caps["label"];
        if !is_figure(label) {
            return label.to_string();
        }
        let boxes = parse_block(label.trim(), &caps["coords"]).unwrap_or_default();
        let placeholders: Vec<String> = boxes
            .into_iter()
            .filter(|raw| figure_region(scale_box(*raw, width, height), width, height).is_some())
            .map(|_| {
                let p = format!("[IMAGE_{next_index}]");
                next_index += 1;
                p
            })
            .collect();
        if placeholders.is_empty() {
            label.to_string()
        } else {
            placeholders.join("\n")
        }
    });

    let cleaned = replaced.replace(GROUNDING_TOKEN, "").trim().to_string();
    if cleaned.is_empty() && !detections.is_empty() {
        return label_summary(detections);
    }
    cleaned
}

// ── Coordinate parsing ───────────────────────────────────────────────────

static RE_TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*\]").unwrap());

/// Rewrite list-literal spellings JSON rejects: tuples become lists and a
/// trailing comma before `]` is dropped.
fn normalise_literal(payload: &str) -> String {
    let bracketed: String = payload
        .chars()
        .map(|c| match c {
            '(' => '[',
            ')' => ']',
            c => c,
        })
        .collect();
    RE_TRAILING_COMMA.replace_all(&bracketed, "]").into_owned()
}

/// Parse one block's payload into raw boxes. Invalid boxes are logged and
/// dropped; an unparseable payload rejects the whole block.
fn parse_block(label: &str, payload: &str) -> Result<Vec<[f64; 4]>, MalformedDetection> {
    let value: Value = serde_json::from_str(&normalise_literal(payload)).map_err(|e| {
        MalformedDetection::InvalidLiteral {
            label: label.to_string(),
            payload: payload.to_string(),
            detail: e.to_string(),
        }
    })?;

    let items = match value {
        Value::Array(items) => items,
        _ => {
            return Err(MalformedDetection::UnsupportedShape {
                label: label.to_string(),
                payload: payload.to_string(),
            })
        }
    };

    // A flat list is a single box only when it holds exactly four numbers.
    let candidates = if items.len() == 4 && items.iter().all(Value::is_number) {
        vec![Value::Array(items)]
    } else if items.first().is_some_and(Value::is_number) {
        return Err(MalformedDetection::UnsupportedShape {
            label: label.to_string(),
            payload: payload.to_string(),
        });
    } else {
        items
    };

    let mut boxes = Vec::with_capacity(candidates.len());
    for (index, candidate) in candidates.iter().enumerate() {
        match as_box(candidate) {
            Some(b) => boxes.push(b),
            None => warn!(
                "{}",
                MalformedDetection::InvalidBox {
                    label: label.to_string(),
                    index,
                    value: candidate.to_string(),
                }
            ),
        }
    }
    Ok(boxes)
}

/// First four elements of a list, if the list has at least four and they
/// are all numeric.
fn as_box(value: &Value) -> Option<[f64; 4]> {
    let items = value.as_array()?;
    if items.len() < 4 {
        return None;
    }
    let mut out = [0.0; 4];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = item.as_f64()?;
    }
    Some(out)
}

/// Rescale `[x1, y1, x2, y2]` from the 0–999 scale to pixels, truncating.
/// Negative results clamp to zero.
pub fn scale_box(raw: [f64; 4], width: u32, height: u32) -> [u32; 4] {
    let scale = |v: f64, dim: u32| -> u32 {
        let px = (v / COORDINATE_SCALE * dim as f64).floor();
        if px.is_finite() && px > 0.0 {
            px as u32
        } else {
            0
        }
    };
    [
        scale(raw[0], width),
        scale(raw[1], height),
        scale(raw[2], width),
        scale(raw[3], height),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOTAL: &str = "<|ref|>Total<|/ref|><|det|>[[100,200,300,400]]<|/det|>";

    #[test]
    fn single_box_scaled_to_page() {
        let d = extract_detections(TOTAL, 1000, 2000);
        assert_eq!(d, vec![Detection::new("Total", [100, 400, 300, 800])]);
    }

    #[test]
    fn full_scale_box_maps_to_page_bounds() {
        let text = "<|ref|>page<|/ref|><|det|>[[0,0,999,999]]<|/det|>";
        for (w, h) in [(1, 1), (640, 480), (1224, 1584), (4961, 7016)] {
            let d = extract_detections(text, w, h);
            assert_eq!(d[0].bbox, [0, 0, w, h], "{w}x{h}");
        }
    }

    #[test]
    fn flat_box_accepted() {
        let text = "<|ref|>Name<|/ref|><|det|>[0, 0, 999, 999]<|/det|>";
        let d = extract_detections(text, 100, 50);
        assert_eq!(d, vec![Detection::new("Name", [0, 0, 100, 50])]);
    }

    #[test]
    fn flat_list_of_five_numbers_skipped() {
        let text = format!("<|ref|>x<|/ref|><|det|>[1,2,3,4,5]<|/det|> {TOTAL}");
        let d = extract_detections(&text, 1000, 2000);
        assert_eq!(d, vec![Detection::new("Total", [100, 400, 300, 800])]);
        assert!(extract_detections("<|ref|>x<|/ref|><|det|>[1,2,3]<|/det|>", 999, 999).is_empty());
    }

    #[test]
    fn trailing_comma_accepted() {
        let d = extract_detections("<|ref|>x<|/ref|><|det|>[[10,20,30,40],]<|/det|>", 999, 999);
        assert_eq!(d, vec![Detection::new("x", [10, 20, 30, 40])]);
        let d = extract_detections("<|ref|>y<|/ref|><|det|>[10, 20, 30, 40, ]<|/det|>", 999, 999);
        assert_eq!(d, vec![Detection::new("y", [10, 20, 30, 40])]);
    }

    #[test]
    fn tuple_boxes_accepted() {
        let text = "<|ref|>x<|/ref|><|det|>[(1,2,3,4), (5, 6, 7, 8)]<|/det|>";
        let d = extract_detections(text, 999, 999);
        assert_eq!(d.len(), 2);
        assert_eq!(d[0].bbox, [1, 2, 3, 4]);
        assert_eq!(d[1].bbox, [5, 6, 7, 8]);
    }

    #[test]
    fn multiple_boxes_share_label() {
        let text = "<|ref|>Total<|/ref|><|det|>[[0,0,10,10], [20,20,30,30]]<|/det|>";
        let d = extract_detections(text, 999, 999);
        assert_eq!(d.len(), 2);
        assert!(d.iter().all(|d| d.label == "Total"));
        assert_eq!(d[1].bbox, [20, 20, 30, 30]);
    }

    #[test]
    fn malformed_block_skipped_siblings_kept() {
        let text = format!("<|ref|>Bad<|/ref|><|det|>[abc]<|/det|> then {TOTAL}");
        let d = extract_detections(&text, 1000, 2000);
        assert_eq!(d, vec![Detection::new("Total", [100, 400, 300, 800])]);
    }

    #[test]
    fn short_box_skipped_individually() {
        let text = "<|ref|>x<|/ref|><|det|>[[1,2,3], [0,0,999,999], [\"a\",1,2,3]]<|/det|>";
        let d = extract_detections(text, 10, 10);
        assert_eq!(d, vec![Detection::new("x", [0, 0, 10, 10])]);
    }

    #[test]
    fn empty_payload_yields_nothing() {
        let text = "<|ref|>a<|/ref|><|det|>[]<|/det|><|ref|>b<|/ref|><|det|>[0,0,999,999]<|/det|>";
        let d = extract_detections(text, 2, 2);
        assert_eq!(d, vec![Detection::new("b", [0, 0, 2, 2])]);
    }

    #[test]
    fn whitespace_between_tags_tolerated() {
        let text = "<|ref|> Invoice No <|/ref|>\n  <|det|> [[0, 0, 999, 999]] \n<|/det|>";
        let d = extract_detections(text, 10, 10);
        assert_eq!(d[0].label, "Invoice No");
    }

    #[test]
    fn blocks_in_arbitrary_positions() {
        let text = format!("Header\n{TOTAL}\nmiddle prose\n<|ref|>Date<|/ref|><|det|>[[0,0,1,1]]<|/det|> end");
        let d = extract_detections(&text, 1000, 2000);
        let labels: Vec<_> = d.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, ["Total", "Date"]);
    }

    #[test]
    fn no_markup_no_detections() {
        assert!(extract_detections("plain text [1,2,3,4]", 100, 100).is_empty());
        assert!(!has_detection_markup("plain text"));
        assert!(has_detection_markup(TOTAL));
    }

    #[test]
    fn negative_coordinates_clamp_to_zero() {
        assert_eq!(scale_box([-5.0, 10.0, 999.0, 999.0], 100, 100), [0, 1, 100, 100]);
    }

    #[test]
    fn clean_replaces_block_with_label() {
        assert_eq!(clean(TOTAL), "Total");
        assert_eq!(
            clean(&format!("Amount due: {TOTAL} $42")),
            "Amount due: Total $42"
        );
    }

    #[test]
    fn nested_payload_not_a_list_skipped() {
        let text = "<|ref|>a<|/ref|><|det|>[{\"x\": 1}]<|/det|>";
        assert!(extract_detections(text, 10, 10).is_empty());
    }

    #[test]
    fn clean_strips_grounding_marker() {
        assert_eq!(clean("<|grounding|>Hello"), "Hello");
    }

    #[test]
    fn display_text_falls_back_to_labels() {
        let only_markup = "<|ref|>A<|/ref|><|det|>[[0,0,1,1]]<|/det|>";
        let mut ds = extract_detections(only_markup, 10, 10);
        ds.push(Detection::new("B", [0, 0, 1, 1]));
        assert_eq!(display_text(only_markup, &ds), "A");
        assert_eq!(display_text("<|grounding|>", &ds), "A, B");
    }

    #[test]
    fn display_text_without_markup_is_unchanged() {
        assert_eq!(display_text("Just text", &[]), "Just text");
    }

    #[test]
    fn figure_placeholders_numbered_per_croppable_box() {
        let text = "Intro <|ref|>image<|/ref|><|det|>[[0,0,500,500],[10,10,10,10]]<|/det|> \
                    <|ref|>title<|/ref|><|det|>[[0,0,1,1]]<|/det|> \
                    <|ref|>image<|/ref|><|det|>[[500,500,999,999]]<|/det|>";
        let d = extract_detections(text, 100, 100);
        let out = display_text_with_figures(text, &d, 100, 100);
        assert_eq!(out, "Intro [IMAGE_0] title [IMAGE_1]");
    }

    #[test]
    fn figure_region_clamps_and_orders() {
        assert_eq!(figure_region([50, 60, 10, 20], 40, 100), Some((10, 20, 30, 40)));
        assert_eq!(figure_region([5, 5, 5, 9], 10, 10), None);
        assert_eq!(figure_region([20, 20, 30, 30], 10, 10), None);
    }
}
