//! Instruction compilation for the recognition engine.
//!
//! Every mode maps to one fixed instruction template. Centralising them here
//! keeps [`compile_instruction`] a pure function: same request in, same
//! string out, no I/O and no failure path. Unknown modes fall back to
//! [`GENERIC_INSTRUCTION`].
//!
//! Layout of a compiled instruction, one part per line:
//!
//! ```text
//! <image>
//! <|grounding|>          (only when grounding is effective)
//! <mode instruction>[\n<caption suffix>]
//! ```

use crate::request::{ExtractionMode, ExtractionRequest};

/// Placeholder token the engine replaces with the page image.
pub const IMAGE_TOKEN: &str = "<image>";

/// Marker asking the engine to emit `<|ref|>…<|det|>` tags.
pub const GROUNDING_TOKEN: &str = "<|grounding|>";

/// Instruction for unknown modes and an empty `freeform` prompt.
pub const GENERIC_INSTRUCTION: &str = "OCR this image.";

/// Appended when a caption is requested (never for `describe`).
pub const CAPTION_SUFFIX: &str = "Then add a one-paragraph description of the image.";

/// Search term used by `find_ref` when none is supplied.
pub const DEFAULT_FIND_TERM: &str = "Total";

/// Schema used by `kv_json` when none is supplied.
pub const DEFAULT_SCHEMA: &str = "{}";

/// Compile the instruction string handed to the recognition engine.
pub fn compile_instruction(request: &ExtractionRequest) -> String {
    let mut parts: Vec<String> = vec![IMAGE_TOKEN.to_string()];
    if request.effective_grounding() {
        parts.push(GROUNDING_TOKEN.to_string());
    }

    let mut instruction = mode_instruction(request);
    if request.include_caption && request.mode != ExtractionMode::Describe {
        instruction.push('\n');
        instruction.push_str(CAPTION_SUFFIX);
    }

    parts.push(instruction);
    parts.join("\n")
}

fn mode_instruction(request: &ExtractionRequest) -> String {
    match &request.mode {
        ExtractionMode::PlainOcr => "Free OCR.".to_string(),
        ExtractionMode::Markdown => "Convert the document to markdown.".to_string(),
        ExtractionMode::TablesCsv => "Extract every table and output CSV only. \
            Use commas, minimal quoting. If multiple tables, separate with a line containing '---'."
            .to_string(),
        ExtractionMode::TablesMd => {
            "Extract every table as GitHub-flavored Markdown tables. Output only the tables."
                .to_string()
        }
        ExtractionMode::KvJson => {
            let schema = trimmed_or(request.schema.as_deref(), DEFAULT_SCHEMA);
            format!(
                "Extract key fields and return strict JSON only. \
                 Use this schema (fill the values): {schema}"
            )
        }
        ExtractionMode::FigureChart => "Parse the figure. First extract any numeric series as a \
            two-column table (x,y). Then summarize the chart in 2 sentences. \
            Output the table, then a line '---', then the summary."
            .to_string(),
        ExtractionMode::FindRef => {
            let key = trimmed_or(request.find_term.as_deref(), DEFAULT_FIND_TERM);
            format!("Locate <|ref|>{key}<|/ref|> in the image.")
        }
        ExtractionMode::LayoutMap => r#"Return a JSON array of blocks with fields {"type":["title","paragraph","table","figure"],"box":[x1,y1,x2,y2]}. Do not include any text content."#
            .to_string(),
        ExtractionMode::PiiRedact => "Find all occurrences of emails, phone numbers, postal \
            addresses, and IBANs. Return a JSON array of objects {label, text, box:[x1,y1,x2,y2]}."
            .to_string(),
        ExtractionMode::Multilingual => {
            "Free OCR. Detect the language automatically and output in the same script."
                .to_string()
        }
        ExtractionMode::Describe => {
            "Describe this image. Focus on visible key elements.".to_string()
        }
        ExtractionMode::Freeform => trimmed_or(Some(request.prompt.as_str()), GENERIC_INSTRUCTION),
        ExtractionMode::Other(_) => GENERIC_INSTRUCTION.to_string(),
    }
}

fn trimmed_or(value: Option<&str>, default: &str) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => default.to_string(),
    }
}

/// System prompt for vision-LLM engines that do not natively speak the
/// grounding grammar. The compiled instruction is sent as the user turn.
pub const VLM_SYSTEM_PROMPT: &str = r#"You are a document OCR engine. You receive one page image and one instruction.

Follow these rules precisely:

1. Follow the instruction exactly; output only what it asks for.
2. Preserve the reading order a human would use on the page.
3. If the instruction contains <|grounding|>, tag every element you locate as
   <|ref|>LABEL<|/ref|><|det|>[[x1, y1, x2, y2]]<|/det|>
   - Coordinates are integers on a 0–999 scale for both axes, regardless of
     the image size: (0, 0) is the top-left corner, (999, 999) the bottom-right.
   - One element may have several boxes: [[x1, y1, x2, y2], [x1, y1, x2, y2]].
   - Use the label "image" for figures, photos and charts.
4. Do NOT wrap the output in code fences.
5. Do NOT add commentary or explanations."#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_ocr_without_grounding() {
        let s = compile_instruction(&ExtractionRequest::new("plain_ocr"));
        assert_eq!(s, "<image>\nFree OCR.");
    }

    #[test]
    fn grounding_flag_adds_marker() {
        let s = compile_instruction(&ExtractionRequest::new("markdown").grounding(true));
        assert_eq!(
            s,
            "<image>\n<|grounding|>\nConvert the document to markdown."
        );
    }

    #[test]
    fn grounding_modes_force_marker() {
        for mode in ["find_ref", "layout_map", "pii_redact"] {
            let s = compile_instruction(&ExtractionRequest::new(mode));
            assert!(s.contains(GROUNDING_TOKEN), "{mode}: {s}");
        }
    }

    #[test]
    fn find_ref_defaults_to_total() {
        let s = compile_instruction(&ExtractionRequest::new("find_ref"));
        assert!(s.ends_with("Locate <|ref|>Total<|/ref|> in the image."), "{s}");

        let blank = compile_instruction(&ExtractionRequest::new("find_ref").find_term("   "));
        assert!(blank.contains("<|ref|>Total<|/ref|>"));
    }

    #[test]
    fn find_ref_trims_term() {
        let s = compile_instruction(&ExtractionRequest::new("find_ref").find_term("  Invoice No "));
        assert!(s.contains("<|ref|>Invoice No<|/ref|>"), "{s}");
    }

    #[test]
    fn kv_json_defaults_to_empty_object() {
        let s = compile_instruction(&ExtractionRequest::new("kv_json"));
        assert!(s.ends_with("Use this schema (fill the values): {}"), "{s}");
    }

    #[test]
    fn kv_json_interpolates_trimmed_schema() {
        let s = compile_instruction(
            &ExtractionRequest::new("kv_json").schema("\n {\"total\": \"\"} \n"),
        );
        assert!(s.ends_with(r#"(fill the values): {"total": ""}"#), "{s}");
    }

    #[test]
    fn freeform_uses_prompt_or_default() {
        let s = compile_instruction(&ExtractionRequest::new("freeform").prompt(" Read the stamp. "));
        assert_eq!(s, "<image>\nRead the stamp.");

        let empty = compile_instruction(&ExtractionRequest::new("freeform"));
        assert_eq!(empty, "<image>\nOCR this image.");
    }

    #[test]
    fn unknown_mode_falls_back() {
        let s = compile_instruction(&ExtractionRequest::new("haiku"));
        assert_eq!(s, "<image>\nOCR this image.");
    }

    #[test]
    fn caption_suffix_skipped_for_describe() {
        let with = compile_instruction(&ExtractionRequest::new("markdown").include_caption(true));
        assert!(with.ends_with(&format!("markdown.\n{CAPTION_SUFFIX}")), "{with}");

        let describe =
            compile_instruction(&ExtractionRequest::new("describe").include_caption(true));
        assert!(!describe.contains(CAPTION_SUFFIX));
    }

    #[test]
    fn compilation_is_deterministic() {
        let req = ExtractionRequest::new("tables_csv").include_caption(true);
        assert_eq!(compile_instruction(&req), compile_instruction(&req));
    }
}
