//! Post-processing: deterministic tidy-up of page text before export.
//!
//! ## Why is post-processing necessary?
//!
//! Recognition output is *semantically* fine but often *structurally* noisy:
//!
//! - Wrapping output in ` ```markdown ... ``` ` fences although nobody asked
//! - Windows-style `\r\n` line endings and trailing spaces
//! - LaTeX colon-equals macros (`\coloneqq`) that Markdown renderers and
//!   word processors show verbatim
//! - Zero-width characters that break heading and table detection
//!
//! Each rule below is a pure `&str → String` function and independently
//! testable. Display text in [`crate::output::PageResult`] is left untouched;
//! these rules run only on the way into an exported document.
//!
//! ## Rule Order
//!
//! Line endings are normalised before trimming, fences are stripped before
//! anything looks at the first line, and blank-line collapsing runs last so
//! that lines emptied by earlier rules are collapsed too.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all tidy rules to one page of text.
///
/// Rules (applied in order):
/// 1. Strip outer markdown fences
/// 2. Normalise line endings (CRLF → LF)
/// 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, etc.)
/// 4. Trim trailing whitespace per line
/// 5. Replace `\coloneqq` / `\eqqcolon` with `:=` / `=:`
/// 6. Collapse runs of blank lines to a single blank line
pub fn tidy_text(input: &str) -> String {
    let s = strip_markdown_fences(input);
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = normalise_latex_colons(&s);
    collapse_blank_lines(&s).trim().to_string()
}

// ── Rule 1: Strip outer markdown fences ──────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?\r?\n(.*)\r?\n```\s*$").unwrap());

fn strip_markdown_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: LaTeX colon-equals ───────────────────────────────────────────────

fn normalise_latex_colons(input: &str) -> String {
    input.replace(r"\coloneqq", ":=").replace(r"\eqqcolon", "=:")
}

// ── Rule 6: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Shared table helpers ─────────────────────────────────────────────────────

/// A row made only of `|`, `-`, `:` and whitespace (a GFM header separator,
/// with or without pipes).
pub fn is_separator_row(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty()
        && trimmed
            .chars()
            .all(|c| c == '|' || c == '-' || c == ':' || c.is_whitespace())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fences() {
        let input = "```markdown\n# Hello\n\nWorld\n```";
        assert_eq!(strip_markdown_fences(input), "# Hello\n\nWorld");
    }

    #[test]
    fn test_inner_code_fence_kept() {
        let input = "Text\n```\ncode\n```";
        assert_eq!(strip_markdown_fences(input), input);
    }

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_trim_trailing_whitespace() {
        assert_eq!(trim_trailing_whitespace("a  \nb\t"), "a\nb");
    }

    #[test]
    fn test_latex_colons() {
        assert_eq!(
            normalise_latex_colons(r"$x \coloneqq 1$ and $y \eqqcolon z$"),
            "$x := 1$ and $y =: z$"
        );
    }

    #[test]
    fn test_remove_invisible() {
        assert_eq!(remove_invisible_chars("a\u{200B}b\u{FEFF}c"), "abc");
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\nb"), "a\n\nb");
        assert_eq!(collapse_blank_lines("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_separator_row() {
        assert!(is_separator_row("|---|:---:|"));
        assert!(is_separator_row(" | - | - | "));
        assert!(!is_separator_row("| a | b |"));
        assert!(is_separator_row("---"));
        assert!(is_separator_row(":--: ---"));
        assert!(!is_separator_row("- item"));
        assert!(!is_separator_row("   "));
    }

    #[test]
    fn test_tidy_full_pipeline() {
        let input = "```markdown\r\n# Title  \r\n\r\n\r\n\r\nBody \u{200B}\r\n```";
        assert_eq!(tidy_text(input), "# Title\n\nBody");
    }
}
