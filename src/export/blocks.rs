//! Cue-based structural reading of page text.
//!
//! Nothing guarantees the engine's Markdown is well-formed, so the reader
//! works from simple line cues and never fails:
//!
//! - Fenced code (```` ``` ````) is collected first and may span blank lines.
//! - Other text is split into paragraphs on blank lines.
//! - A paragraph with more than two `|` characters is a table: separator
//!   rows are dropped, cells are split on `|` and empty cells discarded.
//!   The first surviving row is the header.
//! - Lines starting with 1–3 `#` are headings; a line holding only an
//!   `[IMAGE_i]` placeholder is a figure.
//! - `-`/`*`/`+` and `1.` lines form lists; `---` is a horizontal rule.
//! - A paragraph opening with a block-level HTML tag (`<table>`, `<div>`,
//!   …) is kept verbatim as raw HTML.

use crate::export::standalone_placeholder;
use crate::pipeline::postprocess::is_separator_row;
use once_cell::sync::Lazy;
use quick_xml::escape::unescape;
use regex::Regex;

/// One structural element of a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading { level: u8, text: String },
    /// Rows of cells; row 0 is the header. Rows may be ragged.
    Table(Vec<Vec<String>>),
    Code(String),
    List { ordered: bool, items: Vec<String> },
    /// Figure placeholder on a line of its own.
    Image(usize),
    Rule,
    Paragraph(String),
    /// Block-level HTML, kept as written.
    Html(String),
}

/// Widest row of a table.
pub fn column_count(rows: &[Vec<String>]) -> usize {
    rows.iter().map(Vec::len).max().unwrap_or(0)
}

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#{1,3})\s+(.*\S)\s*$").unwrap());
static RE_BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-*+]\s+(.*)$").unwrap());
static RE_ORDERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+[.)]\s+(.*)$").unwrap());
static RE_RULE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:-{3,}|\*{3,}|_{3,})$").unwrap());
static RE_HTML_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^<(?:table|div|p|ul|ol|pre|h[1-6]|img)[\s>/]").unwrap());
static RE_HTML_BREAK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(?:p|div|tr|li|pre|ul|ol|table|h[1-6])\s*>").unwrap()
});
static RE_HTML_CELL_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</t[dh]\s*>").unwrap());
static RE_HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

/// Plain text of an HTML fragment: block ends become line breaks, table
/// cells are separated by spaces, entities are decoded.
pub fn html_text(html: &str) -> String {
    let s = RE_HTML_BREAK.replace_all(html, "\n");
    let s = RE_HTML_CELL_END.replace_all(&s, " ");
    let s = RE_HTML_TAG.replace_all(&s, "");
    let decoded = unescape(&s).map(|c| c.into_owned()).unwrap_or_else(|_| s.to_string());
    decoded
        .lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Read `text` into blocks, in order.
pub fn parse_blocks(text: &str) -> Vec<Block> {
    let mut out = Collector::default();
    let mut paragraph: Vec<&str> = Vec::new();
    let mut lines = text.lines();

    while let Some(line) = lines.next() {
        let trimmed = line.trim();

        if let Some(rest) = trimmed.strip_prefix("```") {
            out.paragraph(&paragraph);
            paragraph.clear();

            // ```inline code``` on one line
            if let Some(inner) = rest.strip_suffix("```") {
                out.blocks.push(Block::Code(inner.trim().to_string()));
                continue;
            }
            let mut code = Vec::new();
            for inner in lines.by_ref() {
                if inner.trim_start().starts_with("```") {
                    break;
                }
                code.push(inner);
            }
            out.blocks.push(Block::Code(code.join("\n")));
            continue;
        }

        if trimmed.is_empty() {
            out.paragraph(&paragraph);
            paragraph.clear();
        } else {
            paragraph.push(line);
        }
    }
    out.paragraph(&paragraph);
    out.blocks
}

fn heading(line: &str) -> Option<Block> {
    let caps = RE_HEADING.captures(line.trim())?;
    Some(Block::Heading {
        level: caps[1].len() as u8,
        text: caps[2].to_string(),
    })
}

fn parse_table(lines: &[&str]) -> Option<Vec<Vec<String>>> {
    let rows: Vec<Vec<String>> = lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty() && !is_separator_row(l))
        .map(|l| {
            l.split('|')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(String::from)
                .collect::<Vec<_>>()
        })
        .filter(|cells| !cells.is_empty())
        .collect();
    (!rows.is_empty()).then_some(rows)
}

#[derive(Default)]
struct Collector {
    blocks: Vec<Block>,
    text: Vec<String>,
    list: Option<(bool, Vec<String>)>,
}

impl Collector {
    fn paragraph(&mut self, lines: &[&str]) {
        if lines.is_empty() {
            return;
        }

        // Leading headings belong to the paragraph only by adjacency.
        let mut rest = lines;
        while let Some((first, tail)) = rest.split_first() {
            match heading(first) {
                Some(h) => {
                    self.blocks.push(h);
                    rest = tail;
                }
                None => break,
            }
        }

        if rest
            .first()
            .is_some_and(|l| RE_HTML_BLOCK.is_match(l.trim_start()))
        {
            self.blocks.push(Block::Html(rest.join("\n").trim().to_string()));
            return;
        }

        let pipes: usize = rest.iter().map(|l| l.matches('|').count()).sum();
        if pipes > 2 {
            if let Some(rows) = parse_table(rest) {
                self.blocks.push(Block::Table(rows));
            }
            return;
        }

        for line in rest {
            self.line(line.trim());
        }
        self.flush();
    }

    fn line(&mut self, line: &str) {
        if let Some(h) = heading(line) {
            self.flush();
            self.blocks.push(h);
        } else if let Some(index) = standalone_placeholder(line) {
            self.flush();
            self.blocks.push(Block::Image(index));
        } else if RE_RULE.is_match(line) {
            self.flush();
            self.blocks.push(Block::Rule);
        } else if let Some(caps) = RE_BULLET.captures(line) {
            self.list_item(false, &caps[1]);
        } else if let Some(caps) = RE_ORDERED.captures(line) {
            self.list_item(true, &caps[1]);
        } else {
            self.flush_list();
            self.text.push(line.to_string());
        }
    }

    fn list_item(&mut self, ordered: bool, item: &str) {
        self.flush_text();
        if self.list.as_ref().is_some_and(|(o, _)| *o != ordered) {
            self.flush_list();
        }
        self.list
            .get_or_insert_with(|| (ordered, Vec::new()))
            .1
            .push(item.trim().to_string());
    }

    fn flush_text(&mut self) {
        if !self.text.is_empty() {
            self.blocks
                .push(Block::Paragraph(std::mem::take(&mut self.text).join("\n")));
        }
    }

    fn flush_list(&mut self) {
        if let Some((ordered, items)) = self.list.take() {
            self.blocks.push(Block::List { ordered, items });
        }
    }

    fn flush(&mut self) {
        self.flush_text();
        self.flush_list();
    }
}
