//! HTML rendering: a standalone, styled document with one `<div class="page">`
//! per page.
//!
//! Page text takes one of three paths:
//!
//! 1. **Markdown-flavoured** (headings, emphasis, lists, links, fences,
//!    pipe tables) → rendered from [`parse_blocks`] with inline formatting.
//! 2. **Contains `<`** → assumed to be HTML already and passed through.
//! 3. **Anything else** → escaped, wrapped in `<p>` with `<br>` line breaks.
//!
//! Block-level HTML inside Markdown text is emitted as written. Link and
//! image targets with a scheme other than `http`, `https` or `data:image/`
//! are dropped, keeping only the link text.
//!
//! Figures are substituted last, so placeholders survive escaping intact.

use crate::export::blocks::{column_count, parse_blocks, Block};
use crate::export::{data_uri, substitute_figures, ExportPage, DOCUMENT_TITLE};
use once_cell::sync::Lazy;
use quick_xml::escape::escape;
use regex::{Captures, Regex};

const STYLE: &str = r#"
        body {
            font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif;
            max-width: 900px;
            margin: 40px auto;
            padding: 20px;
            line-height: 1.6;
            background-color: #f5f5f5;
        }
        .page {
            background: white;
            padding: 40px;
            margin-bottom: 30px;
            box-shadow: 0 2px 8px rgba(0,0,0,0.1);
            border-radius: 8px;
        }
        .page-header {
            color: #333;
            border-bottom: 2px solid #4CAF50;
            padding-bottom: 10px;
            margin-bottom: 20px;
        }
        .page-break { border: none; margin: 0; }
        table { border-collapse: collapse; width: 100%; margin: 20px 0; }
        th, td { border: 1px solid #ddd; padding: 12px; text-align: left; }
        th { background-color: #4CAF50; color: white; }
        tr:nth-child(even) { background-color: #f9f9f9; }
        img { max-width: 100%; height: auto; margin: 15px 0; border-radius: 4px; }
        code {
            background-color: #f4f4f4;
            padding: 2px 6px;
            border-radius: 3px;
            font-family: 'Courier New', monospace;
        }
        pre { background-color: #f4f4f4; padding: 15px; border-radius: 5px; overflow-x: auto; }
"#;

pub fn render(pages: &[ExportPage]) -> String {
    let mut html = String::with_capacity(4096);
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("    <meta charset=\"UTF-8\">\n");
    html.push_str(
        "    <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n",
    );
    html.push_str(&format!("    <title>{DOCUMENT_TITLE}</title>\n"));
    html.push_str(&format!("    <style>{STYLE}    </style>\n"));
    html.push_str("</head>\n<body>\n");
    html.push_str(&format!("    <h1>{DOCUMENT_TITLE}</h1>\n"));

    for (idx, page) in pages.iter().enumerate() {
        if idx > 0 {
            html.push_str("    <hr class=\"page-break\">\n");
        }
        html.push_str("    <div class=\"page\">\n");
        html.push_str(&format!(
            "        <h2 class=\"page-header\">Page {}</h2>\n",
            idx + 1
        ));
        html.push_str(&render_page(page));
        html.push_str("\n    </div>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn render_page(page: &ExportPage) -> String {
    let body = if is_markdown(&page.text) {
        render_blocks(&parse_blocks(&page.text))
    } else if page.text.contains('<') {
        page.text.clone()
    } else if page.text.is_empty() {
        String::new()
    } else {
        format!("<p>{}</p>", escape(page.text.as_str()).replace('\n', "<br>"))
    };

    substitute_figures(&body, &page.images, |i, payload| {
        Ok(format!(
            "<img src=\"{}\" alt=\"Image {}\" />",
            data_uri(i, payload)?,
            i + 1
        ))
    })
}

// ── Markdown detection ───────────────────────────────────────────────────

static RE_MARKDOWN_CUES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?m)^#+\s",          // headings
        r"|\*\*.*\*\*",        // bold
        r"|\*.*\*",            // italic
        r"|^[*+-]\s",          // bullets
        r"|^\d+\.\s",          // numbered lists
        r"|\[.*\]\(.*\)",      // links
        r"|```",               // fences
        r"|^\s*\|.*\|.*\|",    // pipe tables
    ))
    .unwrap()
});

/// Whether `text` carries Markdown cues worth rendering.
pub fn is_markdown(text: &str) -> bool {
    RE_MARKDOWN_CUES.is_match(text)
}

// ── Block rendering ──────────────────────────────────────────────────────

fn render_blocks(blocks: &[Block]) -> String {
    blocks
        .iter()
        .map(render_block)
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_block(block: &Block) -> String {
    match block {
        Block::Heading { level, text } => format!("<h{level}>{}</h{level}>", inline(text)),
        Block::Paragraph(text) => format!("<p>{}</p>", inline(text)),
        Block::Code(code) => format!("<pre><code>{}</code></pre>", escape(code.as_str())),
        Block::Rule => "<hr>".to_string(),
        // Kept as a placeholder; figures are substituted after rendering.
        Block::Image(i) => format!("<p>{}</p>", crate::export::placeholder(*i)),
        Block::List { ordered, items } => {
            let tag = if *ordered { "ol" } else { "ul" };
            let items: String = items
                .iter()
                .map(|item| format!("<li>{}</li>", inline(item)))
                .collect();
            format!("<{tag}>{items}</{tag}>")
        }
        Block::Table(rows) => render_table(rows),
        Block::Html(html) => html.clone(),
    }
}

fn render_table(rows: &[Vec<String>]) -> String {
    let cols = column_count(rows);
    let row_html = |row: &Vec<String>, cell: &str| -> String {
        let cells: String = (0..cols)
            .map(|j| {
                let text = row.get(j).map(|c| inline(c)).unwrap_or_default();
                format!("<{cell}>{text}</{cell}>")
            })
            .collect();
        format!("<tr>{cells}</tr>")
    };

    let mut html = String::from("<table>\n");
    if let Some((header, body)) = rows.split_first() {
        html.push_str(&format!("<thead>{}</thead>\n", row_html(header, "th")));
        if !body.is_empty() {
            let body: String = body.iter().map(|r| row_html(r, "td")).collect();
            html.push_str(&format!("<tbody>{body}</tbody>\n"));
        }
    }
    html.push_str("</table>");
    html
}

// ── Inline formatting ────────────────────────────────────────────────────

static RE_CODE_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").unwrap());
static RE_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)\s]+)\)").unwrap());
static RE_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]\(([^)\s]+)\)").unwrap());
static RE_BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*|__(.+?)__").unwrap());
static RE_ITALIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*\s][^*]*?)\*").unwrap());

/// Escape `text` and apply inline Markdown (code, images, links, bold, italic).
fn inline(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in RE_CODE_SPAN.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&emphasis(&text[last..whole.start()]));
        out.push_str(&format!("<code>{}</code>", escape(&caps[1])));
        last = whole.end();
    }
    out.push_str(&emphasis(&text[last..]));
    out
}

fn emphasis(text: &str) -> String {
    let s = escape(text);
    let s = RE_IMAGE.replace_all(&s, |caps: &Captures| {
        if safe_url(&caps[2]) {
            format!(r#"<img src="{}" alt="{}" />"#, &caps[2], &caps[1])
        } else {
            caps[1].to_string()
        }
    });
    let s = RE_LINK.replace_all(&s, |caps: &Captures| {
        if safe_url(&caps[2]) {
            format!(r#"<a href="{}">{}</a>"#, &caps[2], &caps[1])
        } else {
            caps[1].to_string()
        }
    });
    let s = RE_BOLD.replace_all(&s, "<strong>$1$2</strong>");
    RE_ITALIC.replace_all(&s, "<em>$1</em>").into_owned()
}

/// Relative targets and `http`, `https` or `data:image/` URLs.
fn safe_url(url: &str) -> bool {
    let lower = url.trim().to_ascii_lowercase();
    match lower.split_once(':') {
        None => true,
        // A colon after a path, query or fragment starts no scheme.
        Some((scheme, _)) if scheme.contains(['/', '?', '#']) => true,
        Some((scheme, rest)) => {
            matches!(scheme, "http" | "https") || (scheme == "data" && rest.starts_with("image/"))
        }
    }
}
