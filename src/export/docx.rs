//! DOCX rendering: WordprocessingML written straight into a zip package.
//!
//! ## Package Layout
//!
//! ```text
//! [Content_Types].xml
//! _rels/.rels
//! word/document.xml            body: title, pages, page breaks
//! word/styles.xml              Normal (Calibri 11pt), Title, Heading1–3
//! word/_rels/document.xml.rels styles + one entry per picture
//! word/media/imageN.{png,jpeg}
//! ```
//!
//! Only the handful of parts Word needs to open the file are written; no
//! theme, settings or numbering parts. Lists are plain indented paragraphs.
//!
//! ## Figures
//!
//! A figure is embedded where its placeholder stands on its own line, after
//! the paragraph when the placeholder is inline, and at the end of the page
//! when the text never references it. Pictures are 5 inches wide with the
//! height following the image's aspect ratio.

use crate::error::OcrError;
use crate::export::blocks::{column_count, html_text, parse_blocks, Block};
use crate::export::{decode_figure, referenced_figures, ExportPage, DOCUMENT_TITLE};
use crate::pipeline::encode::png_bytes;
use image::ImageFormat;
use once_cell::sync::Lazy;
use quick_xml::escape::escape;
use regex::Regex;
use std::io::{Cursor, Write};
use tracing::{debug, warn};
use zip::write::FileOptions;

/// Picture width: 5 inches in English Metric Units.
const PICTURE_WIDTH_EMU: u64 = 5 * 914_400;

/// Usable text width of a Letter page with 1" margins, in twentieths of a point.
const TEXT_WIDTH_TWIPS: u32 = 9_360;

const NS_W: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_WP: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";
const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const NS_PIC: &str = "http://schemas.openxmlformats.org/drawingml/2006/picture";
const REL_IMAGE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

pub fn render(pages: &[ExportPage]) -> Result<Vec<u8>, OcrError> {
    let mut doc = DocumentBuilder::default();
    doc.title(DOCUMENT_TITLE);

    for (idx, page) in pages.iter().enumerate() {
        doc.heading(1, &format!("Page {}", idx + 1));
        doc.page(page);
        if idx + 1 < pages.len() {
            doc.page_break();
        }
    }

    debug!(
        "DOCX: {} page(s), {} picture(s)",
        pages.len(),
        doc.media.len()
    );
    doc.package()
}

// ── Document body ────────────────────────────────────────────────────────

struct Media {
    name: String,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct DocumentBuilder {
    body: String,
    media: Vec<Media>,
}

static RE_INLINE_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\[IMAGE_\d+\]\s*").unwrap());

impl DocumentBuilder {
    fn page(&mut self, page: &ExportPage) {
        let mut placed = vec![false; page.images.len()];
        let mut place = |doc: &mut Self, index: usize| {
            if let (Some(payload), Some(done)) = (page.images.get(index), placed.get_mut(index)) {
                if !*done {
                    *done = true;
                    if let Err(e) = doc.picture(index, payload) {
                        warn!("Skipping figure in DOCX: {e}");
                    }
                }
            }
        };

        for block in parse_blocks(&page.text) {
            match block {
                Block::Image(index) => place(self, index),
                Block::Paragraph(text) => {
                    let refs = referenced_figures(&text);
                    if refs.is_empty() {
                        self.paragraph(&text);
                    } else {
                        let stripped = RE_INLINE_PLACEHOLDER.replace_all(&text, " ");
                        if !stripped.trim().is_empty() {
                            self.paragraph(stripped.trim());
                        }
                        for index in refs {
                            place(self, index);
                        }
                    }
                }
                other => self.block(&other),
            }
        }

        for index in 0..page.images.len() {
            place(self, index);
        }
    }

    fn block(&mut self, block: &Block) {
        match block {
            Block::Heading { level, text } => self.heading(*level, text),
            Block::Paragraph(text) => self.paragraph(text),
            Block::Code(code) => self.code(code),
            Block::Table(rows) => self.table(rows),
            Block::List { ordered, items } => {
                for (i, item) in items.iter().enumerate() {
                    let marker = if *ordered {
                        format!("{}.", i + 1)
                    } else {
                        "\u{2022}".to_string()
                    };
                    self.body.push_str(&format!(
                        "<w:p><w:pPr><w:ind w:left=\"720\" w:hanging=\"360\"/></w:pPr>{}</w:p>",
                        run(&format!("{marker} {item}"), "")
                    ));
                }
            }
            Block::Rule => self.body.push_str(
                "<w:p><w:pPr><w:pBdr><w:bottom w:val=\"single\" w:sz=\"6\" w:space=\"1\" w:color=\"auto\"/></w:pBdr></w:pPr></w:p>",
            ),
            Block::Image(_) => {}
            Block::Html(html) => {
                let text = html_text(html);
                if !text.is_empty() {
                    self.paragraph(&text);
                }
            }
        }
    }

    fn title(&mut self, text: &str) {
        self.body.push_str(&format!(
            "<w:p><w:pPr><w:pStyle w:val=\"Title\"/><w:jc w:val=\"center\"/></w:pPr>{}</w:p>",
            run(text, "")
        ));
    }

    fn heading(&mut self, level: u8, text: &str) {
        let level = level.clamp(1, 3);
        self.body.push_str(&format!(
            "<w:p><w:pPr><w:pStyle w:val=\"Heading{level}\"/></w:pPr>{}</w:p>",
            run(text, "")
        ));
    }

    fn paragraph(&mut self, text: &str) {
        self.body
            .push_str(&format!("<w:p>{}</w:p>", run(text.trim(), "")));
    }

    fn code(&mut self, code: &str) {
        let props = "<w:rFonts w:ascii=\"Courier New\" w:hAnsi=\"Courier New\" w:cs=\"Courier New\"/><w:sz w:val=\"20\"/>";
        self.body.push_str(&format!("<w:p>{}</w:p>", run(code, props)));
    }

    fn page_break(&mut self) {
        self.body
            .push_str("<w:p><w:r><w:br w:type=\"page\"/></w:r></w:p>");
    }

    fn table(&mut self, rows: &[Vec<String>]) {
        let cols = column_count(rows);
        if cols == 0 {
            return;
        }
        let col_width = TEXT_WIDTH_TWIPS / cols as u32;

        self.body.push_str("<w:tbl><w:tblPr><w:tblW w:w=\"0\" w:type=\"auto\"/><w:tblBorders>");
        for edge in ["top", "left", "bottom", "right", "insideH", "insideV"] {
            self.body.push_str(&format!(
                "<w:{edge} w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"auto\"/>"
            ));
        }
        self.body.push_str("</w:tblBorders></w:tblPr><w:tblGrid>");
        for _ in 0..cols {
            self.body
                .push_str(&format!("<w:gridCol w:w=\"{col_width}\"/>"));
        }
        self.body.push_str("</w:tblGrid>");

        for (i, row) in rows.iter().enumerate() {
            let props = if i == 0 { "<w:b/>" } else { "" };
            self.body.push_str("<w:tr>");
            for j in 0..cols {
                let text = row.get(j).map(String::as_str).unwrap_or("");
                self.body.push_str(&format!(
                    "<w:tc><w:tcPr><w:tcW w:w=\"{col_width}\" w:type=\"dxa\"/></w:tcPr><w:p>{}</w:p></w:tc>",
                    run(text, props)
                ));
            }
            self.body.push_str("</w:tr>");
        }
        self.body.push_str("</w:tbl>");
    }

    /// Embed figure `index`; undecodable payloads are reported, not embedded.
    fn picture(&mut self, index: usize, payload: &str) -> Result<(), OcrError> {
        let bytes = decode_figure(index, payload)?;
        let unsupported = |e: image::ImageError| OcrError::UnsupportedContent {
            detail: format!("figure {} cannot be decoded: {e}", index + 1),
        };
        let format = image::guess_format(&bytes).map_err(unsupported)?;
        let image = image::load_from_memory_with_format(&bytes, format).map_err(unsupported)?;
        let (w, h) = (image.width().max(1), image.height().max(1));

        let (ext, bytes) = match format {
            ImageFormat::Png => ("png", bytes),
            ImageFormat::Jpeg => ("jpeg", bytes),
            _ => ("png", png_bytes(&image.to_rgb8())?),
        };

        let n = self.media.len() + 1;
        let rel_id = format!("rIdImage{n}");
        self.media.push(Media {
            name: format!("image{n}.{ext}"),
            bytes,
        });

        let cx = PICTURE_WIDTH_EMU;
        let cy = PICTURE_WIDTH_EMU * u64::from(h) / u64::from(w);
        self.body.push_str(&format!(
            "<w:p><w:r><w:drawing><wp:inline distT=\"0\" distB=\"0\" distL=\"0\" distR=\"0\">\
             <wp:extent cx=\"{cx}\" cy=\"{cy}\"/>\
             <wp:docPr id=\"{n}\" name=\"Picture {n}\"/>\
             <wp:cNvGraphicFramePr><a:graphicFrameLocks xmlns:a=\"{NS_A}\" noChangeAspect=\"1\"/></wp:cNvGraphicFramePr>\
             <a:graphic xmlns:a=\"{NS_A}\"><a:graphicData uri=\"{NS_PIC}\">\
             <pic:pic xmlns:pic=\"{NS_PIC}\">\
             <pic:nvPicPr><pic:cNvPr id=\"{n}\" name=\"image{n}.{ext}\"/><pic:cNvPicPr/></pic:nvPicPr>\
             <pic:blipFill><a:blip r:embed=\"{rel_id}\"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>\
             <pic:spPr><a:xfrm><a:off x=\"0\" y=\"0\"/><a:ext cx=\"{cx}\" cy=\"{cy}\"/></a:xfrm>\
             <a:prstGeom prst=\"rect\"><a:avLst/></a:prstGeom></pic:spPr>\
             </pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing></w:r></w:p>"
        ));
        Ok(())
    }

    // ── Packaging ────────────────────────────────────────────────────────

    fn document_xml(&self) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
             <w:document xmlns:w=\"{NS_W}\" xmlns:r=\"{NS_R}\" xmlns:wp=\"{NS_WP}\">\
             <w:body>{}<w:sectPr><w:pgSz w:w=\"12240\" w:h=\"15840\"/>\
             <w:pgMar w:top=\"1440\" w:right=\"1440\" w:bottom=\"1440\" w:left=\"1440\" w:header=\"720\" w:footer=\"720\" w:gutter=\"0\"/>\
             </w:sectPr></w:body></w:document>",
            self.body
        )
    }

    fn document_rels(&self) -> String {
        let mut rels = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
             <Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\
             <Relationship Id=\"rIdStyles\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles\" Target=\"styles.xml\"/>",
        );
        for (i, media) in self.media.iter().enumerate() {
            rels.push_str(&format!(
                "<Relationship Id=\"rIdImage{}\" Type=\"{REL_IMAGE}\" Target=\"media/{}\"/>",
                i + 1,
                media.name
            ));
        }
        rels.push_str("</Relationships>");
        rels
    }

    fn package(self) -> Result<Vec<u8>, OcrError> {
        let zip_err = |e: zip::result::ZipError| OcrError::Internal(format!("DOCX packaging: {e}"));
        let io_err = |e: std::io::Error| OcrError::Internal(format!("DOCX packaging: {e}"));

        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let deflated = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        let parts = [
            ("[Content_Types].xml", CONTENT_TYPES.to_string()),
            ("_rels/.rels", PACKAGE_RELS.to_string()),
            ("word/document.xml", self.document_xml()),
            ("word/styles.xml", STYLES.to_string()),
            ("word/_rels/document.xml.rels", self.document_rels()),
        ];
        for (name, xml) in parts {
            zip.start_file(name, deflated).map_err(zip_err)?;
            zip.write_all(xml.as_bytes()).map_err(io_err)?;
        }
        for media in &self.media {
            zip.start_file(format!("word/media/{}", media.name), deflated)
                .map_err(zip_err)?;
            zip.write_all(&media.bytes).map_err(io_err)?;
        }

        Ok(zip.finish().map_err(zip_err)?.into_inner())
    }
}

/// One run per line, joined by line breaks. `props` is inner `w:rPr` XML.
fn run(text: &str, props: &str) -> String {
    let rpr = if props.is_empty() {
        String::new()
    } else {
        format!("<w:rPr>{props}</w:rPr>")
    };
    let lines: Vec<String> = text
        .split('\n')
        .map(|line| format!("<w:t xml:space=\"preserve\">{}</w:t>", escape(line)))
        .collect();
    format!("<w:r>{rpr}{}</w:r>", lines.join("<w:br/>"))
}

// ── Static parts ─────────────────────────────────────────────────────────

const CONTENT_TYPES: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
<Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>\
<Default Extension=\"xml\" ContentType=\"application/xml\"/>\
<Default Extension=\"png\" ContentType=\"image/png\"/>\
<Default Extension=\"jpeg\" ContentType=\"image/jpeg\"/>\
<Override PartName=\"/word/document.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml\"/>\
<Override PartName=\"/word/styles.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml\"/>\
</Types>";

const PACKAGE_RELS: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\
<Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument\" Target=\"word/document.xml\"/>\
</Relationships>";

const STYLES: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
<w:styles xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
<w:docDefaults><w:rPrDefault><w:rPr>\
<w:rFonts w:ascii=\"Calibri\" w:hAnsi=\"Calibri\" w:cs=\"Calibri\"/><w:sz w:val=\"22\"/>\
</w:rPr></w:rPrDefault><w:pPrDefault><w:pPr><w:spacing w:after=\"160\" w:line=\"259\" w:lineRule=\"auto\"/></w:pPr></w:pPrDefault></w:docDefaults>\
<w:style w:type=\"paragraph\" w:default=\"1\" w:styleId=\"Normal\"><w:name w:val=\"Normal\"/><w:qFormat/>\
<w:rPr><w:rFonts w:ascii=\"Calibri\" w:hAnsi=\"Calibri\" w:cs=\"Calibri\"/><w:sz w:val=\"22\"/></w:rPr></w:style>\
<w:style w:type=\"paragraph\" w:styleId=\"Title\"><w:name w:val=\"Title\"/><w:basedOn w:val=\"Normal\"/><w:next w:val=\"Normal\"/><w:qFormat/>\
<w:rPr><w:sz w:val=\"56\"/></w:rPr></w:style>\
<w:style w:type=\"paragraph\" w:styleId=\"Heading1\"><w:name w:val=\"heading 1\"/><w:basedOn w:val=\"Normal\"/><w:next w:val=\"Normal\"/><w:qFormat/>\
<w:pPr><w:keepNext/><w:spacing w:before=\"480\"/><w:outlineLvl w:val=\"0\"/></w:pPr><w:rPr><w:b/><w:color w:val=\"2F5496\"/><w:sz w:val=\"32\"/></w:rPr></w:style>\
<w:style w:type=\"paragraph\" w:styleId=\"Heading2\"><w:name w:val=\"heading 2\"/><w:basedOn w:val=\"Normal\"/><w:next w:val=\"Normal\"/><w:qFormat/>\
<w:pPr><w:keepNext/><w:spacing w:before=\"200\"/><w:outlineLvl w:val=\"1\"/></w:pPr><w:rPr><w:b/><w:color w:val=\"2F5496\"/><w:sz w:val=\"26\"/></w:rPr></w:style>\
<w:style w:type=\"paragraph\" w:styleId=\"Heading3\"><w:name w:val=\"heading 3\"/><w:basedOn w:val=\"Normal\"/><w:next w:val=\"Normal\"/><w:qFormat/>\
<w:pPr><w:keepNext/><w:spacing w:before=\"200\"/><w:outlineLvl w:val=\"2\"/></w:pPr><w:rPr><w:b/><w:color w:val=\"1F3763\"/><w:sz w:val=\"24\"/></w:rPr></w:style>\
</w:styles>";
