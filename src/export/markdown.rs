//! Markdown rendering: page text passes through with figures inlined as
//! `data:` URIs, each page under a `# Page N` header and separated by `---`.

use crate::export::{data_uri, substitute_figures, ExportPage};

const PAGE_BREAK: &str = "\n\n---\n\n";

pub fn render(pages: &[ExportPage]) -> String {
    let mut out = pages
        .iter()
        .enumerate()
        .map(|(idx, page)| {
            let body = substitute_figures(&page.text, &page.images, |i, payload| {
                Ok(format!("![Image {}]({})", i + 1, data_uri(i, payload)?))
            });
            format!("# Page {}\n\n{}", idx + 1, body.trim())
        })
        .collect::<Vec<_>>()
        .join(PAGE_BREAK);
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_are_headed_and_separated() {
        let md = render(&[ExportPage::new("alpha"), ExportPage::new("beta")]);
        assert_eq!(md, "# Page 1\n\nalpha\n\n---\n\n# Page 2\n\nbeta\n");
    }

    #[test]
    fn no_separator_after_last_page() {
        let md = render(&[ExportPage::new("only")]);
        assert!(!md.contains("---"));
    }

    #[test]
    fn figures_become_data_uri_images() {
        let page = ExportPage::new("Chart:\n[IMAGE_0]").with_images(vec!["/9j/AAAA".into()]);
        let md = render(&[page]);
        assert!(md.contains("![Image 1](data:image/jpeg;base64,/9j/AAAA)"), "got: {md}");
    }
}
