//! Raw-document-to-plain-text normalization passes.
//!
//! Each pass is a function `&str -> String` applied in sequence: strip
//! non-content regions, decode entities (scraper handles these during
//! parsing), collapse whitespace. Plain-text input passes through the
//! whitespace passes untouched by the HTML stage.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

/// Normalize a raw legal document to plain text.
pub(crate) fn normalize(raw: &str) -> String {
    let text = if looks_like_html(raw) {
        extract_text(raw)
    } else {
        raw.to_string()
    };

    let text = collapse_inline_whitespace(&text);
    collapse_blank_lines(&text).trim().to_string()
}

/// Cheap HTML sniff — a tag near the start is enough.
fn looks_like_html(raw: &str) -> bool {
    let mut end = raw.len().min(512);
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    let head = &raw[..end];
    head.contains('<') && (head.contains("<html") || head.contains("<body") || head.contains("<div") || head.contains("<p>") || head.contains("<!DOCTYPE"))
}

/// Parse HTML and extract text from the content region, skipping chrome.
///
/// Tries `main`/`article`/`[role=main]` first; falls back to `body` with
/// script/style/nav/header/footer/aside subtrees removed.
fn extract_text(html: &str) -> String {
    let doc = Html::parse_document(html);

    let content_selectors = ["main", "article", r#"[role="main"]"#, ".content"];
    for sel_str in content_selectors {
        let sel = Selector::parse(sel_str).expect("valid selector");
        if let Some(el) = doc.select(&sel).next() {
            return block_text(el);
        }
    }

    let body_sel = Selector::parse("body").expect("valid selector");
    match doc.select(&body_sel).next() {
        Some(body) => block_text(body),
        None => doc.root_element().text().collect::<Vec<_>>().join(" "),
    }
}

/// Non-content elements skipped during text extraction.
const SKIP_TAGS: &[&str] = &["script", "style", "nav", "header", "footer", "aside", "noscript"];

/// Elements that terminate a line of text.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "li", "br", "h1", "h2", "h3", "h4", "h5", "h6", "tr", "section", "article",
];

/// Walk an element's subtree collecting text, inserting newlines at block
/// boundaries so article markers stay on their own lines.
fn block_text(el: scraper::ElementRef<'_>) -> String {
    let mut out = String::new();
    walk(el, &mut out);
    out
}

fn walk(el: scraper::ElementRef<'_>, out: &mut String) {
    let name = el.value().name();
    if SKIP_TAGS.contains(&name) {
        return;
    }

    let is_block = BLOCK_TAGS.contains(&name);
    if is_block && !out.ends_with('\n') && !out.is_empty() {
        out.push('\n');
    }

    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child_el) = scraper::ElementRef::wrap(child) {
            walk(child_el, out);
        }
    }

    if is_block && !out.ends_with('\n') {
        out.push('\n');
    }
}

/// Collapse runs of spaces/tabs within each line.
fn collapse_inline_whitespace(text: &str) -> String {
    static SPACES_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[ \t]+").expect("valid regex"));

    text.lines()
        .map(|line| SPACES_RE.replace_all(line.trim(), " ").into_owned())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collapse runs of 2+ blank lines into one.
fn collapse_blank_lines(text: &str) -> String {
    static BLANKS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    BLANKS_RE.replace_all(text, "\n\n").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_chrome_and_keeps_content() {
        let html = r#"<html><body>
            <nav>Meniu principal</nav>
            <main>
              <p>Art. 5</p>
              <p>Angajatorul trebuie s&#259; asigure instruirea.</p>
            </main>
            <footer>Copyright</footer>
        </body></html>"#;

        let text = normalize(html);
        assert!(text.contains("Art. 5"));
        // Entity decoded by the parser.
        assert!(text.contains("să asigure"));
        assert!(!text.contains("Meniu"));
        assert!(!text.contains("Copyright"));
    }

    #[test]
    fn block_boundaries_become_newlines() {
        let html = "<html><body><div><p>Art. 1</p><p>Prima regulă.</p></div></body></html>";
        let text = normalize(html);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Art. 1");
        assert_eq!(lines[1], "Prima regulă.");
    }

    #[test]
    fn plain_text_passes_through() {
        let raw = "Art. 1\nPrima   regulă.\n\n\n\nArt. 2\nA doua.";
        let text = normalize(raw);
        assert!(text.contains("Prima regulă."));
        assert!(!text.contains("   "));
        assert!(!text.contains("\n\n\n"));
    }
}
