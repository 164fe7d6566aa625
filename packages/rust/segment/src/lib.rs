//! Document segmentation: raw legal text → numbered articles.
//!
//! Segmentation normalizes source markup to plain text, then applies the
//! jurisdiction's article-boundary grammar to split the text into ordered,
//! non-overlapping articles, flagging the ones that plausibly contain
//! obligations. Failures here signal an upstream content mismatch and are
//! never retried: [`LexpipeError::EmptyDocument`] means the wrong content
//! region was extracted, [`LexpipeError::NoArticlesFound`] means the
//! document is not in the expected legislative format.

mod normalize;

use chrono::Utc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use lexpipe_shared::{
    Article, LexpipeError, ParsedDocument, Result, has_obligation_markers, jurisdiction,
};

/// Minimum normalized text length. Anything shorter means the content
/// region extraction went wrong.
const MIN_DOCUMENT_CHARS: usize = 500;

/// Candidate articles shorter than this are boilerplate noise, not articles.
const MIN_ARTICLE_CHARS: usize = 10;

/// Segment one raw document into a [`ParsedDocument`].
#[instrument(skip(raw_document), fields(jurisdiction = %jurisdiction_code, raw_len = raw_document.len()))]
pub fn segment(raw_document: &str, jurisdiction_code: &str) -> Result<ParsedDocument> {
    let spec = jurisdiction(jurisdiction_code).ok_or_else(|| {
        LexpipeError::config(format!("unknown jurisdiction: {jurisdiction_code}"))
    })?;

    let text = normalize::normalize(raw_document);

    // Character count, not byte length; the two diverge on diacritics.
    let char_count = text.chars().count();
    if char_count < MIN_DOCUMENT_CHARS {
        return Err(LexpipeError::EmptyDocument {
            length: char_count,
            minimum: MIN_DOCUMENT_CHARS,
        });
    }

    let articles = split_articles(&text, spec.article_pattern);

    if articles.is_empty() {
        return Err(LexpipeError::NoArticlesFound {
            jurisdiction: spec.code.to_string(),
        });
    }

    let obligation_bearing_count = articles.iter().filter(|a| a.has_obligation_markers).count();

    info!(
        total = articles.len(),
        obligation_bearing = obligation_bearing_count,
        "document segmented"
    );

    Ok(ParsedDocument {
        total_articles: articles.len(),
        obligation_bearing_count,
        articles,
        jurisdiction: spec.code.to_string(),
        language: spec.language.to_string(),
        parsed_at: Utc::now(),
    })
}

/// Split normalized text at article-boundary matches.
///
/// Each article's content is the span between the end of its marker line and
/// the start of the next marker, so spans are order-preserving and never
/// overlap. Text before the first marker (preamble) is discarded.
fn split_articles(text: &str, pattern: &regex::Regex) -> Vec<Article> {
    struct Marker {
        start: usize,
        end: usize,
        number: String,
        title: Option<String>,
    }

    let markers: Vec<Marker> = pattern
        .captures_iter(text)
        .map(|caps| {
            let m = caps.get(0).expect("match 0 always present");
            Marker {
                start: m.start(),
                end: m.end(),
                number: caps[1].to_string(),
                title: caps.get(2).map(|t| t.as_str().trim().to_string()),
            }
        })
        .collect();

    let mut articles = Vec::with_capacity(markers.len());

    for (i, marker) in markers.iter().enumerate() {
        let body_end = markers
            .get(i + 1)
            .map(|next| next.start)
            .unwrap_or(text.len());
        let content = text[marker.end..body_end].trim().to_string();

        if content.chars().count() < MIN_ARTICLE_CHARS {
            debug!(number = %marker.number, len = content.len(), "dropping short article candidate");
            continue;
        }

        let has_markers = has_obligation_markers(&content);

        articles.push(Article {
            id: Uuid::now_v7().to_string(),
            number: marker.number.clone(),
            title: marker.title.clone(),
            has_obligation_markers: has_markers,
            content,
        });
    }

    articles
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A plausible RO act body, long enough to clear the minimum length.
    fn ro_document() -> String {
        let filler = "Prezenta lege reglementează cadrul general. ".repeat(12);
        format!(
            "LEGEA nr. 319/2006 a securității și sănătății în muncă\n\
             {filler}\n\
             Art. 1\n\
             Prezenta lege are ca scop instituirea de măsuri privind securitatea lucrătorilor.\n\
             Art. 5\n\
             Angajatorul trebuie să efectueze evaluarea riscurilor pentru fiecare loc de muncă.\n\
             Art. 12^1\n\
             Nerespectarea prevederilor se sancționează cu amendă de la 3.000 la 6.000 lei.\n\
             Art. 13\n\
             ok\n\
             Art. 14 - Dispoziții finale\n\
             Prezenta lege intră în vigoare la 30 de zile de la data publicării."
        )
    }

    #[test]
    fn segments_ro_document() {
        let doc = segment(&ro_document(), "RO").expect("segment");
        assert_eq!(doc.jurisdiction, "RO");
        assert_eq!(doc.language, "ro");
        // Art. 13's body ("ok") is under 10 chars and dropped as noise.
        assert_eq!(doc.total_articles, 4);
        assert_eq!(doc.articles[0].number, "1");
        assert_eq!(doc.articles[1].number, "5");
        assert_eq!(doc.articles[2].number, "12^1");
        assert_eq!(doc.articles[3].number, "14");
        assert_eq!(
            doc.articles[3].title.as_deref(),
            Some("Dispoziții finale")
        );
    }

    #[test]
    fn flags_obligation_bearing_articles() {
        let doc = segment(&ro_document(), "RO").expect("segment");
        let by_number = |n: &str| doc.articles.iter().find(|a| a.number == n).unwrap();

        assert!(!by_number("1").has_obligation_markers);
        assert!(by_number("5").has_obligation_markers); // "trebuie să"
        assert!(by_number("12^1").has_obligation_markers); // "amendă"
        assert!(!by_number("14").has_obligation_markers);
        assert_eq!(doc.obligation_bearing_count, 2);
    }

    #[test]
    fn article_spans_are_ordered_and_disjoint() {
        let doc = segment(&ro_document(), "RO").expect("segment");
        // Each article's content must appear after the previous one's in the
        // original text, and no content may repeat across articles.
        let full = ro_document();
        let mut last_pos = 0usize;
        for article in &doc.articles {
            let pos = full.find(&article.content).expect("content is a source span");
            assert!(pos >= last_pos, "article spans out of order");
            last_pos = pos + article.content.len();
        }
    }

    #[test]
    fn short_document_is_empty_document_error() {
        let err = segment("Art. 1\nText scurt.", "RO").unwrap_err();
        assert!(matches!(err, LexpipeError::EmptyDocument { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn minimum_length_counts_characters_not_bytes() {
        // 300 chars of two-byte diacritics: 600 bytes, still too short.
        let raw = format!("Art. 1\n{}", "ăîșțâ".repeat(60));
        let err = segment(&raw, "RO").unwrap_err();
        assert!(matches!(
            err,
            LexpipeError::EmptyDocument { length, .. } if length < 500
        ));
    }

    #[test]
    fn no_markers_is_no_articles_error() {
        let prose = "Acest document descrie politica editorială a publicației. ".repeat(20);
        let err = segment(&prose, "RO").unwrap_err();
        assert!(matches!(err, LexpipeError::NoArticlesFound { .. }));
    }

    #[test]
    fn segments_eu_document() {
        let filler = "This Regulation lays down general provisions. ".repeat(15);
        let raw = format!(
            "{filler}\n\
             Article 1\n\
             This Regulation applies to all employers in the Union.\n\
             Article 5\n\
             The employer shall ensure that workers receive adequate safety training."
        );
        let doc = segment(&raw, "EU").expect("segment");
        assert_eq!(doc.total_articles, 2);
        assert_eq!(doc.language, "en");
        assert!(doc.articles[1].has_obligation_markers);
    }

    #[test]
    fn segments_html_document() {
        let paragraphs: String = (0..15)
            .map(|_| "<p>Dispoziții generale privind aplicarea prezentei legi.</p>".to_string())
            .collect();
        let html = format!(
            "<html><body><nav>meniu</nav><main>{paragraphs}\
             <p>Art. 7</p><p>Angajatorul este obligat să țină evidența accidentelor de muncă.</p>\
             </main></body></html>"
        );
        let doc = segment(&html, "RO").expect("segment");
        assert_eq!(doc.total_articles, 1);
        assert_eq!(doc.articles[0].number, "7");
        assert!(doc.articles[0].has_obligation_markers);
    }

    #[test]
    fn unknown_jurisdiction_is_config_error() {
        let err = segment(&ro_document(), "XX").unwrap_err();
        assert!(matches!(err, LexpipeError::Config { .. }));
    }
}
