//! Completion-response parsing and candidate normalization.
//!
//! The completion service is instructed to return a JSON array, but real
//! responses wrap it in prose, code fences, or apologies. Parsing locates the
//! first well-formed JSON array of objects anywhere in the text, deserializes it, and
//! drops malformed items. Surviving items are normalized: penalties parsed
//! out of free text, frequency mapped through the synonym table, and
//! low-confidence candidates discarded.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use lexpipe_shared::{Frequency, LexpipeError, RawObligation, Result};

/// Candidates below this confidence are discarded at extraction time.
pub(crate) const MIN_CONFIDENCE: f64 = 0.5;

// ---------------------------------------------------------------------------
// Wire shape
// ---------------------------------------------------------------------------

/// One array element as the completion service emits it. Loose on purpose:
/// anything that fails to deserialize is dropped, not fatal.
#[derive(Debug, Deserialize)]
struct WireObligation {
    obligation_text: String,
    #[serde(default)]
    responsible_parties: Vec<String>,
    #[serde(default)]
    deadline_text: Option<String>,
    #[serde(default)]
    frequency: Option<String>,
    #[serde(default)]
    penalty_text: Option<String>,
    #[serde(default)]
    evidence_required: Vec<String>,
    source_article_number: String,
    #[serde(default)]
    source_legal_act: Option<String>,
    confidence: f64,
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Parse a completion response into normalized obligations.
///
/// `act_name` fills `source_legal_act` when the service omits it.
pub fn parse_response(text: &str, act_name: &str) -> Result<Vec<RawObligation>> {
    let array_text = find_json_array(text).ok_or_else(|| {
        LexpipeError::Extraction("no JSON array found in completion response".into())
    })?;

    let values: Vec<serde_json::Value> = serde_json::from_str(array_text)
        .map_err(|e| LexpipeError::Extraction(format!("JSON array deserialization: {e}")))?;

    let mut obligations = Vec::with_capacity(values.len());
    for value in values {
        let wire: WireObligation = match serde_json::from_value(value) {
            Ok(w) => w,
            Err(e) => {
                debug!(error = %e, "dropping malformed obligation item");
                continue;
            }
        };

        if wire.confidence < MIN_CONFIDENCE {
            debug!(confidence = wire.confidence, "dropping low-confidence item");
            continue;
        }

        obligations.push(normalize_item(wire, act_name));
    }

    Ok(obligations)
}

/// Locate the first well-formed JSON array of objects in free text.
///
/// Scans for `[` and matches the closing bracket by depth counting (string
/// literals and escapes respected). Candidates must parse as an array whose
/// elements are all objects; prose brackets like citation markers (`[1]`)
/// are skipped and the scan moves to the next `[`.
pub(crate) fn find_json_array(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut search_from = 0;

    while let Some(rel) = text[search_from..].find('[') {
        let start = search_from + rel;
        if let Some(end) = matching_bracket(bytes, start) {
            let candidate = &text[start..=end];
            if let Ok(values) = serde_json::from_str::<Vec<serde_json::Value>>(candidate) {
                if values.iter().all(serde_json::Value::is_object) {
                    return Some(candidate);
                }
            }
        }
        search_from = start + 1;
    }

    None
}

/// Index of the `]` matching the `[` at `start`, or `None` if unbalanced.
fn matching_bracket(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

fn normalize_item(wire: WireObligation, act_name: &str) -> RawObligation {
    let (penalty_min, penalty_max, penalty_currency) = match &wire.penalty_text {
        Some(text) => parse_penalty(text),
        None => (None, None, None),
    };

    RawObligation {
        obligation_text: wire.obligation_text,
        responsible_parties: wire.responsible_parties,
        deadline_text: wire.deadline_text,
        frequency: wire
            .frequency
            .as_deref()
            .map(normalize_frequency)
            .unwrap_or(Frequency::Unknown),
        penalty_text: wire.penalty_text,
        penalty_min,
        penalty_max,
        penalty_currency,
        evidence_required: wire.evidence_required,
        source_article_number: wire.source_article_number,
        source_legal_act: wire
            .source_legal_act
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| act_name.to_string()),
        confidence: wire.confidence,
    }
}

/// Amounts with optional thousand markers: `3.000`, `10,000`, `500`.
static AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{1,3}(?:[.,]\d{3})+|\d+").expect("amount regex")
});

/// Parse `{min, max, currency}` out of free penalty text.
///
/// A single number means min = max; with two or more, the first two are
/// taken as min/max. Thousand markers (`.` or `,` grouping) are removed
/// before numeric parsing.
pub(crate) fn parse_penalty(text: &str) -> (Option<f64>, Option<f64>, Option<String>) {
    let amounts: Vec<f64> = AMOUNT_RE
        .find_iter(text)
        .filter_map(|m| {
            let cleaned: String = m.as_str().chars().filter(|c| c.is_ascii_digit()).collect();
            cleaned.parse::<f64>().ok()
        })
        .collect();

    let (min, max) = match amounts.as_slice() {
        [] => (None, None),
        [single] => (Some(*single), Some(*single)),
        [first, second, ..] => (Some(*first), Some(*second)),
    };

    (min, max, detect_currency(text))
}

fn detect_currency(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    if lower.contains("lei") || lower.contains("ron") {
        Some("RON".into())
    } else if lower.contains("eur") || lower.contains('€') {
        Some("EUR".into())
    } else if lower.contains("usd") || lower.contains('$') {
        Some("USD".into())
    } else {
        None
    }
}

/// Map free frequency text onto the canonical buckets.
///
/// Extended categories collapse to the nearest bucket: weekly/daily →
/// monthly, at_hire/at_termination → once, continuous → annual. The
/// collapse loses real temporal semantics (a continuous duty is not an
/// annual one); downstream consumers only know the canonical buckets.
pub(crate) fn normalize_frequency(text: &str) -> Frequency {
    let t = text.trim().to_lowercase();
    match t.as_str() {
        "annual" | "anual" | "yearly" | "continuous" | "continuu" | "permanent" => {
            Frequency::Annual
        }
        "biannual" | "semestrial" | "twice a year" => Frequency::Biannual,
        "quarterly" | "trimestrial" => Frequency::Quarterly,
        "monthly" | "lunar" | "weekly" | "săptămânal" | "daily" | "zilnic" => Frequency::Monthly,
        "on_demand" | "on demand" | "la cerere" | "as needed" => Frequency::OnDemand,
        "once" | "o singură dată" | "at_hire" | "la angajare" | "at_termination"
        | "la încetare" => Frequency::Once,
        _ => Frequency::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_array_amid_prose() {
        let text = r#"Here are the obligations I found:

```json
[{"obligation_text": "x", "source_article_number": "5", "confidence": 0.8}]
```

Let me know if you need more."#;
        let array = find_json_array(text).expect("array");
        assert!(array.starts_with('['));
        assert!(array.ends_with(']'));
    }

    #[test]
    fn skips_non_json_brackets() {
        let text = r#"See [1] for details. The result: [{"obligation_text":"y","source_article_number":"2","confidence":0.9}]"#;
        let array = find_json_array(text).expect("array");
        assert!(array.contains("obligation_text"));
    }

    #[test]
    fn citation_brackets_before_the_array_do_not_swallow_obligations() {
        let text = r#"Per articles [3, 7] and note [2], the extracted duties are:
[{"obligation_text": "Angajatorul asigură instruirea", "source_article_number": "7", "confidence": 0.85}]"#;
        let obligations = parse_response(text, "L 319/2006").expect("parse");
        assert_eq!(obligations.len(), 1);
        assert_eq!(obligations[0].source_article_number, "7");
    }

    #[test]
    fn brackets_inside_strings_do_not_confuse_matching() {
        let text = r#"[{"obligation_text": "see art. [5] and ]weird[ text", "source_article_number": "5", "confidence": 0.7}]"#;
        let array = find_json_array(text).expect("array");
        let parsed: Vec<serde_json::Value> = serde_json::from_str(array).unwrap();
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn no_array_is_none() {
        assert!(find_json_array("I could not find any obligations.").is_none());
        assert!(find_json_array("unbalanced [ bracket").is_none());
    }

    #[test]
    fn parse_response_drops_malformed_and_low_confidence() {
        let text = r#"[
            {"obligation_text": "keep", "source_article_number": "5", "confidence": 0.9},
            {"missing_required_fields": true},
            {"obligation_text": "too low", "source_article_number": "6", "confidence": 0.3}
        ]"#;
        let obligations = parse_response(text, "L 319/2006").expect("parse");
        assert_eq!(obligations.len(), 1);
        assert_eq!(obligations[0].obligation_text, "keep");
        // Act name backfilled when the service omits it.
        assert_eq!(obligations[0].source_legal_act, "L 319/2006");
    }

    #[test]
    fn penalty_single_number_is_min_and_max() {
        let (min, max, cur) = parse_penalty("amendă de 5.000 lei");
        assert_eq!(min, Some(5000.0));
        assert_eq!(max, Some(5000.0));
        assert_eq!(cur.as_deref(), Some("RON"));
    }

    #[test]
    fn penalty_range_takes_first_two_numbers() {
        let (min, max, cur) = parse_penalty("de la 3.000 la 6.000 lei, conform art. 39");
        assert_eq!(min, Some(3000.0));
        assert_eq!(max, Some(6000.0));
        assert_eq!(cur.as_deref(), Some("RON"));
    }

    #[test]
    fn penalty_without_numbers_or_currency() {
        let (min, max, cur) = parse_penalty("sancțiune disciplinară");
        assert_eq!(min, None);
        assert_eq!(max, None);
        assert_eq!(cur, None);
    }

    #[test]
    fn penalty_eur_detection() {
        let (min, max, cur) = parse_penalty("fine up to 10,000 EUR");
        assert_eq!(min, Some(10000.0));
        assert_eq!(max, Some(10000.0));
        assert_eq!(cur.as_deref(), Some("EUR"));
    }

    #[test]
    fn frequency_synonyms_and_collapses() {
        assert_eq!(normalize_frequency("anual"), Frequency::Annual);
        assert_eq!(normalize_frequency("Yearly"), Frequency::Annual);
        assert_eq!(normalize_frequency("trimestrial"), Frequency::Quarterly);
        assert_eq!(normalize_frequency("la cerere"), Frequency::OnDemand);

        // Extended categories collapse to the nearest bucket.
        assert_eq!(normalize_frequency("weekly"), Frequency::Monthly);
        assert_eq!(normalize_frequency("daily"), Frequency::Monthly);
        assert_eq!(normalize_frequency("continuous"), Frequency::Annual);
        assert_eq!(normalize_frequency("at_hire"), Frequency::Once);
        assert_eq!(normalize_frequency("at_termination"), Frequency::Once);

        assert_eq!(normalize_frequency("when the moon is full"), Frequency::Unknown);
    }
}
