//! Obligation validation: scoring, deduplication, status assignment.
//!
//! Pure and deterministic — no I/O. Each candidate gets four weighted
//! sub-scores (completeness 0.40, extractor confidence 0.30, cross-reference
//! validity 0.15, specificity 0.15); deduplication then runs pairwise over
//! the whole snapshot, and status lands on `validated` only for
//! non-duplicates scoring at least the promotion threshold.

mod dedup;

use chrono::Utc;
use tracing::{info, instrument};

use lexpipe_shared::{
    ObligationId, ObligationStatus, RawObligation, ValidatedObligation, jurisdiction,
};

pub use dedup::{DUPLICATE_THRESHOLD, text_similarity};

use dedup::round2;

/// Minimum score for promotion to `validated`.
pub const PROMOTION_THRESHOLD: f64 = 0.6;

/// Sub-score weights.
const WEIGHT_COMPLETENESS: f64 = 0.40;
const WEIGHT_CONFIDENCE: f64 = 0.30;
const WEIGHT_CROSS_REFERENCE: f64 = 0.15;
const WEIGHT_SPECIFICITY: f64 = 0.15;

/// Validate a batch snapshot of raw obligations.
///
/// `jurisdiction_code` selects the citation pattern for the cross-reference
/// check. Scores round to two decimals; running twice on the same input
/// yields identical scores and duplicate flags (up to the generated ids and
/// timestamps).
#[instrument(skip_all, fields(count = raw.len(), jurisdiction = %jurisdiction_code))]
pub fn validate(raw: &[RawObligation], jurisdiction_code: &str) -> Vec<ValidatedObligation> {
    let mut validated: Vec<ValidatedObligation> = raw
        .iter()
        .map(|item| score_one(item, jurisdiction_code))
        .collect();

    dedup::mark_duplicates(&mut validated);

    let promoted = validated
        .iter()
        .filter(|v| v.status == ObligationStatus::Validated)
        .count();
    let duplicates = validated.iter().filter(|v| v.is_duplicate).count();
    info!(total = validated.len(), promoted, duplicates, "validation complete");

    validated
}

/// Score one obligation and assign its pre-dedup status.
fn score_one(raw: &RawObligation, jurisdiction_code: &str) -> ValidatedObligation {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();

    let completeness = completeness_score(raw, &mut errors, &mut warnings);
    let confidence = raw.confidence.clamp(0.0, 1.0);
    let cross_reference = cross_reference_score(raw, jurisdiction_code, &mut warnings);
    let specificity = specificity_score(raw);

    let score = round2(
        completeness * WEIGHT_COMPLETENESS
            + confidence * WEIGHT_CONFIDENCE
            + cross_reference * WEIGHT_CROSS_REFERENCE
            + specificity * WEIGHT_SPECIFICITY,
    );

    let status = if score >= PROMOTION_THRESHOLD {
        ObligationStatus::Validated
    } else {
        ObligationStatus::Draft
    };

    ValidatedObligation {
        id: ObligationId::new(),
        raw: raw.clone(),
        validation_score: score,
        validation_errors: errors,
        validation_warnings: warnings,
        is_duplicate: false,
        duplicate_of_id: None,
        similarity_score: 0.0,
        status,
        validated_at: Utc::now(),
    }
}

/// Completeness sub-score, weight 0.40.
///
/// Required fields deduct 0.3 each and are blocking errors; important
/// fields deduct 0.2 each and are warnings.
fn completeness_score(
    raw: &RawObligation,
    errors: &mut Vec<String>,
    warnings: &mut Vec<String>,
) -> f64 {
    let mut score: f64 = 1.0;

    // Required fields: 0.3 each, recorded as blocking errors.
    if raw.obligation_text.trim().is_empty() {
        score -= 0.3;
        errors.push("missing required field: obligation_text".into());
    }
    if raw.source_article_number.trim().is_empty() {
        score -= 0.3;
        errors.push("missing required field: source_article_number".into());
    }
    if raw.source_legal_act.trim().is_empty() {
        score -= 0.3;
        errors.push("missing required field: source_legal_act".into());
    }

    if !raw.obligation_text.trim().is_empty() && raw.obligation_text.trim().len() < 20 {
        score -= 0.2;
        warnings.push("obligation text is suspiciously short".into());
    }

    // Important fields: 0.2 each, recorded as warnings. An absent party
    // additionally costs the small identifiability penalty.
    if !has_identifiable_party(raw) {
        score -= 0.2;
        score -= 0.05;
        warnings.push("missing important field: responsible_parties".into());
    }
    if raw.deadline_text.as_deref().map(str::trim).unwrap_or("").is_empty() {
        score -= 0.2;
        warnings.push("missing important field: deadline_text".into());
    }
    if raw.frequency == lexpipe_shared::Frequency::Unknown {
        score -= 0.2;
        warnings.push("missing important field: frequency".into());
    }

    score.max(0.0)
}

/// Cross-reference sub-score, weight 0.15.
///
/// 1.0 when the act citation matches the jurisdiction's expected shape,
/// otherwise 0.7 with a warning.
fn cross_reference_score(
    raw: &RawObligation,
    jurisdiction_code: &str,
    warnings: &mut Vec<String>,
) -> f64 {
    let matches = jurisdiction(jurisdiction_code)
        .map(|spec| spec.citation_pattern.is_match(&raw.source_legal_act))
        .unwrap_or(false);

    if matches {
        1.0
    } else {
        warnings.push(format!(
            "source_legal_act {:?} does not match the expected {jurisdiction_code} citation format",
            raw.source_legal_act
        ));
        0.7
    }
}

/// Specificity sub-score, weight 0.15.
///
/// 0.4 for named responsible parties, up to 0.3 for a concrete
/// deadline+frequency pair (0.15 if only one is present), 0.3 for a
/// non-empty evidence list.
fn specificity_score(raw: &RawObligation) -> f64 {
    let mut score = 0.0;

    if has_identifiable_party(raw) {
        score += 0.4;
    }

    let has_deadline = raw
        .deadline_text
        .as_deref()
        .map(str::trim)
        .is_some_and(|d| !d.is_empty());
    let has_frequency = raw.frequency != lexpipe_shared::Frequency::Unknown;
    match (has_deadline, has_frequency) {
        (true, true) => score += 0.3,
        (true, false) | (false, true) => score += 0.15,
        (false, false) => {}
    }

    if !raw.evidence_required.is_empty() {
        score += 0.3;
    }

    score
}

/// A party is identifiable if the list has an entry that is not a literal
/// "unknown" placeholder.
fn has_identifiable_party(raw: &RawObligation) -> bool {
    raw.responsible_parties
        .iter()
        .any(|p| !p.trim().is_empty() && !p.trim().eq_ignore_ascii_case("unknown"))
}
