//! Pairwise obligation deduplication over a validated-set snapshot.
//!
//! Similarity is a weighted blend: 0.7 × normalized edit-distance ratio of
//! the obligation texts, 0.2 for the same source article number, 0.1 for the
//! same source act. Pairs at or above the threshold mark the *later* item as
//! a duplicate of the earlier one — first-seen wins, and an item already
//! marked duplicate is skipped as a comparison source so chains collapse to
//! one canonical original.

use lexpipe_shared::{ObligationStatus, ValidatedObligation};
use tracing::debug;

/// Pairs at or above this similarity are duplicates.
pub const DUPLICATE_THRESHOLD: f64 = 0.85;

/// Mark duplicates in place across the whole set.
///
/// Runs after scoring. Duplicates are forced to `draft` regardless of score.
pub(crate) fn mark_duplicates(obligations: &mut [ValidatedObligation]) {
    for i in 0..obligations.len() {
        if obligations[i].is_duplicate {
            continue;
        }
        for j in (i + 1)..obligations.len() {
            if obligations[j].is_duplicate {
                continue;
            }

            let score = similarity(&obligations[i], &obligations[j]);
            if score >= DUPLICATE_THRESHOLD {
                debug!(
                    original = %obligations[i].id,
                    duplicate = %obligations[j].id,
                    score,
                    "marking duplicate"
                );
                obligations[j].is_duplicate = true;
                obligations[j].duplicate_of_id = Some(obligations[i].id.clone());
                obligations[j].similarity_score = round2(score);
                obligations[j].status = ObligationStatus::Draft;
            }
        }
    }
}

/// Weighted similarity between two obligations.
pub(crate) fn similarity(a: &ValidatedObligation, b: &ValidatedObligation) -> f64 {
    let text = text_similarity(&a.raw.obligation_text, &b.raw.obligation_text);
    let same_article =
        if a.raw.source_article_number == b.raw.source_article_number { 1.0 } else { 0.0 };
    let same_act = if a.raw.source_legal_act == b.raw.source_legal_act { 1.0 } else { 0.0 };

    0.7 * text + 0.2 * same_article + 0.1 * same_act
}

/// Normalized edit-distance ratio in [0, 1] over case/whitespace-normalized text.
pub fn text_similarity(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);

    if a.is_empty() && b.is_empty() {
        return 1.0;
    }

    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let max_len = a_chars.len().max(b_chars.len());

    1.0 - levenshtein(&a_chars, &b_chars) as f64 / max_len as f64
}

fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Classic two-row Levenshtein distance.
fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

pub(crate) fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
