//! Declarative jurisdiction and legal-domain tables.
//!
//! Adding a jurisdiction or a domain keyword set is a data change here, not a
//! code change in the pipeline stages. Each jurisdiction carries its own
//! article-boundary grammar and citation pattern; each legal domain carries
//! the keyword set used to classify feed entries.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::LegalDomain;

// ---------------------------------------------------------------------------
// JurisdictionSpec
// ---------------------------------------------------------------------------

/// Everything the pipeline needs to know about one jurisdiction.
#[derive(Debug)]
pub struct JurisdictionSpec {
    /// Jurisdiction code (e.g. "RO", "EU").
    pub code: &'static str,
    /// Default legislative feed endpoint.
    pub feed_url: &'static str,
    /// Document language (ISO 639-1).
    pub language: &'static str,
    /// Article-boundary pattern. Must expose two capture groups:
    /// 1 = article number (digits plus optional letter/superscript suffix),
    /// 2 = optional title text on the marker line.
    pub article_pattern: &'static LazyLock<Regex>,
    /// Expected citation shape for acts of this jurisdiction.
    pub citation_pattern: &'static LazyLock<Regex>,
}

/// Romanian article markers: `Art. 5`, `Articolul 12^1`, `ART. 34a`.
static RO_ARTICLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^\s*(?:Art\.?|Articolul)\s+(\d+(?:\^\d+)?[a-z]?)\s*\.?\s*(?:[-–—]\s*(\S[^\n]*))?$")
        .expect("RO article regex")
});

/// Romanian citations: `L 319/2006`, `Legea 53/2003`, `HG 1425/2006`, `OUG 195/2002`.
static RO_CITATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:L(?:egea)?|HG|OG|OUG)\.?\s*(?:nr\.?\s*)?\d+/\d{4}\s*$")
        .expect("RO citation regex")
});

/// EU article markers: `Article 5`, `Article 12(1)` — group 1 stops before
/// the paragraph parenthetical.
static EU_ARTICLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^\s*Article\s+(\d+[a-z]?)\s*(?:[-–—]\s*(\S[^\n]*))?$")
        .expect("EU article regex")
});

/// EU citations: `Regulation (EU) 2016/679`, `Directive 89/391/EEC`.
static EU_CITATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:Regulation|Directive)\s+(?:\((?:EU|EC|EEC)\)\s+)?\d+/\d+(?:/(?:EU|EC|EEC))?\s*$")
        .expect("EU citation regex")
});

/// All jurisdictions the pipeline knows about.
pub static JURISDICTIONS: &[JurisdictionSpec] = &[
    JurisdictionSpec {
        code: "RO",
        feed_url: "https://legislatie.just.ro/feed/monitorul-oficial",
        language: "ro",
        article_pattern: &RO_ARTICLE_RE,
        citation_pattern: &RO_CITATION_RE,
    },
    JurisdictionSpec {
        code: "EU",
        feed_url: "https://eur-lex.europa.eu/feed/latest-legislation",
        language: "en",
        article_pattern: &EU_ARTICLE_RE,
        citation_pattern: &EU_CITATION_RE,
    },
];

/// Look up a jurisdiction by its code (case-insensitive).
pub fn jurisdiction(code: &str) -> Option<&'static JurisdictionSpec> {
    JURISDICTIONS
        .iter()
        .find(|j| j.code.eq_ignore_ascii_case(code))
}

// ---------------------------------------------------------------------------
// Legal-domain keyword table
// ---------------------------------------------------------------------------

/// Keyword set for one legal domain. Tested against entry title + summary,
/// first matching domain wins.
#[derive(Debug)]
pub struct DomainKeywords {
    pub domain: LegalDomain,
    pub keywords: &'static [&'static str],
}

/// Ordered per-domain keyword sets. Order matters: the first domain whose
/// keyword matches claims the entry; no match falls through to `Other`.
pub static DOMAIN_KEYWORDS: &[DomainKeywords] = &[
    DomainKeywords {
        domain: LegalDomain::Ssm,
        keywords: &[
            "securitate și sănătate în muncă",
            "securitatea muncii",
            "protecția muncii",
            "occupational safety",
            "accident de muncă",
            "echipament de protecție",
            "evaluarea riscurilor",
        ],
    },
    DomainKeywords {
        domain: LegalDomain::Psi,
        keywords: &[
            "situații de urgență",
            "apărarea împotriva incendiilor",
            "prevenirea și stingerea incendiilor",
            "fire safety",
            "stingătoare",
        ],
    },
    DomainKeywords {
        domain: LegalDomain::Gdpr,
        keywords: &[
            "protecția datelor",
            "date cu caracter personal",
            "data protection",
            "gdpr",
            "personal data",
        ],
    },
    DomainKeywords {
        domain: LegalDomain::Labor,
        keywords: &[
            "codul muncii",
            "contract de muncă",
            "salariat",
            "labour law",
            "labor law",
            "timp de muncă",
        ],
    },
];

/// Classify text into a legal domain by first-match over the keyword table.
pub fn classify_domain(text: &str) -> LegalDomain {
    let haystack = text.to_lowercase();
    for set in DOMAIN_KEYWORDS {
        if set.keywords.iter().any(|kw| haystack.contains(kw)) {
            return set.domain;
        }
    }
    LegalDomain::Other
}

// ---------------------------------------------------------------------------
// Obligation markers
// ---------------------------------------------------------------------------

/// Phrases indicating an article plausibly contains an obligation:
/// duty verbs, penalty nouns, prohibition phrases. Any match flags the
/// article for extraction.
pub static OBLIGATION_MARKERS: &[&str] = &[
    // Duty verbs
    "trebuie să",
    "este obligat",
    "sunt obligați",
    "are obligația",
    "au obligația",
    "se obligă",
    "shall",
    "must",
    "is required to",
    "are required to",
    // Penalty nouns
    "amendă",
    "contravenție",
    "sancțiune",
    "penalty",
    "fine of",
    // Prohibition phrases
    "este interzis",
    "se interzice",
    "is prohibited",
    "shall not",
];

/// Whether the text matches any obligation-indicating phrase.
pub fn has_obligation_markers(text: &str) -> bool {
    let haystack = text.to_lowercase();
    OBLIGATION_MARKERS.iter().any(|m| haystack.contains(m))
}
