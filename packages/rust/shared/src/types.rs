//! Core domain types for the legislative processing pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// JobId / ObligationId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for pipeline job identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a new time-sortable job identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Stable identifier for a persisted obligation (UUID v7, assigned once
/// at validation time so re-publishing upserts in place).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObligationId(pub Uuid);

impl ObligationId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ObligationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ObligationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ObligationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Legal domain
// ---------------------------------------------------------------------------

/// Coarse classification of an entry's subject area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegalDomain {
    /// Occupational health and safety (securitate și sănătate în muncă).
    Ssm,
    /// Fire safety / emergency situations (prevenirea și stingerea incendiilor).
    Psi,
    /// Data protection.
    Gdpr,
    /// Labor law.
    Labor,
    /// Everything that matched no domain keyword set.
    Other,
}

impl std::fmt::Display for LegalDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Ssm => "ssm",
            Self::Psi => "psi",
            Self::Gdpr => "gdpr",
            Self::Labor => "labor",
            Self::Other => "other",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// LegislationEntry
// ---------------------------------------------------------------------------

/// One classified feed entry, produced by the acquirer. Immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegislationEntry {
    /// Entry title from the feed.
    pub title: String,
    /// Link to the full document.
    pub source_link: String,
    /// Publication timestamp.
    pub published_at: DateTime<Utc>,
    /// First-matching legal domain (or [`LegalDomain::Other`]).
    pub legal_domain: LegalDomain,
    /// Jurisdiction code the feed belongs to (e.g. "RO", "EU").
    pub jurisdiction: String,
}

// ---------------------------------------------------------------------------
// Article / ParsedDocument
// ---------------------------------------------------------------------------

/// A single numbered article split out of one legal document.
///
/// Articles are ordered by document position and never mutated after
/// creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    /// Unique article identifier.
    pub id: String,
    /// Article number as printed — may contain letters or superscripts
    /// (e.g. "5", "12^1", "34a").
    pub number: String,
    /// Heading text, when the marker line carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Article body text.
    pub content: String,
    /// Whether the content matched any obligation-indicating phrase.
    pub has_obligation_markers: bool,
}

/// All articles segmented from one source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedDocument {
    /// Articles in document order.
    pub articles: Vec<Article>,
    /// Jurisdiction the boundary grammar came from.
    pub jurisdiction: String,
    /// Document language (from the jurisdiction table).
    pub language: String,
    /// When segmentation ran.
    pub parsed_at: DateTime<Utc>,
    /// Convenience count of `articles`.
    pub total_articles: usize,
    /// Count of articles with `has_obligation_markers` set.
    pub obligation_bearing_count: usize,
}

// ---------------------------------------------------------------------------
// Frequency
// ---------------------------------------------------------------------------

/// Canonical obligation frequency buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Annual,
    Biannual,
    Quarterly,
    Monthly,
    OnDemand,
    Once,
    /// Free text that matched no synonym.
    Unknown,
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Annual => "annual",
            Self::Biannual => "biannual",
            Self::Quarterly => "quarterly",
            Self::Monthly => "monthly",
            Self::OnDemand => "on_demand",
            Self::Once => "once",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// RawObligation
// ---------------------------------------------------------------------------

/// A candidate obligation as returned by the completion service, after
/// normalization but before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawObligation {
    /// The obligation text itself (who must do what).
    pub obligation_text: String,
    /// Parties the obligation binds.
    #[serde(default)]
    pub responsible_parties: Vec<String>,
    /// Deadline as stated in the source, verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_text: Option<String>,
    /// Canonical frequency bucket.
    pub frequency: Frequency,
    /// Penalty clause text, verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub penalty_text: Option<String>,
    /// Parsed penalty lower bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub penalty_min: Option<f64>,
    /// Parsed penalty upper bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub penalty_max: Option<f64>,
    /// Penalty currency code, when stated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub penalty_currency: Option<String>,
    /// Evidence documents the obligation requires.
    #[serde(default)]
    pub evidence_required: Vec<String>,
    /// Article number this obligation was extracted from.
    pub source_article_number: String,
    /// The legal act citation (e.g. "L 319/2006").
    pub source_legal_act: String,
    /// Extractor-supplied confidence in [0, 1].
    pub confidence: f64,
}

// ---------------------------------------------------------------------------
// ValidatedObligation
// ---------------------------------------------------------------------------

/// Lifecycle status of an obligation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObligationStatus {
    Draft,
    Validated,
    Published,
    Archived,
}

impl std::fmt::Display for ObligationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::Validated => "validated",
            Self::Published => "published",
            Self::Archived => "archived",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ObligationStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "validated" => Ok(Self::Validated),
            "published" => Ok(Self::Published),
            "archived" => Ok(Self::Archived),
            other => Err(format!("unknown obligation status: {other}")),
        }
    }
}

/// A scored, dedup-checked obligation.
///
/// `status` is the only field mutated after creation (the publisher promotes
/// draft/validated → published).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedObligation {
    /// Stable identifier used as the storage upsert key.
    pub id: ObligationId,
    /// The underlying extracted obligation.
    #[serde(flatten)]
    pub raw: RawObligation,
    /// Weighted composite quality score in [0, 1], rounded to 2 decimals.
    pub validation_score: f64,
    /// Blocking findings (missing required fields).
    #[serde(default)]
    pub validation_errors: Vec<String>,
    /// Non-blocking findings.
    #[serde(default)]
    pub validation_warnings: Vec<String>,
    /// Whether a similar earlier obligation exists in the validated set.
    pub is_duplicate: bool,
    /// Id of the earlier obligation this one duplicates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_of_id: Option<ObligationId>,
    /// Similarity to the duplicate source, in [0, 1].
    pub similarity_score: f64,
    /// Lifecycle status.
    pub status: ObligationStatus,
    /// When validation ran.
    pub validated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// PipelineJob
// ---------------------------------------------------------------------------

/// Forward-only job state machine, except `retry` which resets an
/// `Error` job to `Queued`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Scraping,
    Parsing,
    Extracting,
    Validating,
    Completed,
    Error,
}

impl JobStatus {
    /// Whether the job can never make further progress.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Legal forward transitions. Retry (Error → Queued) is handled
    /// separately as the single explicit backward edge.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Queued, Scraping) => true,
            (Scraping, Parsing) => true,
            (Parsing, Extracting) => true,
            (Extracting, Validating) => true,
            (Validating, Completed) => true,
            // Any non-terminal state may fail.
            (s, Error) if !s.is_terminal() => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Scraping => "scraping",
            Self::Parsing => "parsing",
            Self::Extracting => "extracting",
            Self::Validating => "validating",
            Self::Completed => "completed",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "scraping" => Ok(Self::Scraping),
            "parsing" => Ok(Self::Parsing),
            "extracting" => Ok(Self::Extracting),
            "validating" => Ok(Self::Validating),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// One queued document, persisted in the jobs table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineJob {
    /// Unique job identifier.
    pub id: JobId,
    /// Source document URL.
    pub source_url: String,
    /// Human-readable title.
    pub title: String,
    /// Current state-machine position.
    pub status: JobStatus,
    /// Last step reached, for diagnosis without replaying the pipeline.
    pub current_step: String,
    /// Monotonically non-decreasing until a terminal status.
    pub progress_percent: u8,
    /// Structured result payload for a completed job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Human-readable failure message for an errored job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// When processing started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl PipelineJob {
    /// Create a fresh queued job for a source URL.
    pub fn queued(source_url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: JobId::new(),
            source_url: source_url.into(),
            title: title.into(),
            status: JobStatus::Queued,
            current_step: "queued".into(),
            progress_percent: 0,
            result: None,
            error_message: None,
            started_at: None,
            completed_at: None,
        }
    }
}
