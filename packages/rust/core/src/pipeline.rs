//! Pipeline orchestrator: acquire → segment → extract → validate → publish
//! for one jurisdiction, with uniform stage wrapping, partial stop/resume,
//! and concurrent per-jurisdiction fan-out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use lexpipe_extract::{CompletionClient, ExtractOptions};
use lexpipe_feeds::AcquireOptions;
use lexpipe_shared::{LegalDomain, LegislationEntry, ParsedDocument, RawObligation, Result};
use lexpipe_storage::Storage;

use crate::publish::{Notifier, PublishOptions, publish};

// ---------------------------------------------------------------------------
// Stages and results
// ---------------------------------------------------------------------------

/// The four orchestrated stages. Publishing runs after `Validate` and is
/// reported in the run summary rather than as a stage of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Acquire,
    Segment,
    Extract,
    Validate,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Acquire => "acquire",
            Self::Segment => "segment",
            Self::Extract => "extract",
            Self::Validate => "validate",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Uniform record of one stage execution. Stage errors are captured here,
/// never allowed to escape the orchestrator.
#[derive(Debug, Clone)]
pub struct StageResult {
    pub stage: Stage,
    pub success: bool,
    /// Output item count (entries, documents, or obligations).
    pub items: usize,
    pub duration: Duration,
    pub error: Option<String>,
}

/// Terminal state of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    PartialSuccess,
    Failed,
}

/// Options for one orchestrated run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub since_days: i64,
    pub max_entries: usize,
    pub domain_filter: Option<Vec<LegalDomain>>,
    /// Override the jurisdiction's default feed URL.
    pub feed_url_override: Option<String>,
    /// Articles per completion-service batch.
    pub batch_size: usize,
    /// Return with status `completed` immediately after this stage.
    pub stop_at: Option<Stage>,
    /// Skip stages before this one; their outputs come from the seed fields.
    pub resume_from: Option<Stage>,
    pub dry_run: bool,
    pub notify: bool,
    /// Acquired entries, for runs resumed at `Segment`.
    pub seed_entries: Option<Vec<LegislationEntry>>,
    /// Parsed documents with their act names, for runs resumed at `Extract`.
    pub seed_documents: Option<Vec<(String, ParsedDocument)>>,
    /// Extracted candidates, for runs resumed at `Validate`.
    pub seed_obligations: Option<Vec<RawObligation>>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            since_days: 30,
            max_entries: 50,
            domain_filter: None,
            feed_url_override: None,
            batch_size: 7,
            stop_at: None,
            resume_from: None,
            dry_run: false,
            notify: false,
            seed_entries: None,
            seed_documents: None,
            seed_obligations: None,
        }
    }
}

/// Everything a caller learns from one run. A failed run always carries
/// human-readable errors; stage exceptions never propagate out.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub jurisdiction: String,
    pub status: RunStatus,
    pub stages: Vec<StageResult>,
    pub errors: Vec<String>,
    pub entries: usize,
    pub documents: usize,
    pub obligations_extracted: usize,
    pub obligations_validated: usize,
    pub obligations_published: usize,
    pub duration: Duration,
}

impl RunSummary {
    fn new(jurisdiction: &str) -> Self {
        Self {
            jurisdiction: jurisdiction.to_string(),
            status: RunStatus::Failed,
            stages: Vec::new(),
            errors: Vec::new(),
            entries: 0,
            documents: 0,
            obligations_extracted: 0,
            obligations_validated: 0,
            obligations_published: 0,
            duration: Duration::ZERO,
        }
    }

    /// Stage result by stage, if it ran.
    pub fn stage(&self, stage: Stage) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.stage == stage)
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Orchestrates runs against shared storage and the completion service.
/// Cheap to clone; clones share the underlying handles.
#[derive(Clone)]
pub struct PipelineRunner {
    storage: Arc<Storage>,
    completion: Arc<CompletionClient>,
    http: reqwest::Client,
    notifier: Option<Arc<dyn Notifier>>,
}

impl PipelineRunner {
    pub fn new(storage: Arc<Storage>, completion: Arc<CompletionClient>) -> Result<Self> {
        Ok(Self {
            storage,
            completion,
            http: crate::fetch::build_client()?,
            notifier: None,
        })
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Run the pipeline for one jurisdiction. Never returns an error: every
    /// failure is folded into the summary.
    #[instrument(skip_all, fields(jurisdiction = %jurisdiction))]
    pub async fn run(&self, jurisdiction: &str, options: &RunOptions) -> RunSummary {
        let started = Instant::now();
        let mut summary = RunSummary::new(jurisdiction);

        // M1: acquire
        let entries = if skipped(options, Stage::Acquire) {
            options.seed_entries.clone().unwrap_or_default()
        } else {
            let stage_started = Instant::now();
            let acquire_opts = AcquireOptions {
                since_days: options.since_days,
                max_entries: options.max_entries,
                domain_filter: options.domain_filter.clone(),
                feed_url_override: options.feed_url_override.clone(),
            };
            match lexpipe_feeds::acquire(jurisdiction, &acquire_opts).await {
                Ok(entries) if entries.is_empty() => {
                    summary.stages.push(StageResult {
                        stage: Stage::Acquire,
                        success: false,
                        items: 0,
                        duration: stage_started.elapsed(),
                        error: Some("feed returned no entries".into()),
                    });
                    summary.errors.push("feed returned no entries".into());
                    summary.duration = started.elapsed();
                    return summary;
                }
                Ok(entries) => {
                    summary.stages.push(StageResult {
                        stage: Stage::Acquire,
                        success: true,
                        items: entries.len(),
                        duration: stage_started.elapsed(),
                        error: None,
                    });
                    entries
                }
                Err(e) => {
                    let message = e.to_string();
                    summary.stages.push(StageResult {
                        stage: Stage::Acquire,
                        success: false,
                        items: 0,
                        duration: stage_started.elapsed(),
                        error: Some(message.clone()),
                    });
                    summary.errors.push(message);
                    summary.duration = started.elapsed();
                    return summary;
                }
            }
        };
        summary.entries = entries.len();
        if options.stop_at == Some(Stage::Acquire) {
            summary.status = RunStatus::Completed;
            summary.duration = started.elapsed();
            return summary;
        }

        // M2: fetch and segment each entry's document
        let documents = if skipped(options, Stage::Segment) {
            options.seed_documents.clone().unwrap_or_default()
        } else {
            let stage_started = Instant::now();
            let mut documents: Vec<(String, ParsedDocument)> = Vec::new();
            for entry in &entries {
                match self.fetch_and_segment(entry, jurisdiction).await {
                    Ok(document) => documents.push((entry.title.clone(), document)),
                    Err(e) => {
                        warn!(title = %entry.title, error = %e, "document skipped");
                        summary.errors.push(format!("{}: {e}", entry.title));
                    }
                }
            }
            let success = !documents.is_empty();
            summary.stages.push(StageResult {
                stage: Stage::Segment,
                success,
                items: documents.len(),
                duration: stage_started.elapsed(),
                error: (!success).then(|| "no document segmented successfully".into()),
            });
            if !success {
                summary.duration = started.elapsed();
                return summary;
            }
            documents
        };
        summary.documents = documents.len();
        if options.stop_at == Some(Stage::Segment) {
            summary.status = RunStatus::Completed;
            summary.duration = started.elapsed();
            return summary;
        }

        // M3: extract
        let raw = if skipped(options, Stage::Extract) {
            options.seed_obligations.clone().unwrap_or_default()
        } else {
            let stage_started = Instant::now();
            let extract_opts = ExtractOptions {
                batch_size: options.batch_size,
            };
            let mut raw: Vec<RawObligation> = Vec::new();
            let mut failures = 0usize;
            for (act_name, document) in &documents {
                match lexpipe_extract::extract(document, act_name, &self.completion, &extract_opts)
                    .await
                {
                    Ok(mut obligations) => raw.append(&mut obligations),
                    Err(e) => {
                        failures += 1;
                        summary.errors.push(format!("{act_name}: {e}"));
                    }
                }
            }
            let success = failures < documents.len();
            summary.stages.push(StageResult {
                stage: Stage::Extract,
                success,
                items: raw.len(),
                duration: stage_started.elapsed(),
                error: (!success).then(|| "extraction failed for every document".into()),
            });
            raw
        };
        summary.obligations_extracted = raw.len();
        if options.stop_at == Some(Stage::Extract) {
            summary.status = RunStatus::Completed;
            summary.duration = started.elapsed();
            return summary;
        }
        if raw.is_empty() {
            // Nothing downstream can publish; not a failure of the run.
            summary.status = RunStatus::PartialSuccess;
            summary.duration = started.elapsed();
            return summary;
        }

        // M4: validate (pure, cannot fail)
        let stage_started = Instant::now();
        let validated = lexpipe_validate::validate(&raw, jurisdiction);
        summary.stages.push(StageResult {
            stage: Stage::Validate,
            success: true,
            items: validated.len(),
            duration: stage_started.elapsed(),
            error: None,
        });
        summary.obligations_validated = validated.len();
        if options.stop_at == Some(Stage::Validate) {
            summary.status = RunStatus::Completed;
            summary.duration = started.elapsed();
            return summary;
        }

        // Publish
        let publish_opts = PublishOptions {
            dry_run: options.dry_run,
            notify: options.notify,
        };
        let outcome = publish(
            &self.storage,
            &validated,
            jurisdiction,
            &publish_opts,
            self.notifier.as_deref(),
        )
        .await;
        summary.obligations_published = outcome.published;
        for (id, message) in outcome.errors {
            summary.errors.push(format!("publish {id}: {message}"));
        }

        summary.status = if summary.errors.is_empty() {
            RunStatus::Completed
        } else if summary.obligations_published > 0 {
            RunStatus::PartialSuccess
        } else {
            RunStatus::Failed
        };
        summary.duration = started.elapsed();

        info!(
            status = ?summary.status,
            entries = summary.entries,
            documents = summary.documents,
            extracted = summary.obligations_extracted,
            published = summary.obligations_published,
            errors = summary.errors.len(),
            "run finished"
        );
        summary
    }

    /// Fan out one independent run per jurisdiction and join results by key.
    /// One jurisdiction's failure never aborts the others.
    #[instrument(skip_all, fields(count = jurisdictions.len()))]
    pub async fn run_all(
        &self,
        jurisdictions: &[String],
        options: &RunOptions,
    ) -> HashMap<String, RunSummary> {
        let mut handles = Vec::with_capacity(jurisdictions.len());
        for code in jurisdictions {
            let runner = self.clone();
            let code = code.clone();
            let options = options.clone();
            handles.push(tokio::spawn(async move {
                let summary = runner.run(&code, &options).await;
                (code, summary)
            }));
        }

        let mut results = HashMap::with_capacity(jurisdictions.len());
        for (handle, code) in handles.into_iter().zip(jurisdictions) {
            match handle.await {
                Ok((code, summary)) => {
                    results.insert(code, summary);
                }
                Err(e) => {
                    let mut summary = RunSummary::new(code);
                    summary.errors.push(format!("run panicked: {e}"));
                    results.insert(code.clone(), summary);
                }
            }
        }
        results
    }

    async fn fetch_and_segment(
        &self,
        entry: &LegislationEntry,
        jurisdiction: &str,
    ) -> Result<ParsedDocument> {
        let body = crate::fetch::fetch_document(&self.http, &entry.source_link).await?;
        lexpipe_segment::segment(&body, jurisdiction)
    }
}

/// Whether a resume point places this stage before the live portion of the
/// run.
fn skipped(options: &RunOptions, stage: Stage) -> bool {
    options.resume_from.is_some_and(|resume| stage < resume)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lexpipe_shared::{CompletionConfig, ObligationStatus};
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DOC_BODY: &str = "\
LEGEA nr. 319/2006 a securității și sănătății în muncă

Art. 1
Prezenta lege are ca scop instituirea de măsuri privind promovarea \
îmbunătățirii securității și sănătății în muncă a lucrătorilor și stabilește \
principii generale referitoare la prevenirea riscurilor profesionale, \
protecția sănătății, eliminarea factorilor de risc și de accidentare, \
informarea, consultarea și instruirea lucrătorilor și a reprezentanților lor.

Art. 5
Angajatorul trebuie să efectueze evaluarea riscurilor pentru securitatea și \
sănătatea lucrătorilor, inclusiv la alegerea echipamentelor de muncă și la \
amenajarea locurilor de muncă, și să actualizeze această evaluare anual sau \
ori de câte ori apar modificări ale condițiilor de muncă.

Art. 13
Angajatorul este obligat să asigure echipamente individuale de protecție \
adecvate riscurilor identificate și să verifice periodic starea acestora, \
sub sancțiunea unei amenzi contravenționale de la 3000 la 6000 lei.
";

    fn feed_body(doc_url: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel>
  <title>Monitorul Oficial</title>
  <item>
    <title>Legea securității și sănătății în muncă</title>
    <link>{doc_url}</link>
    <pubDate>{}</pubDate>
    <description>Măsuri privind securitatea muncii și evaluarea riscurilor</description>
  </item>
</channel></rss>"#,
            Utc::now().to_rfc2822()
        )
    }

    fn completion_body() -> serde_json::Value {
        let array = serde_json::json!([{
            "obligation_text": "Angajatorul trebuie să efectueze evaluarea riscurilor anual",
            "responsible_parties": ["angajator"],
            "deadline_text": "anual",
            "frequency": "annual",
            "evidence_required": ["Evaluare de risc"],
            "source_article_number": "5",
            "source_legal_act": "L 319/2006",
            "confidence": 0.9
        }]);
        serde_json::json!({
            "choices": [{ "text": array.to_string() }]
        })
    }

    async fn test_runner(completion_endpoint: &str) -> PipelineRunner {
        let tmp = std::env::temp_dir().join(format!("lexpipe_run_{}.db", Uuid::now_v7()));
        let storage = Arc::new(Storage::open(&tmp).await.expect("open test db"));
        let config = CompletionConfig {
            endpoint: completion_endpoint.to_string(),
            ..CompletionConfig::default()
        };
        let client = CompletionClient::new(&config, "test-key".into()).expect("client");
        PipelineRunner::new(storage, Arc::new(client)).expect("runner")
    }

    #[tokio::test]
    async fn full_run_publishes_obligations() {
        let server = MockServer::start().await;
        let doc_url = format!("{}/doc", server.uri());

        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_string(feed_body(&doc_url)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/doc"))
            .respond_with(ResponseTemplate::new(200).set_body_string(DOC_BODY))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body()))
            .mount(&server)
            .await;

        let runner = test_runner(&format!("{}/v1/completions", server.uri())).await;
        let options = RunOptions {
            feed_url_override: Some(format!("{}/feed", server.uri())),
            ..RunOptions::default()
        };

        let summary = runner.run("RO", &options).await;

        assert_eq!(summary.status, RunStatus::Completed, "{:?}", summary.errors);
        assert_eq!(summary.entries, 1);
        assert_eq!(summary.documents, 1);
        assert_eq!(summary.obligations_published, 1);
        assert!(summary.stage(Stage::Validate).unwrap().success);

        let published = runner
            .storage
            .list_obligations(Some(ObligationStatus::Published))
            .await
            .unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].raw.source_article_number, "5");
    }

    #[tokio::test]
    async fn stop_at_segment_skips_downstream_stages() {
        let server = MockServer::start().await;
        let doc_url = format!("{}/doc", server.uri());

        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_string(feed_body(&doc_url)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/doc"))
            .respond_with(ResponseTemplate::new(200).set_body_string(DOC_BODY))
            .mount(&server)
            .await;
        // The completion service must never be called.
        Mock::given(method("POST"))
            .and(path("/v1/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body()))
            .expect(0)
            .mount(&server)
            .await;

        let runner = test_runner(&format!("{}/v1/completions", server.uri())).await;
        let options = RunOptions {
            feed_url_override: Some(format!("{}/feed", server.uri())),
            stop_at: Some(Stage::Segment),
            ..RunOptions::default()
        };

        let summary = runner.run("RO", &options).await;

        assert_eq!(summary.status, RunStatus::Completed);
        assert!(summary.stage(Stage::Extract).is_none());
        assert!(summary.stage(Stage::Validate).is_none());
        assert_eq!(summary.obligations_published, 0);
    }

    #[tokio::test]
    async fn failed_feed_fails_the_run() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let runner = test_runner(&format!("{}/v1/completions", server.uri())).await;
        let options = RunOptions {
            feed_url_override: Some(format!("{}/feed", server.uri())),
            ..RunOptions::default()
        };

        let summary = runner.run("RO", &options).await;

        assert_eq!(summary.status, RunStatus::Failed);
        let acquire = summary.stage(Stage::Acquire).unwrap();
        assert!(!acquire.success);
        assert!(acquire.error.is_some());
        assert!(!summary.errors.is_empty());
    }

    #[tokio::test]
    async fn resume_from_validate_uses_seed_obligations() {
        let server = MockServer::start().await;
        let runner = test_runner(&format!("{}/v1/completions", server.uri())).await;

        let seed = lexpipe_shared::RawObligation {
            obligation_text: "Angajatorul trebuie să efectueze evaluarea riscurilor anual".into(),
            responsible_parties: vec!["angajator".into()],
            deadline_text: Some("anual".into()),
            frequency: lexpipe_shared::Frequency::Annual,
            penalty_text: None,
            penalty_min: None,
            penalty_max: None,
            penalty_currency: None,
            evidence_required: vec!["Evaluare de risc".into()],
            source_article_number: "5".into(),
            source_legal_act: "L 319/2006".into(),
            confidence: 0.9,
        };
        let options = RunOptions {
            resume_from: Some(Stage::Validate),
            seed_obligations: Some(vec![seed]),
            ..RunOptions::default()
        };

        let summary = runner.run("RO", &options).await;

        assert_eq!(summary.status, RunStatus::Completed);
        assert!(summary.stage(Stage::Acquire).is_none());
        assert_eq!(summary.obligations_validated, 1);
        assert_eq!(summary.obligations_published, 1);
    }

    #[tokio::test]
    async fn run_all_isolates_jurisdiction_failures() {
        let server = MockServer::start().await;
        let doc_url = format!("{}/doc", server.uri());

        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_string(feed_body(&doc_url)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/doc"))
            .respond_with(ResponseTemplate::new(200).set_body_string(DOC_BODY))
            .mount(&server)
            .await;

        let runner = test_runner(&format!("{}/v1/completions", server.uri())).await;
        let options = RunOptions {
            feed_url_override: Some(format!("{}/feed", server.uri())),
            stop_at: Some(Stage::Segment),
            ..RunOptions::default()
        };

        // "XX" is not a known jurisdiction; its acquisition fails while RO
        // proceeds untouched.
        let results = runner
            .run_all(&["RO".to_string(), "XX".to_string()], &options)
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results["RO"].status, RunStatus::Completed);
        assert_eq!(results["XX"].status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn dry_run_reports_without_writing() {
        let server = MockServer::start().await;
        let doc_url = format!("{}/doc", server.uri());

        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_string(feed_body(&doc_url)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/doc"))
            .respond_with(ResponseTemplate::new(200).set_body_string(DOC_BODY))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body()))
            .mount(&server)
            .await;

        let runner = test_runner(&format!("{}/v1/completions", server.uri())).await;
        let options = RunOptions {
            feed_url_override: Some(format!("{}/feed", server.uri())),
            dry_run: true,
            ..RunOptions::default()
        };

        let summary = runner.run("RO", &options).await;

        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.obligations_published, 0);
        assert!(runner.storage.list_obligations(None).await.unwrap().is_empty());
    }
}
