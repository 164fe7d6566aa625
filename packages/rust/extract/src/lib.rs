//! LLM-assisted obligation extraction.
//!
//! Obligation-bearing articles are grouped into fixed-size batches to bound
//! prompt size; each batch becomes one completion-service call. A transient
//! batch failure is retried twice with increasing delay, then that batch is
//! abandoned while its siblings still run. Given identical input and a
//! deterministic completion service the extractor is idempotent — the only
//! side effect is the outbound call itself.

mod client;
mod parse;

use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use lexpipe_shared::{Article, ParsedDocument, RawObligation, Result};

pub use client::CompletionClient;
pub use parse::parse_response;

/// Articles per completion request. Bounds prompt size.
pub const DEFAULT_BATCH_SIZE: usize = 7;

/// Additional attempts after the first failure of a batch.
const EXTRA_ATTEMPTS: u32 = 2;

/// Base delay between attempts; grows linearly with the attempt number.
const RETRY_BASE_DELAY_MS: u64 = 1_000;

/// Options for one extraction run.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Articles per batch.
    pub batch_size: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Extract candidate obligations from a parsed document.
///
/// Only obligation-bearing articles are sent to the completion service.
/// Returns the concatenated results of all successful batches; a batch that
/// exhausts its retries is dropped with a warning, never failing the run.
#[instrument(skip_all, fields(act = %act_name, articles = document.total_articles))]
pub async fn extract(
    document: &ParsedDocument,
    act_name: &str,
    client: &CompletionClient,
    opts: &ExtractOptions,
) -> Result<Vec<RawObligation>> {
    let bearing: Vec<&Article> = document
        .articles
        .iter()
        .filter(|a| a.has_obligation_markers)
        .collect();

    if bearing.is_empty() {
        info!("no obligation-bearing articles, nothing to extract");
        return Ok(Vec::new());
    }

    let batch_size = opts.batch_size.max(1);
    let batch_count = bearing.len().div_ceil(batch_size);
    let mut obligations = Vec::new();

    for (index, batch) in bearing.chunks(batch_size).enumerate() {
        debug!(batch = index + 1, of = batch_count, articles = batch.len(), "extracting batch");

        match extract_batch(batch, act_name, document, client).await {
            Ok(mut items) => obligations.append(&mut items),
            Err(e) => {
                // Other batches still run; this one's articles are lost
                // for this run only.
                warn!(batch = index + 1, error = %e, "batch failed after retries, skipping");
            }
        }
    }

    info!(
        obligations = obligations.len(),
        batches = batch_count,
        "extraction complete"
    );

    Ok(obligations)
}

/// One batch: build prompt, call with retry, parse.
async fn extract_batch(
    articles: &[&Article],
    act_name: &str,
    document: &ParsedDocument,
    client: &CompletionClient,
) -> Result<Vec<RawObligation>> {
    let prompt = build_prompt(articles, act_name, &document.language);

    let mut attempt = 0u32;
    loop {
        let result = match client.complete(&prompt).await {
            Ok(text) => parse_response(&text, act_name),
            Err(e) => Err(e),
        };

        match result {
            Ok(items) => return Ok(items),
            Err(e) if attempt < EXTRA_ATTEMPTS && e.is_retryable() => {
                attempt += 1;
                let delay = Duration::from_millis(RETRY_BASE_DELAY_MS * u64::from(attempt));
                debug!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying batch");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Build the structured-extraction prompt for one batch.
fn build_prompt(articles: &[&Article], act_name: &str, language: &str) -> String {
    let mut prompt = String::with_capacity(2048);

    prompt.push_str(
        "You are a legal compliance analyst. Extract every discrete legal obligation \
         from the articles below. Respond with ONLY a JSON array; each element must have \
         these fields:\n\
         - obligation_text (string): who must do what\n\
         - responsible_parties (array of strings)\n\
         - deadline_text (string or null): deadline as stated in the source\n\
         - frequency (string): annual, biannual, quarterly, monthly, on_demand, once, \
           weekly, daily, continuous, at_hire, at_termination, or unknown\n\
         - penalty_text (string or null): the penalty clause verbatim\n\
         - evidence_required (array of strings): documents proving compliance\n\
         - source_article_number (string): the article the obligation comes from\n\
         - source_legal_act (string)\n\
         - confidence (number between 0 and 1)\n\
         An article may contain zero or more obligations. Do not invent obligations.\n\n",
    );

    prompt.push_str(&format!("Legal act: {act_name}\nLanguage: {language}\n\n"));

    for article in articles {
        prompt.push_str(&format!("--- Article {} ---\n", article.number));
        if let Some(title) = &article.title {
            prompt.push_str(&format!("{title}\n"));
        }
        prompt.push_str(&article.content);
        prompt.push_str("\n\n");
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lexpipe_shared::CompletionConfig;

    fn article(number: &str, content: &str, bearing: bool) -> Article {
        Article {
            id: format!("a-{number}"),
            number: number.into(),
            title: None,
            content: content.into(),
            has_obligation_markers: bearing,
        }
    }

    fn document(articles: Vec<Article>) -> ParsedDocument {
        let obligation_bearing_count =
            articles.iter().filter(|a| a.has_obligation_markers).count();
        ParsedDocument {
            total_articles: articles.len(),
            obligation_bearing_count,
            articles,
            jurisdiction: "RO".into(),
            language: "ro".into(),
            parsed_at: Utc::now(),
        }
    }

    fn test_client(uri: &str) -> CompletionClient {
        CompletionClient::new(
            &CompletionConfig {
                endpoint: format!("{uri}/v1/completions"),
                api_key_env: "unused".into(),
                model: "test-model".into(),
                temperature: 0.1,
            },
            "sk-test".into(),
        )
        .unwrap()
    }

    fn completion_body(array_json: &str) -> serde_json::Value {
        serde_json::json!({"choices": [{"text": format!("Here you go:\n{array_json}")}]})
    }

    #[test]
    fn prompt_includes_act_and_articles() {
        let a5 = article("5", "Angajatorul trebuie să efectueze evaluarea riscurilor.", true);
        let prompt = build_prompt(&[&a5], "L 319/2006", "ro");
        assert!(prompt.contains("L 319/2006"));
        assert!(prompt.contains("--- Article 5 ---"));
        assert!(prompt.contains("evaluarea riscurilor"));
        assert!(prompt.contains("JSON array"));
    }

    #[tokio::test]
    async fn extracts_only_bearing_articles() {
        let server = wiremock::MockServer::start().await;

        let array = r#"[{"obligation_text": "Angajatorul trebuie să efectueze evaluarea riscurilor",
            "responsible_parties": ["angajator"], "frequency": "anual",
            "source_article_number": "5", "source_legal_act": "L 319/2006", "confidence": 0.9}]"#;

        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(completion_body(array)))
            .expect(1) // one bearing article → exactly one batch call
            .mount(&server)
            .await;

        let doc = document(vec![
            article("1", "Dispoziții generale.", false),
            article("5", "Angajatorul trebuie să efectueze evaluarea riscurilor.", true),
        ]);

        let obligations = extract(&doc, "L 319/2006", &test_client(&server.uri()), &ExtractOptions::default())
            .await
            .expect("extract");

        assert_eq!(obligations.len(), 1);
        assert_eq!(obligations[0].source_article_number, "5");
        assert_eq!(obligations[0].frequency, lexpipe_shared::Frequency::Annual);
    }

    #[tokio::test]
    async fn batches_are_bounded_by_batch_size() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(completion_body("[]")))
            .expect(3) // 7 bearing articles / batch_size 3 → 3 calls
            .mount(&server)
            .await;

        let articles: Vec<Article> = (1..=7)
            .map(|i| article(&i.to_string(), "Angajatorul este obligat să raporteze.", true))
            .collect();
        let doc = document(articles);

        let opts = ExtractOptions { batch_size: 3 };
        let obligations = extract(&doc, "L 319/2006", &test_client(&server.uri()), &opts)
            .await
            .expect("extract");
        assert!(obligations.is_empty());
    }

    #[tokio::test]
    async fn failed_batch_does_not_abort_siblings() {
        let server = wiremock::MockServer::start().await;

        // Every call fails; both batches retry then give up, but extract
        // still returns Ok with zero obligations.
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let articles: Vec<Article> = (1..=2)
            .map(|i| article(&i.to_string(), "The employer shall keep records.", true))
            .collect();
        let doc = document(articles);

        let opts = ExtractOptions { batch_size: 1 };
        let obligations = extract(&doc, "Directive 89/391/EEC", &test_client(&server.uri()), &opts)
            .await
            .expect("extract survives failed batches");
        assert!(obligations.is_empty());

        // 2 batches × (1 + 2 retries) = 6 calls.
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 6);
    }

    #[tokio::test]
    async fn no_bearing_articles_short_circuits() {
        // No mock server: any HTTP call would fail the test.
        let doc = document(vec![article("1", "Dispoziții generale.", false)]);
        let client = test_client("http://127.0.0.1:9"); // unroutable
        let obligations = extract(&doc, "L 319/2006", &client, &ExtractOptions::default())
            .await
            .expect("short circuit");
        assert!(obligations.is_empty());
    }
}
