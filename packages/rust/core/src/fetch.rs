//! Shared document-fetch plumbing for the orchestrator and job worker.

use std::time::Duration;

use lexpipe_shared::{LexpipeError, Result};

/// User-Agent string for document fetches.
const USER_AGENT: &str = concat!("lexpipe/", env!("CARGO_PKG_VERSION"));

/// Per-request timeout for source documents.
const FETCH_TIMEOUT_SECS: u64 = 30;

/// Build the HTTP client used for source-document fetches.
pub(crate) fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
        .build()
        .map_err(|e| LexpipeError::Fetch(format!("failed to build HTTP client: {e}")))
}

/// Fetch one source document as text. Non-2xx responses are fetch failures.
pub(crate) async fn fetch_document(client: &reqwest::Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| LexpipeError::Fetch(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(LexpipeError::Fetch(format!("{url}: HTTP {status}")));
    }

    response
        .text()
        .await
        .map_err(|e| LexpipeError::Fetch(format!("{url}: body read failed: {e}")))
}
