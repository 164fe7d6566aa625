//! Publishing: persist promotable obligations and signal the notifier.

use tracing::{info, instrument, warn};

use lexpipe_shared::{ObligationStatus, Result, ValidatedObligation};
use lexpipe_storage::Storage;

/// External notification collaborator. Receives the jurisdiction and the
/// count of newly published obligations; fan-out to affected organizations
/// is its problem, not ours.
pub trait Notifier: Send + Sync {
    fn notify(&self, jurisdiction: &str, published: usize) -> Result<()>;
}

/// Options for one publish pass.
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    /// Report what would be published without writing anything.
    pub dry_run: bool,
    /// Signal the notifier when at least one obligation is published.
    pub notify: bool,
}

/// Outcome of a publish pass.
#[derive(Debug, Clone, Default)]
pub struct PublishOutcome {
    /// Obligations persisted with status `published`.
    pub published: usize,
    /// Obligations not eligible for publishing (draft, duplicate, dry-run).
    pub skipped: usize,
    /// Per-item write failures as `(obligation id, message)`.
    pub errors: Vec<(String, String)>,
}

/// Persist every validated, non-duplicate obligation as `published`.
///
/// A per-item write failure is recorded and skipped; the loop never aborts.
/// Notification failures are logged and never roll anything back.
#[instrument(skip_all, fields(jurisdiction = %jurisdiction, count = obligations.len()))]
pub async fn publish(
    storage: &Storage,
    obligations: &[ValidatedObligation],
    jurisdiction: &str,
    options: &PublishOptions,
    notifier: Option<&dyn Notifier>,
) -> PublishOutcome {
    let mut outcome = PublishOutcome::default();

    for obligation in obligations {
        let eligible =
            obligation.status == ObligationStatus::Validated && !obligation.is_duplicate;
        if !eligible || options.dry_run {
            outcome.skipped += 1;
            continue;
        }

        let mut record = obligation.clone();
        record.status = ObligationStatus::Published;
        match storage.upsert_obligation(&record).await {
            Ok(()) => outcome.published += 1,
            Err(e) => {
                warn!(id = %obligation.id, error = %e, "failed to publish obligation");
                outcome
                    .errors
                    .push((obligation.id.to_string(), e.to_string()));
                outcome.skipped += 1;
            }
        }
    }

    if options.notify && outcome.published > 0 {
        if let Some(notifier) = notifier {
            if let Err(e) = notifier.notify(jurisdiction, outcome.published) {
                warn!(error = %e, "notification failed, publishing already committed");
            }
        }
    }

    info!(
        published = outcome.published,
        skipped = outcome.skipped,
        errors = outcome.errors.len(),
        dry_run = options.dry_run,
        "publish pass complete"
    );

    outcome
}
