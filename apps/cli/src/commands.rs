//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use url::Url;

use lexpipe_core::{
    BatchOptions, JobWorker, Notifier, PipelineRunner, RunOptions, RunStatus, RunSummary, Stage,
    enqueue_and_process,
};
use lexpipe_extract::CompletionClient;
use lexpipe_shared::{
    AppConfig, JobId, JobStatus, LegalDomain, init_config, load_config, resolve_api_key,
};
use lexpipe_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// lexpipe — turn legislative feeds into validated compliance obligations.
#[derive(Parser)]
#[command(
    name = "lexpipe",
    version,
    about = "Ingest legislative feeds, extract and validate legal obligations.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Fetch and classify a jurisdiction's feed without running the pipeline.
    Acquire {
        /// Jurisdiction code (e.g. RO, EU).
        jurisdiction: String,

        /// Discard entries older than this many days.
        #[arg(long)]
        since_days: Option<i64>,

        /// Keep at most this many entries.
        #[arg(long)]
        max_entries: Option<usize>,

        /// Keep only these legal domains (ssm, psi, gdpr, labor, other).
        #[arg(long = "domain")]
        domains: Vec<String>,

        /// Override the jurisdiction's default feed URL.
        #[arg(long)]
        feed_url: Option<String>,
    },

    /// Run the full pipeline for one or more jurisdictions.
    Run {
        /// Jurisdiction codes.
        #[arg(required = true)]
        jurisdictions: Vec<String>,

        /// Discard entries older than this many days.
        #[arg(long)]
        since_days: Option<i64>,

        /// Keep at most this many entries per jurisdiction.
        #[arg(long)]
        max_entries: Option<usize>,

        /// Keep only these legal domains (ssm, psi, gdpr, labor, other).
        #[arg(long = "domain")]
        domains: Vec<String>,

        /// Override feed URL (single-jurisdiction runs only).
        #[arg(long)]
        feed_url: Option<String>,

        /// Stop after this stage (acquire, segment, extract, validate).
        #[arg(long)]
        stop_at: Option<String>,

        /// Report what would be published without writing.
        #[arg(long)]
        dry_run: bool,

        /// Signal the notification hook for newly published obligations.
        #[arg(long)]
        notify: bool,
    },

    /// Enqueue source document URLs and process them as jobs.
    Batch {
        /// Source document URLs.
        #[arg(required = true)]
        urls: Vec<String>,

        /// Jurisdiction whose article grammar the documents follow.
        #[arg(short, long, default_value = "RO")]
        jurisdiction: String,

        /// Worker pool width.
        #[arg(long)]
        concurrency: Option<usize>,

        /// Attempts per document before it is recorded as failed.
        #[arg(long)]
        max_retries: Option<u32>,
    },

    /// Inspect and manage pipeline jobs.
    Jobs {
        #[command(subcommand)]
        action: JobsAction,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Job queue subcommands.
#[derive(Subcommand)]
pub(crate) enum JobsAction {
    /// List jobs, optionally filtered by status.
    List {
        /// Filter: queued, scraping, parsing, extracting, validating,
        /// completed, error.
        #[arg(long)]
        status: Option<String>,
    },
    /// Show one job in full.
    Show {
        /// Job id.
        id: String,
    },
    /// Reset an errored job back to queued.
    Retry {
        /// Job id.
        id: String,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "lexpipe=info",
        1 => "lexpipe=debug",
        _ => "lexpipe=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Acquire {
            jurisdiction,
            since_days,
            max_entries,
            domains,
            feed_url,
        } => cmd_acquire(&jurisdiction, since_days, max_entries, &domains, feed_url).await,
        Command::Run {
            jurisdictions,
            since_days,
            max_entries,
            domains,
            feed_url,
            stop_at,
            dry_run,
            notify,
        } => {
            cmd_run(
                &jurisdictions,
                since_days,
                max_entries,
                &domains,
                feed_url,
                stop_at.as_deref(),
                dry_run,
                notify,
            )
            .await
        }
        Command::Batch {
            urls,
            jurisdiction,
            concurrency,
            max_retries,
        } => cmd_batch(&urls, &jurisdiction, concurrency, max_retries).await,
        Command::Jobs { action } => match action {
            JobsAction::List { status } => cmd_jobs_list(status.as_deref()).await,
            JobsAction::Show { id } => cmd_jobs_show(&id).await,
            JobsAction::Retry { id } => cmd_jobs_retry(&id).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_acquire(
    jurisdiction: &str,
    since_days: Option<i64>,
    max_entries: Option<usize>,
    domains: &[String],
    feed_url: Option<String>,
) -> Result<()> {
    let config = load_config()?;
    let opts = lexpipe_feeds::AcquireOptions {
        since_days: since_days.unwrap_or(config.defaults.since_days),
        max_entries: max_entries.unwrap_or(config.defaults.max_entries),
        domain_filter: parse_domains(domains)?,
        feed_url_override: feed_url,
    };

    let entries = lexpipe_feeds::acquire(jurisdiction, &opts).await?;

    println!();
    println!("  {} entries from {jurisdiction}", entries.len());
    for entry in &entries {
        println!(
            "  [{:>5}] {}  {}",
            format!("{:?}", entry.legal_domain).to_uppercase(),
            entry.published_at.format("%Y-%m-%d"),
            entry.title
        );
    }
    println!();
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_run(
    jurisdictions: &[String],
    since_days: Option<i64>,
    max_entries: Option<usize>,
    domains: &[String],
    feed_url: Option<String>,
    stop_at: Option<&str>,
    dry_run: bool,
    notify: bool,
) -> Result<()> {
    let config = load_config()?;
    let api_key = resolve_api_key(&config)?;

    if feed_url.is_some() && jurisdictions.len() > 1 {
        return Err(eyre!("--feed-url only makes sense for a single jurisdiction"));
    }

    let storage = Arc::new(Storage::open(&db_path(&config)?).await?);
    let completion = Arc::new(CompletionClient::new(&config.completion, api_key)?);
    let mut runner = PipelineRunner::new(storage, completion)?;
    if notify {
        runner = runner.with_notifier(Arc::new(LogNotifier));
    }

    let options = RunOptions {
        since_days: since_days.unwrap_or(config.defaults.since_days),
        max_entries: max_entries.unwrap_or(config.defaults.max_entries),
        domain_filter: parse_domains(domains)?,
        feed_url_override: feed_url,
        batch_size: config.defaults.extraction_batch_size,
        stop_at: stop_at.map(parse_stage).transpose()?,
        dry_run,
        notify,
        ..RunOptions::default()
    };

    info!(count = jurisdictions.len(), dry_run, "starting pipeline run");

    let results = runner.run_all(jurisdictions, &options).await;

    let mut failed = false;
    for code in jurisdictions {
        if let Some(summary) = results.get(code) {
            print_summary(summary);
            failed |= summary.status == RunStatus::Failed;
        }
    }

    if failed {
        return Err(eyre!("at least one jurisdiction run failed"));
    }
    Ok(())
}

async fn cmd_batch(
    urls: &[String],
    jurisdiction: &str,
    concurrency: Option<usize>,
    max_retries: Option<u32>,
) -> Result<()> {
    let config = load_config()?;
    let api_key = resolve_api_key(&config)?;

    let mut sources = Vec::with_capacity(urls.len());
    for raw in urls {
        let url = Url::parse(raw).map_err(|e| eyre!("invalid URL '{raw}': {e}"))?;
        let title = url.host_str().unwrap_or("document").to_string();
        sources.push((url.to_string(), title));
    }

    let storage = Arc::new(Storage::open(&db_path(&config)?).await?);
    let completion = Arc::new(CompletionClient::new(&config.completion, api_key)?);
    let worker = JobWorker::new(
        storage,
        completion,
        jurisdiction,
        config.defaults.extraction_batch_size,
    )?;

    let options = BatchOptions {
        concurrency_limit: concurrency.unwrap_or(config.batch.concurrency_limit),
        max_retries: max_retries.unwrap_or(config.batch.max_retries),
    };

    let bar = ProgressBar::new(sources.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:30.cyan/dim} {pos}/{len} {msg}").unwrap(),
    );

    let report = enqueue_and_process(worker, &sources, &options, |percent, completed, _total| {
        bar.set_position(completed as u64);
        bar.set_message(format!("{percent}%"));
    })
    .await?;
    bar.finish_and_clear();

    println!();
    println!("  Batch finished in {:.1}s", report.duration.as_secs_f64());
    println!("  Success:     {}", report.success_count);
    println!("  Partial:     {}", report.partial_count);
    println!("  Failed:      {}", report.failed_count);
    println!("  Articles:    {}", report.articles_total);
    println!("  Obligations: {}", report.obligations_total);
    if !report.error_kinds.is_empty() {
        println!("  Errors:");
        for (kind, count) in &report.error_kinds {
            println!("    {:<12} {count}", kind.as_str());
        }
    }
    println!();

    if report.failed_count > 0 {
        return Err(eyre!("{} document(s) failed terminally", report.failed_count));
    }
    Ok(())
}

async fn cmd_jobs_list(status: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let storage = Storage::open_readonly(&db_path(&config)?).await?;

    let filter = status
        .map(|s| JobStatus::from_str(s).map_err(|e| eyre!(e)))
        .transpose()?;
    let jobs = storage.list_jobs(filter).await?;

    println!();
    println!("  {} job(s)", jobs.len());
    for job in &jobs {
        println!(
            "  {}  {:<10} {:>3}%  {}",
            job.id, job.status, job.progress_percent, job.title
        );
    }
    println!();
    Ok(())
}

async fn cmd_jobs_show(id: &str) -> Result<()> {
    let config = load_config()?;
    let storage = Storage::open_readonly(&db_path(&config)?).await?;

    let job_id = JobId::from_str(id).map_err(|e| eyre!("invalid job id '{id}': {e}"))?;
    let Some(job) = storage.get_job(&job_id).await? else {
        return Err(eyre!("job {id} not found"));
    };

    println!();
    println!("  Id:       {}", job.id);
    println!("  Title:    {}", job.title);
    println!("  Source:   {}", job.source_url);
    println!("  Status:   {}", job.status);
    println!("  Step:     {}", job.current_step);
    println!("  Progress: {}%", job.progress_percent);
    if let Some(started) = job.started_at {
        println!("  Started:  {started}");
    }
    if let Some(completed) = job.completed_at {
        println!("  Ended:    {completed}");
    }
    if let Some(error) = &job.error_message {
        println!("  Error:    {error}");
    }
    if let Some(result) = &job.result {
        println!("  Result:   {}", serde_json::to_string_pretty(result)?);
    }
    println!();
    Ok(())
}

async fn cmd_jobs_retry(id: &str) -> Result<()> {
    let config = load_config()?;
    let storage = Storage::open(&db_path(&config)?).await?;

    let job_id = JobId::from_str(id).map_err(|e| eyre!("invalid job id '{id}': {e}"))?;
    let job = storage.retry_job(&job_id).await?;

    println!("Job {} reset to {}", job.id, job.status);
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Notifier that records published counts in the log. Real fan-out to
/// affected organizations lives outside this tool.
struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, jurisdiction: &str, published: usize) -> lexpipe_shared::Result<()> {
        info!(jurisdiction, published, "new obligations published");
        Ok(())
    }
}

fn print_summary(summary: &RunSummary) {
    let status = match summary.status {
        RunStatus::Completed => "completed",
        RunStatus::PartialSuccess => "partial success",
        RunStatus::Failed => "FAILED",
    };

    println!();
    println!("  {} — {status}", summary.jurisdiction);
    for stage in &summary.stages {
        println!(
            "    {:<8} {}  {} item(s) in {:.2}s{}",
            stage.stage,
            if stage.success { "ok" } else { "failed" },
            stage.items,
            stage.duration.as_secs_f64(),
            stage
                .error
                .as_deref()
                .map(|e| format!("  ({e})"))
                .unwrap_or_default()
        );
    }
    println!("    published: {}", summary.obligations_published);
    for error in &summary.errors {
        println!("    error: {error}");
    }
    println!();
}

/// Expand the configured database path, resolving a leading `~`.
fn db_path(config: &AppConfig) -> Result<PathBuf> {
    let raw = &config.defaults.db_path;
    if let Some(rest) = raw.strip_prefix("~/") {
        let home =
            dirs::home_dir().ok_or_else(|| eyre!("could not determine home directory"))?;
        Ok(home.join(rest))
    } else {
        Ok(PathBuf::from(raw))
    }
}

fn parse_domains(domains: &[String]) -> Result<Option<Vec<LegalDomain>>> {
    if domains.is_empty() {
        return Ok(None);
    }
    let mut parsed = Vec::with_capacity(domains.len());
    for raw in domains {
        parsed.push(match raw.to_lowercase().as_str() {
            "ssm" => LegalDomain::Ssm,
            "psi" => LegalDomain::Psi,
            "gdpr" => LegalDomain::Gdpr,
            "labor" => LegalDomain::Labor,
            "other" => LegalDomain::Other,
            other => {
                return Err(eyre!(
                    "unknown legal domain '{other}': expected ssm, psi, gdpr, labor, or other"
                ));
            }
        });
    }
    Ok(Some(parsed))
}

fn parse_stage(raw: &str) -> Result<Stage> {
    match raw.to_lowercase().as_str() {
        "acquire" => Ok(Stage::Acquire),
        "segment" => Ok(Stage::Segment),
        "extract" => Ok(Stage::Extract),
        "validate" => Ok(Stage::Validate),
        other => Err(eyre!(
            "unknown stage '{other}': expected acquire, segment, extract, or validate"
        )),
    }
}
