//! Application configuration for lexpipe.
//!
//! User config lives at `~/.lexpipe/lexpipe.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LexpipeError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "lexpipe.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".lexpipe";

// ---------------------------------------------------------------------------
// Config structs (matching lexpipe.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Completion-service settings.
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Batch processing policies.
    #[serde(default)]
    pub batch: BatchPoliciesConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Database file path.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// How many days back feed entries are considered fresh.
    #[serde(default = "default_since_days")]
    pub since_days: i64,

    /// Maximum feed entries per jurisdiction per run.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Articles per completion-service request.
    #[serde(default = "default_batch_size")]
    pub extraction_batch_size: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            since_days: default_since_days(),
            max_entries: default_max_entries(),
            extraction_batch_size: default_batch_size(),
        }
    }
}

fn default_db_path() -> String {
    "~/.lexpipe/lexpipe.db".into()
}
fn default_since_days() -> i64 {
    30
}
fn default_max_entries() -> usize {
    50
}
fn default_batch_size() -> usize {
    7
}

/// `[completion]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Completion-service endpoint URL.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model identifier sent with each request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature. Kept low so extraction stays near-deterministic.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key_env: default_api_key_env(),
            model: default_model(),
            temperature: default_temperature(),
        }
    }
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1/completions".into()
}
fn default_api_key_env() -> String {
    "LEXPIPE_API_KEY".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f64 {
    0.1
}

/// `[batch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPoliciesConfig {
    /// Worker pool width. Bounded to respect completion-service rate limits.
    #[serde(default = "default_concurrency")]
    pub concurrency_limit: usize,

    /// Attempts per item before it is recorded as terminally failed.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for BatchPoliciesConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_concurrency() -> usize {
    3
}
fn default_max_retries() -> u32 {
    3
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.lexpipe/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LexpipeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.lexpipe/lexpipe.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LexpipeError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| LexpipeError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LexpipeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LexpipeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LexpipeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Resolve the completion-service API key from the env var named by config.
///
/// Its absence is a fatal configuration error, never a per-item failure.
pub fn resolve_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.completion.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(LexpipeError::config(format!(
            "completion-service API key not found. Set the {var_name} environment variable."
        ))),
    }
}
