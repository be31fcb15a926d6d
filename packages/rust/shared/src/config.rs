//! Application configuration for incidentqa.
//!
//! User config lives at `~/.incidentqa/incidentqa.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets never live in the file: each section names the environment
//! variable that holds them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{IncidentQaError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "incidentqa.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".incidentqa";

// ---------------------------------------------------------------------------
// Config structs (matching incidentqa.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Log backend settings.
    #[serde(default)]
    pub splunk: SplunkConfig,

    /// Documentation backend settings.
    #[serde(default)]
    pub confluence: ConfluenceConfig,

    /// Completion service settings.
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Orchestration settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// How search terms are combined in the log search expression.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinMode {
    /// Every term must appear in the record.
    #[default]
    And,
    /// Any term may appear in the record.
    Or,
}

impl JoinMode {
    /// Operator keyword used between terms.
    pub fn operator(&self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// `[splunk]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplunkConfig {
    /// Management API base URL (e.g. `https://localhost:8089`).
    #[serde(default = "default_splunk_url")]
    pub base_url: String,

    /// Web UI base URL used to build search-result links. No link when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_url: Option<String>,

    /// Env var holding the username.
    #[serde(default = "default_splunk_username_env")]
    pub username_env: String,

    /// Env var holding the password.
    #[serde(default = "default_splunk_password_env")]
    pub password_env: String,

    /// Source type the search is restricted to.
    #[serde(default = "default_sourcetype")]
    pub sourcetype: String,

    /// Start of the search time window (Splunk time modifier).
    #[serde(default = "default_earliest_time")]
    pub earliest_time: String,

    /// End of the search time window.
    #[serde(default = "default_latest_time")]
    pub latest_time: String,

    /// Maximum number of records fetched per search.
    #[serde(default = "default_result_cap")]
    pub result_cap: usize,

    /// Term combination mode.
    #[serde(default)]
    pub join_mode: JoinMode,

    /// Delay between job status polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Status polls allowed before the job is treated as timed out.
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,

    /// Skip TLS certificate verification (self-signed local instances).
    #[serde(default)]
    pub accept_invalid_certs: bool,

    /// Per-request HTTP timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SplunkConfig {
    fn default() -> Self {
        Self {
            base_url: default_splunk_url(),
            web_url: None,
            username_env: default_splunk_username_env(),
            password_env: default_splunk_password_env(),
            sourcetype: default_sourcetype(),
            earliest_time: default_earliest_time(),
            latest_time: default_latest_time(),
            result_cap: default_result_cap(),
            join_mode: JoinMode::default(),
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_attempts: default_max_poll_attempts(),
            accept_invalid_certs: false,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_splunk_url() -> String {
    "https://localhost:8089".into()
}
fn default_splunk_username_env() -> String {
    "SPLUNK_USERNAME".into()
}
fn default_splunk_password_env() -> String {
    "SPLUNK_PASSWORD".into()
}
fn default_sourcetype() -> String {
    "splunk_logs".into()
}
fn default_earliest_time() -> String {
    "-24h".into()
}
fn default_latest_time() -> String {
    "now".into()
}
fn default_result_cap() -> usize {
    50
}
fn default_poll_interval_ms() -> u64 {
    1_000
}
fn default_max_poll_attempts() -> u32 {
    120
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[confluence]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfluenceConfig {
    /// REST API base URL (e.g. `https://acme.atlassian.net/wiki/rest/api`).
    #[serde(default = "default_confluence_url")]
    pub base_url: String,

    /// Account email used for basic auth. Not a secret.
    #[serde(default = "default_confluence_email")]
    pub email: String,

    /// Env var holding the API token.
    #[serde(default = "default_confluence_token_env")]
    pub token_env: String,

    /// Maximum pages returned per keyword.
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,

    /// Per-request HTTP timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ConfluenceConfig {
    fn default() -> Self {
        Self {
            base_url: default_confluence_url(),
            email: default_confluence_email(),
            token_env: default_confluence_token_env(),
            page_limit: default_page_limit(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_confluence_url() -> String {
    "https://example.atlassian.net/wiki/rest/api".into()
}
fn default_confluence_email() -> String {
    "oncall@example.com".into()
}
fn default_confluence_token_env() -> String {
    "CONFLUENCE_API_TOKEN".into()
}
fn default_page_limit() -> u32 {
    5
}

/// `[openai]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Chat completions API base URL.
    #[serde(default = "default_openai_url")]
    pub base_url: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for extraction and synthesis.
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature.
    #[serde(default)]
    pub temperature: f32,

    /// Per-request HTTP timeout.
    #[serde(default = "default_completion_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_url(),
            api_key_env: default_api_key_env(),
            model: default_model(),
            temperature: 0.0,
            timeout_secs: default_completion_timeout_secs(),
        }
    }
}

fn default_openai_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_model() -> String {
    "gpt-3.5-turbo".into()
}
fn default_completion_timeout_secs() -> u64 {
    60
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound for answering one question. Unbounded when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_timeout_secs: Option<u64>,
}

// ---------------------------------------------------------------------------
// Credentials (runtime, resolved once from the environment)
// ---------------------------------------------------------------------------

/// A secret string that never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// Wrap a secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the secret for use in an outbound request.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Credentials for every backend, resolved at startup.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub splunk_username: String,
    pub splunk_password: Secret,
    pub confluence_token: Secret,
    pub openai_api_key: Secret,
}

/// Resolve all credentials from the process environment.
///
/// Fails on the first missing or empty variable, naming the variable.
pub fn resolve_credentials(config: &AppConfig) -> Result<Credentials> {
    resolve_credentials_with(config, |name| std::env::var(name).ok())
}

/// Resolve credentials through an arbitrary lookup (used by tests).
pub fn resolve_credentials_with(
    config: &AppConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Credentials> {
    let require = |var_name: &str| match lookup(var_name) {
        Some(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(IncidentQaError::credentials(format!(
            "{var_name} is not set in the environment"
        ))),
    };

    let credentials = Credentials {
        splunk_username: require(&config.splunk.username_env)?,
        splunk_password: Secret::new(require(&config.splunk.password_env)?),
        confluence_token: Secret::new(require(&config.confluence.token_env)?),
        openai_api_key: Secret::new(require(&config.openai.api_key_env)?),
    };
    tracing::debug!(username = %credentials.splunk_username, "credentials resolved");
    Ok(credentials)
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.incidentqa/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| IncidentQaError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.incidentqa/incidentqa.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    load_config_or_default(&config_file_path()?)
}

/// Load the config at `path`, falling back to defaults when it does not exist.
pub fn load_config_or_default(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| IncidentQaError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        IncidentQaError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let path = config_file_path()?;
    init_config_at(&path)?;
    Ok(path)
}

/// Write a default config file at `path`, creating parent directories.
pub fn init_config_at(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| IncidentQaError::io(dir, e))?;
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| IncidentQaError::config(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| IncidentQaError::io(path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(())
}

impl AppConfig {
    /// Reject values that would make the pipeline misbehave.
    pub fn validate(&self) -> Result<()> {
        for (name, raw) in [
            ("splunk.base_url", self.splunk.base_url.as_str()),
            ("confluence.base_url", self.confluence.base_url.as_str()),
            ("openai.base_url", self.openai.base_url.as_str()),
        ] {
            url::Url::parse(raw)
                .map_err(|e| IncidentQaError::config(format!("{name} '{raw}' is invalid: {e}")))?;
        }
        if self.splunk.result_cap == 0 {
            return Err(IncidentQaError::config("splunk.result_cap must be at least 1"));
        }
        if self.splunk.max_poll_attempts == 0 {
            return Err(IncidentQaError::config(
                "splunk.max_poll_attempts must be at least 1",
            ));
        }
        Ok(())
    }
}
