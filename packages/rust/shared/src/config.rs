//! Application configuration for GrantScout.
//!
//! User config lives at `~/.grantscout/grantscout.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{GrantScoutError, Result};
use crate::retry::RetryPolicy;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "grantscout.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".grantscout";

// ---------------------------------------------------------------------------
// Config structs (matching grantscout.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// LLM endpoint and extraction behaviour.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Headless re-render of script-gated pages.
    #[serde(default)]
    pub render: RenderConfig,

    /// Scope keywords.
    #[serde(default)]
    pub scope: ScopeConfig,

    /// Structured feed sources.
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Where export files are written.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Root folder for raw feed snapshots.
    #[serde(default = "default_raw_dir")]
    pub raw_dir: String,

    /// Maximum link distance from a seed.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Maximum pages fetched per seed.
    #[serde(default = "default_max_pages_per_seed")]
    pub max_pages_per_seed: usize,

    /// Delay in ms before every fetch after the first.
    #[serde(default = "default_politeness_ms")]
    pub politeness_ms: u64,

    /// Maximum characters per extraction chunk.
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,

    /// Attempts per page or feed request before it is skipped.
    #[serde(default = "default_fetch_attempts")]
    pub fetch_attempts: u32,

    /// Backoff before the second page or feed attempt; doubles after.
    #[serde(default = "default_fetch_base_delay_ms")]
    pub fetch_base_delay_ms: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            raw_dir: default_raw_dir(),
            max_depth: default_max_depth(),
            max_pages_per_seed: default_max_pages_per_seed(),
            politeness_ms: default_politeness_ms(),
            chunk_chars: default_chunk_chars(),
            fetch_attempts: default_fetch_attempts(),
            fetch_base_delay_ms: default_fetch_base_delay_ms(),
        }
    }
}

fn default_output_dir() -> String {
    "output".into()
}
fn default_raw_dir() -> String {
    "raw".into()
}
fn default_max_depth() -> u32 {
    2
}
fn default_max_pages_per_seed() -> usize {
    50
}
fn default_politeness_ms() -> u64 {
    300
}
fn default_chunk_chars() -> usize {
    3500
}
fn default_fetch_attempts() -> u32 {
    3
}
fn default_fetch_base_delay_ms() -> u64 {
    1000
}

/// How extraction treats a record that does not fit the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationPolicy {
    /// Repair the record: bad fields become "not found".
    #[default]
    Coerce,
    /// Drop the whole record.
    Discard,
}

impl fmt::Display for ValidationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Coerce => f.write_str("coerce"),
            Self::Discard => f.write_str("discard"),
        }
    }
}

impl FromStr for ValidationPolicy {
    type Err = GrantScoutError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "coerce" => Ok(Self::Coerce),
            "discard" => Ok(Self::Discard),
            other => Err(GrantScoutError::config(format!(
                "unknown validation policy '{other}' (expected coerce or discard)"
            ))),
        }
    }
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// OpenAI-compatible API base, without `/chat/completions`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model identifier sent with every request.
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Attempts per chunk, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First retry delay; doubles on each further attempt.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default)]
    pub validation_policy: ValidationPolicy,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            validation_policy: ValidationPolicy::default(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}

/// `[render]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Re-render flagged pages through headless Chrome.
    #[serde(default)]
    pub enabled: bool,

    /// Chrome/Chromium binary.
    #[serde(default = "default_chrome_path")]
    pub chrome_path: String,

    #[serde(default = "default_render_timeout")]
    pub timeout_secs: u64,

    /// Pages with less cleaned text than this are flagged.
    #[serde(default = "default_min_text_chars")]
    pub min_text_chars: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            chrome_path: default_chrome_path(),
            timeout_secs: default_render_timeout(),
            min_text_chars: default_min_text_chars(),
        }
    }
}

fn default_chrome_path() -> String {
    "chromium".into()
}
fn default_render_timeout() -> u64 {
    30
}
fn default_min_text_chars() -> usize {
    200
}

/// `[scope]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeConfig {
    /// A grant is in scope when any keyword occurs in its text (case-insensitive).
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
        }
    }
}

fn default_keywords() -> Vec<String> {
    [
        "digital health",
        "health",
        "ai",
        "artificial intelligence",
        "machine learning",
        "clinical",
        "medical",
        "research",
        "innovation",
        "workforce",
        "education",
        "mrff",
        "nhmrc",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Which wire protocol a feed speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    /// Paginated GET returning JSON.
    Rest,
    /// Paginated POST with a JSON filter body.
    Search,
    /// RSS 2.0 or Atom.
    Rss,
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rest => f.write_str("rest"),
            Self::Search => f.write_str("search"),
            Self::Rss => f.write_str("rss"),
        }
    }
}

/// `[[feeds]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Short name, used in logs and snapshot paths.
    pub name: String,
    pub kind: FeedKind,
    pub url: String,

    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Hard ceiling on pages requested.
    #[serde(default = "default_feed_max_pages")]
    pub max_pages: u32,

    /// Entry field checked against `allow` (REST/RSS), or the filter
    /// name sent in the request body (search).
    #[serde(default)]
    pub filter_field: Option<String>,

    /// Accepted values for `filter_field`. Empty accepts everything.
    #[serde(default)]
    pub allow: Vec<String>,

    /// Grant field key → entry key or JSON pointer (`/a/b`).
    #[serde(default)]
    pub field_map: BTreeMap<String, String>,

    /// Administering body used when the entry has none.
    #[serde(default)]
    pub default_body: Option<String>,

    /// Array key holding entries; found among common names when unset.
    #[serde(default)]
    pub items_key: Option<String>,
}

fn default_page_size() -> u32 {
    50
}
fn default_feed_max_pages() -> u32 {
    20
}

// ---------------------------------------------------------------------------
// Crawl config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime crawl configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Maximum link distance from the seed.
    pub max_depth: u32,
    /// Maximum pages fetched per seed.
    pub max_pages_per_seed: usize,
    /// Delay in ms before every fetch after the first.
    pub politeness_ms: u64,
    /// Render detector threshold.
    pub min_text_chars: usize,
    /// Backoff for transient page and feed failures.
    pub retry: RetryPolicy,
}

impl From<&AppConfig> for CrawlConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_depth: config.defaults.max_depth,
            max_pages_per_seed: config.defaults.max_pages_per_seed,
            politeness_ms: config.defaults.politeness_ms,
            min_text_chars: config.render.min_text_chars,
            retry: RetryPolicy::for_fetches(&config.defaults),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.grantscout/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| GrantScoutError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.grantscout/grantscout.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| GrantScoutError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        GrantScoutError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

impl AppConfig {
    /// Reject values no run could work with.
    pub fn validate(&self) -> Result<()> {
        if self.defaults.chunk_chars == 0 {
            return Err(GrantScoutError::config("defaults.chunk_chars must be > 0"));
        }
        if self.defaults.max_pages_per_seed == 0 {
            return Err(GrantScoutError::config(
                "defaults.max_pages_per_seed must be > 0",
            ));
        }
        if self.defaults.fetch_attempts == 0 {
            return Err(GrantScoutError::config("defaults.fetch_attempts must be > 0"));
        }
        if self.llm.max_attempts == 0 {
            return Err(GrantScoutError::config("llm.max_attempts must be > 0"));
        }

        let mut names = std::collections::HashSet::new();
        for feed in &self.feeds {
            if !names.insert(feed.name.as_str()) {
                return Err(GrantScoutError::config(format!(
                    "duplicate feed name '{}'",
                    feed.name
                )));
            }
            url::Url::parse(&feed.url).map_err(|e| {
                GrantScoutError::config(format!("feed '{}': invalid url: {e}", feed.name))
            })?;
        }
        Ok(())
    }
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| GrantScoutError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| GrantScoutError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| GrantScoutError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the LLM API key env var is set and non-empty. Returns the key.
pub fn validate_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.llm.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(GrantScoutError::config(format!(
            "LLM API key not found. Set the {var_name} environment variable."
        ))),
    }
}
