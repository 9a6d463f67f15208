//! Configuration loading, validation, and management for mcpchat.
//!
//! Loads configuration from `~/.mcpchat/config.toml` (or an explicit path),
//! layers `.env` files and environment variable overrides on top, and
//! validates all settings at startup.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.mcpchat/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Gemini API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the generative language API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Model used for the chat session
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Optional cap on generated tokens per model round
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,

    /// Name shown in the banner and written to the log header
    #[serde(default = "default_agent_name")]
    pub agent_name: String,

    /// System instruction template (`{date}`, `{timezone}`, `{servers}`)
    #[serde(default = "default_system_instruction")]
    pub system_instruction: String,

    /// Maximum tool-call rounds the engine resolves within one turn
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,

    /// Turn retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Gateway connection policy at startup
    #[serde(default)]
    pub startup: StartupConfig,

    /// Session log settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Progress indicator settings
    #[serde(default)]
    pub indicator: IndicatorConfig,

    /// MCP servers that make up the tool gateway
    #[serde(default)]
    pub servers: Vec<McpServerConfig>,
}

fn default_api_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".into()
}
fn default_model() -> String {
    "gemini-2.5-flash".into()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_agent_name() -> String {
    "MCP Agent".into()
}
fn default_max_tool_rounds() -> u32 {
    10
}
fn default_true() -> bool {
    true
}

fn default_system_instruction() -> String {
    "Very important:\n\
     - The user's timezone is {timezone}.\n\
     - The current date is {date}. Any dates before this are in the past; any dates after this are in the future.\n\
     \n\
     Language & Comprehension:\n\
     - When users refer to 'latest', 'most recent', or 'today's', do not assume your knowledge is current. Validate using tools if needed.\n\
     - Speak in the language the user uses or explicitly requests.\n\
     \n\
     Available MCP Servers: {servers}\n\
     \n\
     Tool Usage Guidelines:\n\
     - Select the appropriate tool based on the user's request.\n\
     - If a capability is missing in one server but available in another, prefer the one that supports the feature.\n\
     - After using tools, always finish with a written answer for the user."
        .into()
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("agent_name", &self.agent_name)
            .field("max_tool_rounds", &self.max_tool_rounds)
            .field("retry", &self.retry)
            .field("startup", &self.startup)
            .field("logging", &self.logging)
            .field("indicator", &self.indicator)
            .field("servers", &self.servers)
            .finish()
    }
}

/// How the delay before a retry after a transport/tool error grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// Same delay before every retry
    Fixed,
    /// Delay multiplied by the attempt number
    Linear,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_error_backoff_secs")]
    pub error_backoff_secs: u64,

    #[serde(default = "default_backoff_kind")]
    pub error_backoff: BackoffKind,

    #[serde(default = "default_empty_backoff_secs")]
    pub empty_backoff_secs: u64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_error_backoff_secs() -> u64 {
    3
}
fn default_backoff_kind() -> BackoffKind {
    BackoffKind::Fixed
}
fn default_empty_backoff_secs() -> u64 {
    2
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            error_backoff_secs: default_error_backoff_secs(),
            error_backoff: default_backoff_kind(),
            empty_backoff_secs: default_empty_backoff_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartupConfig {
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,

    /// Delay before connection retry `n` is `connect_backoff_secs * n`
    #[serde(default = "default_connect_backoff_secs")]
    pub connect_backoff_secs: u64,
}

fn default_connect_attempts() -> u32 {
    3
}
fn default_connect_backoff_secs() -> u64 {
    2
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            connect_attempts: default_connect_attempts(),
            connect_backoff_secs: default_connect_backoff_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log directory, relative to the working directory unless absolute
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_file_stem")]
    pub file_stem: String,

    #[serde(default = "default_max_payload_chars")]
    pub max_payload_chars: usize,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(".log")
}
fn default_file_stem() -> String {
    "mcpchat".into()
}
fn default_max_payload_chars() -> usize {
    10_000
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: default_log_dir(),
            file_stem: default_file_stem(),
            max_payload_chars: default_max_payload_chars(),
        }
    }
}

impl LoggingConfig {
    /// Full path of the session log file, resolved against `base`.
    pub fn log_file(&self, base: &Path) -> PathBuf {
        let dir = if self.dir.is_absolute() {
            self.dir.clone()
        } else {
            base.join(&self.dir)
        };
        dir.join(format!("{}_execution.logs", self.file_stem))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Hard ceiling after which the indicator stops by itself
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u32,

    #[serde(default = "default_indicator_label")]
    pub label: String,
}

fn default_tick_ms() -> u64 {
    100
}
fn default_max_ticks() -> u32 {
    300
}
fn default_indicator_label() -> String {
    "Analyzing...".into()
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            max_ticks: default_max_ticks(),
            label: default_indicator_label(),
        }
    }
}

/// One MCP server reachable over streamable HTTP.
#[derive(Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub name: String,

    pub url: String,

    /// Extra HTTP headers sent with every request
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    /// Environment variable holding a bearer token for this server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token_env: Option<String>,

    /// Resolved bearer token (never written back to disk)
    #[serde(skip)]
    pub bearer_token: Option<String>,

    /// Startup fails if a required server cannot be reached; optional
    /// servers are dropped instead.
    #[serde(default = "default_true")]
    pub required: bool,
}

impl std::fmt::Debug for McpServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServerConfig")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("bearer_token_env", &self.bearer_token_env)
            .field("bearer_token", &redact(&self.bearer_token))
            .field("required", &self.required)
            .finish()
    }
}

impl McpServerConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            headers: BTreeMap::new(),
            bearer_token_env: None,
            bearer_token: None,
            required: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from `path`, or from `~/.mcpchat/config.toml`.
    ///
    /// `.env` files are loaded first so their values take part in the
    /// environment overrides:
    /// - `GEMINI_API_KEY`, then `GOOGLE_API_KEY`
    /// - `MCPCHAT_MODEL`
    /// - `MCPCHAT_MCP_URL` / `MCPCHAT_MCP_TOKEN`
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        load_env_files();

        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_dir().join("config.toml"),
        };
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("GEMINI_API_KEY").or_else(|| lookup("GOOGLE_API_KEY"));
        }

        if let Some(model) = lookup("MCPCHAT_MODEL") {
            self.model = model;
        }

        if let Some(url) = lookup("MCPCHAT_MCP_URL") {
            if !self.servers.iter().any(|s| s.url == url) {
                let mut server = McpServerConfig::new("default", url);
                server.bearer_token_env = Some("MCPCHAT_MCP_TOKEN".into());
                self.servers.push(server);
            }
        }

        for server in &mut self.servers {
            if server.bearer_token.is_none() {
                server.bearer_token = server.bearer_token_env.as_deref().and_then(&lookup);
            }
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".mcpchat")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.retry.max_retries == 0 {
            return Err(ConfigError::ValidationError(
                "retry.max_retries must be at least 1".into(),
            ));
        }

        if self.startup.connect_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "startup.connect_attempts must be at least 1".into(),
            ));
        }

        if self.max_tool_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "max_tool_rounds must be at least 1".into(),
            ));
        }

        if self.indicator.tick_ms == 0 || self.indicator.max_ticks == 0 {
            return Err(ConfigError::ValidationError(
                "indicator.tick_ms and indicator.max_ticks must be positive".into(),
            ));
        }

        if self.logging.max_payload_chars < 32 {
            return Err(ConfigError::ValidationError(
                "logging.max_payload_chars must be at least 32".into(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for server in &self.servers {
            if server.name.trim().is_empty() {
                return Err(ConfigError::ValidationError("server name must not be empty".into()));
            }
            if !seen.insert(server.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate server name '{}'",
                    server.name
                )));
            }
            if !server.url.starts_with("http://") && !server.url.starts_with("https://") {
                return Err(ConfigError::ValidationError(format!(
                    "server '{}' url must start with http:// or https://",
                    server.name
                )));
            }
        }

        Ok(())
    }

    /// Names of the configured servers, in order.
    pub fn server_names(&self) -> Vec<String> {
        self.servers.iter().map(|s| s.name.clone()).collect()
    }

    /// Whether any configured server is optional.
    pub fn has_optional_servers(&self) -> bool {
        self.servers.iter().any(|s| !s.required)
    }

    /// Render the system instruction template for `now`.
    pub fn render_system_instruction(&self, now: DateTime<Local>) -> String {
        let servers = if self.servers.is_empty() {
            "none".to_string()
        } else {
            self.server_names().join(", ")
        };
        self.system_instruction
            .replace("{date}", &now.format("%Y-%m-%d").to_string())
            .replace("{timezone}", &now.format("%Z").to_string())
            .replace("{servers}", &servers)
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_output_tokens: None,
            agent_name: default_agent_name(),
            system_instruction: default_system_instruction(),
            max_tool_rounds: default_max_tool_rounds(),
            retry: RetryConfig::default(),
            startup: StartupConfig::default(),
            logging: LoggingConfig::default(),
            indicator: IndicatorConfig::default(),
            servers: Vec::new(),
        }
    }
}

/// Load `./.env`, falling back to `../.env`. Existing variables win.
pub fn load_env_files() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    let candidates = [Some(cwd.join(".env")), cwd.parent().map(|p| p.join(".env"))];

    for candidate in candidates.into_iter().flatten() {
        if candidate.is_file() {
            match dotenvy::from_path(&candidate) {
                Ok(()) => {
                    tracing::debug!(path = %candidate.display(), "Loaded environment file");
                    return Some(candidate);
                }
                Err(e) => {
                    tracing::warn!(path = %candidate.display(), error = %e, "Ignoring unreadable environment file");
                }
            }
        }
    }
    None
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
