// crates/discord-mcp-config/src/config.rs
// ============================================================================
// Module: Discord MCP Configuration
// Description: Configuration loading, environment overrides, and validation.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: serde, toml, thiserror
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits,
//! then overlaid with environment overrides and validated. Missing or invalid
//! configuration fails closed; the only tolerated absence is the default
//! config file, which yields defaults that must still pass validation.
//! Security posture: config inputs are untrusted and the bot token is a secret;
//! the token is never rendered by [`std::fmt::Debug`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "discord-mcp.toml";
/// Environment variable used to locate the config file.
pub const CONFIG_ENV_VAR: &str = "DISCORD_MCP_CONFIG";
/// Environment variable overriding `discord.token`.
pub const TOKEN_ENV_VAR: &str = "DISCORD_TOKEN";
/// Environment variable overriding `discord.guild_id`.
pub const GUILD_ID_ENV_VAR: &str = "DISCORD_GUILD_ID";
/// Environment variable overriding `server.log_level`.
pub const LOG_LEVEL_ENV_VAR: &str = "LOG_LEVEL";
/// Maximum config file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default maximum outbound message length (characters).
pub(crate) const DEFAULT_MAX_MESSAGE_LENGTH: usize = 2000;
/// Upper bound accepted for `discord.max_message_length`.
pub(crate) const MAX_MESSAGE_LENGTH_LIMIT: usize = 4000;
/// Default client-side rate limit (calls per minute).
pub(crate) const DEFAULT_RATE_LIMIT_PER_MINUTE: u32 = 30;
/// Upper bound accepted for `discord.rate_limit_per_minute`.
pub(crate) const MAX_RATE_LIMIT_PER_MINUTE: u32 = 10_000;
/// Default REST API base URL.
pub(crate) const DEFAULT_API_BASE_URL: &str = "https://discord.com/api/v10";
/// Default REST request timeout in milliseconds.
pub(crate) const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
/// Default gateway websocket URL.
pub(crate) const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";
/// Minimum REST request timeout in milliseconds.
pub(crate) const MIN_REQUEST_TIMEOUT_MS: u64 = 500;
/// Maximum REST request timeout in milliseconds.
pub(crate) const MAX_REQUEST_TIMEOUT_MS: u64 = 60_000;
/// Maximum bot token length.
pub(crate) const MAX_TOKEN_LENGTH: usize = 256;
/// Maximum number of allow-listed guilds.
pub(crate) const MAX_ALLOWED_GUILDS: usize = 256;
/// Default MCP server name reported during `initialize`.
pub(crate) const DEFAULT_SERVER_NAME: &str = "discord-mcp";
/// Default MCP server version reported during `initialize`.
pub(crate) const DEFAULT_SERVER_VERSION: &str = "1.0.0";
/// Default log level.
pub(crate) const DEFAULT_LOG_LEVEL: &str = "info";
/// Accepted log level names.
pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
/// Event notification method for newly created messages.
pub const EVENT_MESSAGE_CREATED: &str = "discord/messageCreated";
/// Event notification method for members joining a guild.
pub const EVENT_GUILD_MEMBER_ADDED: &str = "discord/guildMemberAdded";
/// Event notification method for reactions added to a message.
pub const EVENT_MESSAGE_REACTION_ADDED: &str = "discord/messageReactionAdded";
/// All event names that may appear in `events.allowed_events`.
pub const KNOWN_EVENTS: &[&str] =
    &[EVENT_MESSAGE_CREATED, EVENT_GUILD_MEMBER_ADDED, EVENT_MESSAGE_REACTION_ADDED];

// ============================================================================
// SECTION: Types
// ============================================================================

/// Discord MCP configuration root.
///
/// # Invariants
/// - [`DiscordMcpConfig::validate`] has succeeded before the config is used to
///   build a server.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DiscordMcpConfig {
    /// Remote chat service settings.
    #[serde(default)]
    pub discord: DiscordConfig,
    /// MCP identity reported to clients.
    #[serde(default)]
    pub mcp: McpConfig,
    /// Process-level settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Event notification settings.
    #[serde(default)]
    pub events: EventsConfig,
}

impl DiscordMcpConfig {
    /// Loads configuration from disk, applies process environment overrides,
    /// and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, |name| env::var(name).ok())
    }

    /// Loads configuration using a caller-supplied environment lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load_with_env<F>(path: Option<&Path>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (resolved, explicit) = resolve_path(path, &lookup)?;
        validate_path(&resolved)?;
        let mut config = if !explicit && !resolved.exists() {
            Self::default()
        } else {
            Self::from_file(&resolved)?
        };
        config.apply_env_overrides(&lookup);
        config.validate()?;
        Ok(config)
    }

    /// Parses a config file without applying overrides or validation.
    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let bytes = fs::read(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Overlays environment overrides onto the configuration.
    ///
    /// Empty values are ignored so an exported-but-blank variable never
    /// clears a configured value.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = non_empty(lookup(TOKEN_ENV_VAR)) {
            self.discord.token = token;
        }
        if let Some(guild_id) = non_empty(lookup(GUILD_ID_ENV_VAR)) {
            self.discord.guild_id = Some(guild_id);
        }
        if let Some(level) = non_empty(lookup(LOG_LEVEL_ENV_VAR)) {
            self.server.log_level = level;
        }
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.discord.validate()?;
        self.mcp.validate()?;
        self.server.validate()?;
        self.events.validate()
    }

    /// Returns the effective log filter directive.
    #[must_use]
    pub fn effective_log_level(&self) -> &str {
        if self.server.debug { "debug" } else { self.server.log_level.as_str() }
    }
}

/// Remote chat service configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscordConfig {
    /// Bot token used for REST authentication.
    pub token: String,
    /// Default guild identifier.
    pub guild_id: Option<String>,
    /// Guild allow-list; empty means every guild is allowed.
    pub allowed_guilds: Vec<String>,
    /// Maximum outbound message length in characters.
    pub max_message_length: usize,
    /// Client-side call budget per rolling minute.
    pub rate_limit_per_minute: u32,
    /// REST API base URL.
    pub api_base_url: String,
    /// REST request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Gateway websocket URL used for event notifications.
    pub gateway_url: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            guild_id: None,
            allowed_guilds: Vec::new(),
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
            rate_limit_per_minute: DEFAULT_RATE_LIMIT_PER_MINUTE,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
        }
    }
}

impl fmt::Debug for DiscordConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("DiscordConfig")
            .field("token", &"<redacted>")
            .field("guild_id", &self.guild_id)
            .field("allowed_guilds", &self.allowed_guilds)
            .field("max_message_length", &self.max_message_length)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("api_base_url", &self.api_base_url)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("gateway_url", &self.gateway_url)
            .finish()
    }
}

impl DiscordConfig {
    /// Validates remote service settings.
    fn validate(&self) -> Result<(), ConfigError> {
        let token = self.token.trim();
        if token.is_empty() {
            return Err(ConfigError::Invalid("discord.token is required".to_string()));
        }
        if token.len() > MAX_TOKEN_LENGTH {
            return Err(ConfigError::Invalid("discord.token exceeds max length".to_string()));
        }
        if token.chars().any(char::is_whitespace) {
            return Err(ConfigError::Invalid("discord.token must not contain whitespace".to_string()));
        }
        if let Some(guild_id) = &self.guild_id {
            validate_snowflake("discord.guild_id", guild_id)?;
        }
        if self.allowed_guilds.len() > MAX_ALLOWED_GUILDS {
            return Err(ConfigError::Invalid(format!(
                "discord.allowed_guilds exceeds {MAX_ALLOWED_GUILDS} entries"
            )));
        }
        for guild_id in &self.allowed_guilds {
            validate_snowflake("discord.allowed_guilds", guild_id)?;
        }
        if self.max_message_length == 0 || self.max_message_length > MAX_MESSAGE_LENGTH_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "discord.max_message_length must be between 1 and {MAX_MESSAGE_LENGTH_LIMIT}"
            )));
        }
        if self.rate_limit_per_minute == 0 || self.rate_limit_per_minute > MAX_RATE_LIMIT_PER_MINUTE
        {
            return Err(ConfigError::Invalid(format!(
                "discord.rate_limit_per_minute must be between 1 and {MAX_RATE_LIMIT_PER_MINUTE}"
            )));
        }
        let base = self.api_base_url.trim();
        if !(base.starts_with("https://") || base.starts_with("http://")) {
            return Err(ConfigError::Invalid(
                "discord.api_base_url must include http:// or https://".to_string(),
            ));
        }
        if !(MIN_REQUEST_TIMEOUT_MS..=MAX_REQUEST_TIMEOUT_MS).contains(&self.request_timeout_ms) {
            return Err(ConfigError::Invalid(format!(
                "discord.request_timeout_ms must be between {MIN_REQUEST_TIMEOUT_MS} and \
                 {MAX_REQUEST_TIMEOUT_MS}"
            )));
        }
        let gateway = self.gateway_url.trim();
        if !(gateway.starts_with("wss://") || gateway.starts_with("ws://")) {
            return Err(ConfigError::Invalid(
                "discord.gateway_url must include ws:// or wss://".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns true when the guild passes the allow-list.
    #[must_use]
    pub fn is_guild_allowed(&self, guild_id: &str) -> bool {
        self.allowed_guilds.is_empty() || self.allowed_guilds.iter().any(|id| id == guild_id)
    }
}

/// MCP identity configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct McpConfig {
    /// Server name reported in `serverInfo`.
    pub server_name: String,
    /// Server version reported in `serverInfo`.
    pub version: String,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            server_name: DEFAULT_SERVER_NAME.to_string(),
            version: DEFAULT_SERVER_VERSION.to_string(),
        }
    }
}

impl McpConfig {
    /// Validates MCP identity settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.server_name.trim().is_empty() {
            return Err(ConfigError::Invalid("mcp.server_name must be non-empty".to_string()));
        }
        if self.version.trim().is_empty() {
            return Err(ConfigError::Invalid("mcp.version must be non-empty".to_string()));
        }
        Ok(())
    }
}

/// Process-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Log level directive.
    pub log_level: String,
    /// Forces debug logging when true.
    pub debug: bool,
    /// Optional append-only audit log path.
    pub audit_log: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            debug: false,
            audit_log: None,
        }
    }
}

impl ServerConfig {
    /// Validates process-level settings.
    fn validate(&self) -> Result<(), ConfigError> {
        let level = self.log_level.trim().to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "server.log_level must be one of: {}",
                LOG_LEVELS.join(", ")
            )));
        }
        if let Some(path) = &self.audit_log {
            validate_path_string("server.audit_log", path)?;
        }
        Ok(())
    }
}

/// Event notification configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Global enable flag for event notifications.
    pub enabled: bool,
    /// Event names forwarded to the client.
    pub allowed_events: Vec<String>,
}

impl EventsConfig {
    /// Validates event settings.
    fn validate(&self) -> Result<(), ConfigError> {
        for event in &self.allowed_events {
            if !KNOWN_EVENTS.contains(&event.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "events.allowed_events contains unknown event: {event}"
                )));
            }
        }
        Ok(())
    }

    /// Returns true when the event is both enabled and allow-listed.
    #[must_use]
    pub fn allows(&self, event: &str) -> bool {
        self.enabled && self.allowed_events.iter().any(|allowed| allowed == event)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
///
/// Returns the path and whether it was explicitly requested.
fn resolve_path<F>(path: Option<&Path>, lookup: &F) -> Result<(PathBuf, bool), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = path {
        return Ok((path.to_path_buf(), true));
    }
    if let Some(env_path) = non_empty(lookup(CONFIG_ENV_VAR)) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok((PathBuf::from(env_path), true));
    }
    Ok((PathBuf::from(DEFAULT_CONFIG_NAME), false))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Validates a snowflake identifier (non-empty ASCII digits).
fn validate_snowflake(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() || !value.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(ConfigError::Invalid(format!("{field} must be a numeric snowflake id")));
    }
    Ok(())
}

/// Drops empty or whitespace-only values.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
