//! Configuration loading and validation.
//!
//! Loads `./config.toml` (or `$SOLIDSTREAK_CONFIG`). Environment variables
//! override file values; file values override defaults.
//!
//! Precedence: env vars > config file > defaults.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Env var holding the config file path.
pub const CONFIG_PATH_ENV: &str = "SOLIDSTREAK_CONFIG";

// ── Top-level config ────────────────────────────────────────────

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Telegram Bot API settings.
    pub telegram: TelegramConfig,
    /// Update dispatcher settings.
    pub dispatcher: DispatcherConfig,
    /// Web App API server settings.
    pub http: HttpConfig,
    /// SQLite storage settings.
    pub database: DatabaseConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// `path` wins over `$SOLIDSTREAK_CONFIG`, which wins over `./config.toml`.
    /// A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path_with(|key| std::env::var(key).ok()),
        };
        let mut config = Self::load_from_file(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                Self::from_toml(&contents)
                    .with_context(|| format!("failed to parse config at {}", path.display()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no config file found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "failed to read config at {}: {e}",
                path.display()
            )),
        }
    }

    /// Resolve the config file path using a custom env resolver.
    pub fn config_path_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
        env(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function so tests never touch the process environment.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("TG_BOT_API_TOKEN") {
            self.telegram.bot_token = Some(v);
        }
        if let Some(v) = env("SOLIDSTREAK_TG_API_BASE") {
            self.telegram.api_base = v;
        }
        parse_override(&env, "SOLIDSTREAK_TG_UPDATES_OFFSET", &mut self.telegram.updates_offset);
        parse_override(&env, "SOLIDSTREAK_TG_UPDATES_TIMEOUT", &mut self.telegram.updates_timeout_secs);
        parse_override(&env, "SOLIDSTREAK_MAX_EVENT_HANDLERS", &mut self.dispatcher.max_event_handlers);
        parse_override(&env, "SOLIDSTREAK_HTTP_ADDR", &mut self.http.addr);
        if let Some(v) = env("SOLIDSTREAK_DATABASE_URL") {
            self.database.url = v;
        }
        if let Some(v) = env("SOLIDSTREAK_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = env("SOLIDSTREAK_LOGS_DIR") {
            self.logging.dir = Some(PathBuf::from(v));
        }
    }

    /// Parse a TOML string into config.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or has wrongly typed fields.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml_str).context("failed to parse config TOML")?;
        Ok(config)
    }

    /// Check the settings the runtime cannot work without.
    ///
    /// # Errors
    ///
    /// Returns an error if the bot token is missing or the handler limit is zero.
    pub fn validate(&self) -> Result<()> {
        match self.telegram.bot_token.as_deref() {
            Some(token) if !token.trim().is_empty() => {}
            _ => anyhow::bail!("telegram bot token is not set (TG_BOT_API_TOKEN)"),
        }
        if self.dispatcher.max_event_handlers == 0 {
            anyhow::bail!("dispatcher.max_event_handlers must be at least 1");
        }
        Ok(())
    }

    /// The bot token, which is also the Web App signing secret.
    ///
    /// Empty when unset; call [`Config::validate`] first.
    pub fn bot_token(&self) -> &str {
        self.telegram.bot_token.as_deref().unwrap_or_default()
    }
}

fn parse_override<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    target: &mut T,
) {
    if let Some(v) = env(var) {
        match v.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!(var, value = %v, "ignoring invalid env override"),
        }
    }
}

// ── Sections ────────────────────────────────────────────────────

/// Telegram Bot API settings (`[telegram]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token. Usually supplied through `TG_BOT_API_TOKEN`.
    pub bot_token: Option<String>,
    /// Bot API base URL.
    pub api_base: String,
    /// Offset of the first `getUpdates` call.
    pub updates_offset: i64,
    /// Long-poll timeout for `getUpdates`, in seconds.
    pub updates_timeout_secs: u32,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_base: "https://api.telegram.org".to_owned(),
            updates_offset: 0,
            updates_timeout_secs: 60,
        }
    }
}

/// Update dispatcher settings (`[dispatcher]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Maximum number of handler tasks running at once.
    pub max_event_handlers: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_event_handlers: 10,
        }
    }
}

/// Web App API server settings (`[http]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Listen address.
    pub addr: SocketAddr,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

/// SQLite settings (`[database]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection URL.
    pub url: String,
    /// Pool size.
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://solidstreak.db".to_owned(),
            max_connections: 5,
        }
    }
}

/// Log output settings (`[logging]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub level: String,
    /// Directory for JSON log files. Console only when unset.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            dir: None,
        }
    }
}
