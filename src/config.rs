//! Connection configuration parsed from code or environment variables.

use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:3000/ws";
pub const DEFAULT_RECONNECT_INITIAL_MS: u64 = 1_000;
pub const DEFAULT_RECONNECT_MAX_MS: u64 = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid endpoint '{0}': expected ws:// or wss://")]
    InvalidEndpoint(String),
    #[error("config parse error: {0}")]
    Parse(String),
}

/// Whether the handshake carries the session credential.
///
/// Mirrors the browser `withCredentials` switch: callers choose a mode and
/// never build cookie headers themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialsMode {
    #[default]
    Include,
    Omit,
}

/// Reconnect behavior of the websocket link after a drop or failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub initial: Duration,
    pub max: Duration,
}

impl ReconnectPolicy {
    #[must_use]
    pub fn disabled() -> Self {
        Self { enabled: false, ..Self::default() }
    }

    /// Backoff before attempt `attempt` (1-based), without jitter.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1_u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            initial: Duration::from_millis(DEFAULT_RECONNECT_INITIAL_MS),
            max: Duration::from_millis(DEFAULT_RECONNECT_MAX_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Realtime endpoint, `ws://` or `wss://`.
    pub endpoint: String,
    pub credentials: CredentialsMode,
    /// Raw cookie pair sent when `credentials` is `Include`, e.g. `session=abc`.
    pub session_cookie: Option<String>,
    pub reconnect: ReconnectPolicy,
    /// Drop inbound messages that echo one of our own optimistic sends.
    pub dedupe_echoes: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            credentials: CredentialsMode::Include,
            session_cookie: None,
            reconnect: ReconnectPolicy::default(),
            dedupe_echoes: false,
        }
    }
}

impl ConnectionConfig {
    /// Build a config for `endpoint` with defaults for everything else.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEndpoint`] for non-websocket URLs.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ConfigError> {
        let endpoint = validate_endpoint(endpoint.into())?;
        Ok(Self { endpoint, ..Self::default() })
    }

    /// Build typed config from environment variables.
    ///
    /// Optional:
    /// - `LENDCHAT_ENDPOINT`: default `ws://127.0.0.1:3000/ws`
    /// - `LENDCHAT_CREDENTIALS`: `include` (default) or `omit`
    /// - `LENDCHAT_SESSION_COOKIE`: cookie pair for the handshake
    /// - `LENDCHAT_RECONNECT`: `true` (default) or `false`
    /// - `LENDCHAT_RECONNECT_INITIAL_MS`: default 1000
    /// - `LENDCHAT_RECONNECT_MAX_MS`: default 10000
    /// - `LENDCHAT_DEDUPE_ECHOES`: default `false`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable is present but unusable.
    pub fn from_env() -> Result<Self, ConfigError> {
        let endpoint = validate_endpoint(
            std::env::var("LENDCHAT_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_owned()),
        )?;
        let credentials = parse_credentials(env_opt("LENDCHAT_CREDENTIALS").as_deref())?;
        let session_cookie = env_opt("LENDCHAT_SESSION_COOKIE");
        let reconnect = ReconnectPolicy {
            enabled: parse_bool("LENDCHAT_RECONNECT", true)?,
            initial: Duration::from_millis(env_parse_u64("LENDCHAT_RECONNECT_INITIAL_MS", DEFAULT_RECONNECT_INITIAL_MS)),
            max: Duration::from_millis(env_parse_u64("LENDCHAT_RECONNECT_MAX_MS", DEFAULT_RECONNECT_MAX_MS)),
        };
        let dedupe_echoes = parse_bool("LENDCHAT_DEDUPE_ECHOES", false)?;

        Ok(Self { endpoint, credentials, session_cookie, reconnect, dedupe_echoes })
    }

    /// Cookie header value to attach for `mode`, if any.
    #[must_use]
    pub fn cookie_for(&self, mode: CredentialsMode) -> Option<&str> {
        match mode {
            CredentialsMode::Include => self.session_cookie.as_deref().filter(|c| !c.is_empty()),
            CredentialsMode::Omit => None,
        }
    }
}

fn validate_endpoint(raw: String) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.starts_with("ws://") || trimmed.starts_with("wss://") {
        Ok(trimmed.to_owned())
    } else {
        Err(ConfigError::InvalidEndpoint(raw))
    }
}

fn env_opt(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

fn env_parse_u64(key: &str, default: u64) -> u64 {
    env_opt(key).map_or(default, |v| v.trim().parse::<u64>().unwrap_or(default))
}

fn parse_bool(key: &str, default: bool) -> Result<bool, ConfigError> {
    match env_opt(key).as_deref().map(str::trim) {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(ConfigError::Parse(format!("{key}: expected a boolean, got '{other}'"))),
    }
}

fn parse_credentials(raw: Option<&str>) -> Result<CredentialsMode, ConfigError> {
    match raw.map_or("include", str::trim) {
        "include" => Ok(CredentialsMode::Include),
        "omit" => Ok(CredentialsMode::Omit),
        other => Err(ConfigError::Parse(format!(
            "unknown LENDCHAT_CREDENTIALS '{other}' (expected 'include' or 'omit')"
        ))),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
