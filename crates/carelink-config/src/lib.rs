//! Shared configuration for carelink consumers.
//!
//! TOML profiles, token resolution (env + keyring + plaintext), and
//! translation to `carelink_core::ChannelConfig` + `Identity`. The CLI adds
//! flag-aware wrappers on top; core never reads these types.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use carelink_core::{ChannelConfig, DEFAULT_AUTH_CLOSE_CODES, Identity, ReconnectConfig};

/// Keyring service under which tokens are stored.
pub const KEYRING_SERVICE: &str = "carelink";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no token configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is given on the command line.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named endpoint + identity profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

/// Connection tuning shared by every profile.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    /// `0` disables pong supervision.
    #[serde(default = "default_pong_timeout_secs")]
    pub pong_timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_close_timeout_secs")]
    pub close_timeout_secs: u64,

    #[serde(default)]
    pub reconnect: ReconnectSection,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            keepalive_secs: default_keepalive_secs(),
            pong_timeout_secs: default_pong_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            close_timeout_secs: default_close_timeout_secs(),
            reconnect: ReconnectSection::default(),
        }
    }
}

impl Defaults {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn default_keepalive_secs() -> u64 {
    30
}
fn default_pong_timeout_secs() -> u64 {
    10
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_close_timeout_secs() -> u64 {
    2
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReconnectSection {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    #[serde(default = "default_jitter")]
    pub jitter: f64,

    /// Unset means retry forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
            max_retries: None,
        }
    }
}

fn default_initial_delay_ms() -> u64 {
    3000
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_jitter() -> f64 {
    0.25
}

/// A named endpoint + identity profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// WebSocket endpoint (e.g., "wss://clinic.example.com/ws/messaging/").
    pub endpoint: String,

    #[serde(default)]
    pub tenant_id: String,

    #[serde(default)]
    pub user_id: String,

    /// Token (plaintext -- prefer keyring or env var).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Environment variable name containing the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,

    /// Close codes treated as credential rejection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_close_codes: Option<Vec<u16>>,

    /// Override keep-alive interval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keepalive_secs: Option<u64>,

    /// Override pong timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pong_timeout_secs: Option<u64>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "carelink", "carelink").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("carelink");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + environment. A missing file yields the defaults.
///
/// Environment keys nest on `__`: `CARELINK_DEFAULTS__KEEPALIVE_SECS=15`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("CARELINK_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist or is broken.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Token resolution (without CLI flags) ────────────────────────────

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, keyring::Error> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/token"))
}

/// Resolve the channel token from the credential chain (no CLI flag step).
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Profile's token_env → env var lookup
    if let Some(ref env_name) = profile.token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring_entry(profile_name) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref token) = profile.token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store `token` in the system keyring for `profile_name`.
pub fn store_token(profile_name: &str, token: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?.set_password(token)?;
    Ok(())
}

// ── Translation to core types ───────────────────────────────────────

/// Parse and check a channel endpoint. Only `ws` and `wss` are accepted.
pub fn parse_endpoint(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| invalid("endpoint", format!("{raw}: {e}")))?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(invalid(
            "endpoint",
            format!("expected a ws:// or wss:// URL, got scheme '{other}'"),
        )),
    }
}

/// Backoff settings from the `[defaults.reconnect]` table.
pub fn reconnect_config(section: &ReconnectSection) -> Result<ReconnectConfig, ConfigError> {
    if section.initial_delay_ms == 0 {
        return Err(invalid("reconnect.initial_delay_ms", "must be greater than 0"));
    }
    if section.max_delay_ms < section.initial_delay_ms {
        return Err(invalid(
            "reconnect.max_delay_ms",
            "must not be smaller than initial_delay_ms",
        ));
    }
    if !section.multiplier.is_finite() || section.multiplier < 1.0 {
        return Err(invalid("reconnect.multiplier", "must be at least 1.0"));
    }
    if !(0.0..1.0).contains(&section.jitter) {
        return Err(invalid("reconnect.jitter", "must be in [0.0, 1.0)"));
    }

    Ok(ReconnectConfig {
        initial_delay: Duration::from_millis(section.initial_delay_ms),
        max_delay: Duration::from_millis(section.max_delay_ms),
        multiplier: section.multiplier,
        jitter: section.jitter,
        max_retries: section.max_retries,
    })
}

/// Build a `ChannelConfig` for `endpoint` from a profile + defaults.
pub fn channel_config(
    endpoint: Url,
    profile: &Profile,
    defaults: &Defaults,
) -> Result<ChannelConfig, ConfigError> {
    let keepalive_secs = profile.keepalive_secs.unwrap_or(defaults.keepalive_secs);
    if keepalive_secs == 0 {
        return Err(invalid("keepalive_secs", "must be greater than 0"));
    }
    let pong_timeout_secs = profile
        .pong_timeout_secs
        .unwrap_or(defaults.pong_timeout_secs);

    let mut config = ChannelConfig::new(endpoint);
    config.reconnect = reconnect_config(&defaults.reconnect)?;
    config.keepalive_interval = Duration::from_secs(keepalive_secs);
    config.pong_timeout = (pong_timeout_secs > 0).then(|| Duration::from_secs(pong_timeout_secs));
    config.close_timeout = Duration::from_secs(defaults.close_timeout_secs);
    config.auth_close_codes = profile
        .auth_close_codes
        .clone()
        .unwrap_or_else(|| DEFAULT_AUTH_CLOSE_CODES.to_vec());
    Ok(config)
}

/// Build the connecting identity. Tenant and user must be non-empty.
pub fn identity(
    tenant_id: &str,
    user_id: &str,
    token: SecretString,
) -> Result<Identity, ConfigError> {
    if tenant_id.trim().is_empty() {
        return Err(invalid("tenant_id", "must not be empty"));
    }
    if user_id.trim().is_empty() {
        return Err(invalid("user_id", "must not be empty"));
    }
    Ok(Identity::new(tenant_id, user_id, token))
}

/// Build `ChannelConfig` + `Identity` from a profile -- no CLI flag
/// overrides.
pub fn profile_to_channel_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<(ChannelConfig, Identity), ConfigError> {
    let endpoint = parse_endpoint(&profile.endpoint)?;
    let config = channel_config(endpoint, profile, defaults)?;
    let token = resolve_token(profile, profile_name)?;
    let identity = identity(&profile.tenant_id, &profile.user_id, token)?;
    Ok((config, identity))
}
