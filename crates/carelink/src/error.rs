//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use carelink_config::ConfigError;
use carelink_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not connect to the realtime channel at {url}")]
    #[diagnostic(
        code(carelink::connection_failed),
        help(
            "Check that the endpoint is reachable and uses ws:// or wss://.\n\
             Reason: {reason}"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    // ── Authentication ───────────────────────────────────────────────

    #[error("The server rejected the credentials for profile '{profile}': {reason}")]
    #[diagnostic(
        code(carelink::auth_rejected),
        help(
            "The token is missing, expired or revoked.\n\
             Run: carelink config set-token --profile {profile}"
        )
    )]
    AuthRejected { profile: String, reason: String },

    #[error("No token configured for profile '{profile}'")]
    #[diagnostic(
        code(carelink::no_credentials),
        help(
            "Store one with: carelink config set-token\n\
             Or set the CARELINK_TOKEN environment variable."
        )
    )]
    NoCredentials { profile: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(carelink::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(carelink::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: carelink config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No endpoint configured")]
    #[diagnostic(
        code(carelink::no_config),
        help(
            "Pass --endpoint, --tenant and --user, or create a profile with:\n\
             carelink config init --endpoint <URL> --tenant <ID> --user <ID>\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("Profile '{name}' already exists")]
    #[diagnostic(
        code(carelink::profile_exists),
        help("Use --force to replace it.")
    )]
    ProfileExists { name: String },

    #[error(transparent)]
    #[diagnostic(code(carelink::config))]
    Config(ConfigError),

    // ── Timeout ──────────────────────────────────────────────────────

    #[error("Channel did not open within {seconds}s")]
    #[diagnostic(
        code(carelink::timeout),
        help("Increase --open-timeout or check the endpoint.")
    )]
    Timeout { seconds: u64 },

    #[error("Channel manager stopped unexpectedly: {message}")]
    #[diagnostic(code(carelink::internal))]
    Internal { message: String },

    // ── IO / Serialization ───────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to encode output: {0}")]
    #[diagnostic(code(carelink::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthRejected { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. }
            | Self::ProfileNotFound { .. }
            | Self::NoConfig { .. }
            | Self::ProfileExists { .. } => exit_code::USAGE,
            Self::Config(ConfigError::NoCredentials { .. }) => exit_code::AUTH,
            Self::Config(ConfigError::Validation { .. }) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(other),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed {
                url: if url.is_empty() {
                    "(configured endpoint)".into()
                } else {
                    url
                },
                reason,
            },

            CoreError::AuthenticationRejected { reason } => CliError::AuthRejected {
                profile: "current".into(),
                reason,
            },

            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            CoreError::ManagerStopped => CliError::Internal {
                message: "manager task exited".into(),
            },

            CoreError::Internal(message) => CliError::Internal { message },
        }
    }
}
