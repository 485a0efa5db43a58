// ── Core error types ──
//
// User-facing errors from carelink-core. Consumers never see raw
// transport errors; the `From<carelink_api::Error>` impl translates them
// into domain-appropriate variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to realtime channel at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication rejected: {reason}")]
    AuthenticationRejected { reason: String },

    #[error("Timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Lifecycle errors ─────────────────────────────────────────────
    #[error("Channel manager has stopped")]
    ManagerStopped,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Returns `true` when the caller should obtain fresh credentials.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthenticationRejected { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<carelink_api::Error> for CoreError {
    fn from(err: carelink_api::Error) -> Self {
        match err {
            carelink_api::Error::HandshakeRejected { status: status @ (401 | 403) } => {
                CoreError::AuthenticationRejected {
                    reason: format!("server refused the upgrade with HTTP {status}"),
                }
            }
            carelink_api::Error::HandshakeRejected { status } => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("handshake rejected with HTTP {status}"),
            },
            carelink_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason,
            },
            carelink_api::Error::WebSocketClosed { code, reason } => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("closed (code {code}): {reason}"),
            },
            carelink_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            carelink_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            carelink_api::Error::UnsupportedScheme(scheme) => CoreError::Config {
                message: format!("endpoint must use ws:// or wss://, got {scheme}://"),
            },
            carelink_api::Error::Encode(e) => CoreError::Internal(format!("encode error: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_auth_statuses_become_auth_errors() {
        let err = CoreError::from(carelink_api::Error::HandshakeRejected { status: 403 });
        assert!(err.is_auth());

        let err = CoreError::from(carelink_api::Error::HandshakeRejected { status: 502 });
        assert!(matches!(err, CoreError::ConnectionFailed { .. }));
    }

    #[test]
    fn scheme_errors_are_config_errors() {
        let err = CoreError::from(carelink_api::Error::UnsupportedScheme("http".into()));
        assert!(matches!(err, CoreError::Config { ref message } if message.contains("http://")));
    }
}
