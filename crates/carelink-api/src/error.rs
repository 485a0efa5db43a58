use thiserror::Error;

/// Top-level error type for the `carelink-api` crate.
///
/// Covers transport establishment, handshake rejection and outbound
/// encoding. Inbound decoding failures have their own type,
/// [`DecodeError`](crate::protocol::DecodeError), because they never end a
/// connection. `carelink-core` maps these into state-machine decisions.
#[derive(Debug, Error)]
pub enum Error {
    // ── Handshake ───────────────────────────────────────────────────
    /// The server answered the upgrade request with an HTTP error status.
    #[error("WebSocket handshake rejected (HTTP {status})")]
    HandshakeRejected { status: u16 },

    // ── Transport ───────────────────────────────────────────────────
    /// WebSocket connection could not be established.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed by the peer.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// Establishing the connection took too long.
    #[error("Connection timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The endpoint URL does not use a WebSocket scheme.
    #[error("Unsupported URL scheme '{0}' (expected ws or wss)")]
    UnsupportedScheme(String),

    // ── Data ────────────────────────────────────────────────────────
    /// An outbound message could not be serialized.
    #[error("Failed to encode outbound message: {0}")]
    Encode(#[from] serde_json::Error),
}

impl Error {
    /// Returns `true` if the server refused the credentials during the
    /// upgrade request (HTTP 401 or 403).
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, Self::HandshakeRejected { status: 401 | 403 })
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::WebSocketConnect(_) | Self::WebSocketClosed { .. } | Self::Timeout { .. } => true,
            Self::HandshakeRejected { status } => *status >= 500,
            Self::InvalidUrl(_) | Self::UnsupportedScheme(_) | Self::Encode(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_401_and_403_are_auth_rejections() {
        assert!(Error::HandshakeRejected { status: 401 }.is_auth_rejection());
        assert!(Error::HandshakeRejected { status: 403 }.is_auth_rejection());
        assert!(!Error::HandshakeRejected { status: 502 }.is_auth_rejection());
        assert!(!Error::WebSocketConnect("refused".into()).is_auth_rejection());
    }

    #[test]
    fn server_errors_are_transient_client_errors_are_not() {
        assert!(Error::HandshakeRejected { status: 503 }.is_transient());
        assert!(!Error::HandshakeRejected { status: 404 }.is_transient());
        assert!(Error::Timeout { timeout_secs: 10 }.is_transient());
        assert!(!Error::UnsupportedScheme("http".into()).is_transient());
    }
}
