// ── Runtime channel configuration ──
//
// These types describe *how* the manager connects and recovers.
// They never touch disk: carelink-config (or any other caller) builds a
// `ChannelConfig` and hands it to `ChannelManager::spawn`.

use std::time::Duration;

use url::Url;

/// Close codes the server uses to refuse credentials.
pub const DEFAULT_AUTH_CLOSE_CODES: [u16; 2] = [4001, 4003];

/// Backoff configuration for reconnection.
///
/// `delay = min(initial_delay * multiplier^attempt, max_delay) * (1 ± jitter)`.
/// A multiplier of `1.0` with zero jitter gives a flat delay.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 3s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Growth factor per consecutive failure. Default: 2.0.
    pub multiplier: f64,

    /// Fraction of the delay used as jitter amplitude. Default: 0.25.
    pub jitter: f64,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(3),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.25,
            max_retries: None,
        }
    }
}

impl ReconnectConfig {
    /// Fixed delay between attempts, no growth and no jitter.
    pub fn flat(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
            jitter: 0.0,
            max_retries: None,
        }
    }
}

/// Configuration for one realtime channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    /// WebSocket endpoint (`ws://` or `wss://`). Identity parameters are
    /// appended as query parameters on every attempt.
    pub endpoint: Url,

    /// Reconnection backoff.
    pub reconnect: ReconnectConfig,

    /// How often to send `ping` while open. Default: 30s.
    pub keepalive_interval: Duration,

    /// How long to wait for `pong` before treating the connection as
    /// dead. `None` disables the check. Default: 10s.
    pub pong_timeout: Option<Duration>,

    /// How long `disconnect()` waits for the server to confirm the close.
    /// Default: 2s.
    pub close_timeout: Duration,

    /// Close codes that mean "credentials refused": never retried.
    pub auth_close_codes: Vec<u16>,
}

impl ChannelConfig {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            reconnect: ReconnectConfig::default(),
            keepalive_interval: Duration::from_secs(30),
            pong_timeout: Some(Duration::from_secs(10)),
            close_timeout: Duration::from_secs(2),
            auth_close_codes: DEFAULT_AUTH_CLOSE_CODES.to_vec(),
        }
    }

    pub fn is_auth_close_code(&self, code: u16) -> bool {
        self.auth_close_codes.contains(&code)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ChannelConfig::new(Url::parse("wss://clinic.example.com/ws/").unwrap());
        assert_eq!(config.keepalive_interval, Duration::from_secs(30));
        assert_eq!(config.pong_timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.reconnect.initial_delay, Duration::from_secs(3));
        assert!(config.reconnect.max_retries.is_none());
        assert!(config.is_auth_close_code(4001));
        assert!(config.is_auth_close_code(4003));
        assert!(!config.is_auth_close_code(1006));
    }
}
