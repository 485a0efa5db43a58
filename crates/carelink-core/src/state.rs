use std::fmt;
use std::time::Duration;

use strum::IntoStaticStr;

/// Why the server refused the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The server closed the socket with an auth-failure close code.
    CloseCode(u16),
    /// The server answered the upgrade request with 401 or 403.
    HttpStatus(u16),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CloseCode(code) => write!(f, "closed with code {code}"),
            Self::HttpStatus(status) => write!(f, "handshake refused with HTTP {status}"),
        }
    }
}

/// Connection state observable by consumers.
///
/// `Rejected` and `Failed` are idle states the manager never leaves on
/// its own; only an explicit `connect()` starts a new attempt.
#[derive(Debug, Clone, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum ChannelState {
    Idle,
    /// `attempt` is 0 for the first try and counts consecutive failures.
    Connecting { attempt: u32 },
    Open,
    Closing,
    ReconnectWait { attempt: u32, delay: Duration },
    Rejected { reason: RejectReason },
    Failed { attempts: u32 },
}

impl ChannelState {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Idle without automatic recovery pending.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected { .. } | Self::Failed { .. })
    }

    /// Short name for logs and status lines.
    pub fn label(&self) -> &'static str {
        self.into()
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting { attempt: 0 } => f.write_str("connecting"),
            Self::Connecting { attempt } => write!(f, "connecting (attempt {})", attempt + 1),
            Self::ReconnectWait { delay, .. } => {
                write!(f, "reconnecting in {:.1}s", delay.as_secs_f64())
            }
            Self::Rejected { reason } => write!(f, "rejected: {reason}"),
            Self::Failed { attempts } => write!(f, "failed after {attempts} attempts"),
            Self::Idle | Self::Open | Self::Closing => f.write_str(self.label()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_kebab_case() {
        assert_eq!(ChannelState::Idle.label(), "idle");
        assert_eq!(
            ChannelState::ReconnectWait {
                attempt: 1,
                delay: Duration::from_secs(3)
            }
            .label(),
            "reconnect-wait"
        );
    }

    #[test]
    fn display_is_human_readable() {
        assert_eq!(ChannelState::Connecting { attempt: 0 }.to_string(), "connecting");
        assert_eq!(
            ChannelState::Connecting { attempt: 2 }.to_string(),
            "connecting (attempt 3)"
        );
        assert_eq!(
            ChannelState::Rejected {
                reason: RejectReason::CloseCode(4001)
            }
            .to_string(),
            "rejected: closed with code 4001"
        );
    }

    #[test]
    fn terminal_states() {
        assert!(ChannelState::Failed { attempts: 4 }.is_terminal());
        assert!(
            ChannelState::Rejected {
                reason: RejectReason::HttpStatus(401)
            }
            .is_terminal()
        );
        assert!(!ChannelState::Idle.is_terminal());
        assert!(ChannelState::Open.is_open());
    }
}
