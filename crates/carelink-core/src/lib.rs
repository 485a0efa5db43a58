//! Reconnecting realtime channel for the Carelink messaging backend.
//!
//! - **[`ChannelManager`]**: owns one WebSocket connection per identity,
//!   multiplexes per-thread subscriptions over it, recovers from drops with
//!   backoff and dispatches typed events to [`Callbacks`]. All state lives
//!   on a single task; the handle only queues commands and observes
//!   [`ChannelState`].
//!
//! - **[`SubscriptionSet`]**: threads the caller asked for. It outlives
//!   connections and is replayed after every `connected` acknowledgement.
//!
//! - **[`ChannelConfig`]**: endpoint, backoff, keep-alive, pong
//!   supervision, auth-failure close codes. Built by the caller (see
//!   `carelink-config`); core never reads files.

pub mod backoff;
pub mod callbacks;
pub mod config;
pub mod error;
pub mod identity;
pub mod manager;
pub mod state;
pub mod subscriptions;

// ── Primary re-exports ──────────────────────────────────────────────
pub use callbacks::Callbacks;
pub use config::{ChannelConfig, DEFAULT_AUTH_CLOSE_CODES, ReconnectConfig};
pub use error::CoreError;
pub use identity::{Identity, redact_url};
pub use manager::ChannelManager;
pub use state::{ChannelState, RejectReason};
pub use subscriptions::SubscriptionSet;

// Re-export the wire types callers see in callbacks.
pub use carelink_api::{MessageId, ThreadId, ThreadMessage, ThreadSummary};
