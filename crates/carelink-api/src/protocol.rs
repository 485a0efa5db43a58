//! JSON wire protocol spoken over the messaging WebSocket.
//!
//! Every frame is a JSON object carrying a `type` discriminator. Outbound
//! frames are [`ClientMessage`]; inbound frames decode into [`ServerEvent`]
//! through [`decode_event`], which never panics and classifies failures so
//! the caller can log them at the right level.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::Error;

/// Identifier of a message thread (the subscription topic).
pub type ThreadId = u64;

/// Identifier of a single message inside a thread.
pub type MessageId = u64;

// ── Outbound ─────────────────────────────────────────────────────────

/// A frame sent from the client to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Keep-alive probe, answered by [`ServerEvent::Pong`].
    Ping,
    /// Join a thread's event stream.
    SubscribeThread { thread_id: ThreadId },
    /// Leave a thread's event stream.
    UnsubscribeThread { thread_id: ThreadId },
}

impl ClientMessage {
    /// Serialize into the JSON text frame sent on the wire.
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }
}

// ── Inbound ──────────────────────────────────────────────────────────

/// A frame received from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// The server accepted the connection.
    Connected(ConnectionAck),
    /// Answer to a [`ClientMessage::Ping`].
    Pong,
    /// A new message was posted in a subscribed thread.
    NewMessage { message: ThreadMessage },
    /// A message changed state (read by the recipient).
    MessageRead {
        thread_id: ThreadId,
        message_id: MessageId,
    },
    /// A thread's summary changed. Older servers send `thread_updated`.
    #[serde(alias = "thread_updated")]
    ThreadUpdate {
        thread_id: ThreadId,
        thread: ThreadSummary,
    },
    /// Subscription confirmed.
    Subscribed {
        #[serde(default)]
        thread_id: Option<ThreadId>,
    },
    /// Unsubscription confirmed.
    Unsubscribed {
        #[serde(default)]
        thread_id: Option<ThreadId>,
    },
    /// Application-level error reported by the server.
    Error {
        #[serde(default)]
        message: String,
    },
}

impl ServerEvent {
    /// Every `type` value that decodes into a variant.
    pub const KNOWN_TYPES: &'static [&'static str] = &[
        "connected",
        "pong",
        "new_message",
        "message_read",
        "thread_update",
        "thread_updated",
        "subscribed",
        "unsubscribed",
        "error",
    ];

    /// Canonical wire tag of this event, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::Pong => "pong",
            Self::NewMessage { .. } => "new_message",
            Self::MessageRead { .. } => "message_read",
            Self::ThreadUpdate { .. } => "thread_update",
            Self::Subscribed { .. } => "subscribed",
            Self::Unsubscribed { .. } => "unsubscribed",
            Self::Error { .. } => "error",
        }
    }
}

/// Payload of the `connected` acknowledgement. The server decides what it
/// carries, so everything is kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionAck {
    #[serde(default)]
    pub message: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A message inside a thread.
///
/// Only the fields the channel itself cares about are typed; everything
/// else the server sends lands in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub id: MessageId,

    #[serde(default)]
    pub thread_id: Option<ThreadId>,

    #[serde(default)]
    pub content: Option<String>,

    /// ISO-8601 timestamp as sent by the server.
    #[serde(default)]
    pub created_at: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Summary of a thread, as pushed with `thread_update`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadSummary {
    #[serde(default)]
    pub id: Option<ThreadId>,

    #[serde(default)]
    pub subject: Option<String>,

    #[serde(default)]
    pub unread_count: Option<u64>,

    #[serde(default)]
    pub updated_at: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ── Decoding ─────────────────────────────────────────────────────────

/// Why an inbound frame could not be turned into a [`ServerEvent`].
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The frame is not JSON at all.
    #[error("frame is not valid JSON: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The frame is JSON but has no string `type` field.
    #[error("frame has no `type` discriminator")]
    MissingType,

    /// The `type` is not one this client understands.
    #[error("unrecognized event type '{0}'")]
    UnknownType(String),

    /// The `type` is known but the payload does not match its shape.
    #[error("invalid '{kind}' payload: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

impl DecodeError {
    /// Unknown types are expected when the server is newer than the client.
    pub fn is_unknown_type(&self) -> bool {
        matches!(self, Self::UnknownType(_))
    }
}

/// Decode one inbound text frame.
pub fn decode_event(text: &str) -> Result<ServerEvent, DecodeError> {
    let value: Value = serde_json::from_str(text).map_err(DecodeError::Malformed)?;

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingType)?
        .to_owned();

    if !ServerEvent::KNOWN_TYPES.contains(&kind.as_str()) {
        return Err(DecodeError::UnknownType(kind));
    }

    serde_json::from_value(value).map_err(|source| DecodeError::InvalidPayload { kind, source })
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn outbound_frames_match_wire_format() {
        assert_eq!(ClientMessage::Ping.to_json().unwrap(), r#"{"type":"ping"}"#);
        assert_eq!(
            ClientMessage::SubscribeThread { thread_id: 7 }.to_json().unwrap(),
            r#"{"type":"subscribe_thread","thread_id":7}"#
        );
        assert_eq!(
            ClientMessage::UnsubscribeThread { thread_id: 12 }
                .to_json()
                .unwrap(),
            r#"{"type":"unsubscribe_thread","thread_id":12}"#
        );
    }

    #[test]
    fn decode_new_message_keeps_extra_fields() {
        let raw = json!({
            "type": "new_message",
            "message": {
                "id": 901,
                "thread_id": 7,
                "content": "Lab results are in",
                "created_at": "2026-03-02T09:15:00Z",
                "sender": { "id": 3, "name": "Dr. Okafor" },
                "attachments": []
            }
        });

        let event = decode_event(&raw.to_string()).unwrap();
        let ServerEvent::NewMessage { message } = event else {
            panic!("expected new_message, got {event:?}");
        };
        assert_eq!(message.id, 901);
        assert_eq!(message.thread_id, Some(7));
        assert_eq!(message.content.as_deref(), Some("Lab results are in"));
        assert_eq!(message.extra["sender"]["name"], "Dr. Okafor");
        assert!(message.extra.contains_key("attachments"));
    }

    #[test]
    fn decode_message_read() {
        let event = decode_event(r#"{"type":"message_read","thread_id":4,"message_id":88}"#).unwrap();
        assert_eq!(
            event,
            ServerEvent::MessageRead {
                thread_id: 4,
                message_id: 88
            }
        );
    }

    #[test]
    fn thread_updated_is_an_alias_of_thread_update() {
        let raw = json!({
            "type": "thread_updated",
            "thread_id": 12,
            "thread": { "id": 12, "subject": "Follow-up", "unread_count": 3 }
        });

        let event = decode_event(&raw.to_string()).unwrap();
        assert_eq!(event.kind(), "thread_update");
        let ServerEvent::ThreadUpdate { thread_id, thread } = event else {
            panic!("expected thread_update");
        };
        assert_eq!(thread_id, 12);
        assert_eq!(thread.subject.as_deref(), Some("Follow-up"));
        assert_eq!(thread.unread_count, Some(3));
    }

    #[test]
    fn decode_acks_with_and_without_payload() {
        let connected =
            decode_event(r#"{"type":"connected","message":"welcome","user_id":42}"#).unwrap();
        let ServerEvent::Connected(ack) = connected else {
            panic!("expected connected");
        };
        assert_eq!(ack.message.as_deref(), Some("welcome"));
        assert_eq!(ack.extra["user_id"], 42);

        assert_eq!(decode_event(r#"{"type":"pong"}"#).unwrap(), ServerEvent::Pong);
        assert_eq!(
            decode_event(r#"{"type":"subscribed","thread_id":7}"#).unwrap(),
            ServerEvent::Subscribed { thread_id: Some(7) }
        );
        assert_eq!(
            decode_event(r#"{"type":"unsubscribed"}"#).unwrap(),
            ServerEvent::Unsubscribed { thread_id: None }
        );
    }

    #[test]
    fn decode_error_event() {
        assert_eq!(
            decode_event(r#"{"type":"error","message":"thread not found"}"#).unwrap(),
            ServerEvent::Error {
                message: "thread not found".into()
            }
        );
    }

    #[test]
    fn classify_decode_failures() {
        assert!(matches!(
            decode_event("not json at all"),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            decode_event(r#"{"thread_id":1}"#),
            Err(DecodeError::MissingType)
        ));
        assert!(matches!(decode_event("[1,2,3]"), Err(DecodeError::MissingType)));

        let unknown = decode_event(r#"{"type":"typing_started","thread_id":1}"#).unwrap_err();
        assert!(unknown.is_unknown_type());

        let invalid = decode_event(r#"{"type":"message_read","thread_id":"seven"}"#).unwrap_err();
        assert!(matches!(invalid, DecodeError::InvalidPayload { ref kind, .. } if kind == "message_read"));
    }
}
