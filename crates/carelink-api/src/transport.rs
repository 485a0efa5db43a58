// Transport seam between the channel manager and the network.
//
// A `Connection` is a pair of channels: outbound frames go to a writer,
// inbound frames come from a reader. The WebSocket connector backs them
// with tokio-tungstenite tasks; `Connection::pair` backs them with nothing
// but the channels, which is what tests drive.

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use url::Url;

use crate::error::Error;
use crate::protocol::ClientMessage;

/// Close code used when the transport ended without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Why the transport ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// Close code from the peer's close frame, if one was received.
    pub code: Option<u16>,
    pub reason: String,
}

impl CloseInfo {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            reason: reason.into(),
        }
    }

    /// Transport loss without a close frame (reset, read error, EOF).
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            code: None,
            reason: reason.into(),
        }
    }

    /// The code to report, substituting 1006 when no frame was received.
    pub fn effective_code(&self) -> u16 {
        self.code.unwrap_or(ABNORMAL_CLOSURE)
    }
}

/// A frame delivered by the reader side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Text(String),
    /// Terminal: nothing follows.
    Closed(CloseInfo),
}

/// A frame queued for the writer side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Text(String),
    /// Send a normal close frame and stop writing.
    Close,
}

// ── Connection ───────────────────────────────────────────────────────

/// An established transport, exclusively owned by whoever opened it.
///
/// Dropping the connection cancels its background tasks.
pub struct Connection {
    outbound: mpsc::UnboundedSender<Outgoing>,
    inbound: mpsc::UnboundedReceiver<Incoming>,
    _guard: Option<DropGuard>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("writer_closed", &self.outbound.is_closed())
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub fn new(
        outbound: mpsc::UnboundedSender<Outgoing>,
        inbound: mpsc::UnboundedReceiver<Incoming>,
    ) -> Self {
        Self {
            outbound,
            inbound,
            _guard: None,
        }
    }

    /// Tie `cancel` to this connection's lifetime.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self._guard = Some(cancel.drop_guard());
        self
    }

    /// In-memory connection: the returned [`Peer`] plays the server.
    pub fn pair() -> (Self, Peer) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        (
            Self::new(out_tx, in_rx),
            Peer {
                sent: out_rx,
                inbound: in_tx,
            },
        )
    }

    /// Encode and queue a message for the writer.
    pub fn send(&self, message: &ClientMessage) -> Result<(), Error> {
        let text = message.to_json()?;
        self.outbound
            .send(Outgoing::Text(text))
            .map_err(|_| Error::WebSocketClosed {
                code: ABNORMAL_CLOSURE,
                reason: "writer stopped".into(),
            })
    }

    /// Ask the writer to send a close frame. Idempotent.
    pub fn close(&self) {
        // The writer may already be gone; closing a closed transport is fine.
        let _ = self.outbound.send(Outgoing::Close);
    }

    /// Next inbound frame. `None` means the reader vanished without
    /// reporting a closure.
    pub async fn recv(&mut self) -> Option<Incoming> {
        self.inbound.recv().await
    }
}

/// Server side of an in-memory [`Connection`].
#[derive(Debug)]
pub struct Peer {
    sent: mpsc::UnboundedReceiver<Outgoing>,
    inbound: mpsc::UnboundedSender<Incoming>,
}

impl Peer {
    /// Deliver a text frame to the client. Returns `false` once the client
    /// has dropped its connection.
    pub fn push_text(&self, text: impl Into<String>) -> bool {
        self.inbound.send(Incoming::Text(text.into())).is_ok()
    }

    /// Close the transport from the server side.
    pub fn close(&self, info: CloseInfo) -> bool {
        self.inbound.send(Incoming::Closed(info)).is_ok()
    }

    /// Everything the client has written so far, without waiting.
    pub fn drain_sent(&mut self) -> Vec<Outgoing> {
        let mut out = Vec::new();
        while let Ok(frame) = self.sent.try_recv() {
            out.push(frame);
        }
        out
    }

    /// Wait for the next frame the client writes.
    pub async fn next_sent(&mut self) -> Option<Outgoing> {
        self.sent.recv().await
    }

    /// `true` once the client side has been dropped.
    pub fn is_client_gone(&self) -> bool {
        self.inbound.is_closed()
    }
}

// ── Connector ────────────────────────────────────────────────────────

/// Opens transports. The manager calls this once per connection attempt.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, url: Url) -> BoxFuture<'static, Result<Connection, Error>>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pair_carries_frames_both_ways() {
        let (mut conn, mut peer) = Connection::pair();

        conn.send(&ClientMessage::SubscribeThread { thread_id: 3 })
            .unwrap();
        assert_eq!(
            peer.drain_sent(),
            vec![Outgoing::Text(
                r#"{"type":"subscribe_thread","thread_id":3}"#.into()
            )]
        );

        assert!(peer.push_text(r#"{"type":"pong"}"#));
        assert_eq!(
            conn.recv().await,
            Some(Incoming::Text(r#"{"type":"pong"}"#.into()))
        );
    }

    #[tokio::test]
    async fn dropping_connection_is_visible_to_peer() {
        let (conn, peer) = Connection::pair();
        assert!(!peer.is_client_gone());
        drop(conn);
        assert!(peer.is_client_gone());
        assert!(!peer.push_text("late"));
    }

    #[test]
    fn send_after_writer_gone_is_an_error() {
        let (conn, peer) = Connection::pair();
        drop(peer);
        let err = conn.send(&ClientMessage::Ping).unwrap_err();
        assert!(matches!(err, Error::WebSocketClosed { code: 1006, .. }));
    }

    #[test]
    fn close_info_defaults_to_abnormal_code() {
        assert_eq!(CloseInfo::abnormal("reset").effective_code(), 1006);
        assert_eq!(CloseInfo::new(4001, "unauthorized").effective_code(), 4001);
    }
}
