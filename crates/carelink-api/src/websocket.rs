//! WebSocket transport backed by tokio-tungstenite.
//!
//! [`WsConnector`] performs the upgrade handshake and splits the stream
//! into a reader task and a writer task that pump frames through the
//! channels of a [`Connection`]. The tasks stop when the socket closes or
//! when the connection is dropped.
//!
//! # Example
//!
//! ```rust,ignore
//! use carelink_api::{ClientMessage, Connector, Incoming, WsConnector};
//! use url::Url;
//!
//! let url = Url::parse("wss://clinic.example.com/ws/messaging/?token=...")?;
//! let mut conn = WsConnector::default().connect(url).await?;
//! conn.send(&ClientMessage::Ping)?;
//!
//! while let Some(Incoming::Text(text)) = conn.recv().await {
//!     println!("{text}");
//! }
//! ```

use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::transport::{CloseInfo, Connection, Connector, Incoming, Outgoing};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ── WsConnector ──────────────────────────────────────────────────────

/// Opens WebSocket connections with a handshake timeout and optional
/// extra request headers (e.g. `Origin` for servers that check it).
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
    headers: Vec<(String, String)>,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            headers: Vec::new(),
        }
    }
}

/// rustls refuses to build a client config without a process-wide crypto
/// provider. Installing fails harmlessly if the host already picked one.
fn install_crypto_provider() {
    if rustls::crypto::CryptoProvider::get_default().is_none()
        && rustls::crypto::ring::default_provider().install_default().is_err()
    {
        tracing::debug!("rustls crypto provider already installed");
    }
}

impl WsConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            ..Self::default()
        }
    }

    /// Add a header to every upgrade request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    async fn open(self, url: Url) -> Result<Connection, Error> {
        match url.scheme() {
            "ws" => {}
            "wss" => install_crypto_provider(),
            other => return Err(Error::UnsupportedScheme(other.to_owned())),
        }

        let uri: tungstenite::http::Uri = url
            .as_str()
            .parse()
            .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

        let mut request = ClientRequestBuilder::new(uri);
        for (name, value) in self.headers {
            request = request.with_header(name, value);
        }

        let handshake = tokio_tungstenite::connect_async(request);
        let (ws_stream, _response) = match tokio::time::timeout(self.connect_timeout, handshake).await
        {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => return Err(map_handshake_error(e)),
            Err(_) => {
                return Err(Error::Timeout {
                    timeout_secs: self.connect_timeout.as_secs(),
                });
            }
        };

        tracing::debug!(host = url.host_str().unwrap_or(""), "WebSocket handshake complete");

        let (write, read) = ws_stream.split();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        tokio::spawn(read_loop(read, in_tx, cancel.clone()));
        tokio::spawn(write_loop(write, out_rx, cancel.clone()));

        Ok(Connection::new(out_tx, in_rx).with_cancel(cancel))
    }
}

impl Connector for WsConnector {
    fn connect(&self, url: Url) -> BoxFuture<'static, Result<Connection, Error>> {
        Box::pin(self.clone().open(url))
    }
}

fn map_handshake_error(err: tungstenite::Error) -> Error {
    match err {
        tungstenite::Error::Http(response) => Error::HandshakeRejected {
            status: response.status().as_u16(),
        },
        other => Error::WebSocketConnect(other.to_string()),
    }
}

// ── Reader / writer tasks ────────────────────────────────────────────

/// Forward text frames until the socket closes, then report why.
async fn read_loop<S>(mut read: S, inbound: mpsc::UnboundedSender<Incoming>, cancel: CancellationToken)
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let closed = loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if inbound.send(Incoming::Text(text.as_str().to_owned())).is_err() {
                        return;
                    }
                }
                Some(Ok(Message::Ping(_))) => {
                    // tungstenite queues the pong reply itself
                    tracing::trace!("WebSocket ping");
                }
                Some(Ok(Message::Close(frame))) => {
                    break match frame {
                        Some(cf) => CloseInfo::new(u16::from(cf.code), cf.reason.to_string()),
                        None => CloseInfo::abnormal("close frame without status"),
                    };
                }
                Some(Err(e)) => break CloseInfo::abnormal(e.to_string()),
                None => break CloseInfo::abnormal("stream ended"),
                // Binary, Pong, Frame -- ignore
                Some(Ok(_)) => {}
            }
        }
    };

    let _ = inbound.send(Incoming::Closed(closed));
}

/// Write queued frames; a close request or a dropped connection ends the
/// loop with a normal close frame.
async fn write_loop<S>(mut write: S, mut outbound: mpsc::UnboundedReceiver<Outgoing>, cancel: CancellationToken)
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            frame = outbound.recv() => frame,
        };

        if let Some(Outgoing::Text(text)) = next {
            if let Err(e) = write.send(Message::text(text)).await {
                tracing::warn!(error = %e, "WebSocket write failed");
                return;
            }
            continue;
        }

        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "client disconnect".into(),
        };
        if let Err(e) = write.send(Message::Close(Some(frame))).await {
            tracing::debug!(error = %e, "close frame not delivered");
        }
        return;
    }
}
