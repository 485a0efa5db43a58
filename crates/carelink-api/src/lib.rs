// carelink-api: wire protocol and WebSocket transport for the realtime messaging channel

pub mod error;
pub mod protocol;
pub mod transport;
pub mod websocket;

pub use error::Error;
pub use protocol::{
    ClientMessage, ConnectionAck, DecodeError, MessageId, ServerEvent, ThreadId, ThreadMessage,
    ThreadSummary, decode_event,
};
pub use transport::{CloseInfo, Connection, Connector, Incoming, Outgoing, Peer};
pub use websocket::WsConnector;
