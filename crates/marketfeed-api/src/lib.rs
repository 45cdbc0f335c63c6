// marketfeed-api: WebSocket transport and wire envelope codec for market-data feeds

pub mod envelope;
pub mod error;
pub mod websocket;

pub use envelope::{Command, Envelope, normalize};
pub use error::Error;
pub use websocket::{
    ConnectionDriver, ConnectionHandle, Connector, EventSink, Generation, TaggedEvent,
    TransportEvent, WebSocketConnector,
};
