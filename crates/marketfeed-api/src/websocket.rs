//! WebSocket transport connector.
//!
//! Opens one duplex channel per [`Connector::open`] call and reports its
//! lifecycle (`Opened`, `Message`, `Closed`, `Error`) on a single unified
//! event stream shared by every connection. Each event is tagged with the
//! generation of the connection that produced it, so the owner can drop
//! events from connections it has already superseded.
//!
//! Reconnection is *not* handled here -- the connector reports exactly one
//! terminal event per connection and the owner decides what to do next.
//!
//! # Example
//!
//! ```rust,ignore
//! use marketfeed_api::websocket::{Connector, EventSink, WebSocketConnector};
//! use tokio::sync::mpsc;
//! use url::Url;
//!
//! let (tx, mut rx) = mpsc::unbounded_channel();
//! let url = Url::parse("ws://localhost:8001/ws")?;
//!
//! let handle = WebSocketConnector::default().open(&url, EventSink::new(1, tx));
//! while let Some(tagged) = rx.recv().await {
//!     println!("gen {}: {:?}", tagged.generation, tagged.event);
//! }
//! handle.close();
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Interval;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use url::Url;

use crate::error::Error;

/// Sequence number identifying one connection instance.
pub type Generation = u64;

// ── Events ───────────────────────────────────────────────────────────

/// Lifecycle and data events reported by a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake completed; the connection accepts writes.
    Opened,
    /// A text frame arrived.
    Message(String),
    /// Peer closed the connection or the stream ended.
    Closed { code: Option<u16>, reason: String },
    /// Handshake or read failed.
    Error(String),
}

impl TransportEvent {
    /// `true` for events that end a connection.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed { .. } | Self::Error(_))
    }
}

/// A [`TransportEvent`] stamped with the generation that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedEvent {
    pub generation: Generation,
    pub event: TransportEvent,
}

/// Write side of the unified event stream, bound to one generation.
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: Generation,
    tx: mpsc::UnboundedSender<TaggedEvent>,
}

impl EventSink {
    pub fn new(generation: Generation, tx: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Emit an event. Returns `false` if nobody is listening anymore.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(TaggedEvent {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

// ── Connection handle ────────────────────────────────────────────────

/// Owner-side handle to one connection.
///
/// Dropping the handle closes the connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    generation: Generation,
    outbound: mpsc::UnboundedSender<String>,
    open: Arc<AtomicBool>,
    cancel: CancellationToken,
}

/// IO-side counterpart of a [`ConnectionHandle`].
///
/// The task that drives the socket owns this: it flips the open flag,
/// drains outbound frames, and watches for cancellation.
#[derive(Debug)]
pub struct ConnectionDriver {
    generation: Generation,
    outbound: mpsc::UnboundedReceiver<String>,
    open: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl ConnectionHandle {
    /// Create a connected handle/driver pair for `generation`.
    pub fn pair(generation: Generation) -> (Self, ConnectionDriver) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        let handle = Self {
            generation,
            outbound: outbound_tx,
            open: Arc::clone(&open),
            cancel: cancel.clone(),
        };
        let driver = ConnectionDriver {
            generation,
            outbound: outbound_rx,
            open,
            cancel,
        };
        (handle, driver)
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// `true` between the handshake and the terminal event.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.cancel.is_cancelled()
    }

    /// Queue a text frame for sending.
    ///
    /// Fails with [`Error::NotConnected`] unless the connection is open.
    pub fn send(&self, payload: String) -> Result<(), Error> {
        if !self.is_open() {
            return Err(Error::NotConnected);
        }
        self.outbound.send(payload).map_err(|_| Error::NotConnected)
    }

    /// Close the connection. Idempotent.
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
        self.cancel.cancel();
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl ConnectionDriver {
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Mark the connection writable.
    pub fn mark_open(&self) {
        self.open.store(true, Ordering::Release);
    }

    /// Mark the connection no longer writable.
    pub fn mark_closed(&self) {
        self.open.store(false, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the owner closes or drops the handle.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Next outbound frame queued by the owner.
    pub async fn next_outbound(&mut self) -> Option<String> {
        self.outbound.recv().await
    }

    /// Non-blocking variant of [`next_outbound`](Self::next_outbound).
    pub fn try_next_outbound(&mut self) -> Option<String> {
        self.outbound.try_recv().ok()
    }
}

// ── Connector ────────────────────────────────────────────────────────

/// Something that can open a feed connection.
///
/// Implementations must return immediately and report progress through
/// `sink`: at most one `Opened`, any number of `Message`s, then exactly
/// one terminal `Closed`/`Error` unless the handle was closed first.
pub trait Connector: Send + Sync + 'static {
    fn open(&self, url: &Url, sink: EventSink) -> ConnectionHandle;
}

/// Production [`Connector`] backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    /// Send a WebSocket ping at this interval while open.
    pub keepalive: Option<Duration>,
}

impl WebSocketConnector {
    pub fn with_keepalive(keepalive: Option<Duration>) -> Self {
        Self { keepalive }
    }
}

impl Connector for WebSocketConnector {
    fn open(&self, url: &Url, sink: EventSink) -> ConnectionHandle {
        let (handle, driver) = ConnectionHandle::pair(sink.generation());
        let url = url.clone();
        let keepalive = self.keepalive;

        tokio::spawn(async move {
            run_connection(url, sink, driver, keepalive).await;
        });

        handle
    }
}

// ── Single connection lifecycle ──────────────────────────────────────

enum Outcome {
    /// Owner closed the handle; nothing more is reported.
    Cancelled,
    Closed { code: Option<u16>, reason: String },
}

async fn run_connection(
    url: Url,
    sink: EventSink,
    mut driver: ConnectionDriver,
    keepalive: Option<Duration>,
) {
    let generation = sink.generation();
    let result = connect_and_pump(&url, &sink, &mut driver, keepalive).await;
    driver.mark_closed();

    match result {
        Ok(Outcome::Cancelled) => {
            tracing::debug!(generation, "connection closed by owner");
        }
        Ok(Outcome::Closed { code, reason }) => {
            sink.emit(TransportEvent::Closed { code, reason });
        }
        Err(e) => {
            // A handshake aborted by cancellation is not worth reporting.
            if !driver.is_cancelled() {
                sink.emit(TransportEvent::Error(e.to_string()));
            }
        }
    }
}

/// Establish one WebSocket connection and pump frames until it ends.
async fn connect_and_pump(
    url: &Url,
    sink: &EventSink,
    driver: &mut ConnectionDriver,
    keepalive: Option<Duration>,
) -> Result<Outcome, Error> {
    let generation = sink.generation();
    tracing::info!(url = %url, generation, "connecting to feed");

    let cancel = driver.cancel.clone();
    let connect = tokio_tungstenite::connect_async(url.as_str());
    let (ws_stream, _response) = tokio::select! {
        biased;
        () = cancel.cancelled() => return Ok(Outcome::Cancelled),
        result = connect => result.map_err(|e| Error::WebSocketConnect(e.to_string()))?,
    };

    driver.mark_open();
    tracing::info!(generation, "feed connected");
    sink.emit(TransportEvent::Opened);

    let (mut write, mut read) = ws_stream.split();
    let mut ping = keepalive.map(tokio::time::interval);
    if let Some(ref mut interval) = ping {
        // consume the immediate first tick
        interval.tick().await;
    }

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                // Frames queued before the close still go out.
                while let Some(text) = driver.try_next_outbound() {
                    if write.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                let _ = write.send(Message::Close(None)).await;
                return Ok(Outcome::Cancelled);
            }
            outbound = driver.next_outbound() => {
                let Some(text) = outbound else {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(Outcome::Cancelled);
                };
                write
                    .send(Message::Text(text.into()))
                    .await
                    .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
            }
            () = tick(ping.as_mut()) => {
                tracing::trace!(generation, "keepalive ping");
                write
                    .send(Message::Ping(Vec::<u8>::new().into()))
                    .await
                    .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        sink.emit(TransportEvent::Message(text.as_str().to_owned()));
                    }
                    Some(Ok(Message::Ping(_))) => {
                        // tungstenite handles pong replies automatically
                        tracing::trace!(generation, "ping");
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame.map_or((None, String::new()), |cf| {
                            (Some(u16::from(cf.code)), cf.reason.as_str().to_owned())
                        });
                        tracing::info!(generation, ?code, %reason, "close frame received");
                        return Ok(Outcome::Closed { code, reason });
                    }
                    Some(Err(tungstenite::Error::ConnectionClosed)) | None => {
                        tracing::info!(generation, "stream ended");
                        return Ok(Outcome::Closed { code: None, reason: String::new() });
                    }
                    Some(Err(e)) => {
                        return Err(Error::WebSocketConnect(e.to_string()));
                    }
                    Some(Ok(_)) => {
                        // Binary, Pong, Frame -- ignore
                    }
                }
            }
        }
    }
}

/// Tick the keepalive interval, or never resolve when keepalive is off.
async fn tick(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

// ── Tests ────────────────────────────────────────────────────────────
