//! Gateway (WebSocket) session transport.
//!
//! A [`Shard`] is one stateless gateway session: it demultiplexes
//! inbound frames into [`Event`]s and multiplexes outbound commands onto
//! the socket. It does not heartbeat, identify, or reconnect on its own;
//! session policy belongs to the caller, which drives the shard through
//! [`send`](Shard::send) and consumes [`receive`](Shard::receive).

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::codec::{self, Decoder};
use crate::compression::{self, Compressor};
use crate::constants::GATEWAY_VERSION;
use crate::error::{Error, Result};
use crate::packet::{Event, Packet};
use crate::payloads::SentPayload;
use crate::token::TokenKind;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Events buffered between the read loop and `receive`.
const EVENT_QUEUE_DEPTH: usize = 256;

/// Close code sent when the session winds down normally.
const CLOSE_NORMAL: u16 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Fresh,
    Connected,
    Closing,
    Closed,
}

/// One gateway WebSocket session.
///
/// A shard connects once and runs to termination; after the event stream
/// ends it is spent and a new shard must be created. The read loop is the
/// single producer of the event queue and `receive` its single consumer.
pub struct Shard {
    name: String,
    state: Mutex<State>,
    writer: AsyncMutex<Option<WsSink>>,
    events_tx: Mutex<Option<mpsc::Sender<Event>>>,
    events_rx: AsyncMutex<mpsc::Receiver<Event>>,
}

impl Shard {
    /// Create a fresh, unconnected shard. `name` shows up in every log
    /// line this shard emits.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        Self {
            name: name.into(),
            state: Mutex::new(State::Fresh),
            writer: AsyncMutex::new(None),
            events_tx: Mutex::new(Some(events_tx)),
            events_rx: AsyncMutex::new(events_rx),
        }
    }

    /// The shard's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Connect to the gateway and run the session's read loop on the
    /// calling task until the socket terminates.
    ///
    /// The URI query selects the transport: `compress` picks a
    /// [`Compressor`] (default `zlib`), `encoding` a [`Decoder`]
    /// (default `json`), and an unexpected `v` only warns. A `Connected`
    /// event is emitted once the handshake completes; whatever happens
    /// afterwards, a close frame is sent if the socket is still open and
    /// a terminal `Disconnected` event is emitted before this returns.
    /// Read-loop errors are logged, not propagated.
    ///
    /// # Errors
    ///
    /// Fails fast on a malformed URI, an unknown `compress`/`encoding`
    /// name, a second `connect` on the same shard, or a failed WebSocket
    /// handshake.
    pub async fn connect(&self, uri: &str) -> Result<()> {
        let url = Url::parse(uri)?;
        let mut compress = String::from("zlib");
        let mut encoding = String::from("json");
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "v" => {
                    if value != GATEWAY_VERSION.to_string() {
                        warn!(
                            shard = %self.name,
                            version = %value,
                            "gateway version {value} is untested, expect breakage"
                        );
                    }
                }
                "compress" => compress = value.into_owned(),
                "encoding" => encoding = value.into_owned(),
                _ => {}
            }
        }
        let mut compressor = compression::from_name(&compress)?;
        let decoder = codec::from_name(&encoding)?;

        {
            let mut state = self.state.lock();
            if *state != State::Fresh {
                return Err(Error::AlreadyConnected);
            }
            *state = State::Connected;
        }

        let (stream, _) = match connect_async(uri).await {
            Ok(connected) => connected,
            Err(e) => {
                *self.state.lock() = State::Closed;
                return Err(e.into());
            }
        };
        info!(shard = %self.name, url = %uri, "connected to gateway");

        let (sink, source) = stream.split();
        *self.writer.lock().await = Some(sink);

        self.emit(Event::Connected).await;
        self.run(source, compressor.as_mut(), decoder.as_ref()).await;
        self.shutdown().await;
        Ok(())
    }

    /// Read frames until the socket terminates, demultiplexing them into
    /// the event queue. Never returns an error: a failed frame is logged
    /// and dropped, a transport error ends the session.
    async fn run(&self, mut source: WsSource, compressor: &mut dyn Compressor, decoder: &dyn Decoder) {
        while let Some(frame) = source.next().await {
            match frame {
                Ok(Message::Text(text)) => match decoder.decode(text.as_bytes()) {
                    Ok(packet) => self.emit(Event::Packet(packet)).await,
                    Err(e) => {
                        warn!(shard = %self.name, error = %e, "failed to decode text frame");
                    }
                },
                Ok(Message::Binary(bytes)) => match compressor.read(&bytes) {
                    Ok(Some(inflated)) => match decoder.decode(&inflated) {
                        Ok(packet) => self.emit(Event::Packet(packet)).await,
                        Err(e) => {
                            warn!(shard = %self.name, error = %e, "failed to decode binary frame");
                        }
                    },
                    // Message still assembling; nothing to emit yet.
                    Ok(None) => {}
                    Err(e) => {
                        warn!(shard = %self.name, error = %e, "failed to inflate binary frame");
                    }
                },
                Ok(Message::Close(frame)) => {
                    // Peer-initiated close: the protocol layer echoes the
                    // frame, so the cleanup tail must not close again.
                    *self.state.lock() = State::Closing;
                    if let Some(frame) = frame {
                        let code = u16::from(frame.code);
                        let reason = if frame.reason.is_empty() {
                            None
                        } else {
                            Some(frame.reason.to_string())
                        };
                        info!(
                            shard = %self.name,
                            code,
                            reason = reason.as_deref().unwrap_or(""),
                            "gateway closed the connection"
                        );
                        self.emit(Event::Close { code, reason }).await;
                    } else {
                        info!(shard = %self.name, "gateway closed the connection without a code");
                    }
                }
                // Ping/pong are answered by the protocol layer.
                Ok(_) => {}
                Err(e) => {
                    warn!(shard = %self.name, error = %e, "websocket read error, ending session");
                    break;
                }
            }
        }
    }

    /// Guaranteed-cleanup tail of `connect`: close the socket if it is
    /// still open, emit the terminal `Disconnected`, and end the event
    /// stream.
    async fn shutdown(&self) {
        let still_open = {
            let mut state = self.state.lock();
            let open = *state == State::Connected;
            if open {
                *state = State::Closing;
            }
            open
        };
        if still_open {
            let mut writer = self.writer.lock().await;
            if let Some(sink) = writer.as_mut() {
                let frame = CloseFrame {
                    code: CloseCode::from(CLOSE_NORMAL),
                    reason: "".into(),
                };
                if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                    debug!(shard = %self.name, error = %e, "close frame not delivered");
                }
            }
        }
        *self.state.lock() = State::Closed;
        self.emit(Event::Disconnected).await;
        info!(shard = %self.name, "session ended");
        // Dropping the sender ends the stream: `receive` drains whatever
        // is buffered, then yields `None`.
        *self.events_tx.lock() = None;
    }

    /// Send a close frame with code 1000, unwinding `connect`.
    ///
    /// # Errors
    ///
    /// [`Error::NotConnected`] when the shard never connected, or the
    /// transport error if the frame cannot be written.
    pub async fn disconnect(&self) -> Result<()> {
        self.disconnect_with(CLOSE_NORMAL).await
    }

    /// Send a close frame with an explicit code.
    ///
    /// # Errors
    ///
    /// Same as [`disconnect`](Shard::disconnect).
    pub async fn disconnect_with(&self, code: u16) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let sink = writer.as_mut().ok_or(Error::NotConnected)?;
        *self.state.lock() = State::Closing;
        debug!(shard = %self.name, code, "sending close frame");
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: "".into(),
        };
        sink.send(Message::Close(Some(frame))).await?;
        Ok(())
    }

    /// Send a command on the gateway.
    ///
    /// # Errors
    ///
    /// [`Error::BadTokenType`] for an `Identify` carrying a bearer token
    /// (rejected before any bytes are written), [`Error::NotConnected`]
    /// when the shard never connected, or a transport/serialization
    /// error.
    pub async fn send(&self, payload: SentPayload) -> Result<()> {
        if let SentPayload::Identify(identify) = &payload {
            let kind = identify.token.kind();
            if kind == TokenKind::Bearer {
                return Err(Error::BadTokenType(kind));
            }
        }
        self.send_raw(payload.into_packet()?).await
    }

    /// Send a pre-assembled packet, for opcodes this library does not
    /// model.
    ///
    /// # Errors
    ///
    /// [`Error::NotConnected`] when the shard never connected, or a
    /// transport/serialization error.
    pub async fn send_raw(&self, packet: Packet) -> Result<()> {
        let text = serde_json::to_string(&packet)?;
        let mut writer = self.writer.lock().await;
        let sink = writer.as_mut().ok_or(Error::NotConnected)?;
        debug!(shard = %self.name, opcode = %packet.opcode, "sending gateway payload");
        sink.send(Message::Text(text.into())).await?;
        Ok(())
    }

    /// The next event of the session, in socket order. Returns `None`
    /// once the stream has permanently closed.
    pub async fn receive(&self) -> Option<Event> {
        self.events_rx.lock().await.recv().await
    }

    async fn emit(&self, event: Event) {
        let sender = self.events_tx.lock().clone();
        if let Some(sender) = sender {
            if sender.send(event).await.is_err() {
                debug!(shard = %self.name, "event receiver closed, dropping event");
            }
        }
    }
}

impl std::fmt::Debug for Shard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shard")
            .field("name", &self.name)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}
