// crates/discord-mcp/src/gateway.rs
// ============================================================================
// Module: Discord Gateway
// Description: Websocket event source feeding the event dispatcher.
// Purpose: Turn gateway dispatches into MCP notifications.
// Dependencies: async-trait, futures-util, serde_json, thiserror, tokio,
// tokio-tungstenite, tracing
// ============================================================================

//! ## Overview
//! [`run_event_source`] opens one gateway connection, identifies with the bot
//! token and forwards every dispatch (`op` 0) to
//! [`EventDispatcher::dispatch_gateway`]. [`GatewaySession`] holds the
//! protocol state (sequence number, heartbeat acknowledgement) and is free of
//! I/O; the socket sits behind [`GatewayConnection`] so the loop runs against
//! scripted frames in tests.
//!
//! The source does not resume or reconnect. A reconnect request, an invalid
//! session, a missed heartbeat acknowledgement or a closed socket ends it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use futures_util::SinkExt;
use futures_util::StreamExt;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio::time::Interval;
use tokio::time::interval_at;
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;
use tracing::info;

use crate::events::EventDispatcher;
use crate::notifications::EmitOutcome;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Gateway opcodes used by the event source.
pub mod opcode {
    /// Event dispatch.
    pub const DISPATCH: u64 = 0;
    /// Heartbeat (either direction).
    pub const HEARTBEAT: u64 = 1;
    /// Client identification.
    pub const IDENTIFY: u64 = 2;
    /// Server asks the client to reconnect.
    pub const RECONNECT: u64 = 7;
    /// Session is no longer valid.
    pub const INVALID_SESSION: u64 = 9;
    /// First frame carrying the heartbeat interval.
    pub const HELLO: u64 = 10;
    /// Heartbeat acknowledgement.
    pub const HEARTBEAT_ACK: u64 = 11;
}

/// Gateway intents: guilds, guild members, guild messages, guild message
/// reactions and direct messages.
pub const GATEWAY_INTENTS: u64 = 1 | (1 << 1) | (1 << 9) | (1 << 10) | (1 << 12);

/// Client name reported in the identify properties.
const CLIENT_NAME: &str = "discord-mcp";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Gateway failures. Every variant ends the event source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The websocket could not be opened.
    #[error("gateway connect failed: {0}")]
    Connect(String),
    /// Reading or writing a frame failed.
    #[error("gateway transport error: {0}")]
    Transport(String),
    /// A frame violated the gateway protocol.
    #[error("gateway protocol error: {0}")]
    Protocol(String),
    /// The server ended the session.
    #[error("gateway closed: {0}")]
    Closed(String),
}

// ============================================================================
// SECTION: Connection Seam
// ============================================================================

/// One open gateway connection carrying text frames.
#[async_trait]
pub trait GatewayConnection: Send {
    /// Returns the next text frame, or `None` once the stream has ended.
    async fn next_frame(&mut self) -> Option<Result<String, GatewayError>>;

    /// Sends one text frame.
    async fn send_frame(&mut self, frame: String) -> Result<(), GatewayError>;
}

/// Opens gateway connections.
#[async_trait]
pub trait GatewayConnector: Send + Sync {
    /// Opens a new connection.
    async fn connect(&self) -> Result<Box<dyn GatewayConnection>, GatewayError>;
}

/// Connector over a TLS websocket.
pub struct WebSocketConnector {
    /// Gateway URL including version and encoding.
    url: String,
}

impl WebSocketConnector {
    /// Creates a connector for `url`.
    #[must_use]
    pub fn new(url: &str) -> Self {
        Self {
            url: url.trim().to_string(),
        }
    }
}

#[async_trait]
impl GatewayConnector for WebSocketConnector {
    async fn connect(&self) -> Result<Box<dyn GatewayConnection>, GatewayError> {
        let (stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|err| GatewayError::Connect(err.to_string()))?;
        debug!(url = self.url.as_str(), "gateway socket open");
        Ok(Box::new(WebSocketConnection {
            stream,
        }))
    }
}

/// Websocket-backed connection.
struct WebSocketConnection {
    /// Underlying socket.
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl GatewayConnection for WebSocketConnection {
    async fn next_frame(&mut self) -> Option<Result<String, GatewayError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_string())),
                Ok(Message::Close(frame)) => {
                    let reason = frame.map_or_else(String::new, |frame| {
                        format!("{} {}", u16::from(frame.code), frame.reason.as_str())
                    });
                    return Some(Err(GatewayError::Closed(reason)));
                }
                Ok(_) => {}
                Err(err) => return Some(Err(GatewayError::Transport(err.to_string()))),
            }
        }
    }

    async fn send_frame(&mut self, frame: String) -> Result<(), GatewayError> {
        self.stream
            .send(Message::text(frame))
            .await
            .map_err(|err| GatewayError::Transport(err.to_string()))
    }
}

// ============================================================================
// SECTION: Session State
// ============================================================================

/// Action requested by one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayAction {
    /// Send a payload to the gateway.
    Send(Value),
    /// Start heartbeating at the given period.
    StartHeartbeat(Duration),
    /// Forward a `{t, d}` dispatch to the event dispatcher.
    Dispatch(Value),
}

/// Gateway protocol state for one connection.
///
/// # Invariants
/// - `sequence` is the last `s` seen on any frame.
/// - At most one heartbeat is unacknowledged at a time.
pub struct GatewaySession {
    /// Bot token sent in identify.
    token: String,
    /// Intent bits sent in identify.
    intents: u64,
    /// Last sequence number.
    sequence: Option<u64>,
    /// Set after a heartbeat until its acknowledgement arrives.
    awaiting_ack: bool,
}

impl GatewaySession {
    /// Creates the state for a fresh connection.
    #[must_use]
    pub const fn new(token: String, intents: u64) -> Self {
        Self {
            token,
            intents,
            sequence: None,
            awaiting_ack: false,
        }
    }

    /// Returns the last sequence number seen.
    #[must_use]
    pub const fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    /// Applies one inbound frame.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Protocol`] for undecodable frames and
    /// [`GatewayError::Closed`] when the server ends the session.
    pub fn handle_frame(&mut self, frame: &str) -> Result<Vec<GatewayAction>, GatewayError> {
        let payload: Value =
            serde_json::from_str(frame).map_err(|err| GatewayError::Protocol(err.to_string()))?;
        let op = payload
            .get("op")
            .and_then(Value::as_u64)
            .ok_or_else(|| GatewayError::Protocol("frame without op".to_string()))?;
        if let Some(sequence) = payload.get("s").and_then(Value::as_u64) {
            self.sequence = Some(sequence);
        }
        match op {
            opcode::HELLO => {
                let millis = payload
                    .pointer("/d/heartbeat_interval")
                    .and_then(Value::as_u64)
                    .filter(|millis| *millis > 0)
                    .ok_or_else(|| GatewayError::Protocol("hello without interval".to_string()))?;
                Ok(vec![
                    GatewayAction::StartHeartbeat(Duration::from_millis(millis)),
                    GatewayAction::Send(self.identify()),
                ])
            }
            opcode::DISPATCH => {
                if payload.get("t").and_then(Value::as_str) == Some("READY") {
                    info!(
                        session_id = payload.pointer("/d/session_id").and_then(serde_json::Value::as_str),
                        "gateway ready"
                    );
                }
                Ok(vec![GatewayAction::Dispatch(payload)])
            }
            opcode::HEARTBEAT => Ok(vec![GatewayAction::Send(self.heartbeat_payload())]),
            opcode::HEARTBEAT_ACK => {
                self.awaiting_ack = false;
                Ok(Vec::new())
            }
            opcode::RECONNECT => Err(GatewayError::Closed("reconnect requested".to_string())),
            opcode::INVALID_SESSION => Err(GatewayError::Closed("invalid session".to_string())),
            other => {
                debug!(op = other, "ignoring gateway opcode");
                Ok(Vec::new())
            }
        }
    }

    /// Returns the next periodic heartbeat.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Protocol`] when the previous heartbeat was
    /// never acknowledged.
    pub fn heartbeat(&mut self) -> Result<Value, GatewayError> {
        if self.awaiting_ack {
            return Err(GatewayError::Protocol("heartbeat not acknowledged".to_string()));
        }
        self.awaiting_ack = true;
        Ok(self.heartbeat_payload())
    }

    /// Heartbeat payload carrying the last sequence.
    fn heartbeat_payload(&self) -> Value {
        json!({"op": opcode::HEARTBEAT, "d": self.sequence})
    }

    /// Identify payload.
    fn identify(&self) -> Value {
        json!({
            "op": opcode::IDENTIFY,
            "d": {
                "token": self.token,
                "intents": self.intents,
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": CLIENT_NAME,
                    "device": CLIENT_NAME,
                },
            },
        })
    }
}

// ============================================================================
// SECTION: Event Loop
// ============================================================================

/// What woke the event loop.
enum Wake {
    /// A frame arrived or the stream ended.
    Frame(Option<Result<String, GatewayError>>),
    /// The heartbeat timer fired.
    Heartbeat,
}

/// Runs one gateway connection until it ends.
///
/// Returns `Ok(())` when the stream ends without a close frame.
///
/// # Errors
///
/// Returns [`GatewayError`] when the connection fails, a frame is malformed
/// or the server ends the session.
pub async fn run_event_source(
    connector: &dyn GatewayConnector,
    token: String,
    dispatcher: &EventDispatcher,
) -> Result<(), GatewayError> {
    let mut connection = connector.connect().await?;
    let mut session = GatewaySession::new(token, GATEWAY_INTENTS);
    let mut heartbeat: Option<Interval> = None;
    loop {
        let wake = match heartbeat.as_mut() {
            Some(timer) => tokio::select! {
                frame = connection.next_frame() => Wake::Frame(frame),
                _ = timer.tick() => Wake::Heartbeat,
            },
            None => Wake::Frame(connection.next_frame().await),
        };
        let frame = match wake {
            Wake::Heartbeat => {
                connection.send_frame(session.heartbeat()?.to_string()).await?;
                continue;
            }
            Wake::Frame(None) => return Ok(()),
            Wake::Frame(Some(frame)) => frame?,
        };
        for action in session.handle_frame(&frame)? {
            match action {
                GatewayAction::Send(payload) => connection.send_frame(payload.to_string()).await?,
                GatewayAction::StartHeartbeat(period) => {
                    heartbeat = Some(interval_at(Instant::now() + period, period));
                }
                GatewayAction::Dispatch(dispatch) => {
                    if let Some(outcome) = dispatcher.dispatch_gateway(&dispatch) {
                        debug!(
                            sequence = session.sequence(),
                            delivered = matches!(outcome, EmitOutcome::Delivered),
                            "gateway dispatch"
                        );
                    }
                }
            }
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
