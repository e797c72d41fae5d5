//! Push channel wire formats.
//!
//! Two framings are supported: Engine.IO v4 / Socket.IO v5 text packets (what the
//! leaderboard backend speaks) and a plain JSON envelope per text frame.

use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

/// Client to server: ask the backend to rebroadcast its current state.
pub const EVENT_REQUEST_UPDATE: &str = "request_update";
/// Server to client: full leaderboard snapshot.
pub const EVENT_LEADERBOARD_UPDATE: &str = "leaderboard_update";
/// Server to client: countdown target.
pub const EVENT_COUNTDOWN_UPDATE: &str = "countdown_update";

const SOCKET_IO_PATH: &str = "socket.io/";
const SOCKET_IO_QUERY: &str = "EIO=4&transport=websocket";
const JSON_PATH: &str = "ws";

/// Framing used on the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// Engine.IO v4 / Socket.IO v5 packets on `/socket.io/`.
    #[default]
    SocketIo,
    /// `{"event": ..., "data": ...}` envelopes on `/ws`.
    Json,
}

/// Errors raised while decoding a push channel frame.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The frame carried no packet at all.
    #[error("empty frame")]
    Empty,
    /// The packet type is not part of the protocol.
    #[error("unknown packet type `{0}`")]
    UnknownPacket(char),
    /// Binary attachments are not used by the leaderboard feed.
    #[error("binary packets are not supported")]
    Binary,
    /// The packet body is not the expected JSON.
    #[error("malformed packet body")]
    Body(#[from] serde_json::Error),
    /// An event packet without an event name.
    #[error("event packet without a name")]
    MissingEventName,
}

/// Decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Engine.IO open packet; carries the liveness window when advertised.
    Open {
        /// `pingInterval + pingTimeout`, the longest silence tolerated from the server.
        liveness: Option<Duration>,
    },
    /// The server accepted the namespace connection.
    Connected,
    /// The server refused the namespace connection.
    ConnectError(String),
    /// The server closed the session.
    Disconnect,
    /// Engine.IO heartbeat that must be answered with a pong.
    Ping,
    /// Application event.
    Event(PushEvent),
    /// Anything that needs no reaction (pongs, noops, acks).
    Ignored,
}

/// Application-level push event.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// Raw `leaderboard_update` payload.
    Leaderboard(Value),
    /// Raw `countdown_update` payload.
    Countdown(Value),
    /// Any other event name; ignored by the client.
    Other(String),
}

impl PushEvent {
    /// Classify an event by name.
    pub fn from_parts(name: &str, data: Value) -> Self {
        match name {
            EVENT_LEADERBOARD_UPDATE => Self::Leaderboard(data),
            EVENT_COUNTDOWN_UPDATE => Self::Countdown(data),
            other => Self::Other(other.to_string()),
        }
    }
}

/// Frames the client sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Join the default namespace after the open packet.
    Connect,
    /// Heartbeat reply.
    Pong,
    /// Emit a payload-less event.
    Emit(&'static str),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenPacket {
    ping_interval: u64,
    ping_timeout: u64,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct ConnectErrorBody {
    message: String,
}

impl Framing {
    /// WebSocket endpoint derived from the backend HTTP origin.
    pub fn endpoint(&self, backend: &Url) -> Option<Url> {
        let mut url = backend.clone();
        let scheme = match backend.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            _ => return None,
        };
        url.set_scheme(scheme).ok()?;
        let base_path = backend.path().trim_end_matches('/');
        match self {
            Self::SocketIo => {
                url.set_path(&format!("{base_path}/{SOCKET_IO_PATH}"));
                url.set_query(Some(SOCKET_IO_QUERY));
            }
            Self::Json => {
                url.set_path(&format!("{base_path}/{JSON_PATH}"));
                url.set_query(None);
            }
        }
        Some(url)
    }

    /// Whether the channel counts as connected as soon as the upgrade completes.
    pub fn connected_on_upgrade(&self) -> bool {
        matches!(self, Self::Json)
    }

    /// Decode one text frame.
    pub fn decode(&self, text: &str) -> Result<InboundFrame, FrameError> {
        match self {
            Self::SocketIo => decode_engine_packet(text),
            Self::Json => {
                let envelope: Envelope = serde_json::from_str(text)?;
                Ok(InboundFrame::Event(PushEvent::from_parts(
                    &envelope.event,
                    envelope.data,
                )))
            }
        }
    }

    /// Encode an outbound frame, or `None` when the framing has no such frame.
    pub fn encode(&self, frame: OutboundFrame) -> Option<String> {
        match (self, frame) {
            (Self::SocketIo, OutboundFrame::Connect) => Some("40".into()),
            (Self::SocketIo, OutboundFrame::Pong) => Some("3".into()),
            (Self::SocketIo, OutboundFrame::Emit(name)) => Some(format!("42{}", json!([name]))),
            (Self::Json, OutboundFrame::Emit(name)) => Some(json!({ "event": name }).to_string()),
            (Self::Json, _) => None,
        }
    }
}

fn split_type(packet: &str) -> Result<(char, &str), FrameError> {
    let mut chars = packet.chars();
    let kind = chars.next().ok_or(FrameError::Empty)?;
    Ok((kind, chars.as_str()))
}

fn decode_engine_packet(text: &str) -> Result<InboundFrame, FrameError> {
    let (kind, body) = split_type(text)?;
    match kind {
        '0' => {
            let liveness = serde_json::from_str::<OpenPacket>(body).ok().map(|open| {
                Duration::from_millis(open.ping_interval.saturating_add(open.ping_timeout))
            });
            Ok(InboundFrame::Open { liveness })
        }
        '1' => Ok(InboundFrame::Disconnect),
        '2' => Ok(InboundFrame::Ping),
        '3' | '5' | '6' => Ok(InboundFrame::Ignored),
        '4' => decode_socket_packet(body),
        other => Err(FrameError::UnknownPacket(other)),
    }
}

fn decode_socket_packet(packet: &str) -> Result<InboundFrame, FrameError> {
    let (kind, body) = split_type(packet)?;
    let body = strip_ack_id(strip_namespace(body));
    match kind {
        '0' => Ok(InboundFrame::Connected),
        '1' => Ok(InboundFrame::Disconnect),
        '2' => {
            let mut items = match serde_json::from_str::<Value>(body)? {
                Value::Array(items) => items.into_iter(),
                _ => return Err(FrameError::MissingEventName),
            };
            let name = match items.next() {
                Some(Value::String(name)) => name,
                _ => return Err(FrameError::MissingEventName),
            };
            let data = items.next().unwrap_or(Value::Null);
            Ok(InboundFrame::Event(PushEvent::from_parts(&name, data)))
        }
        '3' => Ok(InboundFrame::Ignored),
        '4' => {
            let message = serde_json::from_str::<ConnectErrorBody>(body)
                .map(|err| err.message)
                .unwrap_or_else(|_| body.to_string());
            Ok(InboundFrame::ConnectError(message))
        }
        '5' | '6' => Err(FrameError::Binary),
        other => Err(FrameError::UnknownPacket(other)),
    }
}

/// Drop a `/namespace,` prefix; the client only uses the default namespace.
fn strip_namespace(body: &str) -> &str {
    if body.starts_with('/') {
        body.split_once(',').map(|(_, rest)| rest).unwrap_or("")
    } else {
        body
    }
}

fn strip_ack_id(body: &str) -> &str {
    body.trim_start_matches(|c: char| c.is_ascii_digit())
}
