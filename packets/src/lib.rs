//! Engine.IO v4 / Socket.IO v4 text packet codec for the relay websocket transport.
//!
//! This crate owns the wire representation shared by the relay server and its
//! tests. Two layers are modeled:
//!
//! - [`EnginePacket`]: the transport envelope (`0` open, `2` ping, `4` message, ...).
//! - [`Packet`]: the Socket.IO packet carried inside an engine `message`.
//!
//! Only text packets are supported. Binary attachments are rejected at decode.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Namespace every relay socket lives in.
pub const DEFAULT_NAMESPACE: &str = "/";

/// Error returned by [`decode_engine`] and [`decode_packet`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The input text was empty.
    #[error("empty packet")]
    Empty,
    /// The leading character is not a known Engine.IO packet type.
    #[error("unknown engine packet type: {0:?}")]
    UnknownEngineType(char),
    /// The leading character is not a known Socket.IO packet type.
    #[error("unknown socket packet type: {0:?}")]
    UnknownPacketType(char),
    /// Binary event/ack packets need attachments this transport never carries.
    #[error("binary packets are not supported")]
    BinaryUnsupported,
    /// The ack id digits do not fit in a `u64`.
    #[error("invalid ack id")]
    InvalidAckId,
    /// The JSON segment of the packet could not be parsed.
    #[error("invalid packet json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// The JSON segment parsed but has the wrong shape for the packet type.
    #[error("invalid payload for {0:?} packet")]
    InvalidPayload(PacketType),
}

// =============================================================================
// ENGINE LAYER
// =============================================================================

/// Handshake data sent by the server in the engine `open` packet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings.
    pub ping_interval: u64,
    /// Milliseconds the client has to answer a ping.
    pub ping_timeout: u64,
    /// Largest accepted packet, in bytes.
    pub max_payload: u64,
}

/// One Engine.IO packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnginePacket {
    Open(Handshake),
    Close,
    Ping(String),
    Pong(String),
    /// Carries an encoded Socket.IO [`Packet`].
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    /// Wrap a Socket.IO packet in an engine `message`.
    #[must_use]
    pub fn message(packet: &Packet) -> Self {
        Self::Message(encode_packet(packet))
    }
}

/// Encode an engine packet as websocket text.
#[must_use]
pub fn encode_engine(packet: &EnginePacket) -> String {
    match packet {
        EnginePacket::Open(handshake) => {
            let body = serde_json::json!({
                "sid": handshake.sid,
                "upgrades": handshake.upgrades,
                "pingInterval": handshake.ping_interval,
                "pingTimeout": handshake.ping_timeout,
                "maxPayload": handshake.max_payload,
            });
            format!("0{body}")
        }
        EnginePacket::Close => "1".to_owned(),
        EnginePacket::Ping(data) => format!("2{data}"),
        EnginePacket::Pong(data) => format!("3{data}"),
        EnginePacket::Message(data) => format!("4{data}"),
        EnginePacket::Upgrade => "5".to_owned(),
        EnginePacket::Noop => "6".to_owned(),
    }
}

/// Decode websocket text into an engine packet.
///
/// # Errors
///
/// Returns [`CodecError::Empty`] for empty input, [`CodecError::UnknownEngineType`]
/// for an unrecognized type character, and [`CodecError::InvalidJson`] for a
/// malformed `open` handshake.
pub fn decode_engine(text: &str) -> Result<EnginePacket, CodecError> {
    let mut chars = text.chars();
    let Some(kind) = chars.next() else {
        return Err(CodecError::Empty);
    };
    let rest = chars.as_str();

    match kind {
        '0' => Ok(EnginePacket::Open(serde_json::from_str(rest)?)),
        '1' => Ok(EnginePacket::Close),
        '2' => Ok(EnginePacket::Ping(rest.to_owned())),
        '3' => Ok(EnginePacket::Pong(rest.to_owned())),
        '4' => Ok(EnginePacket::Message(rest.to_owned())),
        '5' => Ok(EnginePacket::Upgrade),
        '6' => Ok(EnginePacket::Noop),
        other => Err(CodecError::UnknownEngineType(other)),
    }
}

// =============================================================================
// SOCKET LAYER
// =============================================================================

/// Socket.IO packet type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketType {
    Connect,
    Disconnect,
    Event,
    Ack,
    ConnectError,
    BinaryEvent,
    BinaryAck,
}

impl PacketType {
    /// Wire digit for this packet type.
    #[must_use]
    pub fn as_char(self) -> char {
        match self {
            Self::Connect => '0',
            Self::Disconnect => '1',
            Self::Event => '2',
            Self::Ack => '3',
            Self::ConnectError => '4',
            Self::BinaryEvent => '5',
            Self::BinaryAck => '6',
        }
    }

    fn from_char(c: char) -> Result<Self, CodecError> {
        match c {
            '0' => Ok(Self::Connect),
            '1' => Ok(Self::Disconnect),
            '2' => Ok(Self::Event),
            '3' => Ok(Self::Ack),
            '4' => Ok(Self::ConnectError),
            '5' => Ok(Self::BinaryEvent),
            '6' => Ok(Self::BinaryAck),
            other => Err(CodecError::UnknownPacketType(other)),
        }
    }
}

/// A Socket.IO packet.
#[derive(Clone, Debug, PartialEq)]
pub struct Packet {
    pub kind: PacketType,
    /// Namespace, `"/"` unless the client addressed another one.
    pub namespace: String,
    /// Present when the sender expects an acknowledgment.
    pub ack_id: Option<u64>,
    pub data: Option<Value>,
}

impl Packet {
    fn new(kind: PacketType, data: Option<Value>) -> Self {
        Self { kind, namespace: DEFAULT_NAMESPACE.to_owned(), ack_id: None, data }
    }

    /// Server reply to a namespace CONNECT, carrying the socket id.
    #[must_use]
    pub fn connect(sid: &str) -> Self {
        Self::new(PacketType::Connect, Some(serde_json::json!({ "sid": sid })))
    }

    /// Handshake rejection for the given namespace.
    #[must_use]
    pub fn connect_error(namespace: &str, message: impl Into<String>) -> Self {
        let mut packet = Self::new(
            PacketType::ConnectError,
            Some(serde_json::json!({ "message": message.into() })),
        );
        namespace.clone_into(&mut packet.namespace);
        packet
    }

    #[must_use]
    pub fn disconnect() -> Self {
        Self::new(PacketType::Disconnect, None)
    }

    /// Named event with a single argument.
    #[must_use]
    pub fn event(name: &str, payload: Value) -> Self {
        Self::new(PacketType::Event, Some(Value::Array(vec![Value::String(name.to_owned()), payload])))
    }

    /// Acknowledgment for `ack_id`. An empty `args` means the callback runs
    /// with no arguments.
    #[must_use]
    pub fn ack(ack_id: u64, args: Vec<Value>) -> Self {
        let mut packet = Self::new(PacketType::Ack, Some(Value::Array(args)));
        packet.ack_id = Some(ack_id);
        packet
    }

    #[must_use]
    pub fn with_ack_id(mut self, ack_id: u64) -> Self {
        self.ack_id = Some(ack_id);
        self
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Event name, for EVENT packets.
    #[must_use]
    pub fn event_name(&self) -> Option<&str> {
        if self.kind != PacketType::Event {
            return None;
        }
        self.data
            .as_ref()
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .and_then(Value::as_str)
    }

    /// Event arguments following the name, or ack arguments for ACK packets.
    #[must_use]
    pub fn args(&self) -> &[Value] {
        let Some(items) = self.data.as_ref().and_then(Value::as_array) else {
            return &[];
        };
        match self.kind {
            PacketType::Event => items.get(1..).unwrap_or(&[]),
            _ => items,
        }
    }
}

/// Encode a Socket.IO packet (without the engine `4` prefix).
#[must_use]
pub fn encode_packet(packet: &Packet) -> String {
    let mut out = String::new();
    out.push(packet.kind.as_char());
    if packet.namespace != DEFAULT_NAMESPACE {
        out.push_str(&packet.namespace);
        out.push(',');
    }
    if let Some(ack_id) = packet.ack_id {
        out.push_str(&ack_id.to_string());
    }
    if let Some(data) = &packet.data {
        out.push_str(&data.to_string());
    }
    out
}

/// Decode a Socket.IO packet (the body of an engine `message`).
///
/// # Errors
///
/// Returns [`CodecError::BinaryUnsupported`] for binary packet types,
/// [`CodecError::InvalidAckId`] for an overflowing ack id,
/// [`CodecError::InvalidJson`] for a malformed JSON segment, and
/// [`CodecError::InvalidPayload`] when the JSON does not fit the packet type.
pub fn decode_packet(text: &str) -> Result<Packet, CodecError> {
    let mut chars = text.chars();
    let Some(kind) = chars.next() else {
        return Err(CodecError::Empty);
    };
    let kind = PacketType::from_char(kind)?;
    if matches!(kind, PacketType::BinaryEvent | PacketType::BinaryAck) {
        return Err(CodecError::BinaryUnsupported);
    }
    let mut rest = chars.as_str();

    let mut namespace = DEFAULT_NAMESPACE.to_owned();
    if rest.starts_with('/') {
        match rest.split_once(',') {
            Some((nsp, tail)) => {
                nsp.clone_into(&mut namespace);
                rest = tail;
            }
            None => {
                rest.clone_into(&mut namespace);
                rest = "";
            }
        }
    }

    let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    let ack_id = if digits > 0 {
        let id = rest[..digits].parse::<u64>().map_err(|_| CodecError::InvalidAckId)?;
        rest = &rest[digits..];
        Some(id)
    } else {
        None
    };

    let data = if rest.is_empty() { None } else { Some(serde_json::from_str::<Value>(rest)?) };

    if !payload_fits(kind, data.as_ref()) {
        return Err(CodecError::InvalidPayload(kind));
    }

    Ok(Packet { kind, namespace, ack_id, data })
}

fn payload_fits(kind: PacketType, data: Option<&Value>) -> bool {
    match kind {
        PacketType::Connect => data.is_none_or(Value::is_object),
        PacketType::Disconnect => data.is_none(),
        PacketType::Event => data
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .is_some_and(Value::is_string),
        PacketType::Ack => data.is_some_and(Value::is_array),
        PacketType::ConnectError => data.is_some_and(|v| v.is_object() || v.is_string()),
        PacketType::BinaryEvent | PacketType::BinaryAck => false,
    }
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
