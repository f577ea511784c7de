//! Gateway wire messages.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;

use crate::error::{Error, Result};

/// Gateway operation codes.
///
/// Op codes define the meaning of a packet's `d` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Server dispatches a named application-level event
    Dispatch = 0,
    /// Keep the connection alive (either direction)
    Heartbeat = 1,
    /// Start a new session (client only)
    Identify = 2,
    /// Update presence (client only)
    StatusUpdate = 3,
    /// Join, move between, or leave voice channels (client only)
    VoiceStateUpdate = 4,
    /// Voice ping checking (server only)
    VoiceServerPing = 5,
    /// Resume a dropped session (client only)
    Resume = 6,
    /// Server requests a reconnect (server only)
    Reconnect = 7,
    /// Request guild member chunks (client only)
    RequestGuildMembers = 8,
    /// Session invalidated (server only)
    InvalidSession = 9,
    /// Sent on connect; carries `heartbeat_interval` (server only)
    Hello = 10,
    /// Heartbeat acknowledged (server only)
    HeartbeatAck = 11,
}

impl Opcode {
    /// Create an `Opcode` from a raw integer value.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Dispatch),
            1 => Some(Self::Heartbeat),
            2 => Some(Self::Identify),
            3 => Some(Self::StatusUpdate),
            4 => Some(Self::VoiceStateUpdate),
            5 => Some(Self::VoiceServerPing),
            6 => Some(Self::Resume),
            7 => Some(Self::Reconnect),
            8 => Some(Self::RequestGuildMembers),
            9 => Some(Self::InvalidSession),
            10 => Some(Self::Hello),
            11 => Some(Self::HeartbeatAck),
            _ => None,
        }
    }

    /// Get the raw integer value.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.as_u8())
    }
}

impl Serialize for Opcode {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for Opcode {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = u8::deserialize(deserializer)?;
        Self::from_u8(value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid opcode: {value}")))
    }
}

/// The gateway message envelope, both directions.
///
/// The `d` subtree is kept as the raw bytes captured during decode, so
/// the envelope neither knows nor cares about the data schema for every
/// opcode and event. Downstream parsers consume it lazily via
/// [`parse_data`](Packet::parse_data).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Packet {
    /// Operation code
    #[serde(rename = "op")]
    pub opcode: Opcode,

    /// Sequence number of Dispatch packets
    #[serde(rename = "s", default)]
    pub sequence: Option<u64>,

    /// Raw, re-parseable payload
    #[serde(rename = "d", default)]
    pub data: Option<Box<RawValue>>,

    /// Event name of Dispatch packets
    #[serde(rename = "t", default)]
    pub event_type: Option<String>,
}

impl Packet {
    /// Assemble a packet from its parts.
    #[must_use]
    pub const fn new(
        opcode: Opcode,
        sequence: Option<u64>,
        data: Option<Box<RawValue>>,
        event_type: Option<String>,
    ) -> Self {
        Self {
            opcode,
            sequence,
            data,
            event_type,
        }
    }

    /// Re-parse the raw `d` payload into a typed value. An absent `d`
    /// parses as JSON `null`.
    pub fn parse_data<'a, T: Deserialize<'a>>(&'a self) -> Result<T> {
        let raw = self.data.as_ref().map_or("null", |data| data.get());
        Ok(serde_json::from_str(raw)?)
    }
}

/// What a shard consumer observes.
///
/// `Connected` precedes all packets of a session; `Disconnected` follows
/// them; an optional `Close` slots in between.
#[derive(Debug, Clone)]
pub enum Event {
    /// The WebSocket handshake completed.
    Connected,
    /// A decoded gateway packet.
    Packet(Packet),
    /// The peer sent a close frame.
    Close {
        /// WebSocket close code.
        code: u16,
        /// UTF-8 close reason, when one was given.
        reason: Option<String>,
    },
    /// The session ended; no further events follow.
    Disconnected,
}

impl Event {
    /// Decode a close frame payload: a big-endian `u16` code followed by
    /// an optional UTF-8 reason.
    pub fn from_close_payload(payload: &[u8]) -> Result<Self> {
        if payload.len() < 2 {
            return Err(Error::MalformedCloseFrame);
        }
        let code = u16::from(payload[0]) << 8 | u16::from(payload[1]);
        let reason = if payload.len() > 2 {
            let text = std::str::from_utf8(&payload[2..]).map_err(|_| Error::MalformedCloseFrame)?;
            Some(text.to_string())
        } else {
            None
        };
        Ok(Self::Close { code, reason })
    }
}
