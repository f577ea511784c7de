//! Typed payloads a shard can send.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::Result;
use crate::packet::{Opcode, Packet};
use crate::snowflake::Snowflake;
use crate::token::Token;

/// Identify connection properties. Discord requires these user-agent-like
/// fields; the values are fixed for this library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionProperties {
    /// Operating system
    pub os: String,

    /// Library name, browser slot
    pub browser: String,

    /// Library name, device slot
    pub device: String,
}

impl Default for ConnectionProperties {
    fn default() -> Self {
        Self {
            os: "Linux".into(),
            browser: "cryogonal".into(),
            device: "cryogonal".into(),
        }
    }
}

/// Starts a new gateway session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identify {
    /// Bot credential; only [`TokenKind::Bot`](crate::TokenKind::Bot)
    /// tokens may identify
    pub token: Token,

    /// Connection properties
    pub properties: ConnectionProperties,

    /// Whether to expect per-message compressed Dispatch payloads
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compress: Option<bool>,

    /// Member count threshold below which guilds send offline members
    #[serde(skip_serializing_if = "Option::is_none")]
    pub large_threshold: Option<u32>,

    /// `[shard_id, num_shards]`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shard: Option<[u32; 2]>,
}

impl Identify {
    /// Identify with the default properties and no optional fields.
    #[must_use]
    pub fn new(token: Token) -> Self {
        Self {
            token,
            properties: ConnectionProperties::default(),
            compress: None,
            large_threshold: None,
            shard: None,
        }
    }
}

/// Resumes a dropped session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resume {
    /// Bot credential
    pub token: Token,

    /// Session to resume
    pub session_id: String,

    /// Last sequence number observed
    pub seq: u64,
}

/// Requests guild member chunks over the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestGuildMembers {
    /// Guild to fetch members for
    pub guild_id: Snowflake,

    /// Username prefix filter; empty matches everyone
    pub query: String,

    /// Maximum members to fetch; 0 for no limit
    pub limit: u32,
}

/// Updates the client's presence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatus {
    /// Unix ms of when the client went idle, if it is
    pub since: Option<u64>,

    /// Activity object, untyped here
    pub game: Option<serde_json::Value>,

    /// One of `online`, `dnd`, `idle`, `invisible`, `offline`
    pub status: String,

    /// Whether the client is AFK
    pub afk: bool,
}

/// Joins, moves between, or leaves voice channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateVoiceState {
    /// Guild the voice channel belongs to
    pub guild_id: Snowflake,

    /// Channel to join, or `None` to disconnect
    pub channel_id: Option<Snowflake>,

    /// Whether the client is muted
    pub self_mute: bool,

    /// Whether the client is deafened
    pub self_deaf: bool,
}

/// A command to send over the gateway. Each variant maps to a fixed
/// opcode; [`Raw`](SentPayload::Raw) is the escape hatch for opcodes this
/// library does not model.
#[derive(Debug, Clone)]
pub enum SentPayload {
    /// Opcode 2
    Identify(Identify),
    /// Opcode 6
    Resume(Resume),
    /// Opcode 1, carrying the last observed sequence number
    Heartbeat(Option<u64>),
    /// Opcode 8
    RequestGuildMembers(RequestGuildMembers),
    /// Opcode 4
    UpdateVoiceState(UpdateVoiceState),
    /// Opcode 3
    UpdateStatus(UpdateStatus),
    /// Pre-assembled packet, sent as-is
    Raw(Packet),
}

impl SentPayload {
    /// Wrap the payload in its wire envelope.
    pub(crate) fn into_packet(self) -> Result<Packet> {
        let (opcode, data) = match self {
            Self::Identify(payload) => (Opcode::Identify, to_raw(&payload)?),
            Self::Resume(payload) => (Opcode::Resume, to_raw(&payload)?),
            Self::Heartbeat(sequence) => (Opcode::Heartbeat, to_raw(&sequence)?),
            Self::RequestGuildMembers(payload) => (Opcode::RequestGuildMembers, to_raw(&payload)?),
            Self::UpdateVoiceState(payload) => (Opcode::VoiceStateUpdate, to_raw(&payload)?),
            Self::UpdateStatus(payload) => (Opcode::StatusUpdate, to_raw(&payload)?),
            Self::Raw(packet) => return Ok(packet),
        };
        Ok(Packet::new(opcode, None, Some(data), None))
    }
}

fn to_raw<T: Serialize>(value: &T) -> Result<Box<RawValue>> {
    Ok(serde_json::value::to_raw_value(value)?)
}

/// HELLO (opcode 10) data: how often the server expects heartbeats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hello {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identify_carries_fixed_properties() {
        let identify = Identify::new(Token::new("Bot abc"));
        let json = serde_json::to_value(&identify).unwrap();
        assert_eq!(json["token"], "Bot abc");
        assert_eq!(json["properties"]["os"], "Linux");
        assert_eq!(json["properties"]["browser"], "cryogonal");
        assert_eq!(json["properties"]["device"], "cryogonal");
        assert!(json.get("compress").is_none());
        assert!(json.get("shard").is_none());
    }

    #[test]
    fn payloads_map_to_their_opcodes() {
        let identify = SentPayload::Identify(Identify::new(Token::new("Bot abc")));
        assert_eq!(identify.into_packet().unwrap().opcode, Opcode::Identify);

        let resume = SentPayload::Resume(Resume {
            token: Token::new("Bot abc"),
            session_id: "deadbeef".into(),
            seq: 42,
        });
        assert_eq!(resume.into_packet().unwrap().opcode, Opcode::Resume);

        // Guild member requests get their own opcode, not Heartbeat's.
        let members = SentPayload::RequestGuildMembers(RequestGuildMembers {
            guild_id: Snowflake::new(1),
            query: String::new(),
            limit: 0,
        });
        let packet = members.into_packet().unwrap();
        assert_eq!(packet.opcode, Opcode::RequestGuildMembers);
        assert_eq!(packet.opcode.as_u8(), 8);

        let voice = SentPayload::UpdateVoiceState(UpdateVoiceState {
            guild_id: Snowflake::new(1),
            channel_id: None,
            self_mute: false,
            self_deaf: false,
        });
        assert_eq!(
            voice.into_packet().unwrap().opcode,
            Opcode::VoiceStateUpdate
        );

        let status = SentPayload::UpdateStatus(UpdateStatus {
            since: None,
            game: None,
            status: "online".into(),
            afk: false,
        });
        assert_eq!(status.into_packet().unwrap().opcode, Opcode::StatusUpdate);
    }

    #[test]
    fn heartbeat_data_is_the_bare_sequence() {
        let packet = SentPayload::Heartbeat(Some(251)).into_packet().unwrap();
        assert_eq!(packet.opcode, Opcode::Heartbeat);
        assert_eq!(packet.data.unwrap().get(), "251");

        let packet = SentPayload::Heartbeat(None).into_packet().unwrap();
        assert_eq!(packet.data.unwrap().get(), "null");
    }

    #[test]
    fn heartbeat_envelope_serialization() {
        let packet = SentPayload::Heartbeat(Some(7)).into_packet().unwrap();
        assert_eq!(
            serde_json::to_string(&packet).unwrap(),
            r#"{"op":1,"s":null,"d":7,"t":null}"#
        );
    }

    #[test]
    fn snowflakes_in_payloads_are_strings() {
        let members = RequestGuildMembers {
            guild_id: Snowflake::new(81_384_788_765_712_384),
            query: "lyt".into(),
            limit: 10,
        };
        let json = serde_json::to_string(&members).unwrap();
        assert!(json.contains(r#""guild_id":"81384788765712384""#));
    }
}
