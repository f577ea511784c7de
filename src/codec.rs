//! Gateway payload decoding.

use crate::error::{Error, Result};
use crate::packet::Packet;

/// A payload-decoding strategy, turning a complete inbound message into
/// a [`Packet`].
pub trait Decoder: Send + Sync {
    /// Decode one complete message.
    fn decode(&self, bytes: &[u8]) -> Result<Packet>;
}

/// Select a decoder by the gateway URI's `encoding` parameter.
pub fn from_name(name: &str) -> Result<Box<dyn Decoder>> {
    match name {
        "json" => Ok(Box::new(JsonDecoder)),
        other => Err(Error::UnknownDecoder(other.to_string())),
    }
}

/// Decodes the JSON envelope `{"op", "s", "d", "t"}`. The `d` subtree is
/// captured verbatim for downstream typed parsers.
#[derive(Debug, Clone, Copy)]
pub struct JsonDecoder;

impl Decoder for JsonDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Packet> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
