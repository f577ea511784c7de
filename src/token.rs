//! Tagged API credentials.

use std::fmt;

use base64::engine::general_purpose::STANDARD_NO_PAD as BASE64_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::snowflake::Snowflake;

/// Kind of credential, inferred from the raw string's prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// No credential; requests go out unauthenticated.
    Empty,
    /// Bot token (`"Bot "` prefix).
    Bot,
    /// HTTP basic credentials (`"Basic "` prefix).
    Basic,
    /// OAuth bearer token (`"Bearer "` prefix).
    Bearer,
    /// Anything else, passed through untouched.
    Unknown,
}

/// An API credential. The raw value is sensitive: it is only ever
/// rendered by [`header_value`](Token::header_value) (for the
/// `Authorization` header) and by serialization onto the gateway wire.
/// The `Debug` output carries the kind and, for bot tokens, the derived
/// client id — never the raw string.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    kind: TokenKind,
    raw: String,
}

impl Token {
    /// Wrap a raw credential string, inferring its kind.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let kind = if raw.is_empty() {
            TokenKind::Empty
        } else if raw.starts_with("Bot ") {
            TokenKind::Bot
        } else if raw.starts_with("Basic ") {
            TokenKind::Basic
        } else if raw.starts_with("Bearer ") {
            TokenKind::Bearer
        } else {
            TokenKind::Unknown
        };
        Self { kind, raw }
    }

    /// The inferred kind.
    #[must_use]
    pub const fn kind(&self) -> TokenKind {
        self.kind
    }

    /// Whether there is no credential at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self.kind, TokenKind::Empty)
    }

    /// The raw value, for the `Authorization` header only.
    #[must_use]
    pub fn header_value(&self) -> &str {
        &self.raw
    }

    /// For bot tokens, the client id baked into the portion before the
    /// first `.` of the payload.
    #[must_use]
    pub fn client_id(&self) -> Option<Snowflake> {
        if self.kind != TokenKind::Bot {
            return None;
        }
        let payload = self.raw.strip_prefix("Bot ")?;
        let encoded = payload.split('.').next()?;
        let decoded = BASE64_NO_PAD.decode(encoded.trim_end_matches('=')).ok()?;
        std::str::from_utf8(&decoded).ok()?.parse().ok()
    }
}

impl From<&str> for Token {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for Token {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token(kind={:?}", self.kind)?;
        if let Some(id) = self.client_id() {
            write!(f, ", client_id={id}")?;
        }
        f.write_str(")")
    }
}

impl Serialize for Token {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Token {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Self::new)
    }
}
