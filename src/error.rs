//! Crate-wide error types.

use thiserror::Error;

use crate::rest::ApiError;
use crate::token::TokenKind;

/// Errors produced by the gateway transport and the REST coordinator.
#[derive(Debug, Error)]
pub enum Error {
    /// No compressor is registered under the requested name.
    #[error("unknown compressor: {0:?}")]
    UnknownCompressor(String),

    /// No decoder is registered under the requested name.
    #[error("unknown decoder: {0:?}")]
    UnknownDecoder(String),

    /// The token kind cannot be used for the attempted operation.
    #[error("a {0:?} token cannot identify with the gateway")]
    BadTokenType(TokenKind),

    /// The token cannot be carried in an `Authorization` header.
    #[error("token contains characters illegal in an Authorization header")]
    MalformedToken,

    /// The gateway URI did not parse.
    #[error("invalid gateway URI: {0}")]
    InvalidUri(#[from] url::ParseError),

    /// The shard was never connected.
    #[error("shard is not connected")]
    NotConnected,

    /// Shard sessions are single-use; a second `connect` is a caller bug.
    #[error("shard session already consumed")]
    AlreadyConnected,

    /// A close frame payload was too short or carried a non-UTF-8 reason.
    #[error("malformed close frame payload")]
    MalformedCloseFrame,

    /// The response carried neither a full rate-limit header set nor a
    /// `Retry-After`.
    #[error("response headers insufficient to build a rate limit bucket")]
    MissingRateLimitHeaders,

    /// `Bucket::cooldown` was asked to wait for a reset that already
    /// passed.
    #[error("rate limit reset time is already in the past")]
    CooldownInPast,

    /// The request body cannot be cloned for a retry.
    #[error("request body cannot be rewound for retry")]
    UnrewindableBody,

    /// The request kept failing with retryable statuses.
    #[error("max request attempts ({0}) exceeded")]
    MaxAttemptsExceeded(u32),

    /// Discord rejected the request.
    #[error("Discord API error {status}: {error}")]
    Api {
        /// HTTP status code of the response.
        status: u16,
        /// Parsed error body.
        error: ApiError,
    },

    /// WebSocket transport failure.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload inflation failure.
    #[error("zlib inflate error: {0}")]
    Inflate(#[from] flate2::DecompressError),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
