//! A set of constants used by the library.

/// The gateway protocol version this library targets. Other versions are
/// accepted with a warning.
pub const GATEWAY_VERSION: u8 = 6;

/// Sent along with every REST request, per Discord's bot user-agent
/// policy.
pub const USER_AGENT: &str = concat!(
    "DiscordBot (https://github.com/cryogonal/cryogonal, ",
    env!("CARGO_PKG_VERSION"),
    ") rust/",
    env!("CARGO_PKG_RUST_VERSION"),
);

/// Upper bound on executions of a single REST request before giving up on
/// transient failures (429, 502).
pub const MAX_REQUEST_ATTEMPTS: u32 = 5;
