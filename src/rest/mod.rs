//! REST client and rate-limit coordination.
//!
//! Discord's rate limits live in server-side "buckets" whose identity is
//! unknown until a response has returned. [`LimitTable`] learns the
//! topology as responses arrive, [`Bucket`] gates tasks around exhausted
//! windows, and [`Client`] threads every request through both.

mod bucket;
mod client;
mod error;
mod limits;

pub use bucket::Bucket;
pub use client::Client;
pub use error::{ApiError, ErrorDetail, ErrorNode, RateLimitResponse};
pub use limits::{LimitKey, LimitTable, MajorParameter};
