//! Route-key registry coalescing onto shared server buckets.
//!
//! Discord does not publish its rate-limit topology: the bucket behind a
//! route is only discoverable from the `X-RateLimit-Bucket` header of a
//! response that already happened. Two different routes may turn out to
//! share one bucket, so the registry is dual-indexed and keys sharing a
//! bucket id alias the *same* [`Bucket`] instance.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::DateTime;
use parking_lot::Mutex;
use reqwest::header::HeaderMap;
use tracing::debug;

use super::bucket::Bucket;
use crate::error::{Error, Result};
use crate::snowflake::Snowflake;

/// Path component that partitions an otherwise shared route into
/// independent buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MajorParameter {
    /// Route has no major parameter.
    None,
    /// Route is per-channel.
    ChannelId(Snowflake),
    /// Route is per-guild.
    GuildId(Snowflake),
    /// Route is per-webhook.
    WebhookId(Snowflake),
}

/// Identifies a route template plus its major parameter. The tag is a
/// caller-chosen symbol for the template, not the URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LimitKey {
    route_tag: &'static str,
    major_parameter: MajorParameter,
}

impl LimitKey {
    /// The account-wide rate limit.
    pub const GLOBAL: Self = Self {
        route_tag: "global",
        major_parameter: MajorParameter::None,
    };

    /// Key a route template under its major parameter.
    #[must_use]
    pub const fn new(route_tag: &'static str, major_parameter: MajorParameter) -> Self {
        Self {
            route_tag,
            major_parameter,
        }
    }

    /// The route template symbol.
    #[must_use]
    pub const fn route_tag(&self) -> &'static str {
        self.route_tag
    }

    /// The major parameter partitioning this route.
    #[must_use]
    pub const fn major_parameter(&self) -> MajorParameter {
        self.major_parameter
    }
}

impl fmt::Display for LimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.major_parameter {
            MajorParameter::None => f.write_str(self.route_tag),
            MajorParameter::ChannelId(id) => write!(f, "{}(channel:{id})", self.route_tag),
            MajorParameter::GuildId(id) => write!(f, "{}(guild:{id})", self.route_tag),
            MajorParameter::WebhookId(id) => write!(f, "{}(webhook:{id})", self.route_tag),
        }
    }
}

#[derive(Default)]
struct Maps {
    by_key: HashMap<LimitKey, Arc<Bucket>>,
    by_bucket_id: HashMap<String, Arc<Bucket>>,
}

/// Registry of every rate-limit window observed so far.
#[derive(Default)]
pub struct LimitTable {
    maps: Mutex<Maps>,
}

impl LimitTable {
    /// An empty registry; buckets appear lazily as responses come back.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The bucket a route key currently maps to, if any response has
    /// populated it.
    #[must_use]
    pub fn lookup(&self, key: &LimitKey) -> Option<Arc<Bucket>> {
        self.maps.lock().by_key.get(key).cloned()
    }

    /// The bucket behind a server-assigned bucket id.
    #[must_use]
    pub fn lookup_id(&self, bucket_id: &str) -> Option<Arc<Bucket>> {
        self.maps.lock().by_bucket_id.get(bucket_id).cloned()
    }

    /// Digest a response's rate-limit headers into the registry.
    ///
    /// With the full header set present, the reset instant comes from the
    /// server's `Date` plus `Retry-After` (milliseconds) when both exist,
    /// falling back to the Unix-seconds `X-RateLimit-Reset`. A bare
    /// `Retry-After` is a global 429 and synthesizes an exhausted bucket.
    ///
    /// # Errors
    ///
    /// [`Error::MissingRateLimitHeaders`] when neither form is present.
    pub fn update(&self, key: &LimitKey, headers: &HeaderMap) -> Result<()> {
        let limit = header_u32(headers, "x-ratelimit-limit");
        let remaining = header_u32(headers, "x-ratelimit-remaining");
        let reset = header_u64(headers, "x-ratelimit-reset");
        let bucket_id = header_str(headers, "x-ratelimit-bucket");
        let retry_after = header_u64(headers, "retry-after").map(Duration::from_millis);
        let server_date = header_str(headers, "date").and_then(parse_http_date);

        if let (Some(limit), Some(remaining), Some(reset), Some(bucket_id)) =
            (limit, remaining, reset, bucket_id)
        {
            let reset_time = match (server_date, retry_after) {
                (Some(date), Some(after)) => date + after,
                _ => UNIX_EPOCH + Duration::from_secs(reset),
            };
            debug!(
                key = %key,
                bucket = bucket_id,
                limit,
                remaining,
                "rate limit window observed"
            );
            self.apply(key, Some(bucket_id), limit, remaining, reset_time);
            Ok(())
        } else if let Some(after) = retry_after {
            let base = server_date.unwrap_or_else(SystemTime::now);
            debug!(key = %key, retry_after_ms = after.as_millis() as u64, "bare Retry-After window");
            self.apply(key, None, 0, 0, base + after);
            Ok(())
        } else {
            Err(Error::MissingRateLimitHeaders)
        }
    }

    fn apply(
        &self,
        key: &LimitKey,
        bucket_id: Option<&str>,
        limit: u32,
        remaining: u32,
        reset_time: SystemTime,
    ) {
        let mut maps = self.maps.lock();
        if let Some(id) = bucket_id {
            if let Some(bucket) = maps.by_bucket_id.get(id).cloned() {
                // Known server bucket: mutate it in place and alias the
                // key to the same instance, so a decrement through any
                // key is observed through every other.
                bucket.configure(limit, remaining, reset_time);
                maps.by_key.insert(key.clone(), bucket);
                return;
            }
        }
        let bucket = Arc::new(Bucket::new(limit, remaining, reset_time));
        maps.by_key.insert(key.clone(), Arc::clone(&bucket));
        if let Some(id) = bucket_id {
            maps.by_bucket_id.insert(id.to_string(), bucket);
        }
    }
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn header_u32(headers: &HeaderMap, name: &str) -> Option<u32> {
    header_str(headers, name).and_then(|value| value.parse().ok())
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    header_str(headers, name).and_then(|value| value.parse().ok())
}

/// HTTP-date (IMF-fixdate is RFC 2822 compatible) to a wall-clock
/// instant.
fn parse_http_date(value: &str) -> Option<SystemTime> {
    DateTime::parse_from_rfc2822(value).ok().map(SystemTime::from)
}
