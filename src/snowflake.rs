//! Discord snowflake IDs.
//!
//! A snowflake is an unsigned 64-bit integer whose upper 42 bits encode a
//! millisecond timestamp offset from the Discord epoch (2015-01-01 UTC).
//! On the wire a snowflake is always a decimal string, never a JSON
//! number, because 64-bit integers do not survive every JSON parser.

use std::cmp::Ordering;
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Discord epoch (2015-01-01T00:00:00.000Z), in Unix milliseconds.
const DISCORD_EPOCH: u64 = 1_420_070_400_000;

/// A 64-bit ID with an embedded creation timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Snowflake(u64);

impl Snowflake {
    /// First millisecond of the Discord epoch, in Unix milliseconds.
    pub const EPOCH: u64 = DISCORD_EPOCH;

    /// Wrap a raw 64-bit value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The raw 64-bit value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Construct a snowflake whose timestamp bits encode `time`. The
    /// worker, process, and increment bits are zero, which makes the
    /// result suitable as a paginated-query boundary.
    #[must_use]
    pub fn from_time(time: DateTime<Utc>) -> Self {
        let unix_ms = u64::try_from(time.timestamp_millis()).unwrap_or(0);
        Self(unix_ms.saturating_sub(DISCORD_EPOCH) << 22)
    }

    /// When this ID was generated, at millisecond resolution.
    #[must_use]
    pub fn creation_time(self) -> DateTime<Utc> {
        let unix_ms = (self.0 >> 22) + DISCORD_EPOCH;
        i64::try_from(unix_ms)
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .expect("42-bit snowflake timestamp fits the chrono range")
    }
}

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Snowflake {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

impl From<u64> for Snowflake {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Snowflake> for u64 {
    fn from(value: Snowflake) -> Self {
        value.0
    }
}

impl PartialEq<u64> for Snowflake {
    fn eq(&self, other: &u64) -> bool {
        self.0 == *other
    }
}

impl PartialEq<Snowflake> for u64 {
    fn eq(&self, other: &Snowflake) -> bool {
        *self == other.0
    }
}

impl PartialOrd<u64> for Snowflake {
    fn partial_cmp(&self, other: &u64) -> Option<Ordering> {
        self.0.partial_cmp(other)
    }
}

impl PartialOrd<Snowflake> for u64 {
    fn partial_cmp(&self, other: &Snowflake) -> Option<Ordering> {
        self.partial_cmp(&other.0)
    }
}

impl Serialize for Snowflake {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&self.0)
    }
}

struct SnowflakeVisitor;

impl Visitor<'_> for SnowflakeVisitor {
    type Value = Snowflake;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a snowflake encoded as a decimal string")
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        value
            .parse()
            .map_err(|_| E::invalid_value(de::Unexpected::Str(value), &self))
    }
}

impl<'de> Deserialize<'de> for Snowflake {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_str(SnowflakeVisitor)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn epoch_is_first_second_of_2015() {
        assert_eq!(Snowflake::EPOCH, 1_420_070_400_000);
    }

    #[test]
    fn string_round_trip_preserves_value() {
        for value in [0, 1, 175_928_847_299_117_063, u64::MAX - 1, u64::MAX] {
            let parsed: Snowflake = value.to_string().parse().unwrap();
            assert_eq!(parsed.get(), value);
            assert_eq!(parsed.to_string(), value.to_string());
        }
    }

    #[test]
    fn ordering_agrees_with_u64() {
        let low = Snowflake::new(10);
        let high = Snowflake::new(20);
        assert!(low < high);
        assert!(low < 20_u64);
        assert!(20_u64 > low);
        assert!(low == 10_u64);
        assert!(10_u64 == low);

        let converted: Snowflake = 7_u64.into();
        assert_eq!(u64::from(converted), 7);
    }

    #[test]
    fn time_round_trip_at_millisecond_resolution() {
        let time = Utc.with_ymd_and_hms(2018, 4, 18, 0, 0, 0).unwrap();
        assert_eq!(Snowflake::from_time(time).creation_time(), time);
    }

    #[test]
    fn known_id_creation_time() {
        // From the Discord docs' worked example.
        let id = Snowflake::new(175_928_847_299_117_063);
        assert_eq!(id.creation_time().timestamp_millis(), 1_462_015_105_796);
    }

    #[test]
    fn serializes_as_string_never_number() {
        let json = serde_json::to_string(&Snowflake::new(42)).unwrap();
        assert_eq!(json, r#""42""#);

        let back: Snowflake = serde_json::from_str(r#""42""#).unwrap();
        assert_eq!(back, 42_u64);

        assert!(serde_json::from_str::<Snowflake>("42").is_err());
    }
}
