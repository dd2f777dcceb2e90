//! Identity types for cached entities

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Milliseconds between the Unix epoch and the platform epoch (2015-01-01T00:00:00Z).
pub const PLATFORM_EPOCH_MS: u64 = 1_420_070_400_000;

/// Number of low bits below the timestamp (worker, process, increment).
const TIMESTAMP_SHIFT: u32 = 22;

/// Index of one gateway connection.
pub type ShardId = u32;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// 64-bit entity identifier with an embedded creation timestamp.
///
/// The high 42 bits hold milliseconds since [`PLATFORM_EPOCH_MS`], so numeric
/// order is creation order. Stores use that property as the age tiebreak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snowflake(u64);

impl Snowflake {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// Smallest snowflake that could have been minted at `at`.
    ///
    /// Instants before the platform epoch clamp to zero.
    pub fn from_timestamp(at: Timestamp) -> Self {
        let millis = u64::try_from(at.timestamp_millis()).unwrap_or(0);
        Self(millis.saturating_sub(PLATFORM_EPOCH_MS) << TIMESTAMP_SHIFT)
    }

    /// Creation time encoded in the identifier.
    pub fn timestamp(self) -> Timestamp {
        let millis = (self.0 >> TIMESTAMP_SHIFT) + PLATFORM_EPOCH_MS;
        // 42 bits of millis past 2015 always fit chrono's range
        Utc.timestamp_millis_opt(millis as i64)
            .single()
            .unwrap_or(DateTime::UNIX_EPOCH)
    }
}

impl From<u64> for Snowflake {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<Snowflake> for u64 {
    fn from(id: Snowflake) -> Self {
        id.0
    }
}

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Snowflake {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Snowflake)
            .map_err(|e| format!("Invalid snowflake '{}': {}", s, e))
    }
}

/// Shard responsible for a guild under the gateway's routing rule.
///
/// A `shard_total` of zero is treated as a single shard.
pub fn shard_for_guild(guild_id: Snowflake, shard_total: u32) -> ShardId {
    if shard_total == 0 {
        return 0;
    }
    ((guild_id.get() >> TIMESTAMP_SHIFT) % u64::from(shard_total)) as ShardId
}
