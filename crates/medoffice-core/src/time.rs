use crate::error::{CoreError, Result};
use time::OffsetDateTime;

const NANOS_PER_MILLI: i128 = 1_000_000;

pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Current time as milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    unix_millis(&now_utc())
}

pub fn unix_millis(datetime: &OffsetDateTime) -> i64 {
    (datetime.unix_timestamp_nanos() / NANOS_PER_MILLI) as i64
}

pub fn from_unix_millis(millis: i64) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * NANOS_PER_MILLI).map_err(|e| {
        CoreError::invalid_timestamp(format!("Invalid Unix timestamp millis {millis}: {e}"))
    })
}

/// Serde adapter encoding an `OffsetDateTime` as integer milliseconds since the epoch.
pub mod epoch_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::OffsetDateTime;

    pub fn serialize<S>(datetime: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(super::unix_millis(datetime))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = i64::deserialize(deserializer)?;
        super::from_unix_millis(millis).map_err(serde::de::Error::custom)
    }
}
