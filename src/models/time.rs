//! Timestamp and duration value types.
//!
//! Storage keeps epoch milliseconds, so every timestamp entering the core is
//! truncated to millisecond precision first. That keeps a state returned to
//! the caller identical to the one read back later.

use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub fn truncate_to_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
}

pub fn from_millis(ms: i64) -> CoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| CoreError::InvalidValue(format!("timestamp {ms}ms out of range")))
}

/// Time a learner spent on an answer. Never negative.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Elapsed(i64);

impl Elapsed {
    pub const ZERO: Elapsed = Elapsed(0);

    pub fn from_millis(ms: i64) -> CoreResult<Self> {
        if ms < 0 {
            return Err(CoreError::InvalidValue(format!(
                "elapsed time cannot be negative ({ms}ms)"
            )));
        }
        Ok(Self(ms))
    }

    pub fn as_millis(self) -> i64 {
        self.0
    }
}

impl<'de> Deserialize<'de> for Elapsed {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let ms = i64::deserialize(deserializer)?;
        Elapsed::from_millis(ms).map_err(serde::de::Error::custom)
    }
}

/// Gap between two reviews, in whole seconds. Always positive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Interval(i64);

impl Interval {
    pub fn from_secs(secs: i64) -> CoreResult<Self> {
        if secs <= 0 {
            return Err(CoreError::InvalidValue(format!(
                "interval must be positive ({secs}s)"
            )));
        }
        Ok(Self(secs))
    }

    pub fn from_days(days: i64) -> CoreResult<Self> {
        days.checked_mul(86_400)
            .ok_or_else(|| CoreError::InvalidValue(format!("interval of {days} days overflows")))
            .and_then(Self::from_secs)
    }

    /// Whole days. Only for positive literals.
    pub(crate) const fn days(n: i64) -> Self {
        Self(n * 86_400)
    }

    /// The gap between two timestamps, if the second lies strictly after the first.
    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Option<Self> {
        let secs = (to - from).num_seconds();
        (secs > 0).then_some(Self(secs))
    }

    pub fn as_secs(self) -> i64 {
        self.0
    }

    pub fn as_days_f64(self) -> f64 {
        self.0 as f64 / 86_400.0
    }

    pub fn as_delta(self) -> TimeDelta {
        TimeDelta::seconds(self.0)
    }
}
