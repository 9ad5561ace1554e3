//! Time windows, ordering direction and coverage summaries.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::core::errors::{EngineError, EngineResult};
use crate::cache::core::ids::MessageId;

/// Inclusive time window `[start, end]` at millisecond resolution.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    /// First instant included in the window.
    pub start: DateTime<Utc>,
    /// Last instant included in the window.
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Build a window, rejecting inverted bounds.
    ///
    /// # Errors
    /// Returns `InvalidRequest` if `start` is after `end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> EngineResult<Self> {
        if start > end {
            return Err(EngineError::InvalidRequest(format!(
                "window start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Build a window from millisecond timestamps.
    ///
    /// # Errors
    /// Returns `InvalidRequest` if either bound is out of range or inverted.
    pub fn from_millis(start: i64, end: i64) -> EngineResult<Self> {
        Self::new(millis_to_datetime(start)?, millis_to_datetime(end)?)
    }

    /// Start bound as Unix milliseconds.
    #[must_use]
    pub fn start_millis(&self) -> i64 {
        self.start.timestamp_millis()
    }

    /// End bound as Unix milliseconds.
    #[must_use]
    pub fn end_millis(&self) -> i64 {
        self.end.timestamp_millis()
    }

    /// Whether `ts` falls inside the window.
    #[must_use]
    pub fn contains_millis(&self, ts: i64) -> bool {
        ts >= self.start_millis() && ts <= self.end_millis()
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} .. {}]", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// One millisecond, the resolution at which windows are split.
pub(crate) fn one_milli() -> TimeDelta {
    TimeDelta::milliseconds(1)
}

/// Convert Unix milliseconds into a UTC timestamp.
///
/// # Errors
/// Returns `InvalidRequest` if the value is outside chrono's range.
pub fn millis_to_datetime(ts: i64) -> EngineResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ts)
        .single()
        .ok_or_else(|| EngineError::InvalidRequest(format!("timestamp out of range: {ts}")))
}

/// Order in which messages are produced.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Oldest first.
    #[default]
    Ascending,
    /// Newest first.
    Descending,
}

impl Direction {
    /// Stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ascending => "ascending",
            Self::Descending => "descending",
        }
    }

    /// SQL ordering keyword.
    #[must_use]
    pub(crate) const fn sql_order(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }

    /// SQL comparison operator meaning "strictly after" in this direction.
    #[must_use]
    pub(crate) const fn sql_after(self) -> &'static str {
        match self {
            Self::Ascending => ">",
            Self::Descending => "<",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ascending" | "asc" => Ok(Self::Ascending),
            "descending" | "desc" => Ok(Self::Descending),
            _ => Err(value.to_string()),
        }
    }
}

/// Position of the last message produced, used to resume reads and fetches.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Cursor {
    /// Message timestamp in Unix milliseconds.
    pub timestamp_millis: i64,
    /// Message identifier, the tie-breaker for equal timestamps.
    pub message_id: MessageId,
}

impl Cursor {
    /// Whether `(ts, id)` lies strictly beyond this cursor in `direction`.
    #[must_use]
    pub fn admits(&self, ts: i64, id: MessageId, direction: Direction) -> bool {
        let key = (ts, id);
        let mine = (self.timestamp_millis, self.message_id);
        match direction {
            Direction::Ascending => key > mine,
            Direction::Descending => key < mine,
        }
    }
}

/// What the cache currently holds for a conversation.
///
/// Coverage is the single span between the oldest and newest stored message.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RangeSummary {
    /// Oldest cached message timestamp.
    pub min: DateTime<Utc>,
    /// Newest cached message timestamp.
    pub max: DateTime<Utc>,
    /// Number of cached messages.
    pub row_count: u64,
}

impl RangeSummary {
    /// The covered interval as a window.
    #[must_use]
    pub fn covered(&self) -> TimeWindow {
        TimeWindow {
            start: self.min,
            end: self.max,
        }
    }
}
