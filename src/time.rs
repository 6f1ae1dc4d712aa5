//! Human-authored durations such as `"30s"` or `"5m"`.
//!
//! A [`TimeDetail`] keeps the value and unit exactly as written so that it can
//! be rendered back to the same canonical text when persisted.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

/// Rejected duration input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed duration {input:?}: {reason}")]
pub struct DurationError {
    pub input: String,
    pub reason: String,
}

impl DurationError {
    fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// Unit of a [`TimeDetail`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Short code used in the canonical form (`ms`, `s`, `m`, `h`, `d`).
    pub fn code(self) -> &'static str {
        match self {
            TimeUnit::Milliseconds => "ms",
            TimeUnit::Seconds => "s",
            TimeUnit::Minutes => "m",
            TimeUnit::Hours => "h",
            TimeUnit::Days => "d",
        }
    }

    /// Plural word used in interval expressions.
    pub fn plural(self) -> &'static str {
        match self {
            TimeUnit::Milliseconds => "milliseconds",
            TimeUnit::Seconds => "seconds",
            TimeUnit::Minutes => "minutes",
            TimeUnit::Hours => "hours",
            TimeUnit::Days => "days",
        }
    }

    /// Milliseconds in one unit.
    pub fn millis(self) -> i64 {
        match self {
            TimeUnit::Milliseconds => 1,
            TimeUnit::Seconds => 1_000,
            TimeUnit::Minutes => 60_000,
            TimeUnit::Hours => 3_600_000,
            TimeUnit::Days => 86_400_000,
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        match code {
            "ms" => Some(TimeUnit::Milliseconds),
            "s" => Some(TimeUnit::Seconds),
            "m" => Some(TimeUnit::Minutes),
            "h" => Some(TimeUnit::Hours),
            "d" => Some(TimeUnit::Days),
            _ => None,
        }
    }
}

/// A duration as an integer value plus unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeDetail {
    pub value: i64,
    pub unit: TimeUnit,
}

fn duration_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<value>.*?)(?P<unit>ms|[smhd])$").expect("duration pattern is valid")
    })
}

impl TimeDetail {
    pub fn new(value: i64, unit: TimeUnit) -> Self {
        Self { value, unit }
    }

    /// Parse `"<integer><unit-code>"`.
    pub fn parse(text: &str) -> Result<Self, DurationError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(DurationError::new(text, "empty duration"));
        }

        let caps = duration_pattern()
            .captures(trimmed)
            .ok_or_else(|| DurationError::new(text, "unit must be one of ms, s, m, h, d"))?;

        let unit = TimeUnit::from_code(&caps["unit"])
            .ok_or_else(|| DurationError::new(text, "unit must be one of ms, s, m, h, d"))?;

        let raw_value = &caps["value"];
        if raw_value.is_empty() {
            return Err(DurationError::new(text, "missing numeric value"));
        }
        if !raw_value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DurationError::new(
                text,
                format!("{raw_value:?} is not a non-negative integer"),
            ));
        }
        let value = raw_value
            .parse::<i64>()
            .map_err(|_| DurationError::new(text, format!("{raw_value:?} is out of range")))?;

        let parsed = Self { value, unit };
        if parsed.try_to_chrono().is_none() {
            return Err(DurationError::new(text, "duration is out of range"));
        }
        Ok(parsed)
    }

    /// Value followed directly by the unit code, e.g. `"30s"`. This is the
    /// persisted form.
    pub fn to_canonical_string(&self) -> String {
        format!("{}{}", self.value, self.unit.code())
    }

    /// Value and plural unit word, e.g. `"45 minutes"`.
    pub fn to_interval_expression(&self) -> String {
        format!("{} {}", self.value, self.unit.plural())
    }

    pub fn to_millis(&self) -> i64 {
        self.value.saturating_mul(self.unit.millis())
    }

    /// Convert to a chrono duration. `None` for negative values or when the
    /// span does not fit a `TimeDelta`.
    pub fn try_to_chrono(&self) -> Option<chrono::Duration> {
        if self.value < 0 {
            return None;
        }
        let millis = self.value.checked_mul(self.unit.millis())?;
        chrono::Duration::try_milliseconds(millis)
    }

    /// The instant `self` before `now`, or `None` when that lies before the
    /// earliest representable instant (nothing can be older than it).
    pub fn cutoff_before(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        now.checked_sub_signed(self.try_to_chrono()?)
    }
}

impl fmt::Display for TimeDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.code())
    }
}

impl FromStr for TimeDetail {
    type Err = DurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TimeDetail {
    type Error = DurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TimeDetail> for String {
    fn from(t: TimeDetail) -> Self {
        t.to_canonical_string()
    }
}
