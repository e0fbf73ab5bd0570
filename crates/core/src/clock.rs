use chrono::{NaiveDate, NaiveDateTime, Utc};

/// Rendering used for every `created_at` / `updated_at` style field.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Reference instant used when no wall clock is requested.
pub const DEFAULT_FIXED_TIME: &str = "2025-11-16T23:59:00";

/// Source of "now" for record bookkeeping.
///
/// Replays of recorded sessions need byte-identical output, so the default clock is
/// pinned to [`DEFAULT_FIXED_TIME`]. `System` reads the UTC wall clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clock {
    Fixed(NaiveDateTime),
    System,
}

impl Default for Clock {
    fn default() -> Self {
        // The constant is known-good; fall back to the epoch rather than panic.
        Clock::Fixed(parse_timestamp(DEFAULT_FIXED_TIME).unwrap_or_default())
    }
}

impl Clock {
    pub fn fixed(timestamp: &str) -> Option<Self> {
        parse_timestamp(timestamp).map(Clock::Fixed)
    }

    pub fn now(&self) -> NaiveDateTime {
        match self {
            Clock::Fixed(at) => *at,
            Clock::System => Utc::now().naive_utc(),
        }
    }

    pub fn timestamp(&self) -> String {
        self.now().format(TIMESTAMP_FORMAT).to_string()
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// Parse a `YYYY-MM-DDTHH:MM:SS` timestamp. A trailing `Z` or fractional seconds are accepted.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim().trim_end_matches('Z');
    NaiveDateTime::parse_from_str(trimmed, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S"))
        .ok()
}

/// Parse a strict `YYYY-MM-DD` date.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    if value.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT).ok()
}
