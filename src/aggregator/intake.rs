//! Turning raw marked messages into pending entries

use crate::category::{lowercase_initial, CategoryMatcher};
use crate::error::{Error, Result};
use chrono::{DateTime, FixedOffset, Local, Timelike, Utc};
use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// Wall-clock time of an entry, shown as `HH.MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryTime {
    hour: u8,
    minute: u8,
}

impl EntryTime {
    /// `None` unless `hour` is 0-23 and `minute` is 0-59
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    fn from_timelike(t: &impl Timelike) -> Self {
        Self {
            hour: t.hour() as u8,
            minute: t.minute() as u8,
        }
    }
}

impl fmt::Display for EntryTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}.{:02}", self.hour, self.minute)
    }
}

impl Serialize for EntryTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Converts message times into entry times.
///
/// Every path that has no valid explicit time uses the message's own send
/// time; the current time is only used when the transport supplied none.
#[derive(Debug, Clone, Copy)]
pub struct EntryClock {
    offset: Option<FixedOffset>,
}

impl EntryClock {
    /// Use the host's local zone
    pub fn local() -> Self {
        Self { offset: None }
    }

    /// Use a fixed UTC offset
    pub fn fixed(offset: FixedOffset) -> Self {
        Self {
            offset: Some(offset),
        }
    }

    /// Build from the configured offset in minutes
    pub fn from_offset_minutes(minutes: Option<i32>) -> Result<Self> {
        match minutes {
            None => Ok(Self::local()),
            Some(m) => FixedOffset::east_opt(m.saturating_mul(60))
                .map(Self::fixed)
                .ok_or_else(|| Error::Config(format!("UTC offset of {} minutes is out of range", m))),
        }
    }

    pub fn time_of(&self, sent_at: Option<DateTime<Utc>>) -> EntryTime {
        let instant = sent_at.unwrap_or_else(Utc::now);
        match self.offset {
            Some(offset) => EntryTime::from_timelike(&instant.with_timezone(&offset)),
            None => EntryTime::from_timelike(&instant.with_timezone(&Local)),
        }
    }
}

/// A parsed entry, ready to become a pending entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEntry {
    pub timestamp: EntryTime,
    /// Category as written by the user, if one matched
    pub label: Option<String>,
    /// Display text after category wrapping
    pub text: String,
}

/// Parses marked messages: `.text`, `.H.MM text` or `.HH.MM text`.
pub struct EntryParser {
    marker: char,
    time_prefix: Regex,
    clock: EntryClock,
    matcher: Arc<CategoryMatcher>,
}

impl EntryParser {
    pub fn new(marker: char, clock: EntryClock, matcher: Arc<CategoryMatcher>) -> Result<Self> {
        let pattern = format!(
            r"^{}([0-9]{{1,2}})\.([0-9]{{2}})(?:\s+|$)",
            regex::escape(&marker.to_string())
        );
        let time_prefix = Regex::new(&pattern)
            .map_err(|e| Error::Config(format!("Invalid entry marker '{}': {}", marker, e)))?;

        Ok(Self {
            marker,
            time_prefix,
            clock,
            matcher,
        })
    }

    /// Parse a message; `None` if it does not carry the entry marker
    pub fn parse(&self, raw: &str, sent_at: Option<DateTime<Utc>>) -> Option<ParsedEntry> {
        let body = raw.strip_prefix(self.marker)?;

        let (timestamp, content) = match self.explicit_time(raw) {
            Some((time, rest)) => (time, rest),
            None => (self.clock.time_of(sent_at), body.trim()),
        };

        let content = lowercase_initial(content);
        let classification = self.matcher.classify(&content);

        Some(ParsedEntry {
            timestamp,
            label: classification.label,
            text: classification.text,
        })
    }

    /// A valid `.H.MM` prefix and the text after it
    fn explicit_time<'a>(&self, raw: &'a str) -> Option<(EntryTime, &'a str)> {
        let captures = self.time_prefix.captures(raw)?;
        let hour = captures.get(1)?.as_str().parse::<u8>().ok()?;
        let minute = captures.get(2)?.as_str().parse::<u8>().ok()?;
        let time = EntryTime::new(hour, minute)?;
        let end = captures.get(0)?.end();
        Some((time, raw[end..].trim()))
    }
}
