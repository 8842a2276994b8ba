//! Weekly availability slots

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A recurring weekly slot in UTC: day-of-week plus time-of-day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    pub day: Weekday,
    pub hour: u8,
    pub minute: u8,
}

impl Slot {
    /// Build a slot, rejecting out-of-range hour or minute values.
    pub fn new(day: Weekday, hour: u8, minute: u8) -> Option<Self> {
        if hour > 23 || minute > 59 {
            return None;
        }
        Some(Self { day, hour, minute })
    }

    /// The slot an instant falls on (seconds are ignored).
    pub fn of(instant: DateTime<Utc>) -> Self {
        Self {
            day: instant.weekday(),
            hour: instant.hour() as u8,
            minute: instant.minute() as u8,
        }
    }

    /// Day index as stored: 0 = Sunday .. 6 = Saturday
    pub fn day_index(&self) -> i32 {
        self.day.num_days_from_sunday() as i32
    }

    /// Rebuild a slot from stored columns.
    pub fn from_columns(day_index: i32, hour: i32, minute: i32) -> Option<Self> {
        let day = match day_index {
            0 => Weekday::Sun,
            1 => Weekday::Mon,
            2 => Weekday::Tue,
            3 => Weekday::Wed,
            4 => Weekday::Thu,
            5 => Weekday::Fri,
            6 => Weekday::Sat,
            _ => return None,
        };
        let hour = u8::try_from(hour).ok()?;
        let minute = u8::try_from(minute).ok()?;
        Self::new(day, hour, minute)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:02}:{:02} UTC", self.day, self.hour, self.minute)
    }
}
