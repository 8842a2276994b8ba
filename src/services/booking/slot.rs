//! Slot matching: does a requested start fall on one of the mentor's weekly
//! slots?

use crate::models::Slot;
use chrono::{DateTime, Utc};

/// True iff some slot has the candidate's UTC weekday, hour and minute.
/// Date, month, year and seconds are ignored.
pub fn matches(slots: &[Slot], candidate: DateTime<Utc>) -> bool {
    let wanted = Slot::of(candidate);
    slots.iter().any(|slot| *slot == wanted)
}
