//! Conflict checking against a mentor's existing bookings.
//!
//! Two starts collide when they share UTC calendar date, hour and minute.

use crate::models::Booking;
use chrono::{DateTime, Timelike, Utc};

/// Outcome of checking a candidate start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conflict {
    Free,
    /// An accepted booking already holds this time
    AcceptedAt(i64),
    /// The same mentee is already waiting on this time
    WaitingBySameMentee(i64),
}

fn collides(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a.date_naive() == b.date_naive() && a.hour() == b.hour() && a.minute() == b.minute()
}

/// Check `candidate` for mentee `mentee_id` against `existing` bookings of one
/// mentor. Accepted collisions take precedence over waiting ones; other
/// mentees' waiting requests never conflict.
pub fn check(existing: &[Booking], candidate: DateTime<Utc>, mentee_id: i64) -> Conflict {
    let mut waiting = None;
    for booking in existing.iter().filter(|b| collides(b.start_at, candidate)) {
        if booking.is_accepted() {
            return Conflict::AcceptedAt(booking.id);
        }
        if booking.is_waiting() && booking.mentee_id == mentee_id && waiting.is_none() {
            waiting = Some(booking.id);
        }
    }
    waiting.map_or(Conflict::Free, Conflict::WaitingBySameMentee)
}

/// Id of any waiting booking `mentee_id` already holds with this mentor,
/// regardless of time.
pub fn has_waiting_with(existing: &[Booking], mentee_id: i64) -> Option<i64> {
    existing
        .iter()
        .find(|b| b.is_waiting() && b.mentee_id == mentee_id)
        .map(|b| b.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BookingStatus, SessionDetails};
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    const MENTOR: i64 = 1;

    fn booking(id: i64, mentee: i64, start: DateTime<Utc>, status: BookingStatus) -> Booking {
        let mut b = Booking::new(
            MENTOR,
            mentee,
            "m@example.com".into(),
            "e@example.com".into(),
            start,
            SessionDetails::default(),
        )
        .unwrap();
        b.id = id;
        b.status = status;
        b
    }

    fn t(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, day, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_free_when_nothing_collides() {
        let existing = vec![
            booking(1, 10, t(6, 14, 0), BookingStatus::Accepted),
            booking(2, 11, t(6, 15, 0), BookingStatus::Waiting),
        ];
        assert_eq!(check(&existing, t(6, 16, 0), 12), Conflict::Free);
        assert_eq!(check(&[], t(6, 16, 0), 12), Conflict::Free);
    }

    #[test]
    fn test_accepted_collision() {
        let existing = vec![booking(1, 10, t(6, 14, 0), BookingStatus::Accepted)];
        assert_eq!(check(&existing, t(6, 14, 0), 12), Conflict::AcceptedAt(1));
    }

    #[test]
    fn test_same_day_of_month_in_other_month_does_not_collide() {
        let feb = Utc.with_ymd_and_hms(2025, 2, 6, 14, 0, 0).unwrap();
        let existing = vec![booking(1, 10, feb, BookingStatus::Accepted)];
        assert_eq!(check(&existing, t(6, 14, 0), 12), Conflict::Free);
    }

    #[test]
    fn test_waiting_by_same_mentee() {
        let existing = vec![booking(3, 12, t(6, 14, 0), BookingStatus::Waiting)];
        assert_eq!(check(&existing, t(6, 14, 0), 12), Conflict::WaitingBySameMentee(3));
        // Another mentee's waiting request is no conflict
        assert_eq!(check(&existing, t(6, 14, 0), 13), Conflict::Free);
    }

    #[test]
    fn test_accepted_wins_over_waiting() {
        let existing = vec![
            booking(3, 12, t(6, 14, 0), BookingStatus::Waiting),
            booking(4, 10, t(6, 14, 0), BookingStatus::Accepted),
        ];
        assert_eq!(check(&existing, t(6, 14, 0), 12), Conflict::AcceptedAt(4));
    }

    #[test]
    fn test_cancelled_is_ignored() {
        let existing = vec![booking(5, 12, t(6, 14, 0), BookingStatus::Cancelled)];
        assert_eq!(check(&existing, t(6, 14, 0), 12), Conflict::Free);
        assert_eq!(has_waiting_with(&existing, 12), None);
    }

    #[test]
    fn test_has_waiting_with_any_time() {
        let existing = vec![
            booking(1, 10, t(6, 14, 0), BookingStatus::Accepted),
            booking(2, 12, t(20, 9, 0), BookingStatus::Waiting),
        ];
        assert_eq!(has_waiting_with(&existing, 12), Some(2));
        assert_eq!(has_waiting_with(&existing, 10), None);
    }

    proptest! {
        /// An accepted booking at the candidate's exact start always yields
        /// AcceptedAt, whatever else is present.
        #[test]
        fn prop_accepted_always_detected(
            secs in 0i64..4_000_000_000,
            others in proptest::collection::vec((0i64..1_000_000, 1i64..5, any::<bool>()), 0..8),
            mentee in 1i64..5,
        ) {
            let candidate = Utc.timestamp_opt(secs, 0).unwrap();
            let mut existing: Vec<Booking> = others
                .iter()
                .enumerate()
                .map(|(i, (offset, who, accepted))| {
                    let status = if *accepted { BookingStatus::Accepted } else { BookingStatus::Waiting };
                    booking(100 + i as i64, *who, candidate + Duration::minutes(*offset), status)
                })
                .collect();
            existing.push(booking(42, 99, candidate, BookingStatus::Accepted));

            prop_assert!(matches!(check(&existing, candidate, mentee), Conflict::AcceptedAt(_)));
        }

        /// Bookings on other days never conflict.
        #[test]
        fn prop_other_days_never_collide(secs in 0i64..4_000_000_000, days in 1i64..400) {
            let candidate = Utc.timestamp_opt(secs, 0).unwrap();
            let existing = vec![
                booking(1, 7, candidate + Duration::days(days), BookingStatus::Accepted),
                booking(2, 7, candidate - Duration::days(days), BookingStatus::Waiting),
            ];
            prop_assert_eq!(check(&existing, candidate, 7), Conflict::Free);
        }
    }
}
