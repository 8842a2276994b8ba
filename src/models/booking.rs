//! Booking model
//!
//! A booking is a one-hour session requested by a mentee on one of a mentor's
//! weekly slots.

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every session lasts exactly one hour.
pub fn session_length() -> Duration {
    Duration::hours(1)
}

/// Latest calendar year a session may start or end in
pub const MAX_YEAR: i32 = 9999;

/// End of a session starting at `start_at`, or `None` when the session
/// would not lie within years 1 to [`MAX_YEAR`].
pub fn session_end(start_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if start_at.year() < 1 {
        return None;
    }
    start_at
        .checked_add_signed(session_length())
        .filter(|end| end.year() <= MAX_YEAR)
}

/// Booking entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub mentor_id: i64,
    pub mentee_id: i64,
    /// Mentor email at request time
    pub mentor_email: String,
    /// Mentee email at request time
    pub mentee_email: String,
    pub start_at: DateTime<Utc>,
    /// Always `start_at + 1h`
    pub end_at: DateTime<Utc>,
    pub status: BookingStatus,
    pub session: SessionDetails,
    /// Opaque meeting room id, assigned on acceptance
    pub meeting_id: Option<String>,
    /// Join URL built from `meeting_id`
    pub meeting_link: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// New `waiting` booking starting at `start_at`, or `None` when the start
    /// is out of range (see [`session_end`])
    pub fn new(
        mentor_id: i64,
        mentee_id: i64,
        mentor_email: String,
        mentee_email: String,
        start_at: DateTime<Utc>,
        session: SessionDetails,
    ) -> Option<Self> {
        let end_at = session_end(start_at)?;
        let now = Utc::now();
        Some(Self {
            id: 0, // Will be set by the database
            mentor_id,
            mentee_id,
            mentor_email,
            mentee_email,
            start_at,
            end_at,
            status: BookingStatus::Waiting,
            session,
            meeting_id: None,
            meeting_link: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_waiting(&self) -> bool {
        self.status == BookingStatus::Waiting
    }

    pub fn is_accepted(&self) -> bool {
        self.status == BookingStatus::Accepted
    }
}

/// Free-form details the mentee attaches to a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionDetails {
    /// Contact address overriding the mentor's email for the request mail
    pub email: Option<String>,
    pub topic: Option<String>,
    pub description: Option<String>,
}

/// Booking status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    /// Requested, awaiting the mentor
    Waiting,
    /// Accepted by the mentor; terminal
    Accepted,
    /// Reserved value; rejection deletes the record instead
    Cancelled,
}

impl Default for BookingStatus {
    fn default() -> Self {
        Self::Waiting
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingStatus::Waiting => write!(f, "waiting"),
            BookingStatus::Accepted => write!(f, "accepted"),
            BookingStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for BookingStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "waiting" => Ok(BookingStatus::Waiting),
            "accepted" => Ok(BookingStatus::Accepted),
            "cancelled" => Ok(BookingStatus::Cancelled),
            _ => Err(anyhow::anyhow!("Invalid booking status: {}", s)),
        }
    }
}

/// Which bookings a listing returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingQuery {
    /// Accepted bookings starting now or later
    Upcoming,
    /// Bookings that started at or before now, any status
    Past,
    /// Waiting bookings, any time
    Pending,
}

impl FromStr for BookingQuery {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upcoming" => Ok(BookingQuery::Upcoming),
            "past" => Ok(BookingQuery::Past),
            "pending" => Ok(BookingQuery::Pending),
            _ => Err(anyhow::anyhow!(
                "Please provide a valid query type of upcoming, past or pending"
            )),
        }
    }
}

/// Name summary of one side of a booking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Party {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
}

/// Booking with both parties' names, as returned by listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingWithParties {
    #[serde(flatten)]
    pub booking: Booking,
    pub mentor: Party,
    pub mentee: Party,
}
