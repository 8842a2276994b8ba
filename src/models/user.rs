//! User, mentee and mentor models
//!
//! A `User` is the stored account. `Mentee` and `Mentor` are the two views the
//! booking lifecycle works with; both implement [`Profile`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Slot;

/// Identity and contact capability shared by mentors and mentees.
pub trait Profile {
    /// User id
    fn id(&self) -> i64;
    /// Email address
    fn email(&self) -> &str;
    fn first_name(&self) -> &str;
    fn last_name(&self) -> &str;
    /// IANA timezone name
    fn timezone(&self) -> &str;
    /// Phone number for chat messages, if known
    fn phone(&self) -> Option<&str>;

    /// "First Last", trimmed when the last name is empty
    fn full_name(&self) -> String {
        format!("{} {}", self.first_name(), self.last_name())
            .trim()
            .to_string()
    }
}

/// Stored user account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Email address (unique)
    pub email: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    /// IANA timezone name
    pub timezone: String,
    /// Whether the account has a mentor profile
    pub is_mentor: bool,
    /// Session requests made as a mentee that are still pending
    pub sessions_requested: i64,
    pub last_session_requested: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new user. The password must already be hashed.
    pub fn new(
        email: String,
        password_hash: String,
        first_name: String,
        last_name: String,
        is_mentor: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // Will be set by the database
            email,
            password_hash,
            first_name,
            last_name,
            phone: None,
            timezone: "UTC".to_string(),
            is_mentor,
            sessions_requested: 0,
            last_session_requested: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Profile for User {
    fn id(&self) -> i64 {
        self.id
    }
    fn email(&self) -> &str {
        &self.email
    }
    fn first_name(&self) -> &str {
        &self.first_name
    }
    fn last_name(&self) -> &str {
        &self.last_name
    }
    fn timezone(&self) -> &str {
        &self.timezone
    }
    fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }
}

/// A user acting as the requesting side of a booking.
#[derive(Debug, Clone, Serialize)]
pub struct Mentee {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub timezone: String,
    pub sessions_requested: i64,
}

impl From<User> for Mentee {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            phone: user.phone,
            timezone: user.timezone,
            sessions_requested: user.sessions_requested,
        }
    }
}

impl Profile for Mentee {
    fn id(&self) -> i64 {
        self.id
    }
    fn email(&self) -> &str {
        &self.email
    }
    fn first_name(&self) -> &str {
        &self.first_name
    }
    fn last_name(&self) -> &str {
        &self.last_name
    }
    fn timezone(&self) -> &str {
        &self.timezone
    }
    fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }
}

/// A user with a mentor profile and declared weekly slots.
#[derive(Debug, Clone, Serialize)]
pub struct Mentor {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub timezone: String,
    /// Whether the mentor currently accepts booking requests
    pub is_mentoring: bool,
    /// Pending (waiting) requests addressed to this mentor
    pub session_requests: i64,
    /// Accepted sessions
    pub active_sessions: i64,
    pub last_session_request: Option<DateTime<Utc>>,
    pub slots: Vec<Slot>,
}

impl Profile for Mentor {
    fn id(&self) -> i64 {
        self.id
    }
    fn email(&self) -> &str {
        &self.email
    }
    fn first_name(&self) -> &str {
        &self.first_name
    }
    fn last_name(&self) -> &str {
        &self.last_name
    }
    fn timezone(&self) -> &str {
        &self.timezone
    }
    fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }
}

/// Input for updating a user's profile
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfileInput {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub timezone: Option<String>,
}
