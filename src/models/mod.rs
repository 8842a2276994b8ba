//! Data models
//!
//! Data structures used throughout the Vita service:
//! - Database entities (User, Booking, Notification, Session)
//! - Booking-side views of users (Mentor, Mentee) and weekly slots

mod booking;
mod notification;
mod session;
mod slot;
mod user;

pub use booking::{
    session_length, Booking, BookingQuery, BookingStatus, BookingWithParties, Party,
    SessionDetails,
};
pub use notification::Notification;
pub use session::Session;
pub use slot::Slot;
pub use user::{Mentee, Mentor, Profile, UpdateProfileInput, User};
