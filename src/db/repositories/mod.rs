//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the queries for a specific entity.

pub mod booking;
pub mod mentor;
pub mod notification;
pub mod session;
pub mod user;

pub use booking::{is_unique_violation, BookingRepository, SqlxBookingRepository};
pub use mentor::{MentorRepository, SqlxMentorRepository};
pub use notification::{NotificationRepository, SqlxNotificationRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use user::{SqlxUserRepository, UserRepository};
