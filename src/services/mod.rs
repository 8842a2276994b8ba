//! Services layer - Business logic
//!
//! Services implement the rules of the mentorship platform on top of the
//! repositories:
//! - Accounts, sessions and mentor profiles
//! - The booking lifecycle and its side effects
//! - Outbound channels (notifications, e-mail, chat messages)

pub mod booking;
pub mod dispatch;
pub mod email;
pub mod meeting;
pub mod mentor;
pub mod messaging;
pub mod notification;
pub mod password;
pub mod template;
pub mod user;

pub use booking::{
    BookingOutcome, BookingService, BookingServiceError, BookingSettings, CreateBookingInput,
    ErrorKind, MentorLocks,
};
pub use dispatch::{Channel, DispatchOutcome, DispatchReport};
pub use email::{LogMailer, Mailer, SmtpMailer};
pub use meeting::{MeetingLink, MeetingLinkGenerator};
pub use mentor::{MentorService, MentorServiceError, SlotInput};
pub use messaging::{DisabledMessenger, Messenger, WhatsAppMessenger};
pub use notification::{NotificationService, NotificationServiceError, Notifier};
pub use password::{hash_password, verify_password};
pub use template::TemplateRenderer;
pub use user::{
    ChangePasswordInput, LoginInput, RegisterInput, UserService, UserServiceError,
};
