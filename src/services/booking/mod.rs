//! Booking lifecycle
//!
//! Mentees request one-hour sessions on a mentor's weekly slots; mentors
//! accept or reject them. Every state change runs under the mentor's lock
//! and is saved before any side effect is dispatched. Side effects
//! (notification, e-mail, chat message) run concurrently afterwards and are
//! reported per dispatch, never rolled back.
//!
//! Lifecycle:
//! - `create`: waiting booking, counters incremented, mentor informed
//! - `accept`: waiting -> accepted with a meeting link, both parties mailed
//! - `reject`: booking deleted, counters decremented, mentee informed

pub mod conflict;
pub mod locks;
pub mod slot;

pub use conflict::{check, has_waiting_with, Conflict};
pub use locks::MentorLocks;
pub use slot::matches;

use crate::config::Config;
use crate::db::repositories::{
    is_unique_violation, BookingRepository, MentorRepository, UserRepository,
};
use crate::models::{
    Booking, BookingQuery, BookingStatus, BookingWithParties, Mentee, Mentor, Profile,
    SessionDetails,
};
use crate::services::dispatch::{self, Channel, DispatchOutcome, DispatchReport};
use crate::services::email::{LogMailer, Mailer};
use crate::services::meeting::MeetingLinkGenerator;
use crate::services::messaging::{DisabledMessenger, Messenger};
use crate::services::notification::Notifier;
use crate::services::template::{format_date, format_date_time, format_time, TemplateRenderer};
use crate::services::user::is_valid_email;
use anyhow::Context;
use chrono::{DateTime, Utc};
use futures::future::{self, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tera::Context as TeraContext;

/// Client path every booking notification links to
const DASHBOARD_LINK: &str = "/dashboard";

const SUBJECT_REQUEST: &str = "Regarding Session";
const SUBJECT_ACCEPTED: &str = "Booking Accepted";
const SUBJECT_REJECTED: &str = "Booking Rejected";

/// Error category, used by callers to pick a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authorization,
    NotFound,
    Conflict,
    /// State was saved but a required delivery failed
    Delivery,
    Internal,
}

/// Error types for booking operations
#[derive(Debug, thiserror::Error)]
pub enum BookingServiceError {
    #[error("You can't book yourself")]
    SelfBookingNotAllowed,

    #[error("Mentee not found")]
    MenteeNotFound,

    #[error("Mentor not found")]
    MentorNotFound,

    #[error("Mentor is not accepting bookings right now")]
    MentorNotMentoring,

    /// The mentee already has a waiting request with this mentor
    #[error("You already have a pending booking with this mentor")]
    DuplicateWaiting(i64),

    #[error("The requested time does not match any of the mentor's slots")]
    NoMatchingSlot,

    #[error("The mentor is already booked at this time")]
    MentorAlreadyBooked,

    #[error("You have already requested this time")]
    DuplicateWaitingAtTime(i64),

    #[error("Booking not found")]
    BookingNotFound,

    #[error("You don't have access to this booking")]
    Forbidden,

    #[error("Booking is already accepted")]
    AlreadyAccepted,

    #[error("Booking in status '{0}' cannot be accepted")]
    InvalidTransition(BookingStatus),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The booking was saved but the required e-mail did not go out
    #[error("Booking {} saved but the email could not be sent", booking.id)]
    DeliveryFailed {
        booking: Box<Booking>,
        report: DispatchReport,
    },

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl BookingServiceError {
    pub fn kind(&self) -> ErrorKind {
        use BookingServiceError::*;
        match self {
            ValidationError(_) | SelfBookingNotAllowed => ErrorKind::Validation,
            Forbidden => ErrorKind::Authorization,
            MenteeNotFound | MentorNotFound | MentorNotMentoring | BookingNotFound => {
                ErrorKind::NotFound
            }
            DuplicateWaiting(_)
            | NoMatchingSlot
            | MentorAlreadyBooked
            | DuplicateWaitingAtTime(_)
            | AlreadyAccepted
            | InvalidTransition(_) => ErrorKind::Conflict,
            DeliveryFailed { .. } => ErrorKind::Delivery,
            InternalError(_) => ErrorKind::Internal,
        }
    }
}

/// Request for a new session
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBookingInput {
    pub mentor_id: i64,
    pub start_at: DateTime<Utc>,
    /// Contact address that receives the request mail instead of the mentor's
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A booking together with what happened to its side effects
#[derive(Debug, Clone, Serialize)]
pub struct BookingOutcome {
    pub booking: Booking,
    pub report: DispatchReport,
}

/// Values rendered into mails and used for dispatch limits
#[derive(Debug, Clone)]
pub struct BookingSettings {
    pub app_name: String,
    pub client_url: String,
    pub asset_folder: String,
    pub dispatch_timeout: Duration,
}

impl BookingSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            app_name: config.app.name.clone(),
            client_url: config.app.client_url.clone(),
            asset_folder: config.app.asset_folder.clone(),
            dispatch_timeout: config.booking.dispatch_timeout(),
        }
    }
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Booking lifecycle manager
pub struct BookingService {
    bookings: Arc<dyn BookingRepository>,
    users: Arc<dyn UserRepository>,
    mentors: Arc<dyn MentorRepository>,
    notifier: Arc<dyn Notifier>,
    mailer: Arc<dyn Mailer>,
    messenger: Arc<dyn Messenger>,
    templates: Arc<TemplateRenderer>,
    meetings: MeetingLinkGenerator,
    locks: Arc<MentorLocks>,
    settings: BookingSettings,
}

impl BookingService {
    /// Create a booking service that logs mail instead of sending it and
    /// sends no chat messages. Use the `with_*` methods to plug in real
    /// channels.
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        users: Arc<dyn UserRepository>,
        mentors: Arc<dyn MentorRepository>,
        notifier: Arc<dyn Notifier>,
        settings: BookingSettings,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            bookings,
            users,
            mentors,
            notifier,
            mailer: Arc::new(LogMailer),
            messenger: Arc::new(DisabledMessenger),
            templates: Arc::new(TemplateRenderer::new()?),
            meetings: MeetingLinkGenerator::new("https://meet.jit.si"),
            locks: Arc::new(MentorLocks::new()),
            settings,
        })
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }

    pub fn with_messenger(mut self, messenger: Arc<dyn Messenger>) -> Self {
        self.messenger = messenger;
        self
    }

    pub fn with_meeting_links(mut self, meetings: MeetingLinkGenerator) -> Self {
        self.meetings = meetings;
        self
    }

    /// Share a lock table, e.g. with the periodic cleanup task
    pub fn with_locks(mut self, locks: Arc<MentorLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn locks(&self) -> Arc<MentorLocks> {
        self.locks.clone()
    }

    /// Request a session with a mentor
    ///
    /// Checks run in this order: self-booking, contact e-mail, mentee,
    /// mentor, mentoring flag, start range, existing waiting request, slot
    /// match, then conflicts at the requested time.
    ///
    /// # Errors
    ///
    /// Besides the checks above, `DeliveryFailed` when the booking was saved
    /// but the request e-mail could not be sent.
    pub async fn create(
        &self,
        mentee_id: i64,
        input: CreateBookingInput,
    ) -> Result<BookingOutcome, BookingServiceError> {
        if mentee_id == input.mentor_id {
            return Err(BookingServiceError::SelfBookingNotAllowed);
        }
        let contact_email = normalize(input.email);
        if let Some(email) = &contact_email {
            if !is_valid_email(email) {
                return Err(BookingServiceError::ValidationError(format!(
                    "Invalid contact email '{}'",
                    email
                )));
            }
        }

        let mentee: Mentee = self
            .users
            .get_by_id(mentee_id)
            .await
            .context("Failed to load mentee")?
            .ok_or(BookingServiceError::MenteeNotFound)?
            .into();
        let mentor = self.load_mentor(input.mentor_id).await?;
        if !mentor.is_mentoring {
            return Err(BookingServiceError::MentorNotMentoring);
        }

        let start = input.start_at;
        let request = Booking::new(
            mentor.id,
            mentee.id,
            mentor.email.clone(),
            mentee.email.clone(),
            start,
            SessionDetails {
                email: contact_email,
                topic: normalize(input.topic),
                description: normalize(input.description),
            },
        )
        .ok_or_else(|| {
            BookingServiceError::ValidationError(format!(
                "Start time {} is out of range",
                start
            ))
        })?;

        let booking = {
            let _guard = self.locks.lock(mentor.id).await;

            let existing = self
                .bookings
                .list_by_mentor(mentor.id)
                .await
                .context("Failed to load mentor bookings")?;

            if let Some(id) = has_waiting_with(&existing, mentee.id) {
                return Err(BookingServiceError::DuplicateWaiting(id));
            }
            if !matches(&mentor.slots, start) {
                return Err(BookingServiceError::NoMatchingSlot);
            }
            match check(&existing, start, mentee.id) {
                Conflict::Free => {}
                Conflict::AcceptedAt(_) => return Err(BookingServiceError::MentorAlreadyBooked),
                Conflict::WaitingBySameMentee(id) => {
                    return Err(BookingServiceError::DuplicateWaitingAtTime(id))
                }
            }

            let booking = self
                .bookings
                .create(&request)
                .await
                .context("Failed to save booking")?;

            if let Err(e) = self.count_request(&booking).await {
                tracing::error!(
                    booking_id = booking.id,
                    error = %e,
                    "Counter update failed, withdrawing booking"
                );
                if let Err(undo) = self.bookings.delete(booking.id).await {
                    tracing::error!(
                        booking_id = booking.id,
                        error = %undo,
                        "Failed to withdraw booking, it stays waiting without counters"
                    );
                }
                return Err(e.into());
            }
            booking
        };

        tracing::info!(
            booking_id = booking.id,
            mentor_id = mentor.id,
            mentee_id = mentee.id,
            start = %booking.start_at,
            "Booking requested"
        );

        let report = self.dispatch_request(&booking, &mentor, &mentee).await;
        if report.email_failed() {
            return Err(BookingServiceError::DeliveryFailed {
                booking: Box::new(booking),
                report,
            });
        }
        Ok(BookingOutcome { booking, report })
    }

    /// Accept a waiting booking as its mentor
    pub async fn accept(
        &self,
        actor_id: i64,
        booking_id: i64,
    ) -> Result<BookingOutcome, BookingServiceError> {
        let (booking, mentor, mentee) = {
            let _guard = self.locks.lock(actor_id).await;

            let booking = self.load_booking(booking_id).await?;
            if booking.mentor_id != actor_id {
                return Err(BookingServiceError::Forbidden);
            }
            if booking.is_accepted() {
                return Err(BookingServiceError::AlreadyAccepted);
            }
            if !booking.is_waiting() {
                return Err(BookingServiceError::InvalidTransition(booking.status));
            }

            let others: Vec<Booking> = self
                .bookings
                .list_by_mentor(actor_id)
                .await
                .context("Failed to load mentor bookings")?
                .into_iter()
                .filter(|b| b.id != booking.id)
                .collect();
            if let Conflict::AcceptedAt(_) = check(&others, booking.start_at, booking.mentee_id) {
                return Err(BookingServiceError::MentorAlreadyBooked);
            }

            let mentor = self.load_mentor(actor_id).await?;
            let mentee = self.load_mentee(booking.mentee_id).await?;

            let link = self.meetings.generate();
            let accepted = match self
                .bookings
                .mark_accepted(booking.id, &link.id, &link.url)
                .await
            {
                Ok(accepted) => accepted,
                Err(e) if is_unique_violation(&e) => {
                    return Err(BookingServiceError::MentorAlreadyBooked)
                }
                Err(e) => return Err(e.context("Failed to accept booking").into()),
            };

            self.mentors
                .adjust_counters(actor_id, -1, 1, None)
                .await
                .context("Failed to update mentor counters")?;
            (accepted, mentor, mentee)
        };

        tracing::info!(
            booking_id = booking.id,
            mentor_id = mentor.id,
            mentee_id = mentee.id,
            "Booking accepted"
        );

        let report = self.dispatch_accepted(&booking, &mentor, &mentee).await;
        Ok(BookingOutcome { booking, report })
    }

    /// Reject a booking as its mentor. The booking is deleted; the returned
    /// outcome carries its last state.
    pub async fn reject(
        &self,
        actor_id: i64,
        booking_id: i64,
        reason: Option<String>,
    ) -> Result<BookingOutcome, BookingServiceError> {
        let (booking, mentor, mentee) = {
            let _guard = self.locks.lock(actor_id).await;

            let booking = self.load_booking(booking_id).await?;
            if booking.mentor_id != actor_id {
                return Err(BookingServiceError::Forbidden);
            }
            if booking.is_accepted() {
                return Err(BookingServiceError::AlreadyAccepted);
            }
            let mentee = self.load_mentee(booking.mentee_id).await?;
            let mentor = self.load_mentor(actor_id).await?;

            self.bookings
                .delete(booking.id)
                .await
                .context("Failed to delete booking")?;
            self.users
                .adjust_sessions_requested(mentee.id, -1, None)
                .await
                .context("Failed to update mentee counters")?;
            self.mentors
                .adjust_counters(actor_id, -1, 0, None)
                .await
                .context("Failed to update mentor counters")?;
            (booking, mentor, mentee)
        };

        tracing::info!(
            booking_id = booking.id,
            mentor_id = mentor.id,
            mentee_id = mentee.id,
            "Booking rejected"
        );

        let report = self
            .dispatch_rejected(&booking, &mentor, &mentee, normalize(reason))
            .await;
        Ok(BookingOutcome { booking, report })
    }

    /// Bookings where `user_id` is mentor or mentee. `query` is one of
    /// `upcoming`, `past` or `pending`.
    pub async fn list(
        &self,
        user_id: i64,
        query: &str,
    ) -> Result<Vec<BookingWithParties>, BookingServiceError> {
        let query = BookingQuery::from_str(query)
            .map_err(|e| BookingServiceError::ValidationError(e.to_string()))?;
        let list = self
            .bookings
            .list_for_user(user_id, query, Utc::now())
            .await
            .context("Failed to list bookings")?;
        Ok(list)
    }

    /// Start times the mentor already has accepted sessions at
    pub async fn availability(
        &self,
        mentor_id: i64,
    ) -> Result<Vec<DateTime<Utc>>, BookingServiceError> {
        self.load_mentor(mentor_id).await?;
        let starts = self
            .bookings
            .accepted_starts(mentor_id)
            .await
            .context("Failed to load accepted bookings")?;
        Ok(starts)
    }

    /// Bump both parties' request counters for a new booking. A mentee
    /// failure undoes the mentor bump.
    async fn count_request(&self, booking: &Booking) -> anyhow::Result<()> {
        self.mentors
            .adjust_counters(booking.mentor_id, 1, 0, Some(booking.start_at))
            .await
            .context("Failed to update mentor counters")?;

        if let Err(e) = self
            .users
            .adjust_sessions_requested(booking.mentee_id, 1, Some(booking.start_at))
            .await
        {
            if let Err(undo) = self.mentors.adjust_counters(booking.mentor_id, -1, 0, None).await {
                tracing::error!(
                    mentor_id = booking.mentor_id,
                    error = %undo,
                    "Failed to undo mentor counter bump"
                );
            }
            return Err(e.context("Failed to update mentee counters"));
        }
        Ok(())
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    async fn load_booking(&self, id: i64) -> Result<Booking, BookingServiceError> {
        self.bookings
            .get_by_id(id)
            .await
            .context("Failed to load booking")?
            .ok_or(BookingServiceError::BookingNotFound)
    }

    async fn load_mentor(&self, id: i64) -> Result<Mentor, BookingServiceError> {
        self.mentors
            .get(id)
            .await
            .context("Failed to load mentor")?
            .ok_or(BookingServiceError::MentorNotFound)
    }

    async fn load_mentee(&self, id: i64) -> Result<Mentee, BookingServiceError> {
        self.users
            .get_by_id(id)
            .await
            .context("Failed to load mentee")?
            .map(Mentee::from)
            .ok_or(BookingServiceError::MenteeNotFound)
    }

    // ========================================================================
    // Side effects
    // ========================================================================

    async fn dispatch_request(
        &self,
        booking: &Booking,
        mentor: &Mentor,
        mentee: &Mentee,
    ) -> DispatchReport {
        let mentee_name = mentee.full_name();
        let when = format_date_time(booking.start_at, mentor.timezone());

        let mut context = self.base_context();
        context.insert("user", &mentee_name);
        context.insert("client_url", &self.settings.client_url);
        context.insert(
            "session",
            &serde_json::json!({
                "topic": booking.session.topic,
                "description": booking.session.description,
            }),
        );
        let recipient = booking
            .session
            .email
            .clone()
            .unwrap_or_else(|| mentor.email.clone());

        let chat = format!(
            "Hi {}, {} has requested a session with you on {}. Booking id: {}.",
            mentor.full_name(),
            mentee_name,
            when,
            booking.id
        );

        dispatch::dispatch_all(vec![
            self.notify(
                mentor.id,
                format!("Booking Request from {}", mentee_name),
                format!("{} has requested a booking slot on {}", mentee_name, when),
            ),
            self.email(
                recipient,
                SUBJECT_REQUEST,
                self.templates.render("mentor_booking_notify", &context),
            ),
            self.message(mentor.phone().map(str::to_string), chat),
        ])
        .await
    }

    async fn dispatch_accepted(
        &self,
        booking: &Booking,
        mentor: &Mentor,
        mentee: &Mentee,
    ) -> DispatchReport {
        let url = booking.meeting_link.clone().unwrap_or_default();
        let accept_mail = |me: &dyn Profile, other: &dyn Profile| {
            let mut context = self.base_context();
            context.insert("name1", &me.full_name());
            context.insert("name2", &other.full_name());
            context.insert("url", &url);
            context.insert("date", &format_date(booking.start_at, me.timezone()));
            context.insert("time", &format_time(booking.start_at, me.timezone()));
            self.templates.render("accept_booking", &context)
        };

        let mentee_mail = accept_mail(mentee, mentor);
        let mentor_mail = accept_mail(mentor, mentee);
        let mentor_name = mentor.full_name();

        dispatch::dispatch_all(vec![
            self.notify(
                mentee.id,
                format!("Booking Accepted by {}", mentor_name),
                format!(
                    "{} has accepted your booking slot on {}",
                    mentor_name,
                    format_date_time(booking.start_at, mentee.timezone())
                ),
            ),
            self.email(mentee.email.clone(), SUBJECT_ACCEPTED, mentee_mail),
            self.email(mentor.email.clone(), SUBJECT_ACCEPTED, mentor_mail),
        ])
        .await
    }

    async fn dispatch_rejected(
        &self,
        booking: &Booking,
        mentor: &Mentor,
        mentee: &Mentee,
        reason: Option<String>,
    ) -> DispatchReport {
        let mentor_name = mentor.full_name();
        let tz = mentee.timezone();

        let mut context = self.base_context();
        context.insert("mentor_name", &mentor_name);
        context.insert("mentee_name", &mentee.full_name());
        context.insert("date", &format_date(booking.start_at, tz));
        context.insert("time", &format_time(booking.start_at, tz));
        context.insert("reason", &reason);

        dispatch::dispatch_all(vec![
            self.email(
                mentee.email.clone(),
                SUBJECT_REJECTED,
                self.templates.render("booking_rejected", &context),
            ),
            self.notify(
                mentee.id,
                format!("Booking Rejected by {}", mentor_name),
                format!(
                    "{} has rejected your booking slot on {}",
                    mentor_name,
                    format_date_time(booking.start_at, tz)
                ),
            ),
        ])
        .await
    }

    fn base_context(&self) -> TeraContext {
        let mut context = TeraContext::new();
        context.insert("app_name", &self.settings.app_name);
        context.insert("asset_folder", &self.settings.asset_folder);
        context
    }

    fn notify(&self, recipient: i64, title: String, body: String) -> BoxFuture<'static, DispatchOutcome> {
        let notifier = self.notifier.clone();
        dispatch::bounded(
            Channel::Notification,
            recipient.to_string(),
            self.settings.dispatch_timeout,
            async move {
                let created = notifier
                    .notify(recipient, &title, &body, Some(DASHBOARD_LINK))
                    .await?;
                Ok(Some(created.id.to_string()))
            },
        )
        .boxed()
    }

    /// A render failure counts as a failed delivery of that mail.
    fn email(
        &self,
        to: String,
        subject: &'static str,
        html: anyhow::Result<String>,
    ) -> BoxFuture<'static, DispatchOutcome> {
        let mailer = self.mailer.clone();
        dispatch::bounded(
            Channel::Email,
            to.clone(),
            self.settings.dispatch_timeout,
            async move {
                let html = html?;
                let id = mailer.send_email(&to, subject, &html).await?;
                Ok(Some(id))
            },
        )
        .boxed()
    }

    fn message(&self, phone: Option<String>, body: String) -> BoxFuture<'static, DispatchOutcome> {
        let Some(phone) = phone else {
            tracing::debug!("Skipping chat message: no phone number");
            return future::ready(DispatchOutcome::failed(
                Channel::Message,
                String::new(),
                "no phone number",
            ))
            .boxed();
        };
        let messenger = self.messenger.clone();
        dispatch::bounded(
            Channel::Message,
            phone.clone(),
            self.settings.dispatch_timeout,
            async move { messenger.send_text(&phone, &body).await },
        )
        .boxed()
    }
}

/// Trimmed value, or `None` when blank
fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
