//! Mentor service
//!
//! Mentor profile reads, the mentoring toggle and weekly slot management.

use crate::db::repositories::MentorRepository;
use crate::models::{Mentor, Slot};
use anyhow::Context;
use chrono::Weekday;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Error types for mentor service operations
#[derive(Debug, thiserror::Error)]
pub enum MentorServiceError {
    #[error("Mentor not found")]
    NotFound,

    /// The acting user has no mentor profile
    #[error("User is not a mentor")]
    NotAMentor,

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// A slot as submitted by clients; validated into a [`Slot`].
#[derive(Debug, Clone, Deserialize)]
pub struct SlotInput {
    pub day: Weekday,
    pub hour: u32,
    pub minute: u32,
}

/// Mentor service
pub struct MentorService {
    mentor_repo: Arc<dyn MentorRepository>,
}

impl MentorService {
    pub fn new(mentor_repo: Arc<dyn MentorRepository>) -> Self {
        Self { mentor_repo }
    }

    /// Get a mentor with its slots
    pub async fn get(&self, id: i64) -> Result<Mentor, MentorServiceError> {
        self.mentor_repo
            .get(id)
            .await
            .context("Failed to get mentor")?
            .ok_or(MentorServiceError::NotFound)
    }

    /// Start or stop accepting booking requests
    pub async fn set_mentoring(
        &self,
        user_id: i64,
        is_mentoring: bool,
    ) -> Result<Mentor, MentorServiceError> {
        self.require_mentor(user_id).await?;
        self.mentor_repo
            .set_mentoring(user_id, is_mentoring)
            .await
            .context("Failed to update mentoring flag")?;

        tracing::info!(mentor_id = user_id, is_mentoring, "Mentoring flag changed");
        self.get(user_id).await
    }

    /// Replace the mentor's weekly slots. Duplicates are dropped, keeping the
    /// first occurrence; out-of-range times are rejected as a whole.
    pub async fn set_slots(
        &self,
        user_id: i64,
        slots: Vec<SlotInput>,
    ) -> Result<Mentor, MentorServiceError> {
        self.require_mentor(user_id).await?;

        let mut seen = HashSet::new();
        let mut validated = Vec::with_capacity(slots.len());
        for input in slots {
            let slot = validate_slot(&input)?;
            if seen.insert(slot) {
                validated.push(slot);
            }
        }

        self.mentor_repo
            .replace_slots(user_id, &validated)
            .await
            .context("Failed to replace slots")?;

        tracing::info!(mentor_id = user_id, count = validated.len(), "Slots updated");
        self.get(user_id).await
    }

    async fn require_mentor(&self, user_id: i64) -> Result<Mentor, MentorServiceError> {
        self.mentor_repo
            .get(user_id)
            .await
            .context("Failed to get mentor")?
            .ok_or(MentorServiceError::NotAMentor)
    }
}

fn validate_slot(input: &SlotInput) -> Result<Slot, MentorServiceError> {
    let hour = u8::try_from(input.hour).ok();
    let minute = u8::try_from(input.minute).ok();
    hour.zip(minute)
        .and_then(|(hour, minute)| Slot::new(input.day, hour, minute))
        .ok_or_else(|| {
            MentorServiceError::ValidationError(format!(
                "Invalid slot {} {:02}:{:02}: hour must be 0-23 and minute 0-59",
                input.day, input.hour, input.minute
            ))
        })
}
