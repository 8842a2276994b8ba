//! Notification service
//!
//! Persists in-app notifications and serves them back to their recipient.

use crate::db::repositories::NotificationRepository;
use crate::models::Notification;
use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;

/// Sink for in-app notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Record a notification for `recipient`
    async fn notify(
        &self,
        recipient: i64,
        title: &str,
        body: &str,
        link: Option<&str>,
    ) -> anyhow::Result<Notification>;
}

/// Error types for notification service operations
#[derive(Debug, thiserror::Error)]
pub enum NotificationServiceError {
    /// Missing, or owned by someone else
    #[error("Notification not found")]
    NotFound,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct NotificationService {
    repo: Arc<dyn NotificationRepository>,
}

impl NotificationService {
    pub fn new(repo: Arc<dyn NotificationRepository>) -> Self {
        Self { repo }
    }

    pub async fn list_for_user(
        &self,
        user_id: i64,
        unread_only: bool,
    ) -> Result<Vec<Notification>, NotificationServiceError> {
        let list = self
            .repo
            .list_for_user(user_id, unread_only)
            .await
            .context("Failed to list notifications")?;
        Ok(list)
    }

    pub async fn mark_read(&self, user_id: i64, id: i64) -> Result<(), NotificationServiceError> {
        let found = self
            .repo
            .mark_read(user_id, id)
            .await
            .context("Failed to mark notification read")?;
        if !found {
            return Err(NotificationServiceError::NotFound);
        }
        Ok(())
    }

    /// Returns how many notifications changed
    pub async fn mark_all_read(&self, user_id: i64) -> Result<u64, NotificationServiceError> {
        let count = self
            .repo
            .mark_all_read(user_id)
            .await
            .context("Failed to mark notifications read")?;
        Ok(count)
    }
}

#[async_trait]
impl Notifier for NotificationService {
    async fn notify(
        &self,
        recipient: i64,
        title: &str,
        body: &str,
        link: Option<&str>,
    ) -> anyhow::Result<Notification> {
        let notification = Notification::new(
            recipient,
            title.to_string(),
            body.to_string(),
            link.map(str::to_string),
        );
        let created = self
            .repo
            .create(&notification)
            .await
            .context("Failed to store notification")?;
        tracing::debug!(recipient, notification_id = created.id, "Notification stored");
        Ok(created)
    }
}
