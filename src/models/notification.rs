//! In-app notification model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Notification shown to a user in the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    /// Recipient user id
    pub user_id: i64,
    pub title: String,
    pub body: String,
    /// Client-side path the notification links to
    pub link: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(user_id: i64, title: String, body: String, link: Option<String>) -> Self {
        Self {
            id: 0,
            user_id,
            title,
            body,
            link,
            is_read: false,
            created_at: Utc::now(),
        }
    }
}
