//! Login session model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session entity; the id doubles as the bearer token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Session ID (token)
    pub id: String,
    /// Associated user ID
    pub user_id: i64,
    /// Expiration timestamp
    pub expires_at: DateTime<Utc>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Fresh session for `user_id` valid for `days`
    pub fn issue(user_id: i64, days: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            expires_at: now + Duration::days(days),
            created_at: now,
        }
    }

    /// Check if the session has expired
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_is_not_expired() {
        let session = Session::issue(3, 7);
        assert_eq!(session.user_id, 3);
        assert!(!session.is_expired());
        assert_ne!(Session::issue(3, 7).id, session.id);
    }

    #[test]
    fn test_past_expiry_is_expired() {
        let mut session = Session::issue(3, 7);
        session.expires_at = Utc::now() - Duration::seconds(1);
        assert!(session.is_expired());
    }
}
