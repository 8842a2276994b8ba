//! User service
//!
//! Implements business logic for accounts:
//! - Registration (optionally with a mentor profile)
//! - Login/logout with opaque session tokens
//! - Session validation (expired sessions are purged on sight)
//! - Password changes and profile updates

use crate::db::repositories::{MentorRepository, SessionRepository, UserRepository};
use crate::models::{Session, UpdateProfileInput, User};
use crate::services::password::{hash_password, verify_password};
use anyhow::Context;
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

/// Default session expiration time in days
const DEFAULT_SESSION_EXPIRATION_DAYS: i64 = 7;

/// Minimum accepted password length
pub const MIN_PASSWORD_LENGTH: usize = 8;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid")
});

/// Loose e-mail shape check: one `@`, no whitespace, a dot in the domain.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Whether `name` is a known IANA timezone.
pub fn is_valid_timezone(name: &str) -> bool {
    name.parse::<Tz>().is_ok()
}

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Authentication failed (invalid credentials)
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// User already exists
    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("User not found")]
    UserNotFound,

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// User service for managing users and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    mentor_repo: Arc<dyn MentorRepository>,
    session_expiration_days: i64,
}

impl UserService {
    /// Create a new user service with the given repositories
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        mentor_repo: Arc<dyn MentorRepository>,
    ) -> Self {
        Self::with_session_expiration(
            user_repo,
            session_repo,
            mentor_repo,
            DEFAULT_SESSION_EXPIRATION_DAYS,
        )
    }

    /// Create a new user service with custom session expiration
    pub fn with_session_expiration(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        mentor_repo: Arc<dyn MentorRepository>,
        session_expiration_days: i64,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            mentor_repo,
            session_expiration_days,
        }
    }

    /// Register a new user
    ///
    /// Mentor registrations also get an empty mentor profile: not mentoring
    /// and without slots until the mentor configures them.
    ///
    /// # Errors
    ///
    /// - `ValidationError` for a malformed e-mail, empty first name or a
    ///   password shorter than [`MIN_PASSWORD_LENGTH`]
    /// - `UserExists` if the e-mail is already registered
    pub async fn register(&self, input: RegisterInput) -> Result<User, UserServiceError> {
        self.validate_register_input(&input)?;

        let email = input.email.trim().to_string();
        if self
            .user_repo
            .get_by_email(&email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(format!(
                "Email '{}' is already registered",
                email
            )));
        }

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;

        let user = User::new(
            email,
            password_hash,
            input.first_name.trim().to_string(),
            input.last_name.trim().to_string(),
            input.as_mentor,
        );

        let created_user = self
            .user_repo
            .create(&user)
            .await
            .context("Failed to create user")?;

        if created_user.is_mentor {
            self.mentor_repo
                .create_profile(created_user.id)
                .await
                .context("Failed to create mentor profile")?;
        }

        tracing::info!(user_id = created_user.id, mentor = created_user.is_mentor, "User registered");
        Ok(created_user)
    }

    /// Login with credentials
    ///
    /// Unknown e-mail and wrong password produce the same error.
    pub async fn login(&self, input: LoginInput) -> Result<Session, UserServiceError> {
        let invalid =
            || UserServiceError::AuthenticationError("Invalid email or password".to_string());

        let user = self
            .user_repo
            .get_by_email(input.email.trim())
            .await
            .context("Failed to get user by email")?
            .ok_or_else(invalid)?;

        let password_valid = verify_password(&input.password, &user.password_hash)
            .context("Failed to verify password")?;
        if !password_valid {
            return Err(invalid());
        }

        let session = Session::issue(user.id, self.session_expiration_days);
        let created = self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;

        tracing::debug!(user_id = user.id, "Session issued");
        Ok(created)
    }

    /// Logout (invalidate session)
    pub async fn logout(&self, session_id: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(session_id)
            .await
            .context("Failed to delete session")?;

        Ok(())
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        let user = self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?;

        Ok(user)
    }

    /// Validate session token and return the associated user
    ///
    /// Returns `None` if the session doesn't exist or is expired. Expired
    /// sessions are deleted.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            if let Err(e) = self.session_repo.delete(token).await {
                tracing::warn!("Failed to delete expired session: {:#}", e);
            }
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;

        Ok(user)
    }

    /// Change a user's password
    ///
    /// # Errors
    ///
    /// - `ValidationError` when the new password or its confirmation is
    ///   missing, they differ, or the new password is too short
    /// - `AuthenticationError` when the current password is wrong
    pub async fn change_password(
        &self,
        user_id: i64,
        input: ChangePasswordInput,
    ) -> Result<(), UserServiceError> {
        if input.new_password.is_empty() || input.confirm_password.is_empty() {
            return Err(UserServiceError::ValidationError(
                "New password and confirmation are required".to_string(),
            ));
        }
        if input.new_password != input.confirm_password {
            return Err(UserServiceError::ValidationError(
                "Passwords do not match".to_string(),
            ));
        }
        if input.new_password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(UserServiceError::ValidationError(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }

        let user = self
            .user_repo
            .get_by_id(user_id)
            .await
            .context("Failed to get user")?
            .ok_or(UserServiceError::UserNotFound)?;

        let current_valid = verify_password(&input.current_password, &user.password_hash)
            .context("Failed to verify password")?;
        if !current_valid {
            return Err(UserServiceError::AuthenticationError(
                "Current password is incorrect".to_string(),
            ));
        }

        let password_hash =
            hash_password(&input.new_password).context("Failed to hash password")?;
        self.user_repo
            .update_password(user_id, &password_hash)
            .await
            .context("Failed to update password")?;

        tracing::info!(user_id, "Password changed");
        Ok(())
    }

    /// Update name, phone and timezone. Absent fields are left unchanged; an
    /// empty phone clears it.
    pub async fn update_profile(
        &self,
        user_id: i64,
        input: UpdateProfileInput,
    ) -> Result<User, UserServiceError> {
        let mut user = self
            .user_repo
            .get_by_id(user_id)
            .await
            .context("Failed to get user")?
            .ok_or(UserServiceError::UserNotFound)?;

        if let Some(first_name) = input.first_name {
            let first_name = first_name.trim();
            if first_name.is_empty() {
                return Err(UserServiceError::ValidationError(
                    "First name cannot be empty".to_string(),
                ));
            }
            user.first_name = first_name.to_string();
        }
        if let Some(last_name) = input.last_name {
            user.last_name = last_name.trim().to_string();
        }
        if let Some(phone) = input.phone {
            let phone = phone.trim();
            user.phone = (!phone.is_empty()).then(|| phone.to_string());
        }
        if let Some(timezone) = input.timezone {
            if !is_valid_timezone(&timezone) {
                return Err(UserServiceError::ValidationError(format!(
                    "Unknown timezone '{}'",
                    timezone
                )));
            }
            user.timezone = timezone;
        }

        let updated = self
            .user_repo
            .update_profile(&user)
            .await
            .context("Failed to update user")?;

        Ok(updated)
    }

    /// Delete all expired sessions; returns how many were removed
    pub async fn cleanup_expired_sessions(&self) -> Result<i64, UserServiceError> {
        let count = self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?;

        Ok(count)
    }

    // ========================================================================
    // Private helper methods
    // ========================================================================

    fn validate_register_input(&self, input: &RegisterInput) -> Result<(), UserServiceError> {
        if !is_valid_email(input.email.trim()) {
            return Err(UserServiceError::ValidationError(
                "Invalid email format".to_string(),
            ));
        }

        if input.first_name.trim().is_empty() {
            return Err(UserServiceError::ValidationError(
                "First name cannot be empty".to_string(),
            ));
        }

        if input.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(UserServiceError::ValidationError(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }

        Ok(())
    }
}

/// Input for user registration
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    /// Register with a mentor profile
    pub as_mentor: bool,
}

impl RegisterInput {
    /// Create a new registration input for a mentee
    pub fn new(
        email: impl Into<String>,
        password: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            as_mentor: false,
        }
    }

    /// Same input, registering as a mentor
    pub fn mentor(mut self) -> Self {
        self.as_mentor = true;
        self
    }
}

/// Input for user login
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

impl LoginInput {
    /// Create a new login input
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Input for a password change
#[derive(Debug, Clone, Default)]
pub struct ChangePasswordInput {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}
