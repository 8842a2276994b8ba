//! Configuration management
//!
//! This module handles loading and parsing configuration for the Vita service.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults. The loaded
//! `Config` is handed to each component at construction time.

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Application identity used in emails and links
    #[serde(default)]
    pub app: AppConfig,
    /// Outgoing mail configuration
    #[serde(default)]
    pub mail: MailConfig,
    /// Chat messaging channel configuration
    #[serde(default)]
    pub messaging: MessagingConfig,
    /// Meeting link configuration
    #[serde(default)]
    pub meeting: MeetingConfig,
    /// Booking lifecycle configuration
    #[serde(default)]
    pub booking: BookingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (the web client)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5001
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/vita.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Lifetime of a login session in days
    #[serde(default = "default_session_expiration_days")]
    pub session_expiration_days: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_expiration_days: default_session_expiration_days(),
        }
    }
}

fn default_session_expiration_days() -> i64 {
    7
}

/// Application identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Display name used in email subjects and bodies
    #[serde(default = "default_app_name")]
    pub name: String,
    /// Public URL of the web client
    #[serde(default = "default_client_url")]
    pub client_url: String,
    /// Asset folder name referenced by email templates
    #[serde(default = "default_asset_folder")]
    pub asset_folder: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            client_url: default_client_url(),
            asset_folder: default_asset_folder(),
        }
    }
}

fn default_app_name() -> String {
    "Vita".to_string()
}

fn default_client_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_asset_folder() -> String {
    "Vita".to_string()
}

/// Outgoing mail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// When false, emails are only logged
    #[serde(default)]
    pub enabled: bool,
    /// SMTP relay host
    #[serde(default = "default_mail_host")]
    pub host: String,
    /// SMTP port (465 uses implicit TLS, anything else STARTTLS)
    #[serde(default = "default_mail_port")]
    pub port: u16,
    /// SMTP username
    #[serde(default)]
    pub username: String,
    /// SMTP password
    #[serde(default)]
    pub password: String,
    /// Sender address
    #[serde(default = "default_mail_from")]
    pub from: String,
    /// Sender display name (defaults to the application name when empty)
    #[serde(default)]
    pub from_name: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_mail_host(),
            port: default_mail_port(),
            username: String::new(),
            password: String::new(),
            from: default_mail_from(),
            from_name: String::new(),
        }
    }
}

fn default_mail_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_mail_port() -> u16 {
    465
}

fn default_mail_from() -> String {
    "no-reply@localhost".to_string()
}

/// Chat messaging (WhatsApp Cloud API) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// When false, messages are only logged
    #[serde(default)]
    pub enabled: bool,
    /// Graph API base URL
    #[serde(default = "default_messaging_api_url")]
    pub api_url: String,
    /// Sending phone number id
    #[serde(default)]
    pub phone_number_id: String,
    /// Bearer access token
    #[serde(default)]
    pub access_token: String,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: default_messaging_api_url(),
            phone_number_id: String::new(),
            access_token: String::new(),
        }
    }
}

fn default_messaging_api_url() -> String {
    "https://graph.facebook.com/v17.0".to_string()
}

/// Meeting link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingConfig {
    /// Base URL that meeting ids are appended to
    #[serde(default = "default_meeting_base_url")]
    pub base_url: String,
}

impl Default for MeetingConfig {
    fn default() -> Self {
        Self {
            base_url: default_meeting_base_url(),
        }
    }
}

fn default_meeting_base_url() -> String {
    "https://meet.jit.si".to_string()
}

/// Booking lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfig {
    /// Upper bound for each notification/email/message dispatch, in seconds
    #[serde(default = "default_dispatch_timeout_secs")]
    pub dispatch_timeout_secs: u64,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            dispatch_timeout_secs: default_dispatch_timeout_secs(),
        }
    }
}

fn default_dispatch_timeout_secs() -> u64 {
    10
}

impl BookingConfig {
    /// Dispatch timeout as a `Duration`
    pub fn dispatch_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.dispatch_timeout_secs)
    }
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist or is empty, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern `VITA_<SECTION>_<FIELD>`:
    /// - VITA_SERVER_HOST, VITA_SERVER_PORT, VITA_SERVER_CORS_ORIGIN
    /// - VITA_DATABASE_DRIVER, VITA_DATABASE_URL
    /// - VITA_AUTH_SESSION_EXPIRATION_DAYS
    /// - VITA_APP_NAME, VITA_APP_CLIENT_URL
    /// - VITA_MAIL_ENABLED, VITA_MAIL_HOST, VITA_MAIL_PORT, VITA_MAIL_USERNAME,
    ///   VITA_MAIL_PASSWORD, VITA_MAIL_FROM
    /// - VITA_MESSAGING_ENABLED, VITA_MESSAGING_PHONE_NUMBER_ID,
    ///   VITA_MESSAGING_ACCESS_TOKEN
    /// - VITA_MEETING_BASE_URL
    /// - VITA_BOOKING_DISPATCH_TIMEOUT_SECS
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.session_expiration_days <= 0 {
            return Err(ConfigError::ValidationError(
                "auth.session_expiration_days must be positive".to_string(),
            ));
        }
        if self.booking.dispatch_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "booking.dispatch_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        fn var(key: &str) -> Option<String> {
            std::env::var(key).ok()
        }
        fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
            var(key).and_then(|v| v.parse().ok())
        }
        fn flag(key: &str) -> Option<bool> {
            var(key).and_then(|v| match v.to_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" => Some(false),
                _ => None,
            })
        }

        // Server configuration
        if let Some(host) = var("VITA_SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = parsed("VITA_SERVER_PORT") {
            self.server.port = port;
        }
        if let Some(origin) = var("VITA_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = origin;
        }

        // Database configuration
        if let Some(driver) = var("VITA_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        if let Some(url) = var("VITA_DATABASE_URL") {
            self.database.url = url;
        }

        // Auth configuration
        if let Some(days) = parsed::<i64>("VITA_AUTH_SESSION_EXPIRATION_DAYS") {
            if days > 0 {
                self.auth.session_expiration_days = days;
            }
        }

        // Application identity
        if let Some(name) = var("VITA_APP_NAME") {
            self.app.name = name;
        }
        if let Some(url) = var("VITA_APP_CLIENT_URL") {
            self.app.client_url = url;
        }

        // Mail configuration
        if let Some(enabled) = flag("VITA_MAIL_ENABLED") {
            self.mail.enabled = enabled;
        }
        if let Some(host) = var("VITA_MAIL_HOST") {
            self.mail.host = host;
        }
        if let Some(port) = parsed("VITA_MAIL_PORT") {
            self.mail.port = port;
        }
        if let Some(username) = var("VITA_MAIL_USERNAME") {
            self.mail.username = username;
        }
        if let Some(password) = var("VITA_MAIL_PASSWORD") {
            self.mail.password = password;
        }
        if let Some(from) = var("VITA_MAIL_FROM") {
            self.mail.from = from;
        }

        // Messaging configuration
        if let Some(enabled) = flag("VITA_MESSAGING_ENABLED") {
            self.messaging.enabled = enabled;
        }
        if let Some(id) = var("VITA_MESSAGING_PHONE_NUMBER_ID") {
            self.messaging.phone_number_id = id;
        }
        if let Some(token) = var("VITA_MESSAGING_ACCESS_TOKEN") {
            self.messaging.access_token = token;
        }

        // Meeting links
        if let Some(url) = var("VITA_MEETING_BASE_URL") {
            self.meeting.base_url = url;
        }

        // Booking
        if let Some(secs) = parsed::<u64>("VITA_BOOKING_DISPATCH_TIMEOUT_SECS") {
            if secs > 0 {
                self.booking.dispatch_timeout_secs = secs;
            }
        }
    }

    /// Sender display name, falling back to the application name
    pub fn mail_from_name(&self) -> &str {
        if self.mail.from_name.trim().is_empty() {
            &self.app.name
        } else {
            &self.mail.from_name
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    const ALL_VARS: &[&str] = &[
        "VITA_SERVER_HOST",
        "VITA_SERVER_PORT",
        "VITA_SERVER_CORS_ORIGIN",
        "VITA_DATABASE_DRIVER",
        "VITA_DATABASE_URL",
        "VITA_AUTH_SESSION_EXPIRATION_DAYS",
        "VITA_APP_NAME",
        "VITA_APP_CLIENT_URL",
        "VITA_MAIL_ENABLED",
        "VITA_MAIL_HOST",
        "VITA_MAIL_PORT",
        "VITA_MAIL_USERNAME",
        "VITA_MAIL_PASSWORD",
        "VITA_MAIL_FROM",
        "VITA_MESSAGING_ENABLED",
        "VITA_MESSAGING_PHONE_NUMBER_ID",
        "VITA_MESSAGING_ACCESS_TOKEN",
        "VITA_MEETING_BASE_URL",
        "VITA_BOOKING_DISPATCH_TIMEOUT_SECS",
    ];

    fn clear_env() {
        for key in ALL_VARS {
            std::env::remove_var(key);
        }
    }

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        write!(file, "{}", content).expect("Failed to write config");
        file
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let config = Config::load(Path::new("/nonexistent/config.yml")).unwrap();
        assert_eq!(config.server.port, 5001);
        assert_eq!(config.database.driver, DatabaseDriver::Sqlite);
        assert_eq!(config.database.url, "data/vita.db");
        assert_eq!(config.auth.session_expiration_days, 7);
        assert_eq!(config.meeting.base_url, "https://meet.jit.si");
        assert!(!config.mail.enabled);
        assert!(!config.messaging.enabled);
    }

    #[test]
    fn test_load_empty_file_returns_defaults() {
        let file = write_config("   \n");
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.booking.dispatch_timeout_secs, 10);
    }

    #[test]
    fn test_load_partial_config_fills_defaults() {
        let file = write_config("server:\n  port: 9000\nmail:\n  enabled: true\n");
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(config.mail.enabled);
        assert_eq!(config.mail.port, 465);
        assert_eq!(config.app.name, "Vita");
    }

    #[test]
    fn test_load_invalid_yaml_returns_error() {
        let file = write_config("server:\n  port: [not a port\n");
        let err = Config::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_load_rejects_zero_dispatch_timeout() {
        let file = write_config("booking:\n  dispatch_timeout_secs: 0\n");
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_mail_from_name_falls_back_to_app_name() {
        let mut config = Config::default();
        assert_eq!(config.mail_from_name(), "Vita");
        config.mail.from_name = "Mentors".to_string();
        assert_eq!(config.mail_from_name(), "Mentors");
    }

    #[test]
    fn test_env_overrides_apply() {
        let _guard = lock_env();
        clear_env();

        let file = write_config("server:\n  host: \"original\"\n  port: 1234\n");
        std::env::set_var("VITA_SERVER_HOST", "127.0.0.1");
        std::env::set_var("VITA_DATABASE_DRIVER", "MySQL");
        std::env::set_var("VITA_MAIL_ENABLED", "true");
        std::env::set_var("VITA_MEETING_BASE_URL", "https://meet.example.com");
        std::env::set_var("VITA_BOOKING_DISPATCH_TIMEOUT_SECS", "3");

        let config = Config::load_with_env(file.path()).unwrap();
        clear_env();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 1234);
        assert_eq!(config.database.driver, DatabaseDriver::Mysql);
        assert!(config.mail.enabled);
        assert_eq!(config.meeting.base_url, "https://meet.example.com");
        assert_eq!(config.booking.dispatch_timeout(), std::time::Duration::from_secs(3));
    }

    #[test]
    fn test_env_override_invalid_values_ignored() {
        let _guard = lock_env();
        clear_env();

        std::env::set_var("VITA_SERVER_PORT", "not-a-port");
        std::env::set_var("VITA_DATABASE_DRIVER", "postgres");
        std::env::set_var("VITA_MAIL_ENABLED", "maybe");
        std::env::set_var("VITA_AUTH_SESSION_EXPIRATION_DAYS", "-4");

        let config = Config::load_with_env(Path::new("/nonexistent/config.yml")).unwrap();
        clear_env();

        assert_eq!(config.server.port, 5001);
        assert_eq!(config.database.driver, DatabaseDriver::Sqlite);
        assert!(!config.mail.enabled);
        assert_eq!(config.auth.session_expiration_days, 7);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn config_strategy() -> impl Strategy<Value = Config> {
            (
                "[a-z][a-z0-9.]{0,20}",
                1u16..=65535,
                prop_oneof![Just(DatabaseDriver::Sqlite), Just(DatabaseDriver::Mysql)],
                1i64..365,
                any::<bool>(),
                1u64..120,
            )
                .prop_map(|(host, port, driver, days, mail_enabled, timeout)| {
                    let mut config = Config::default();
                    config.server.host = host;
                    config.server.port = port;
                    config.database.driver = driver;
                    config.auth.session_expiration_days = days;
                    config.mail.enabled = mail_enabled;
                    config.booking.dispatch_timeout_secs = timeout;
                    config
                })
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(20))]

            #[test]
            fn config_survives_yaml_round_trip(config in config_strategy()) {
                let yaml = serde_yaml::to_string(&config).unwrap();
                let file = write_config(&yaml);
                let loaded = Config::load(file.path()).unwrap();

                prop_assert_eq!(loaded.server.host, config.server.host);
                prop_assert_eq!(loaded.server.port, config.server.port);
                prop_assert_eq!(loaded.database.driver, config.database.driver);
                prop_assert_eq!(loaded.auth.session_expiration_days, config.auth.session_expiration_days);
                prop_assert_eq!(loaded.mail.enabled, config.mail.enabled);
                prop_assert_eq!(loaded.booking.dispatch_timeout_secs, config.booking.dispatch_timeout_secs);
            }
        }
    }
}
