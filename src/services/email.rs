//! Outgoing e-mail
//!
//! `SmtpMailer` delivers HTML mail through an SMTP relay. `LogMailer` stands
//! in when mail is disabled and only logs what would have been sent.

use crate::config::MailConfig;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use uuid::Uuid;

/// Port on which SMTP servers expect TLS from the first byte
const IMPLICIT_TLS_PORT: u16 = 465;

/// Mail delivery
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send an HTML e-mail, returning its message id
    async fn send_email(&self, to: &str, subject: &str, html: &str) -> Result<String>;
}

/// SMTP mailer backed by lettre
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    /// Domain used in generated Message-IDs
    domain: String,
}

impl SmtpMailer {
    /// Build the transport once. Port 465 uses implicit TLS, anything else
    /// STARTTLS.
    pub fn new(config: &MailConfig, from_name: &str) -> Result<Self> {
        if config.host.trim().is_empty() {
            return Err(anyhow!("SMTP host not configured"));
        }

        let builder = if config.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        }
        .map_err(|e| anyhow!("Failed to create SMTP transport: {}", e))?
        .port(config.port);

        let builder = if config.username.is_empty() {
            builder
        } else {
            builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
        };

        let from: Mailbox = format!("\"{}\" <{}>", from_name, config.from)
            .parse()
            .map_err(|e| anyhow!("Invalid from address: {}", e))?;
        let domain = config
            .from
            .rsplit_once('@')
            .map(|(_, d)| d.to_string())
            .unwrap_or_else(|| "localhost".to_string());

        Ok(Self {
            transport: builder.build(),
            from,
            domain,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_email(&self, to: &str, subject: &str, html: &str) -> Result<String> {
        let message_id = format!("<{}@{}>", Uuid::new_v4(), self.domain);

        let email = Message::builder()
            .from(self.from.clone())
            .to(to.parse().map_err(|e| anyhow!("Invalid to address: {}", e))?)
            .subject(subject)
            .message_id(Some(message_id.clone()))
            .header(ContentType::TEXT_HTML)
            .body(html.to_string())
            .map_err(|e| anyhow!("Failed to build email: {}", e))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| anyhow!("Failed to send email: {}", e))?;

        tracing::info!(to, %message_id, "Email sent");
        Ok(message_id)
    }
}

/// Mailer used when delivery is disabled
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_email(&self, to: &str, subject: &str, html: &str) -> Result<String> {
        let message_id = format!("<{}@log>", Uuid::new_v4());
        tracing::info!(to, subject, bytes = html.len(), %message_id, "Mail disabled, not sending");
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(port: u16) -> MailConfig {
        MailConfig {
            enabled: true,
            host: "smtp.example.com".into(),
            port,
            username: "user".into(),
            password: "pass".into(),
            from: "no-reply@example.com".into(),
            from_name: "Vita".into(),
        }
    }

    #[tokio::test]
    async fn test_smtp_mailer_builds_for_both_tls_modes() {
        assert!(SmtpMailer::new(&config(465), "Vita").is_ok());
        let mailer = SmtpMailer::new(&config(587), "Vita").unwrap();
        assert_eq!(mailer.domain, "example.com");
    }

    #[test]
    fn test_smtp_mailer_requires_host() {
        let mut cfg = config(465);
        cfg.host = String::new();
        assert!(SmtpMailer::new(&cfg, "Vita").is_err());
    }

    #[tokio::test]
    async fn test_log_mailer_returns_id() {
        let id = LogMailer
            .send_email("a@example.com", "Hello", "<p>hi</p>")
            .await
            .unwrap();
        assert!(id.starts_with('<') && id.ends_with("@log>"));
    }
}
