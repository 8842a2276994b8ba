//! Chat messaging channel
//!
//! Best-effort text messages to a user's phone. The WhatsApp Cloud API is the
//! only provider; when messaging is disabled a logging stand-in is used.

use crate::config::MessagingConfig;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outbound chat messages
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send a plain text message, returning the provider's message id if any
    async fn send_text(&self, phone: &str, body: &str) -> Result<Option<String>>;
}

#[derive(Debug, Serialize)]
struct TextMessage<'a> {
    messaging_product: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    text: TextBody<'a>,
}

#[derive(Debug, Serialize)]
struct TextBody<'a> {
    body: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

/// WhatsApp Cloud API client
pub struct WhatsAppMessenger {
    client: reqwest::Client,
    endpoint: String,
    access_token: String,
}

impl WhatsAppMessenger {
    pub fn new(config: &MessagingConfig) -> Result<Self> {
        if config.phone_number_id.trim().is_empty() || config.access_token.trim().is_empty() {
            return Err(anyhow!(
                "Messaging enabled but phone_number_id or access_token is missing"
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/{}/messages",
                config.api_url.trim_end_matches('/'),
                config.phone_number_id
            ),
            access_token: config.access_token.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Messenger for WhatsAppMessenger {
    async fn send_text(&self, phone: &str, body: &str) -> Result<Option<String>> {
        let payload = TextMessage {
            messaging_product: "whatsapp",
            to: phone,
            kind: "text",
            text: TextBody { body },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await
            .context("Failed to send message request")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!("Messaging provider returned {}: {}", status, detail));
        }

        let parsed: SendResponse = response
            .json()
            .await
            .context("Failed to read messaging response")?;
        Ok(parsed.messages.into_iter().next().map(|m| m.id))
    }
}

/// Messenger used when messaging is disabled
#[derive(Debug, Default)]
pub struct DisabledMessenger;

#[async_trait]
impl Messenger for DisabledMessenger {
    async fn send_text(&self, phone: &str, body: &str) -> Result<Option<String>> {
        tracing::debug!(phone, chars = body.chars().count(), "Messaging disabled, not sending");
        Ok(None)
    }
}
