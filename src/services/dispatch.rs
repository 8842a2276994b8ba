//! Side-effect dispatch
//!
//! Lifecycle operations fan out notifications, e-mails and chat messages
//! after their state change is saved. Each dispatch runs under a timeout and
//! yields a [`DispatchOutcome`]; one operation's outcomes form a
//! [`DispatchReport`]. Failures are recorded, never propagated.

use futures::future::{join_all, BoxFuture};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Delivery channel of a side effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Notification,
    Email,
    Message,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Notification => write!(f, "notification"),
            Channel::Email => write!(f, "email"),
            Channel::Message => write!(f, "message"),
        }
    }
}

/// Result of one dispatched side effect
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchOutcome {
    pub channel: Channel,
    /// User id, e-mail address or phone number, depending on the channel
    pub recipient: String,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DispatchOutcome {
    pub fn delivered(channel: Channel, recipient: impl Into<String>, message_id: Option<String>) -> Self {
        Self {
            channel,
            recipient: recipient.into(),
            delivered: true,
            message_id,
            error: None,
        }
    }

    pub fn failed(channel: Channel, recipient: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            channel,
            recipient: recipient.into(),
            delivered: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

/// Ordered outcomes of one lifecycle operation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchReport {
    pub outcomes: Vec<DispatchOutcome>,
}

impl DispatchReport {
    pub fn all_delivered(&self) -> bool {
        self.outcomes.iter().all(|o| o.delivered)
    }

    /// Outcomes that did not deliver
    pub fn failures(&self) -> impl Iterator<Item = &DispatchOutcome> {
        self.outcomes.iter().filter(|o| !o.delivered)
    }

    /// Whether any e-mail in the report failed
    pub fn email_failed(&self) -> bool {
        self.failures().any(|o| o.channel == Channel::Email)
    }

    pub fn by_channel(&self, channel: Channel) -> impl Iterator<Item = &DispatchOutcome> {
        self.outcomes.iter().filter(move |o| o.channel == channel)
    }
}

/// Run one side effect under `limit`. The future resolves to an optional
/// provider message id.
pub async fn bounded<F>(
    channel: Channel,
    recipient: String,
    limit: Duration,
    effect: F,
) -> DispatchOutcome
where
    F: Future<Output = anyhow::Result<Option<String>>>,
{
    let outcome = match tokio::time::timeout(limit, effect).await {
        Ok(Ok(message_id)) => DispatchOutcome::delivered(channel, recipient, message_id),
        Ok(Err(e)) => DispatchOutcome::failed(channel, recipient, format!("{:#}", e)),
        Err(_) => DispatchOutcome::failed(
            channel,
            recipient,
            format!("timed out after {}s", limit.as_secs_f64()),
        ),
    };

    if let Some(error) = &outcome.error {
        tracing::warn!(
            channel = %outcome.channel,
            recipient = %outcome.recipient,
            "Dispatch failed: {}",
            error
        );
    }
    outcome
}

/// Run all dispatches concurrently, keeping their order in the report.
pub async fn dispatch_all(dispatches: Vec<BoxFuture<'_, DispatchOutcome>>) -> DispatchReport {
    DispatchReport {
        outcomes: join_all(dispatches).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    #[tokio::test]
    async fn test_bounded_success_and_failure() {
        let ok = bounded(Channel::Email, "a@example.com".into(), Duration::from_secs(1), async {
            Ok(Some("<id@host>".to_string()))
        })
        .await;
        assert!(ok.delivered);
        assert_eq!(ok.message_id.as_deref(), Some("<id@host>"));

        let err = bounded(Channel::Message, "+1555".into(), Duration::from_secs(1), async {
            Err(anyhow::anyhow!("provider down"))
        })
        .await;
        assert!(!err.delivered);
        assert_eq!(err.error.as_deref(), Some("provider down"));
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let outcome = bounded(
            Channel::Notification,
            "7".into(),
            Duration::from_millis(20),
            async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(None)
            },
        )
        .await;
        assert!(!outcome.delivered);
        assert!(outcome.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_dispatch_all_keeps_order() {
        let limit = Duration::from_secs(1);
        let report = dispatch_all(vec![
            bounded(Channel::Notification, "1".into(), limit, async { Ok(None) }).boxed(),
            bounded(Channel::Email, "a@example.com".into(), limit, async {
                Err(anyhow::anyhow!("smtp refused"))
            })
            .boxed(),
            bounded(Channel::Message, "+1".into(), limit, async { Ok(Some("wamid".into())) }).boxed(),
        ])
        .await;

        let channels: Vec<Channel> = report.outcomes.iter().map(|o| o.channel).collect();
        assert_eq!(channels, vec![Channel::Notification, Channel::Email, Channel::Message]);
        assert!(!report.all_delivered());
        assert!(report.email_failed());
        assert_eq!(report.failures().count(), 1);
    }
}
