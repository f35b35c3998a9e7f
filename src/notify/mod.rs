// src/notify/mod.rs
//! Notification handoff. The dispatcher only sees `Ok`/`Err` from
//! [`Notifier::deliver`]; transport details (status codes, rate limits,
//! retries) stay inside the implementations here.

pub mod discord;
pub mod slack;

use anyhow::{anyhow, Result};
use std::collections::BTreeMap;

use crate::category::Category;

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, message: &str, category: Category) -> Result<()>;
}

/// Category → webhook URL. All categories may share the default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Destinations {
    pub default: Option<String>,
    pub overrides: BTreeMap<Category, String>,
}

impl Destinations {
    pub fn resolve(&self, category: Category) -> Option<&str> {
        self.overrides
            .get(&category)
            .or(self.default.as_ref())
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.default.is_none() && self.overrides.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookFlavor {
    Discord,
    Slack,
}

impl WebhookFlavor {
    pub fn detect(url: &str) -> Self {
        let host = reqwest::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_ascii_lowercase));
        match host.as_deref() {
            Some(h) if h == "hooks.slack.com" || h.ends_with(".slack.com") => WebhookFlavor::Slack,
            _ => WebhookFlavor::Discord,
        }
    }
}

/// Posts to Discord or Slack webhooks depending on each destination URL.
#[derive(Clone)]
pub struct WebhookNotifier {
    destinations: Destinations,
    discord: discord::DiscordWebhook,
    slack: slack::SlackWebhook,
}

impl WebhookNotifier {
    pub fn new(destinations: Destinations) -> Self {
        let client = reqwest::Client::new();
        Self {
            destinations,
            discord: discord::DiscordWebhook::new(client.clone()),
            slack: slack::SlackWebhook::new(client),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.discord = self.discord.with_timeout(secs);
        self.slack = self.slack.with_timeout(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.discord = self.discord.with_retries(retries);
        self.slack = self.slack.with_retries(retries);
        self
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn deliver(&self, message: &str, category: Category) -> Result<()> {
        let url = self
            .destinations
            .resolve(category)
            .ok_or_else(|| anyhow!("no destination configured for `{category}`"))?;
        match WebhookFlavor::detect(url) {
            WebhookFlavor::Discord => self.discord.post(url, message).await,
            WebhookFlavor::Slack => self.slack.post(url, message).await,
        }
    }
}

/// Logs messages instead of sending them; always succeeds.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, message: &str, category: Category) -> Result<()> {
        tracing::info!(category = %category, chars = message.chars().count(), "dry-run message:\n{message}");
        Ok(())
    }
}

/// Exponential backoff shared by the webhook clients: 500ms, 1s, 2s, ...
pub(crate) fn backoff(attempt: u8) -> std::time::Duration {
    std::time::Duration::from_millis(500u64 << attempt.saturating_sub(1).min(6))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_beats_default() {
        let mut d = Destinations {
            default: Some("https://discord.com/api/webhooks/1/a".into()),
            ..Default::default()
        };
        d.overrides
            .insert(Category::Weekly, "https://hooks.slack.com/services/x".into());
        assert_eq!(d.resolve(Category::Daily), Some("https://discord.com/api/webhooks/1/a"));
        assert_eq!(d.resolve(Category::Weekly), Some("https://hooks.slack.com/services/x"));
        assert!(Destinations::default().resolve(Category::Daily).is_none());
    }

    #[test]
    fn flavor_by_host() {
        assert_eq!(
            WebhookFlavor::detect("https://hooks.slack.com/services/T/B/X"),
            WebhookFlavor::Slack
        );
        assert_eq!(
            WebhookFlavor::detect("https://discord.com/api/webhooks/1/abc"),
            WebhookFlavor::Discord
        );
        assert_eq!(WebhookFlavor::detect("not a url"), WebhookFlavor::Discord);
    }

    #[test]
    fn backoff_doubles() {
        assert_eq!(backoff(1).as_millis(), 500);
        assert_eq!(backoff(2).as_millis(), 1000);
        assert_eq!(backoff(3).as_millis(), 2000);
    }

    #[tokio::test]
    async fn missing_destination_is_error() {
        let n = WebhookNotifier::new(Destinations::default());
        assert!(n.deliver("hi", Category::Daily).await.is_err());
    }
}
