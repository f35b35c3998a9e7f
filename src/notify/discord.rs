use anyhow::{anyhow, Result};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;

use super::backoff;

/// Longest rate-limit pause we are willing to sit through.
const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct DiscordWebhook {
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl DiscordWebhook {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    pub async fn post(&self, webhook: &str, content: &str) -> Result<()> {
        let payload = DiscordWebhookPayload { content };

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(webhook)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            match res {
                Ok(rsp) if rsp.status() == StatusCode::TOO_MANY_REQUESTS => {
                    let wait = retry_after(&rsp).unwrap_or_else(|| backoff(attempt));
                    if attempt < self.max_retries && wait <= MAX_RATE_LIMIT_WAIT {
                        tracing::warn!(attempt, wait_ms = wait.as_millis() as u64, "discord rate limited");
                        tokio::time::sleep(wait).await;
                        continue;
                    }
                    return Err(anyhow!("Discord webhook rate limited (retry after {wait:?})"));
                }
                Ok(rsp) => {
                    if let Err(e) = rsp.error_for_status_ref() {
                        // 4xx other than 429 will not get better by retrying
                        if attempt < self.max_retries && rsp.status().is_server_error() {
                            tokio::time::sleep(backoff(attempt)).await;
                            continue;
                        }
                        return Err(anyhow!("Discord webhook HTTP error: {e}"));
                    }
                    return Ok(());
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        tokio::time::sleep(backoff(attempt)).await;
                        continue;
                    }
                    return Err(anyhow!("Discord webhook request failed: {e}"));
                }
            }
        }
    }
}

/// `Retry-After` header in (possibly fractional) seconds.
fn retry_after(rsp: &reqwest::Response) -> Option<Duration> {
    rsp.headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

#[derive(Serialize)]
struct DiscordWebhookPayload<'a> {
    content: &'a str,
}
