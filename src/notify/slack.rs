use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;

use super::backoff;

#[derive(Clone)]
pub struct SlackWebhook {
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl SlackWebhook {
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

    pub async fn post(&self, url: &str, text: &str) -> Result<()> {
        // Slack uses *bold*, not **bold**.
        let body = serde_json::json!({ "text": text.replace("**", "*") });

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(url)
                .timeout(self.timeout)
                .json(&body)
                .send()
                .await
                .context("slack post")
                .and_then(|rsp| rsp.error_for_status().context("slack non-2xx"));

            match res {
                Ok(_) => return Ok(()),
                Err(e) if attempt < self.max_retries => {
                    tracing::debug!(attempt, error = %e, "slack post failed, retrying");
                    tokio::time::sleep(backoff(attempt)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
