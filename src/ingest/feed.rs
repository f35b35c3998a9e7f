// src/ingest/feed.rs
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::error::FeedError;
use crate::ingest::types::FeedSource;

// Some calendar hosts reject requests without browser-like headers.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";
const ACCEPT: &str = "application/json,text/plain,*/*";

/// JSON calendar feed, fetched over HTTP or served from an in-memory fixture.
pub struct JsonFeed {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http {
        url: String,
        client: reqwest::Client,
        timeout: Duration,
    },
}

impl JsonFeed {
    /// Fixture text is parsed on every fetch, so malformed fixtures fail like a bad response.
    pub fn from_fixture_str(s: &str) -> Self {
        Self {
            mode: Mode::Fixture(s.to_string()),
        }
    }

    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            mode: Mode::Http {
                url: url.into(),
                client: reqwest::Client::new(),
                timeout: Duration::from_secs(30),
            },
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        if let Mode::Http { timeout, .. } = &mut self.mode {
            *timeout = Duration::from_secs(secs);
        }
        self
    }
}

#[async_trait]
impl FeedSource for JsonFeed {
    async fn fetch(&self) -> Result<Value, FeedError> {
        match &self.mode {
            Mode::Fixture(s) => Ok(serde_json::from_str(s)?),
            Mode::Http {
                url,
                client,
                timeout,
            } => {
                let rsp = client
                    .get(url)
                    .timeout(*timeout)
                    .header(reqwest::header::USER_AGENT, USER_AGENT)
                    .header(reqwest::header::ACCEPT, ACCEPT)
                    .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
                    .send()
                    .await?;
                let status = rsp.status();
                if !status.is_success() {
                    tracing::warn!(%status, feed = %url, "feed returned non-2xx");
                    return Err(FeedError::Status(status));
                }
                let body = rsp.bytes().await?;
                let text = String::from_utf8_lossy(&body);
                Ok(serde_json::from_str(&text)?)
            }
        }
    }

    fn name(&self) -> &str {
        match &self.mode {
            Mode::Fixture(_) => "fixture",
            Mode::Http { url, .. } => url,
        }
    }
}
