// src/ingest/types.rs
use chrono::DateTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::FeedError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Impact {
    Low,
    Medium,
    High,
    Unknown,
}

impl Impact {
    /// Case-insensitive; numeric importance levels 1..=3 are accepted too.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "HIGH" | "3" => Impact::High,
            "MEDIUM" | "2" => Impact::Medium,
            "LOW" | "1" => Impact::Low,
            _ => Impact::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Impact::Low => "LOW",
            Impact::Medium => "MEDIUM",
            Impact::High => "HIGH",
            Impact::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for Impact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical calendar event. `occurs_at` is already in the display timezone.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub title: String,
    pub impact: Impact,
    pub occurs_at: DateTime<Tz>,
    pub currency: Option<String>,
    pub actual: Option<String>,
    pub forecast: Option<String>,
    pub previous: Option<String>,
}

#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self) -> Result<serde_json::Value, FeedError>;
    fn name(&self) -> &str;
}
