// tests/common/mod.rs
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use calendar_notifier::config::rules::{CategoryRules, TriggerRule};
use calendar_notifier::{AppConfig, Category, Notifier};
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Mutex;

pub fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
}

/// UTC display timezone, reminder at -30min with 120min tolerance.
pub fn test_config() -> AppConfig {
    AppConfig {
        timezone: Tz::UTC,
        rules: CategoryRules {
            reminder: TriggerRule::per_event(-30, 120),
            ..CategoryRules::default()
        },
        reference_link: "https://example.test/calendar".into(),
        ..AppConfig::default()
    }
}

pub fn feed_json(events: Value) -> String {
    json!({ "events": events }).to_string()
}

pub fn cpi_feed() -> String {
    feed_json(json!([
        { "title": "CPI Release", "impact": "High", "currency": "USD", "datetime": "2024-03-01T13:30:00Z" }
    ]))
}

/// Records deliveries; can be told to fail whole categories or the n-th call.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(Category, String)>>,
    failing: Mutex<HashSet<Category>>,
    fail_on_call: Mutex<Option<usize>>,
    calls: Mutex<usize>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(categories: &[Category]) -> Self {
        let n = Self::default();
        n.failing.lock().unwrap().extend(categories.iter().copied());
        n
    }

    /// Fail the n-th call (1-based) and succeed on all others.
    pub fn fail_on_call(n: usize) -> Self {
        let notifier = Self::default();
        *notifier.fail_on_call.lock().unwrap() = Some(n);
        notifier
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
        *self.fail_on_call.lock().unwrap() = None;
    }

    pub fn count(&self, category: Category) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == category)
            .count()
    }

    pub fn messages(&self, category: Category) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == category)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, message: &str, category: Category) -> Result<()> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        if self.failing.lock().unwrap().contains(&category) {
            return Err(anyhow!("simulated outage for {category}"));
        }
        if *self.fail_on_call.lock().unwrap() == Some(call) {
            return Err(anyhow!("simulated failure on call {call}"));
        }
        self.sent
            .lock()
            .unwrap()
            .push((category, message.to_string()));
        Ok(())
    }
}
