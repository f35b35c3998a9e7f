// src/config/mod.rs
//! Process configuration, read once at start and passed by reference.

pub mod rules;

use anyhow::{bail, Context, Result};
use chrono_tz::Tz;
use std::path::PathBuf;

use crate::category::Category;
use crate::digest::DEFAULT_MAX_MESSAGE_LEN;
use crate::ingest::types::Impact;
use crate::notify::Destinations;
use rules::CategoryRules;

pub const DEFAULT_TIMEZONE: &str = "Europe/Amsterdam";
pub const DEFAULT_LEDGER_PATH: &str = "state.json";
pub const DEFAULT_REFERENCE_LINK: &str = "https://www.cryptocraft.com/calendar";
pub const DEFAULT_MAX_EVENT_MESSAGES: usize = 10;

/// Messages shorter than this cannot hold a header, one block and a footer.
pub const MIN_MESSAGE_LEN: usize = 200;

pub const ENV_FEED_URL: &str = "FEED_URL";
pub const ENV_FEED_URL_LEGACY: &str = "CRYPTOCRAFT_JSON_URL";
pub const ENV_TIMEZONE: &str = "DISPLAY_TIMEZONE";
pub const ENV_STATE_FILE: &str = "STATE_FILE";
pub const ENV_WEBHOOK: &str = "DISCORD_WEBHOOK_URL";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub feed_url: Option<String>,
    pub timezone: Tz,
    pub ledger_path: PathBuf,
    pub rules: CategoryRules,
    pub max_message_len: usize,
    pub destinations: Destinations,
    pub reference_link: String,
    pub notify_impacts: Vec<Impact>,
    pub max_event_messages_per_pass: usize,
    pub dry_run: bool,
    pub run_interval_secs: Option<u64>,
    pub request_timeout_secs: u64,
    pub max_retries: u8,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            feed_url: None,
            timezone: parse_timezone(DEFAULT_TIMEZONE),
            ledger_path: PathBuf::from(DEFAULT_LEDGER_PATH),
            rules: CategoryRules::default(),
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
            destinations: Destinations::default(),
            reference_link: DEFAULT_REFERENCE_LINK.to_string(),
            notify_impacts: vec![Impact::High],
            max_event_messages_per_pass: DEFAULT_MAX_EVENT_MESSAGES,
            dry_run: false,
            run_interval_secs: None,
            request_timeout_secs: 30,
            max_retries: 3,
        }
    }
}

/// Unknown timezone names fall back to UTC.
pub fn parse_timezone(name: &str) -> Tz {
    match name.trim().parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            tracing::warn!(timezone = name, "unknown timezone, falling back to UTC");
            Tz::UTC
        }
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_impacts(raw: &str) -> Vec<Impact> {
    let mut out: Vec<Impact> = raw
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(Impact::parse)
        .collect();
    out.sort();
    out.dedup();
    out
}

fn parse_num<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("{name} must be a number, got `{raw}`"))
}

impl AppConfig {
    /// Read the process environment (call `dotenvy::dotenv()` first).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());
        let mut cfg = AppConfig::default();

        cfg.feed_url = get(ENV_FEED_URL).or_else(|| get(ENV_FEED_URL_LEGACY));
        if let Some(tz) = get(ENV_TIMEZONE) {
            cfg.timezone = parse_timezone(&tz);
        }
        if let Some(p) = get(ENV_STATE_FILE) {
            cfg.ledger_path = PathBuf::from(p);
        }
        if let Some(v) = get("MAX_MESSAGE_LEN") {
            cfg.max_message_len = parse_num("MAX_MESSAGE_LEN", &v)?;
        }
        if let Some(v) = get("REFERENCE_LINK") {
            cfg.reference_link = v;
        }
        if let Some(v) = get("NOTIFY_IMPACTS") {
            cfg.notify_impacts = parse_impacts(&v);
        }
        if let Some(v) = get("MAX_EVENT_MESSAGES") {
            cfg.max_event_messages_per_pass = parse_num("MAX_EVENT_MESSAGES", &v)?;
        }
        if let Some(v) = get("DRY_RUN") {
            cfg.dry_run = parse_bool(&v);
        }
        if let Some(v) = get("RUN_INTERVAL_SECS") {
            cfg.run_interval_secs = Some(parse_num("RUN_INTERVAL_SECS", &v)?);
        }
        if let Some(v) = get("HTTP_TIMEOUT_SECS") {
            cfg.request_timeout_secs = parse_num("HTTP_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("HTTP_MAX_RETRIES") {
            cfg.max_retries = parse_num("HTTP_MAX_RETRIES", &v)?;
        }

        cfg.destinations.default = get(ENV_WEBHOOK);
        for c in Category::ALL {
            let key = format!("{ENV_WEBHOOK}_{}", c.as_str().to_ascii_uppercase());
            if let Some(url) = get(&key) {
                cfg.destinations.overrides.insert(c, url);
            }
        }

        cfg.rules = rules::load_rules_default(&lookup)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.rules.validate()?;
        if self.max_message_len < MIN_MESSAGE_LEN {
            bail!(
                "MAX_MESSAGE_LEN must be at least {MIN_MESSAGE_LEN}, got {}",
                self.max_message_len
            );
        }
        if self.max_event_messages_per_pass == 0 {
            bail!("MAX_EVENT_MESSAGES must be at least 1");
        }
        if let Some(0) = self.run_interval_secs {
            bail!("RUN_INTERVAL_SECS must be positive");
        }
        Ok(())
    }
}
