// src/keys.rs
//! Occurrence keys: the dedup identity of "one thing we may notify about".
//!
//! Event keys hash only the title and the instant, so a feed that later
//! fills in `actual`/`forecast` still maps to the same occurrence.

use chrono::{Datelike, NaiveDate, SecondsFormat, Utc, Weekday};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

use crate::ingest::types::Event;

/// Digest bytes kept in an event key (64 bits).
const EVENT_KEY_BYTES: usize = 8;

pub fn event_key(ev: &Event) -> String {
    let instant = ev
        .occurs_at
        .with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Secs, true);
    let mut hasher = Sha256::new();
    hasher.update(ev.title.as_bytes());
    hasher.update([0x1f]);
    hasher.update(instant.as_bytes());
    let digest = hasher.finalize();

    let mut out = String::with_capacity(EVENT_KEY_BYTES * 2);
    for b in digest.iter().take(EVENT_KEY_BYTES) {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// `YYYY-MM-DD`
pub fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// ISO week, `YYYY-Www`. Uses the ISO week-numbering year, not the calendar year.
pub fn week_key(date: NaiveDate) -> String {
    let w = date.iso_week();
    format!("{:04}-W{:02}", w.year(), w.week())
}

/// First date a calendar key covers: the day itself, or the Monday of an
/// ISO week. Event keys carry no date and yield `None`.
pub fn calendar_key_date(key: &str) -> Option<NaiveDate> {
    if let Ok(d) = NaiveDate::parse_from_str(key, "%Y-%m-%d") {
        return Some(d);
    }
    let (year, week) = key.split_once("-W")?;
    NaiveDate::from_isoywd_opt(year.parse().ok()?, week.parse().ok()?, Weekday::Mon)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::Impact;
    use chrono::TimeZone;
    use chrono_tz::Tz;

    fn cpi(tz: Tz) -> Event {
        Event {
            title: "CPI Release".into(),
            impact: Impact::High,
            occurs_at: Utc
                .with_ymd_and_hms(2024, 3, 1, 13, 30, 0)
                .unwrap()
                .with_timezone(&tz),
            currency: Some("USD".into()),
            actual: None,
            forecast: None,
            previous: None,
        }
    }

    #[test]
    fn event_key_ignores_mutable_fields_and_display_tz() {
        let a = cpi(Tz::UTC);
        let mut b = cpi(chrono_tz::America::New_York);
        b.actual = Some("3.4%".into());
        b.forecast = Some("3.1%".into());
        b.impact = Impact::Medium;
        assert_eq!(event_key(&a), event_key(&b));
        assert_eq!(event_key(&a).len(), 16);
    }

    #[test]
    fn event_key_differs_on_title_or_time() {
        let a = cpi(Tz::UTC);
        let mut b = a.clone();
        b.title = "Core CPI Release".into();
        let mut c = a.clone();
        c.occurs_at = c.occurs_at + chrono::Duration::minutes(1);
        assert_ne!(event_key(&a), event_key(&b));
        assert_ne!(event_key(&a), event_key(&c));
    }

    #[test]
    fn calendar_keys() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(day_key(d), "2024-03-01");
        assert_eq!(week_key(d), "2024-W09");
        // 2024-12-30 belongs to ISO week 1 of 2025
        let edge = NaiveDate::from_ymd_opt(2024, 12, 30).unwrap();
        assert_eq!(week_key(edge), "2025-W01");
    }

    #[test]
    fn calendar_key_dates() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(calendar_key_date(&day_key(d)), Some(d));
        assert_eq!(
            calendar_key_date("2025-W01"),
            NaiveDate::from_ymd_opt(2024, 12, 30)
        );
        assert_eq!(calendar_key_date(&event_key(&cpi(Tz::UTC))), None);
        assert_eq!(calendar_key_date("2024-W99"), None);
    }
}
