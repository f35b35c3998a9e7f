// src/ingest/mod.rs
//! Event normalization: raw feed JSON → canonical [`Event`] values.
//!
//! Everything here is pure. Records that cannot be scheduled (no timestamp,
//! or one that is not ISO-8601) are counted as discarded and dropped.

pub mod feed;
pub mod types;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde_json::Value;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::ingest::types::{Event, Impact};

/// Top-level keys probed, in order, when the payload is an object.
pub const RECORD_LIST_KEYS: &[&str] = &["events", "data", "items", "calendar"];

/// Title used when a record carries none of the title aliases.
pub const FALLBACK_TITLE: &str = "Calendar event";

/// Candidate field names per attribute; the first present non-empty value wins.
#[derive(Debug, Clone, Copy)]
pub struct FieldTable {
    pub title: &'static [&'static str],
    pub impact: &'static [&'static str],
    pub datetime: &'static [&'static str],
    pub currency: &'static [&'static str],
    pub actual: &'static [&'static str],
    pub forecast: &'static [&'static str],
    pub previous: &'static [&'static str],
}

pub const FIELDS: FieldTable = FieldTable {
    title: &["title", "event", "name"],
    impact: &["impact", "importance", "level"],
    datetime: &["datetime", "date", "time"],
    currency: &["currency", "symbol", "coin", "country"],
    actual: &["actual", "result", "value", "outcome"],
    forecast: &["forecast", "consensus", "estimate", "expected"],
    previous: &["previous"],
};

/// Outcome of normalizing a whole payload.
#[derive(Debug, Clone, Default)]
pub struct NormalizedFeed {
    pub events: Vec<Event>,
    /// Records in the payload (before normalization).
    pub records: usize,
    /// Records dropped because they had no usable timestamp.
    pub discarded: usize,
    /// Records dropped because an identical occurrence was already seen.
    pub duplicates: usize,
}

/// Normalize text: decode entities, strip tags, fold whitespace.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();

    out.trim().to_string()
}

/// The record list inside a payload. Unknown shapes yield an empty slice.
pub fn extract_records(payload: &Value) -> &[Value] {
    match payload {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => RECORD_LIST_KEYS
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_array))
            .map(Vec::as_slice)
            .unwrap_or(&[]),
        _ => &[],
    }
}

fn field_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => {
            let t = s.trim();
            (!t.is_empty()).then(|| t.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First non-empty value among `aliases`.
pub fn first_field(record: &Value, aliases: &[&str]) -> Option<String> {
    let map = record.as_object()?;
    aliases
        .iter()
        .find_map(|k| map.get(*k).and_then(field_text))
}

/// Parse an ISO-8601 timestamp. Values without an offset are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%dT%H:%M:%S%z", "%Y-%m-%d %H:%M:%S%z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Wall-clock time such as `13:30`, `13:30:00` or `8:30am`.
fn parse_clock(raw: &str) -> Option<NaiveTime> {
    let s = raw.trim();
    ["%H:%M:%S", "%H:%M", "%I:%M%p", "%I:%M %p"]
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
}

/// Record timestamp. A bare date is combined with a separate `time` field
/// when one is present; both are read as UTC.
fn record_instant(record: &Value) -> Option<DateTime<Utc>> {
    let when = first_field(record, FIELDS.datetime)?;
    if let Ok(date) = NaiveDate::parse_from_str(when.trim(), "%Y-%m-%d") {
        if let Some(clock) = first_field(record, &["time"]).and_then(|t| parse_clock(&t)) {
            return Some(date.and_time(clock).and_utc());
        }
    }
    parse_timestamp(&when)
}

/// Map one raw record to an [`Event`]; `None` means the record is discarded.
pub fn normalize_record(record: &Value, tz: Tz) -> Option<Event> {
    let occurs_at = record_instant(record)?.with_timezone(&tz);

    let title = first_field(record, FIELDS.title)
        .map(|t| normalize_text(&t))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| FALLBACK_TITLE.to_string());

    let impact = first_field(record, FIELDS.impact)
        .map(|raw| Impact::parse(&raw))
        .unwrap_or(Impact::Unknown);

    Some(Event {
        title,
        impact,
        occurs_at,
        currency: first_field(record, FIELDS.currency),
        actual: first_field(record, FIELDS.actual),
        forecast: first_field(record, FIELDS.forecast),
        previous: first_field(record, FIELDS.previous),
    })
}

/// A repeated record may carry figures the first copy lacked.
fn fill_missing(kept: &mut Event, dup: Event) {
    kept.currency = kept.currency.take().or(dup.currency);
    kept.actual = kept.actual.take().or(dup.actual);
    kept.forecast = kept.forecast.take().or(dup.forecast);
    kept.previous = kept.previous.take().or(dup.previous);
    if kept.impact == Impact::Unknown {
        kept.impact = dup.impact;
    }
}

/// Normalize every record of a payload, dropping unusable and repeated ones.
pub fn normalize_feed(payload: &Value, tz: Tz) -> NormalizedFeed {
    let records = extract_records(payload);
    let mut out = NormalizedFeed {
        records: records.len(),
        ..Default::default()
    };
    let mut seen: HashMap<String, usize> = HashMap::new();

    for record in records {
        let Some(ev) = normalize_record(record, tz) else {
            out.discarded += 1;
            continue;
        };
        match seen.entry(crate::keys::event_key(&ev)) {
            Entry::Occupied(slot) => {
                out.duplicates += 1;
                fill_missing(&mut out.events[*slot.get()], ev);
            }
            Entry::Vacant(slot) => {
                slot.insert(out.events.len());
                out.events.push(ev);
            }
        }
    }

    out
}
