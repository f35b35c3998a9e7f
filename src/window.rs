// src/window.rs
//! # Window Evaluator
//! Decides which occurrences are due at `now`. Pure: no I/O, no clock reads.
//!
//! Policy: an occurrence fires only while `now` is inside its half-open
//! window `[anchor, anchor + tolerance)` and its key is not yet in the
//! ledger. A window that closed without a pass landing in it is skipped for
//! good. Calendar occurrences are named after the local date the window
//! *starts* on, so a late-evening window that runs past midnight still maps
//! to the previous day.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::HashSet;

use crate::category::Category;
use crate::config::rules::{Cardinality, Trigger, TriggerRule};
use crate::ingest::types::Event;
use crate::keys;
use crate::ledger::Ledger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPhase {
    Pending,
    Open,
    Closed,
}

/// Half-open delivery window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn new(anchor: DateTime<Utc>, tolerance: Duration) -> Self {
        Self {
            start: anchor,
            end: anchor + tolerance,
        }
    }

    pub fn phase(&self, now: DateTime<Utc>) -> WindowPhase {
        if now < self.start {
            WindowPhase::Pending
        } else if now < self.end {
            WindowPhase::Open
        } else {
            WindowPhase::Closed
        }
    }

    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.phase(now) == WindowPhase::Open
    }
}

/// One concrete thing a category may notify about.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Occurrence<'a> {
    Event(&'a Event),
    Day(NaiveDate),
    /// A weekly occurrence, identified by the local date its window starts on.
    Week { anchor_date: NaiveDate },
}

impl Occurrence<'_> {
    pub fn key(&self) -> String {
        match self {
            Occurrence::Event(ev) => keys::event_key(ev),
            Occurrence::Day(d) => keys::day_key(*d),
            Occurrence::Week { anchor_date } => keys::week_key(*anchor_date),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Due<'a> {
    pub occurrence: Occurrence<'a>,
    pub key: String,
    pub window: Window,
}

/// Result of evaluating one category at one instant.
#[derive(Debug, Clone, Default)]
pub struct Evaluation<'a> {
    /// Open, not yet delivered; ordered by window start.
    pub due: Vec<Due<'a>>,
    /// Windows not yet open.
    pub pending: usize,
    /// Windows already closed without a recorded delivery.
    pub missed: usize,
    /// Open windows whose key is already in the ledger.
    pub already_sent: usize,
}

/// Local wall-clock time on `date` as a UTC instant.
///
/// Ambiguous times (DST fall-back) take the earlier instant; times inside a
/// DST gap are shifted forward by the gap length.
pub fn resolve_local(tz: Tz, date: NaiveDate, hour: u32, minute: u32) -> Option<DateTime<Utc>> {
    let naive = date.and_time(NaiveTime::from_hms_opt(hour, minute, 0)?);
    if let Some(dt) = tz.from_local_datetime(&naive).earliest() {
        return Some(dt.with_timezone(&Utc));
    }
    let before = tz
        .from_local_datetime(&(naive - Duration::hours(3)))
        .earliest()?;
    let offset = before.offset().fix().local_minus_utc();
    Some((naive - Duration::seconds(i64::from(offset))).and_utc())
}

/// Window of an event-relative trigger; `None` when it falls outside the
/// representable time range.
pub fn event_window(ev: &Event, offset_minutes: i64, tolerance: Duration) -> Option<Window> {
    let anchor = ev
        .occurs_at
        .with_timezone(&Utc)
        .checked_add_signed(Duration::try_minutes(offset_minutes)?)?;
    let end = anchor.checked_add_signed(tolerance)?;
    Some(Window { start: anchor, end })
}

/// Local dates whose absolute-trigger window could still contain `now`,
/// oldest first, paired with their windows.
pub fn calendar_windows(rule: &TriggerRule, now: DateTime<Utc>, tz: Tz) -> Vec<(NaiveDate, Window)> {
    let Trigger::Absolute {
        hour,
        minute,
        weekday,
    } = rule.trigger
    else {
        return Vec::new();
    };

    let today = now.with_timezone(&tz).date_naive();
    let lookback = rule.tolerance_minutes / (24 * 60) + 1;

    let mut out = Vec::new();
    for back in (0..=lookback).rev() {
        let Some(date) = today.checked_sub_signed(Duration::days(back)) else {
            continue;
        };
        if weekday.is_some_and(|wd| date.weekday() != wd) {
            continue;
        }
        if let Some(anchor) = resolve_local(tz, date, hour, minute) {
            out.push((date, Window::new(anchor, rule.tolerance())));
        }
    }
    out
}

/// Evaluate one category against the ledger at `now`.
pub fn evaluate<'a>(
    category: Category,
    rule: &TriggerRule,
    now: DateTime<Utc>,
    events: &'a [Event],
    tz: Tz,
    ledger: &Ledger,
) -> Evaluation<'a> {
    let mut candidates: Vec<(Occurrence<'a>, Window)> = match (rule.trigger, rule.cardinality) {
        (Trigger::EventRelative { offset_minutes }, _) => events
            .iter()
            .filter_map(|ev| {
                let window = event_window(ev, offset_minutes, rule.tolerance());
                if window.is_none() {
                    tracing::warn!(title = %ev.title, offset_minutes, "event window out of range, skipped");
                }
                window.map(|w| (Occurrence::Event(ev), w))
            })
            .collect(),
        (Trigger::Absolute { .. }, Cardinality::OncePerWeek) => calendar_windows(rule, now, tz)
            .into_iter()
            .map(|(d, w)| (Occurrence::Week { anchor_date: d }, w))
            .collect(),
        (Trigger::Absolute { .. }, _) => calendar_windows(rule, now, tz)
            .into_iter()
            .map(|(d, w)| (Occurrence::Day(d), w))
            .collect(),
    };
    candidates.sort_by(|(oa, wa), (ob, wb)| {
        wa.start.cmp(&wb.start).then_with(|| match (oa, ob) {
            (Occurrence::Event(a), Occurrence::Event(b)) => a.title.cmp(&b.title),
            _ => std::cmp::Ordering::Equal,
        })
    });

    let mut out = Evaluation::default();
    let mut seen: HashSet<String> = HashSet::new();

    for (occurrence, window) in candidates {
        let key = occurrence.key();
        let sent = ledger.contains(category, &key);
        match window.phase(now) {
            WindowPhase::Pending => out.pending += 1,
            WindowPhase::Closed => {
                if !sent {
                    out.missed += 1;
                }
            }
            WindowPhase::Open if sent => out.already_sent += 1,
            WindowPhase::Open => {
                if seen.insert(key.clone()) {
                    out.due.push(Due {
                        occurrence,
                        key,
                        window,
                    });
                }
            }
        }
    }

    out
}
