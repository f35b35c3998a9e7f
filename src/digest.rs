// src/digest.rs
//! Digest building and message rendering.
//!
//! Every outgoing message is `header`, then one or more blocks, then
//! `footer`, joined by newlines, and never longer than `max_len` characters.

use chrono::{Duration, NaiveDate};
use chrono_tz::Tz;

use crate::category::Category;
use crate::config::rules::{Trigger, TriggerRule};
use crate::ingest::types::{Event, Impact};
use crate::window::{Due, Occurrence};

/// Discord's message limit.
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 2000;

const ELLIPSIS: char = '…';

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Cut `s` to at most `max` characters, marking the cut with an ellipsis.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if char_len(s) <= max {
        return s.to_string();
    }
    if max == 0 {
        return String::new();
    }
    let mut out: String = s.chars().take(max - 1).collect();
    out.push(ELLIPSIS);
    out
}

/// HIGH-impact events whose local date lies in `[from, to]`, ordered by
/// time and then title.
pub fn select_digest_events(events: &[Event], from: NaiveDate, to: NaiveDate) -> Vec<&Event> {
    let mut out: Vec<&Event> = events
        .iter()
        .filter(|ev| ev.impact == Impact::High)
        .filter(|ev| {
            let d = ev.occurs_at.date_naive();
            d >= from && d <= to
        })
        .collect();
    out.sort_by(|a, b| {
        a.occurs_at
            .cmp(&b.occurs_at)
            .then_with(|| a.title.cmp(&b.title))
    });
    out
}

/// Local date range a calendar occurrence reports on.
pub fn digest_range(occurrence: &Occurrence<'_>) -> Option<(NaiveDate, NaiveDate)> {
    match occurrence {
        Occurrence::Day(d) => Some((*d, *d)),
        // The full week starting the day after the trigger date.
        Occurrence::Week { anchor_date } => {
            let from = *anchor_date + Duration::days(1);
            Some((from, from + Duration::days(6)))
        }
        Occurrence::Event(_) => None,
    }
}

/// Split blocks into messages of at most `max_len` characters.
///
/// Blocks keep their order and each lands in exactly one message; every
/// message starts with `header` and ends with `footer`. A block that cannot
/// fit even on its own is truncated.
pub fn chunk_messages(header: &str, blocks: &[String], footer: &str, max_len: usize) -> Vec<String> {
    let header_len = char_len(header);
    let footer_cost = if footer.is_empty() { 0 } else { 1 + char_len(footer) };
    let block_room = max_len.saturating_sub(header_len + 1 + footer_cost);

    let close = |mut msg: String| {
        if !footer.is_empty() {
            msg.push('\n');
            msg.push_str(footer);
        }
        msg
    };

    let mut out = Vec::new();
    let mut current = header.to_string();
    let mut current_len = header_len;
    let mut has_blocks = false;

    for block in blocks {
        let block = truncate_chars(block, block_room);
        let block_len = char_len(&block);
        if has_blocks && current_len + 1 + block_len + footer_cost > max_len {
            out.push(close(std::mem::replace(&mut current, header.to_string())));
            current_len = header_len;
            has_blocks = false;
        }
        if !current.is_empty() {
            current.push('\n');
            current_len += 1;
        }
        current.push_str(&block);
        current_len += block_len;
        has_blocks = true;
    }
    out.push(close(current));
    out
}

fn figures_line(ev: &Event) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(f) = &ev.forecast {
        parts.push(format!("Forecast: {f}"));
    }
    if let Some(p) = &ev.previous {
        parts.push(format!("Previous: {p}"));
    }
    (!parts.is_empty()).then(|| format!("   {}", parts.join(" | ")))
}

fn title_line(time_label: &str, ev: &Event) -> String {
    match &ev.currency {
        Some(cur) => format!("**{time_label}** {} | 🪙 {cur}", ev.title),
        None => format!("**{time_label}** {}", ev.title),
    }
}

/// Renders digests and single-event messages for one pass.
#[derive(Debug, Clone)]
pub struct MessageLayout<'a> {
    pub tz: Tz,
    pub reference_link: &'a str,
    pub max_len: usize,
}

impl MessageLayout<'_> {
    fn footer(&self) -> String {
        if self.reference_link.trim().is_empty() {
            String::new()
        } else {
            format!("🔗 {}", self.reference_link.trim())
        }
    }

    fn upcoming_block(&self, ev: &Event, time_fmt: &str) -> String {
        let label = ev.occurs_at.format(time_fmt).to_string();
        let mut block = title_line(&label, ev);
        if let Some(fig) = figures_line(ev) {
            block.push('\n');
            block.push_str(&fig);
        }
        block
    }

    fn result_block(&self, ev: &Event) -> String {
        let label = ev.occurs_at.format("%H:%M").to_string();
        let mut block = title_line(&label, ev);
        block.push_str(&format!(
            "\n   Actual: {} | Forecast: {} | Previous: {}",
            ev.actual.as_deref().unwrap_or("pending"),
            ev.forecast.as_deref().unwrap_or("-"),
            ev.previous.as_deref().unwrap_or("-"),
        ));
        block
    }

    /// Header, placeholder and blocks of a calendar digest.
    pub fn digest(&self, category: Category, occurrence: &Occurrence<'_>, events: &[Event]) -> Vec<String> {
        let Some((from, to)) = digest_range(occurrence) else {
            return Vec::new();
        };
        let selected = select_digest_events(events, from, to);
        let tz = self.tz.name();

        let (header, placeholder) = match category {
            Category::Results => (
                format!("📊 **High-impact results for {}** ({tz})", from.format("%A %d %B %Y")),
                "No high-impact events were scheduled for this day.",
            ),
            Category::Weekly => (
                format!(
                    "🗓️ **High-impact events {} – {}** ({tz})",
                    from.format("%a %d %b"),
                    to.format("%a %d %b %Y")
                ),
                "No high-impact events next week.",
            ),
            Category::Daily | Category::Reminder => (
                format!("📅 **High-impact events for {}** ({tz})", from.format("%A %d %B %Y")),
                "No high-impact events today.",
            ),
        };

        let blocks: Vec<String> = if selected.is_empty() {
            vec![placeholder.to_string()]
        } else {
            selected
                .into_iter()
                .map(|ev| match category {
                    Category::Results => self.result_block(ev),
                    Category::Weekly => self.upcoming_block(ev, "%a %d %b %H:%M"),
                    Category::Daily | Category::Reminder => self.upcoming_block(ev, "%H:%M"),
                })
                .collect()
        };

        chunk_messages(&header, &blocks, &self.footer(), self.max_len)
    }

    /// Message for one event-scoped occurrence.
    pub fn event_message(&self, category: Category, rule: &TriggerRule, ev: &Event) -> Vec<String> {
        let offset = match rule.trigger {
            Trigger::EventRelative { offset_minutes } => offset_minutes,
            Trigger::Absolute { .. } => 0,
        };
        let (header, block) = match category {
            Category::Results => ("📊 **Result released**".to_string(), self.result_block(ev)),
            _ => {
                let header = if offset < 0 {
                    format!("⏰ **Starting in {} min** | 🔥 {}", -offset, ev.impact)
                } else {
                    format!("⏰ **Starting now** | 🔥 {}", ev.impact)
                };
                (header, self.upcoming_block(ev, "%H:%M %Z"))
            }
        };
        chunk_messages(&header, &[block], &self.footer(), self.max_len)
    }

    pub fn render(&self, category: Category, rule: &TriggerRule, due: &Due<'_>, events: &[Event]) -> Vec<String> {
        match due.occurrence {
            Occurrence::Event(ev) => self.event_message(category, rule, ev),
            ref calendar => self.digest(category, calendar, events),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ev(title: &str, h: u32, m: u32, impact: Impact) -> Event {
        Event {
            title: title.into(),
            impact,
            occurs_at: Utc.with_ymd_and_hms(2024, 3, 1, h, m, 0).unwrap().with_timezone(&Tz::UTC),
            currency: Some("USD".into()),
            actual: None,
            forecast: Some("3.1%".into()),
            previous: None,
        }
    }

    fn layout() -> MessageLayout<'static> {
        MessageLayout {
            tz: Tz::UTC,
            reference_link: "https://example.test/calendar",
            max_len: DEFAULT_MAX_MESSAGE_LEN,
        }
    }

    #[test]
    fn selection_filters_sorts_and_breaks_ties_by_title() {
        let events = vec![
            ev("Zeta", 13, 30, Impact::High),
            ev("Alpha", 13, 30, Impact::High),
            ev("Early", 8, 0, Impact::High),
            ev("Quiet", 9, 0, Impact::Low),
        ];
        let d = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let titles: Vec<&str> = select_digest_events(&events, d, d)
            .iter()
            .map(|e| e.title.as_str())
            .collect();
        assert_eq!(titles, vec!["Early", "Alpha", "Zeta"]);
    }

    #[test]
    fn chunking_respects_limit_and_order() {
        let blocks: Vec<String> = (0..40).map(|i| format!("block-{i:02} {}", "x".repeat(30))).collect();
        let msgs = chunk_messages("HEADER", &blocks, "FOOTER", 200);
        assert!(msgs.len() > 1);
        let mut seen = Vec::new();
        for m in &msgs {
            assert!(m.chars().count() <= 200, "too long: {}", m.chars().count());
            let lines: Vec<&str> = m.lines().collect();
            assert_eq!(lines.first(), Some(&"HEADER"));
            assert_eq!(lines.last(), Some(&"FOOTER"));
            seen.extend(lines[1..lines.len() - 1].iter().map(|s| s.to_string()));
        }
        assert_eq!(seen, blocks);
    }

    #[test]
    fn oversized_block_is_truncated() {
        let msgs = chunk_messages("H", &["y".repeat(500)], "F", 100);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].chars().count(), 100);
        assert!(msgs[0].contains('…'));
    }

    #[test]
    fn empty_digest_has_placeholder_and_footer() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let msgs = layout().digest(Category::Daily, &Occurrence::Day(d), &[]);
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].contains("No high-impact events today."));
        assert!(msgs[0].ends_with("🔗 https://example.test/calendar"));
    }

    #[test]
    fn weekly_range_starts_next_day() {
        let sunday = NaiveDate::from_ymd_opt(2024, 2, 25).unwrap();
        let (from, to) = digest_range(&Occurrence::Week { anchor_date: sunday }).unwrap();
        assert_eq!(from, NaiveDate::from_ymd_opt(2024, 2, 26).unwrap());
        assert_eq!(to, NaiveDate::from_ymd_opt(2024, 3, 3).unwrap());

        let events = vec![ev("CPI", 13, 30, Impact::High)];
        let msgs = layout().digest(Category::Weekly, &Occurrence::Week { anchor_date: sunday }, &events);
        assert!(msgs[0].contains("**Fri 01 Mar 13:30** CPI | 🪙 USD"));
    }

    #[test]
    fn results_show_pending_actual() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let events = vec![ev("CPI", 13, 30, Impact::High)];
        let msgs = layout().digest(Category::Results, &Occurrence::Day(d), &events);
        assert!(msgs[0].contains("Actual: pending | Forecast: 3.1% | Previous: -"));
    }

    #[test]
    fn reminder_mentions_lead_time() {
        let rule = TriggerRule::per_event(-30, 120);
        let e = ev("CPI Release", 13, 30, Impact::High);
        let msgs = layout().event_message(Category::Reminder, &rule, &e);
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].starts_with("⏰ **Starting in 30 min** | 🔥 HIGH"));
        assert!(msgs[0].contains("CPI Release"));
        assert!(msgs[0].contains("Forecast: 3.1%"));
    }
}
