// src/dispatch.rs
//! # Dispatch Coordinator
//! One evaluation pass: fetch → normalize → filter → evaluate each category
//! → persist. The ledger is mutated in memory only after a confirmed
//! handoff and written once at the end, so an aborted pass leaves the
//! stored ledger untouched.

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use std::collections::BTreeMap;

use crate::category::Category;
use crate::config::AppConfig;
use crate::digest::MessageLayout;
use crate::error::PassError;
use crate::ingest::types::{Event, FeedSource};
use crate::ingest::normalize_feed;
use crate::ledger::{Ledger, LedgerStore};
use crate::notify::Notifier;
use crate::window::{self, Due};

/// Calendar keys older than this many days are dropped before persisting.
/// Must stay above the longest calendar lookback (tolerance caps at 7 days).
pub const LEDGER_RETENTION_DAYS: i64 = 35;

/// One-time metrics registration.
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("notify_passes_total", "Evaluation passes started.");
        describe_counter!("notify_pass_failures_total", "Passes aborted by a fatal error.");
        describe_counter!("notify_delivered_total", "Occurrences delivered and marked.");
        describe_counter!(
            "notify_delivery_failures_total",
            "Category deliveries that failed and were left unmarked."
        );
        describe_counter!(
            "ingest_discarded_total",
            "Feed records dropped for lack of a usable timestamp."
        );
        describe_gauge!("notify_pass_last_run_ts", "Unix ts of the last completed pass.");
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassPhase {
    Start,
    Fetch,
    Normalize,
    Filter,
    Evaluate,
    Persist,
    Done,
}

impl PassPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassPhase::Start => "start",
            PassPhase::Fetch => "fetch",
            PassPhase::Normalize => "normalize",
            PassPhase::Filter => "filter",
            PassPhase::Evaluate => "evaluate",
            PassPhase::Persist => "persist",
            PassPhase::Done => "done",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub key: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryOutcome {
    /// Keys delivered and marked in this pass, in delivery order.
    pub delivered: Vec<String>,
    /// Set when a handoff failed; the category stopped there for this pass.
    pub failure: Option<DeliveryFailure>,
    /// Due occurrences held back by the per-pass message cap.
    pub capped: usize,
    pub pending: usize,
    pub missed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct PassReport {
    pub records: usize,
    pub discarded: usize,
    pub duplicates: usize,
    /// Events left after the impact filter.
    pub eligible: usize,
    pub outcomes: BTreeMap<Category, CategoryOutcome>,
    pub ledger_recovered: bool,
    pub persisted: bool,
}

impl PassReport {
    pub fn delivered(&self, category: Category) -> &[String] {
        self.outcomes
            .get(&category)
            .map(|o| o.delivered.as_slice())
            .unwrap_or(&[])
    }

    pub fn delivered_count(&self) -> usize {
        self.outcomes.values().map(|o| o.delivered.len()).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = (Category, &DeliveryFailure)> {
        self.outcomes
            .iter()
            .filter_map(|(c, o)| o.failure.as_ref().map(|f| (*c, f)))
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }
}

pub struct Dispatcher<'a> {
    config: &'a AppConfig,
    feed: &'a dyn FeedSource,
    notifier: &'a dyn Notifier,
    store: &'a dyn LedgerStore,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        config: &'a AppConfig,
        feed: &'a dyn FeedSource,
        notifier: &'a dyn Notifier,
        store: &'a dyn LedgerStore,
    ) -> Self {
        Self {
            config,
            feed,
            notifier,
            store,
        }
    }

    fn enter(&self, phase: PassPhase) {
        tracing::debug!(phase = phase.as_str(), "pass phase");
    }

    /// Run one pass as of `now`.
    pub async fn run_pass(&self, now: DateTime<Utc>) -> Result<PassReport, PassError> {
        ensure_metrics_described();
        counter!("notify_passes_total").increment(1);

        self.enter(PassPhase::Start);
        let load = self.store.load();
        let mut ledger = load.ledger;
        let mut report = PassReport {
            ledger_recovered: load.recovered,
            ..Default::default()
        };

        self.enter(PassPhase::Fetch);
        let payload = match self.feed.fetch().await {
            Ok(v) => v,
            Err(source) => {
                counter!("notify_pass_failures_total").increment(1);
                tracing::error!(feed = self.feed.name(), error = %source, "feed unavailable, pass aborted");
                return Err(PassError::FeedUnavailable {
                    feed: self.feed.name().to_string(),
                    source,
                });
            }
        };

        self.enter(PassPhase::Normalize);
        let normalized = normalize_feed(&payload, self.config.timezone);
        report.records = normalized.records;
        report.discarded = normalized.discarded;
        report.duplicates = normalized.duplicates;
        counter!("ingest_discarded_total").increment(normalized.discarded as u64);

        self.enter(PassPhase::Filter);
        let events: Vec<Event> = normalized
            .events
            .into_iter()
            .filter(|ev| self.config.notify_impacts.contains(&ev.impact))
            .collect();
        report.eligible = events.len();

        self.enter(PassPhase::Evaluate);
        for category in Category::ALL {
            let outcome = self.evaluate_category(category, now, &events, &mut ledger).await;
            report.outcomes.insert(category, outcome);
        }

        self.enter(PassPhase::Persist);
        let cutoff = now.with_timezone(&self.config.timezone).date_naive()
            - Duration::days(LEDGER_RETENTION_DAYS);
        let pruned = ledger.prune_calendar_before(cutoff);
        if pruned > 0 {
            tracing::debug!(pruned, %cutoff, "old calendar keys dropped from ledger");
        }
        if ledger.is_dirty() {
            if let Err(e) = self.store.persist(&ledger) {
                counter!("notify_pass_failures_total").increment(1);
                tracing::error!(error = %e, "ledger persist failed");
                return Err(e.into());
            }
            report.persisted = true;
        }

        self.enter(PassPhase::Done);
        gauge!("notify_pass_last_run_ts").set(now.timestamp() as f64);
        tracing::info!(
            records = report.records,
            discarded = report.discarded,
            eligible = report.eligible,
            delivered = report.delivered_count(),
            failures = report.failures().count(),
            persisted = report.persisted,
            "pass complete"
        );
        Ok(report)
    }

    async fn evaluate_category(
        &self,
        category: Category,
        now: DateTime<Utc>,
        events: &[Event],
        ledger: &mut Ledger,
    ) -> CategoryOutcome {
        let rule = self.config.rules.get(category);
        let eval = window::evaluate(category, rule, now, events, self.config.timezone, ledger);

        let mut outcome = CategoryOutcome {
            pending: eval.pending,
            missed: eval.missed,
            ..Default::default()
        };

        let mut due: Vec<Due<'_>> = eval.due;
        if rule.is_event_scoped() && due.len() > self.config.max_event_messages_per_pass {
            outcome.capped = due.len() - self.config.max_event_messages_per_pass;
            due.truncate(self.config.max_event_messages_per_pass);
            tracing::warn!(category = %category, capped = outcome.capped, "per-pass message cap reached");
        }

        let layout = MessageLayout {
            tz: self.config.timezone,
            reference_link: &self.config.reference_link,
            max_len: self.config.max_message_len,
        };

        'occurrences: for item in due {
            let messages = layout.render(category, rule, &item, events);
            for (i, message) in messages.iter().enumerate() {
                if let Err(e) = self.notifier.deliver(message, category).await {
                    counter!("notify_delivery_failures_total", "category" => category.as_str())
                        .increment(1);
                    tracing::warn!(
                        category = %category,
                        key = %item.key,
                        chunk = i + 1,
                        chunks = messages.len(),
                        error = %format!("{e:#}"),
                        "delivery failed; will retry while window is open"
                    );
                    outcome.failure = Some(DeliveryFailure {
                        key: item.key.clone(),
                        error: format!("{e:#}"),
                    });
                    break 'occurrences;
                }
            }

            ledger.mark(category, item.key.clone());
            counter!("notify_delivered_total", "category" => category.as_str()).increment(1);
            tracing::info!(category = %category, key = %item.key, chunks = messages.len(), "delivered");
            outcome.delivered.push(item.key);
        }

        if outcome.missed > 0 {
            tracing::debug!(category = %category, missed = outcome.missed, "windows closed without delivery");
        }
        outcome
    }
}
