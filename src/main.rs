//! Calendar notifier binary entrypoint.
//! Runs one evaluation pass (or one every `RUN_INTERVAL_SECS`) against the
//! configured feed, delivering due notifications to the webhooks.

use anyhow::{bail, Context, Result};
use calendar_notifier::{
    init_tracing, ingest::feed::JsonFeed, AppConfig, Dispatcher, FileLedgerStore, LedgerStore,
    LogNotifier, MemoryLedgerStore, Notifier, PassReport, WebhookNotifier,
};
use chrono::Utc;

fn log_report(report: &PassReport) {
    for (category, failure) in report.failures() {
        tracing::warn!(
            category = %category,
            key = %failure.key,
            error = %failure.error,
            "category delivery failed this pass"
        );
    }
    if report.ledger_recovered {
        tracing::warn!("ledger was unreadable and has been rebuilt from scratch");
    }
}

async fn run_once(dispatcher: &Dispatcher<'_>) -> Result<()> {
    let report = dispatcher.run_pass(Utc::now()).await?;
    log_report(&report);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when the file is absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::from_env().context("loading configuration")?;
    let Some(feed_url) = cfg.feed_url.clone() else {
        bail!("FEED_URL (or CRYPTOCRAFT_JSON_URL) is not set");
    };
    let feed = JsonFeed::from_url(feed_url).with_timeout(cfg.request_timeout_secs);

    let file_store = FileLedgerStore::new(&cfg.ledger_path);
    // Dry runs work on an in-memory copy so the real ledger is never touched.
    let (store, notifier): (Box<dyn LedgerStore>, Box<dyn Notifier>) =
        if cfg.dry_run || cfg.destinations.is_empty() {
            if !cfg.dry_run {
                tracing::warn!("no webhook configured, running as dry run");
            }
            (
                Box::new(MemoryLedgerStore::with_ledger(file_store.load().ledger)),
                Box::new(LogNotifier),
            )
        } else {
            (
                Box::new(file_store),
                Box::new(
                    WebhookNotifier::new(cfg.destinations.clone())
                        .with_timeout(cfg.request_timeout_secs)
                        .with_retries(cfg.max_retries),
                ),
            )
        };

    let dispatcher = Dispatcher::new(&cfg, &feed, notifier.as_ref(), store.as_ref());

    let Some(interval_secs) = cfg.run_interval_secs else {
        return run_once(&dispatcher).await;
    };

    tracing::info!(interval_secs, "running in loop mode");
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        // Passes run back to back on this task and never overlap.
        if let Err(e) = run_once(&dispatcher).await {
            tracing::warn!("pass failed: {e:#}");
        }
    }
}
