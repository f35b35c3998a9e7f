// tests/metrics_pass.rs
#![cfg(feature = "strict-metrics")]
mod common;

use calendar_notifier::ingest::feed::JsonFeed;
use calendar_notifier::{Dispatcher, MemoryLedgerStore};
use common::{test_config, utc, RecordingNotifier};
use metrics_exporter_prometheus::PrometheusBuilder;

#[tokio::test]
async fn metrics_exposed_after_pass() {
    // Install a local recorder for the test
    let handle = PrometheusBuilder::new().install_recorder().expect("recorder");

    let body = std::fs::read_to_string("tests/fixtures/calendar.json").expect("fixture");
    let feed = JsonFeed::from_fixture_str(&body);
    let cfg = test_config();
    let notifier = RecordingNotifier::new();
    let store = MemoryLedgerStore::new();

    let report = Dispatcher::new(&cfg, &feed, &notifier, &store)
        .run_pass(utc(2024, 3, 1, 13, 0, 0))
        .await
        .unwrap();
    assert!(report.delivered_count() >= 1);

    let out = handle.render();
    for needle in [
        "notify_passes_total",
        "notify_delivered_total",
        "ingest_discarded_total",
        "notify_pass_last_run_ts",
    ] {
        assert!(out.contains(needle), "exposition missing '{needle}'\n{out}");
    }
}
