// tests/ingest_fixture.rs
use calendar_notifier::digest::select_digest_events;
use calendar_notifier::ingest::feed::JsonFeed;
use calendar_notifier::ingest::normalize_feed;
use calendar_notifier::{FeedSource, Impact};
use chrono::NaiveDate;
use chrono_tz::Tz;

const CALENDAR_JSON: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/tests/fixtures/calendar.json"
));

#[tokio::test]
async fn fixture_feed_normalizes() {
    let feed = JsonFeed::from_fixture_str(CALENDAR_JSON);
    let payload = feed.fetch().await.expect("fixture parses");
    let normalized = normalize_feed(&payload, Tz::UTC);

    assert_eq!(normalized.records, 10);
    assert_eq!(normalized.discarded, 2);
    assert_eq!(normalized.duplicates, 1);
    assert_eq!(normalized.events.len(), 7);

    let ecb = normalized
        .events
        .iter()
        .find(|e| e.title == "ECB Press Conference")
        .unwrap();
    assert_eq!(ecb.impact, Impact::High);
    assert_eq!(ecb.currency.as_deref(), Some("EUR"));
    assert_eq!(ecb.occurs_at.format("%H:%M").to_string(), "13:45");

    let holiday = normalized
        .events
        .iter()
        .find(|e| e.title == "Bank Holiday")
        .unwrap();
    assert_eq!(holiday.impact, Impact::Unknown);

    assert!(normalized
        .events
        .iter()
        .any(|e| e.title == "Non-Farm & Payrolls"));
}

#[tokio::test]
async fn fixture_daily_selection_is_sorted() {
    let payload = JsonFeed::from_fixture_str(CALENDAR_JSON).fetch().await.unwrap();
    let normalized = normalize_feed(&payload, Tz::UTC);
    let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

    let titles: Vec<&str> = select_digest_events(&normalized.events, day, day)
        .into_iter()
        .map(|e| e.title.as_str())
        .collect();
    assert_eq!(
        titles,
        vec!["CPI Release", "ECB Press Conference", "Core PCE Price Index"]
    );
}

#[tokio::test]
async fn display_timezone_shifts_local_dates() {
    let payload = JsonFeed::from_fixture_str(CALENDAR_JSON).fetch().await.unwrap();
    let tokyo = normalize_feed(&payload, chrono_tz::Asia::Tokyo);
    let pce = tokyo
        .events
        .iter()
        .find(|e| e.title == "Core PCE Price Index")
        .unwrap();
    // 15:00 UTC is past midnight in Tokyo.
    assert_eq!(pce.occurs_at.date_naive(), NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
}
