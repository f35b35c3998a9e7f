//! Sends one short test message to every configured destination.
//! Usage: `notify-probe [category...]` (default: all categories).

use calendar_notifier::{init_tracing, AppConfig, Category, Notifier, WebhookNotifier};
use chrono::Utc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::from_env()?;
    if cfg.destinations.is_empty() {
        anyhow::bail!("no destination configured (DISCORD_WEBHOOK_URL)");
    }
    let notifier = WebhookNotifier::new(cfg.destinations.clone())
        .with_timeout(cfg.request_timeout_secs)
        .with_retries(cfg.max_retries);

    let mut categories = std::env::args()
        .skip(1)
        .map(|a| a.parse::<Category>())
        .collect::<anyhow::Result<Vec<_>>>()?;
    if categories.is_empty() {
        categories = Category::ALL.to_vec();
    }

    let mut failed = 0usize;
    for category in categories {
        let msg = format!(
            "🔧 notify-probe: `{category}` destination reachable ({})",
            Utc::now().with_timezone(&cfg.timezone).format("%Y-%m-%d %H:%M %Z")
        );
        match notifier.deliver(&msg, category).await {
            Ok(()) => tracing::info!(category = %category, "probe delivered"),
            Err(e) => {
                failed += 1;
                tracing::warn!(category = %category, "probe failed: {e:#}");
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} destination(s) failed");
    }
    println!("notify-probe done");
    Ok(())
}
