// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod category;
pub mod config;
pub mod digest;
pub mod dispatch;
pub mod error;
pub mod ingest;
pub mod keys;
pub mod ledger;
pub mod notify;
pub mod window;

// ---- Re-exports for stable public API ----
pub use crate::category::Category;
pub use crate::config::AppConfig;
pub use crate::dispatch::{Dispatcher, PassReport};
pub use crate::error::{FeedError, LedgerError, PassError};
pub use crate::ingest::types::{Event, FeedSource, Impact};
pub use crate::ledger::{FileLedgerStore, Ledger, LedgerStore, MemoryLedgerStore};
pub use crate::notify::{LogNotifier, Notifier, WebhookNotifier};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber. `LOG_FORMAT=json` switches to JSON lines.
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("calendar_notifier=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}
