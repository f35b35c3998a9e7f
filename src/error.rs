// src/error.rs
//! Error taxonomy of a notification pass.
//!
//! Only feed retrieval and ledger persistence can fail a pass. A malformed
//! record is counted and dropped, a failed delivery is reported per category
//! and an unreadable ledger loads as empty; none of those surface as `Err`.

use thiserror::Error;

/// Retrieving or decoding the event feed failed.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("feed returned HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("feed body is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Writing the ledger file failed.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("ledger encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Fatal pass failures. Nothing is persisted when the pass aborts at fetch.
#[derive(Debug, Error)]
pub enum PassError {
    #[error("feed `{feed}` unavailable: {source}")]
    FeedUnavailable {
        feed: String,
        #[source]
        source: FeedError,
    },
    #[error("could not persist ledger: {0}")]
    LedgerPersist(#[from] LedgerError),
}
