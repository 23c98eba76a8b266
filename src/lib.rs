//! Ticket scan sessions: debounced decode intake, remote validation, and a
//! bounded write-through scan history.
//!
//! # Examples
//!
//! In-memory history with [`core::history::ScanHistory`]:
//! ```
//! use ticketscan::{
//!     core::history::ScanHistory,
//!     scan::ScanDraft,
//!     types::{ScanStatus, Verdict},
//! };
//!
//! let mut history = ScanHistory::default();
//! let id = history.record(ScanDraft {
//!     code: "ABC123".to_string(),
//!     captured_at_ms: 1,
//!     event_id: "42".to_string(),
//! }).id;
//! history.resolve(id, Verdict::Valid).expect("resolve");
//! assert_eq!(history.get(id).map(|e| e.status), Some(ScanStatus::Valid));
//! ```
//!
//! Runtime usage with a SQLite store and the REST validator:
//! ```no_run
//! use std::sync::Arc;
//!
//! use ticketscan::{
//!     camera::feed::FeedDecoder,
//!     persist::{sqlite::SqliteHistoryStore, HistoryStore},
//!     runtime::handle::{spawn_scanner, RuntimeConfig},
//!     scan::EventContext,
//!     validate::http::ApiClient,
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let store = SqliteHistoryStore::open("history.db").expect("open sqlite");
//! let history = store.load().expect("load");
//! let api = Arc::new(ApiClient::new("https://api.example.com", "token"));
//! let (decoder, feed) = FeedDecoder::pair();
//! let handle = spawn_scanner(history, Box::new(store), api, Box::new(decoder), RuntimeConfig::default());
//! handle.start(EventContext::new("42", "Launch Night")).await.expect("start");
//! feed.push("ABC123").await;
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```
#![deny(missing_docs)]

/// Camera/decoder capability and bundled decoders.
pub mod camera;
/// Binary configuration.
pub mod config;
/// Scan history, debounce and stats.
pub mod core;
/// History persistence port and stores.
pub mod persist;
/// Single-writer runtime handle and events.
pub mod runtime;
/// Scan records and event context.
pub mod scan;
/// Shared primitive types and enums.
pub mod types;
/// Ticket validation port and REST client.
pub mod validate;
