//! Versioned offline cache for the web shell.
//!
//! This module provides the network-first caching layer that:
//! - Precaches a fixed manifest into a named cache generation on install
//! - Deletes every other generation on activation
//! - Answers intercepted GET requests from the network, storing 2xx responses
//! - Falls back to the stored response, or the offline page for HTML, when the network fails

mod controller;
mod error;
mod request;
mod storage;

pub use controller::{ActivateReport, FetchOutcome, InstallReport, OfflineCacheController};
pub use error::CacheError;
pub use request::{Request, Response};
#[cfg(test)]
pub use request::RequestKey;
pub use storage::{CacheStorage, SqliteStorage};
