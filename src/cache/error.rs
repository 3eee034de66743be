//! Error taxonomy for the offline cache.

use thiserror::Error;

use crate::worker::WorkerState;

/// Errors surfaced by the cache controller and the worker host.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
  /// A manifest URL could not be fetched or stored; the install attempt is void.
  #[error("precache of {url} failed: {reason}")]
  PrecacheFailure { url: String, reason: String },

  /// A passed-through request failed on the network with no cache involved.
  #[error("network unavailable: {0}")]
  NetworkUnavailable(String),

  /// Network failed and nothing usable was cached for the request.
  #[error("{url} is not available offline: {reason}")]
  NotAvailable { url: String, reason: String },

  #[error("cache storage failed: {0}")]
  Storage(String),

  #[error("invalid url {url}: {reason}")]
  InvalidUrl { url: String, reason: String },

  #[error("worker is redundant and receives no further events")]
  Redundant,

  #[error("invalid worker transition from {from:?} to {to:?}")]
  InvalidTransition { from: WorkerState, to: WorkerState },
}

impl From<color_eyre::Report> for CacheError {
  fn from(report: color_eyre::Report) -> Self {
    Self::Storage(report.to_string())
  }
}
