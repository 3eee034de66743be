//! Worker instances and their lifecycle state.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use crate::cache::{
  ActivateReport, CacheError, CacheStorage, FetchOutcome, InstallReport, OfflineCacheController,
  Request,
};
use crate::net::Network;

/// Unique identifier for a worker instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(u64);

impl WorkerId {
  fn next() -> Self {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    Self(COUNTER.fetch_add(1, Ordering::Relaxed))
  }
}

impl fmt::Display for WorkerId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "worker-{}", self.0)
  }
}

/// Worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  /// Precaching the manifest.
  Installing,
  /// Installed, waiting to take over.
  Installed,
  /// Cleaning up stale generations.
  Activating,
  /// Intercepting fetches.
  Activated,
  /// Replaced or failed. Terminal.
  Redundant,
}

impl WorkerState {
  fn can_become(self, next: WorkerState) -> bool {
    use WorkerState::*;
    matches!(
      (self, next),
      (Installing, Installed)
        | (Installed, Activating)
        | (Activating, Activated)
        | (Installing | Installed | Activating | Activated, Redundant)
    )
  }
}

/// One worker instance wrapping a cache controller.
pub struct Worker<S: CacheStorage, N: Network> {
  id: WorkerId,
  state: WorkerState,
  state_changed_at: DateTime<Utc>,
  controller: OfflineCacheController<S, N>,
}

impl<S: CacheStorage, N: Network> Worker<S, N> {
  pub fn new(controller: OfflineCacheController<S, N>) -> Self {
    Self {
      id: WorkerId::next(),
      state: WorkerState::Installing,
      state_changed_at: Utc::now(),
      controller,
    }
  }

  /// A worker whose generation is already installed and active, e.g. after a restart.
  pub fn restored(controller: OfflineCacheController<S, N>) -> Self {
    Self {
      state: WorkerState::Activated,
      ..Self::new(controller)
    }
  }

  pub fn id(&self) -> WorkerId {
    self.id
  }

  pub fn state(&self) -> WorkerState {
    self.state
  }

  pub fn state_changed_at(&self) -> DateTime<Utc> {
    self.state_changed_at
  }

  pub fn version_key(&self) -> &str {
    self.controller.version_key()
  }

  fn transition(&mut self, next: WorkerState) -> Result<(), CacheError> {
    if self.state == WorkerState::Redundant {
      return Err(CacheError::Redundant);
    }
    if !self.state.can_become(next) {
      return Err(CacheError::InvalidTransition {
        from: self.state,
        to: next,
      });
    }
    info!(worker = %self.id, from = ?self.state, to = ?next, "worker state change");
    self.state = next;
    self.state_changed_at = Utc::now();
    Ok(())
  }

  pub fn retire(&mut self) {
    // Already redundant is fine here
    let _ = self.transition(WorkerState::Redundant);
  }

  /// Run the install event. A failed install leaves the worker redundant.
  pub async fn install(&mut self) -> Result<InstallReport, CacheError> {
    if self.state != WorkerState::Installing {
      return Err(self.unexpected(WorkerState::Installed));
    }
    match self.controller.on_install().await {
      Ok(report) => {
        self.transition(WorkerState::Installed)?;
        Ok(report)
      }
      Err(err) => {
        self.retire();
        Err(err)
      }
    }
  }

  /// Run the activate event. A failed activation leaves the worker redundant.
  pub async fn activate(&mut self) -> Result<ActivateReport, CacheError> {
    self.transition(WorkerState::Activating)?;
    match self.controller.on_activate().await {
      Ok(report) => {
        self.transition(WorkerState::Activated)?;
        Ok(report)
      }
      Err(err) => {
        self.retire();
        Err(err)
      }
    }
  }

  /// Deliver a fetch event. Workers that are not active do not intercept.
  pub async fn handle_fetch(&self, request: &Request) -> Result<FetchOutcome, CacheError> {
    match self.state {
      WorkerState::Redundant => Err(CacheError::Redundant),
      WorkerState::Activated => self.controller.on_fetch(request).await,
      _ => Ok(FetchOutcome::Bypassed),
    }
  }

  fn unexpected(&self, to: WorkerState) -> CacheError {
    match self.state {
      WorkerState::Redundant => CacheError::Redundant,
      from => CacheError::InvalidTransition { from, to },
    }
  }
}
