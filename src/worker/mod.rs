//! Host adapter that drives cache controllers through the worker lifecycle.
//!
//! A registration holds at most one installing, one waiting and one active
//! worker. Installing a new version precaches into its own generation while the
//! old worker keeps serving; only after a successful install does the new
//! worker skip waiting, prune stale generations, claim every client and
//! replace the old one.

mod clients;
mod state;

pub use clients::Clients;
pub use state::{Worker, WorkerState};

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{
  ActivateReport, CacheError, CacheStorage, FetchOutcome, InstallReport, OfflineCacheController,
  Request,
};
use crate::net::Network;

/// Result of installing a new worker version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport {
  pub install: InstallReport,
  /// Present when the worker took over right away
  pub activate: Option<ActivateReport>,
  /// Clients that switched to the new worker
  pub claimed: usize,
}

pub struct Registration<S: CacheStorage, N: Network> {
  waiting: Option<Worker<S, N>>,
  active: Option<Worker<S, N>>,
  clients: Clients,
  /// Used for requests no worker intercepts
  network: Arc<N>,
}

impl<S: CacheStorage, N: Network> Registration<S, N> {
  pub fn new(network: Arc<N>) -> Self {
    Self {
      waiting: None,
      active: None,
      clients: Clients::new(),
      network,
    }
  }

  pub fn active(&self) -> Option<&Worker<S, N>> {
    self.active.as_ref()
  }

  #[allow(dead_code)]
  pub fn waiting(&self) -> Option<&Worker<S, N>> {
    self.waiting.as_ref()
  }

  #[allow(dead_code)]
  pub fn clients(&self) -> &Clients {
    &self.clients
  }

  #[allow(dead_code)]
  pub fn clients_mut(&mut self) -> &mut Clients {
    &mut self.clients
  }

  /// Resume a previously activated generation without re-running install.
  pub fn restore(&mut self, controller: OfflineCacheController<S, N>) {
    let worker = Worker::restored(controller);
    info!(worker = %worker.id(), generation = worker.version_key(), "restored active worker");
    self.replace_active(worker);
  }

  /// Install a controller as a new worker version.
  ///
  /// On failure the new worker is discarded and the current active worker
  /// stays in control.
  pub async fn install(
    &mut self,
    controller: OfflineCacheController<S, N>,
  ) -> Result<UpdateReport, CacheError> {
    let mut worker = Worker::new(controller);
    info!(worker = %worker.id(), generation = worker.version_key(), "installing worker");

    let install = match worker.install().await {
      Ok(report) => report,
      Err(err) => {
        warn!(worker = %worker.id(), error = %err, "install failed, keeping current worker");
        return Err(err);
      }
    };

    if let Some(mut previous) = self.waiting.replace(worker) {
      previous.retire();
    }

    let (activate, claimed) = if install.skip_waiting {
      match self.skip_waiting().await? {
        Some((report, claimed)) => (Some(report), claimed),
        None => (None, 0),
      }
    } else {
      (None, 0)
    };

    Ok(UpdateReport {
      install,
      activate,
      claimed,
    })
  }

  /// Activate the waiting worker now.
  ///
  /// Returns None when nothing is waiting.
  pub async fn skip_waiting(&mut self) -> Result<Option<(ActivateReport, usize)>, CacheError> {
    let Some(mut worker) = self.waiting.take() else {
      return Ok(None);
    };

    let report = worker.activate().await?;
    let claimed = if report.claim_clients {
      self.clients.claim(worker.id())
    } else {
      0
    };
    info!(worker = %worker.id(), deleted = report.deleted.len(), claimed, "worker activated");
    self.replace_active(worker);

    Ok(Some((report, claimed)))
  }

  /// Route a request through the active worker, or straight to the network.
  ///
  /// Requests nobody intercepts never touch the cache; their network error
  /// is returned as is.
  pub async fn dispatch_fetch(&self, request: &Request) -> Result<FetchOutcome, CacheError> {
    if let Some(worker) = &self.active {
      match worker.handle_fetch(request).await? {
        FetchOutcome::Bypassed => {}
        outcome => return Ok(outcome),
      }
    }

    debug!(method = %request.method, url = %request.url, "passing request through");
    self
      .network
      .fetch(request)
      .await
      .map(FetchOutcome::Fetched)
      .map_err(|e| CacheError::NetworkUnavailable(e.to_string()))
  }

  fn replace_active(&mut self, worker: Worker<S, N>) {
    if let Some(mut previous) = self.active.replace(worker) {
      previous.retire();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{RequestKey, Response, SqliteStorage};
  use crate::config::CacheConfig;
  use crate::net::fake::FakeNetwork;
  use url::Url;

  const ORIGIN: &str = "https://app.example/";

  fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
  }

  struct Host {
    storage: Arc<SqliteStorage>,
    network: Arc<FakeNetwork>,
    registration: Registration<SqliteStorage, FakeNetwork>,
  }

  impl Host {
    fn new() -> Self {
      let network = Arc::new(FakeNetwork::new());
      network.respond(url("/").as_str(), Response::new(200, "home"));
      network.respond(url("/offline.html").as_str(), Response::new(200, "offline"));
      Self {
        storage: Arc::new(SqliteStorage::open_in_memory().unwrap()),
        registration: Registration::new(Arc::clone(&network)),
        network,
      }
    }

    fn controller(&self, version: &str) -> OfflineCacheController<SqliteStorage, FakeNetwork> {
      let config = CacheConfig {
        version_key: version.to_string(),
        origin: Url::parse(ORIGIN).unwrap(),
        manifest: vec!["/".to_string(), "/offline.html".to_string()],
        offline_fallback_url: "/offline.html".to_string(),
        exclusion_patterns: vec!["/api/".to_string()],
      };
      OfflineCacheController::new(config, Arc::clone(&self.storage), Arc::clone(&self.network))
    }
  }

  #[tokio::test]
  async fn install_activates_immediately() {
    let mut host = Host::new();
    let controller = host.controller("v1");

    let report = host.registration.install(controller).await.unwrap();

    assert_eq!(report.install.stored, 2);
    assert!(report.activate.is_some());
    let active = host.registration.active().unwrap();
    assert_eq!(active.state(), WorkerState::Activated);
    assert_eq!(active.version_key(), "v1");
    assert!(host.registration.waiting().is_none());
  }

  #[tokio::test]
  async fn version_bump_rotates_generation() {
    let mut host = Host::new();
    let v1 = host.controller("v1");
    host.registration.install(v1).await.unwrap();

    let v2 = host.controller("v2");
    let report = host.registration.install(v2).await.unwrap();

    assert_eq!(report.activate.unwrap().deleted, vec!["v1"]);
    assert_eq!(host.storage.generation_names().unwrap(), vec!["v2"]);
    assert_eq!(host.registration.active().unwrap().version_key(), "v2");
  }

  #[tokio::test]
  async fn failed_install_keeps_previous_worker() {
    let mut host = Host::new();
    let v1 = host.controller("v1");
    host.registration.install(v1).await.unwrap();
    let v1_id = host.registration.active().unwrap().id();

    host.network.fail(url("/").as_str());
    let v2 = host.controller("v2");
    let err = host.registration.install(v2).await.unwrap_err();

    assert!(matches!(err, CacheError::PrecacheFailure { .. }));
    let active = host.registration.active().unwrap();
    assert_eq!(active.id(), v1_id);
    assert_eq!(active.version_key(), "v1");
    assert_eq!(host.storage.generation_names().unwrap(), vec!["v1"]);
  }

  #[tokio::test]
  async fn activation_claims_open_clients() {
    let mut host = Host::new();
    host.registration.clients_mut().open_window(url("/mobile"));
    host.registration.clients_mut().open_window(url("/mobile/vehicles"));

    let v1 = host.controller("v1");
    let report = host.registration.install(v1).await.unwrap();

    let active_id = host.registration.active().unwrap().id();
    assert_eq!(report.claimed, 2);
    assert!(host
      .registration
      .clients()
      .iter()
      .all(|c| c.controller == Some(active_id)));
  }

  #[tokio::test]
  async fn dispatch_without_worker_goes_to_network() {
    let host = Host::new();
    let outcome = host
      .registration
      .dispatch_fetch(&Request::get(url("/")))
      .await
      .unwrap();

    assert_eq!(outcome, FetchOutcome::Fetched(Response::new(200, "home")));
    assert!(host.storage.generation_names().unwrap().is_empty());
  }

  #[tokio::test]
  async fn excluded_failure_propagates_without_cache_lookup() {
    let mut host = Host::new();
    let v1 = host.controller("v1");
    host.registration.install(v1).await.unwrap();
    host
      .storage
      .put("v1", &RequestKey::get(&url("/api/status")), &Response::new(200, "stale"))
      .unwrap();
    host.network.set_offline(true);

    let err = host
      .registration
      .dispatch_fetch(&Request::get(url("/api/status")))
      .await
      .unwrap_err();
    assert!(matches!(err, CacheError::NetworkUnavailable(_)));

    let err = host
      .registration
      .dispatch_fetch(&Request::new("POST", url("/api/login")))
      .await
      .unwrap_err();
    assert!(matches!(err, CacheError::NetworkUnavailable(_)));
  }

  #[tokio::test]
  async fn excluded_success_is_never_cached() {
    let mut host = Host::new();
    let v1 = host.controller("v1");
    host.registration.install(v1).await.unwrap();
    host
      .network
      .respond(url("/api/status").as_str(), Response::new(200, "ok"));

    let outcome = host
      .registration
      .dispatch_fetch(&Request::get(url("/api/status")))
      .await
      .unwrap();

    assert_eq!(outcome, FetchOutcome::Fetched(Response::new(200, "ok")));
    assert_eq!(host.storage.entry_count("v1").unwrap(), 2);
  }

  #[tokio::test]
  async fn offline_navigation_after_install_uses_cache() {
    let mut host = Host::new();
    let v1 = host.controller("v1");
    host.registration.install(v1).await.unwrap();
    host.network.set_offline(true);

    let home = host
      .registration
      .dispatch_fetch(&Request::navigate(url("/")))
      .await
      .unwrap();
    let unknown = host
      .registration
      .dispatch_fetch(&Request::navigate(url("/employees/42")))
      .await
      .unwrap();

    assert_eq!(home.response().unwrap().body, b"home");
    assert_eq!(unknown, FetchOutcome::ServedOfflinePage(Response::new(200, "offline")));
  }

  #[tokio::test]
  async fn restore_resumes_installed_generation() {
    let mut host = Host::new();
    host
      .storage
      .put("v1", &RequestKey::get(&url("/")), &Response::new(200, "cached home"))
      .unwrap();
    host.network.set_offline(true);

    let v1 = host.controller("v1");
    host.registration.restore(v1);

    let outcome = host
      .registration
      .dispatch_fetch(&Request::navigate(url("/")))
      .await
      .unwrap();
    assert_eq!(outcome.response().unwrap().body, b"cached home");
  }
}
