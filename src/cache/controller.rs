//! Offline cache controller: precache on install, prune on activate,
//! network-first with cache fallback on fetch.

use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::error::CacheError;
use super::request::{CachedResponse, Request, RequestKey, Response};
use super::storage::CacheStorage;
use crate::config::CacheConfig;
use crate::net::Network;

/// Outcome of a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
  pub generation: String,
  /// Number of manifest entries stored
  pub stored: usize,
  /// Cross-origin manifest entries that could not be fetched
  pub skipped: Vec<String>,
  /// Become active without waiting for clients of the previous worker to go away
  pub skip_waiting: bool,
}

/// Outcome of activation cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateReport {
  pub generation: String,
  /// Stale generations that were deleted
  pub deleted: Vec<String>,
  /// Take control of already open clients without a reload
  pub claim_clients: bool,
}

/// What happened to an intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
  /// Not intercepted; the host performs the request itself
  Bypassed,
  /// Live network response, returned unmodified
  Fetched(Response),
  /// Network failed, last stored response for this request
  ServedFromCache(CachedResponse),
  /// Network failed, nothing stored, HTML request got the offline page
  ServedOfflinePage(Response),
  /// Network failed and nothing could stand in for it
  Failed(CacheError),
}

impl FetchOutcome {
  /// The response handed back to the page, if any.
  #[allow(dead_code)]
  pub fn response(&self) -> Option<&Response> {
    match self {
      Self::Fetched(response) | Self::ServedOfflinePage(response) => Some(response),
      Self::ServedFromCache(cached) => Some(&cached.response),
      Self::Bypassed | Self::Failed(_) => None,
    }
  }
}

/// Versioned, network-first offline cache.
///
/// Only 2xx responses are stored, both at install time and at fetch time.
/// Other statuses pass through live and never replace a stored entry.
pub struct OfflineCacheController<S: CacheStorage, N: Network> {
  config: Arc<CacheConfig>,
  storage: Arc<S>,
  network: Arc<N>,
}

impl<S: CacheStorage, N: Network> OfflineCacheController<S, N> {
  pub fn new(config: CacheConfig, storage: Arc<S>, network: Arc<N>) -> Self {
    Self {
      config: Arc::new(config),
      storage,
      network,
    }
  }

  pub fn version_key(&self) -> &str {
    &self.config.version_key
  }

  /// Fetch and store every manifest URL into the current generation.
  ///
  /// All same-origin entries must succeed or nothing is written. Cross-origin
  /// entries that fail are skipped and reported.
  pub async fn on_install(&self) -> Result<InstallReport, CacheError> {
    let generation = self.version_key();
    let urls = self.config.manifest_urls()?;
    info!(generation, entries = urls.len(), "installing cache generation");

    let fetches = urls.into_iter().map(|url| async move {
      let request = Request::get(url);
      let result = self.network.fetch(&request).await;
      (request, result)
    });

    let mut entries = Vec::new();
    let mut skipped = Vec::new();

    for (request, result) in join_all(fetches).await {
      let reason = match result {
        Ok(response) if response.is_success() => {
          entries.push((request.key(), response));
          continue;
        }
        Ok(response) => format!("unexpected status {}", response.status),
        Err(err) => err.to_string(),
      };

      if self.config.is_same_origin(&request.url) {
        warn!(url = %request.url, %reason, "precache failed, aborting install");
        return Err(CacheError::PrecacheFailure {
          url: request.url.to_string(),
          reason,
        });
      }

      warn!(url = %request.url, %reason, "skipping cross-origin precache entry");
      skipped.push(request.url.to_string());
    }

    self.storage.put_all(generation, &entries)?;
    info!(generation, stored = entries.len(), skipped = skipped.len(), "precache complete");

    Ok(InstallReport {
      generation: generation.to_string(),
      stored: entries.len(),
      skipped,
      skip_waiting: true,
    })
  }

  /// Delete every generation other than the current one.
  pub async fn on_activate(&self) -> Result<ActivateReport, CacheError> {
    let generation = self.version_key();
    let mut deleted = Vec::new();

    for name in self.storage.generation_names()? {
      if name == generation {
        continue;
      }
      info!(stale = %name, current = generation, "deleting stale cache generation");
      if self.storage.delete_generation(&name)? {
        deleted.push(name);
      }
    }

    Ok(ActivateReport {
      generation: generation.to_string(),
      deleted,
      claim_clients: true,
    })
  }

  /// Handle one intercepted request.
  ///
  /// `Err` is reserved for storage failures during fallback lookup; network
  /// failures end up in the returned outcome.
  pub async fn on_fetch(&self, request: &Request) -> Result<FetchOutcome, CacheError> {
    if !self.intercepts(request) {
      debug!(method = %request.method, url = %request.url, "bypassing cache");
      return Ok(FetchOutcome::Bypassed);
    }

    let generation = self.version_key();
    let key = request.key();

    let err = match self.network.fetch(request).await {
      Ok(response) => {
        if response.is_success() {
          // A failed write must not hide the live response
          if let Err(e) = self.storage.put(generation, &key, &response) {
            warn!(url = %key.url, error = %e, "failed to store response");
          }
        } else {
          debug!(url = %key.url, status = response.status, "not caching unsuccessful response");
        }
        return Ok(FetchOutcome::Fetched(response));
      }
      Err(err) => err,
    };

    if let Some(cached) = self.storage.match_entry(generation, &key)? {
      warn!(url = %key.url, error = %err, stored_at = %cached.stored_at, "network failed, serving cached response");
      return Ok(FetchOutcome::ServedFromCache(cached));
    }

    if request.accepts_html() {
      let offline_key = RequestKey::get(&self.config.offline_url()?);
      if let Some(page) = self.storage.match_entry(generation, &offline_key)? {
        warn!(url = %key.url, error = %err, "network failed, serving offline page");
        return Ok(FetchOutcome::ServedOfflinePage(page.response));
      }
    }

    debug!(url = %key.url, error = %err, "no cached response available");
    Ok(FetchOutcome::Failed(CacheError::NotAvailable {
      url: key.url,
      reason: err.to_string(),
    }))
  }

  fn intercepts(&self, request: &Request) -> bool {
    request.is_safe_read() && !self.config.is_excluded(&request.url)
  }
}

impl<S: CacheStorage, N: Network> Clone for OfflineCacheController<S, N> {
  fn clone(&self) -> Self {
    Self {
      config: Arc::clone(&self.config),
      storage: Arc::clone(&self.storage),
      network: Arc::clone(&self.network),
    }
  }
}
