//! Scripted network for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::{Network, NetworkError};
use crate::cache::{Request, Response};

/// Answers from a fixed route table; unknown URLs fail like an unreachable host.
#[derive(Default)]
pub struct FakeNetwork {
  routes: Mutex<HashMap<String, Result<Response, NetworkError>>>,
  calls: Mutex<Vec<String>>,
  offline: AtomicBool,
}

impl FakeNetwork {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn respond(&self, url: &str, response: Response) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url.to_string(), Ok(response));
  }

  pub fn fail(&self, url: &str) {
    self.routes.lock().unwrap().insert(
      url.to_string(),
      Err(NetworkError::Connect(format!("{} unreachable", url))),
    );
  }

  /// Fail every request regardless of routes.
  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  /// "METHOD url" for every fetch attempted, in order.
  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }
}

impl Network for FakeNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
    self
      .calls
      .lock()
      .unwrap()
      .push(format!("{} {}", request.method, request.url));

    if self.offline.load(Ordering::SeqCst) {
      return Err(NetworkError::Connect("offline".to_string()));
    }

    self
      .routes
      .lock()
      .unwrap()
      .get(request.url.as_str())
      .cloned()
      .unwrap_or_else(|| Err(NetworkError::Connect(format!("no route to {}", request.url))))
  }
}
