//! Pages controlled by the registration.

use std::sync::atomic::{AtomicU64, Ordering};
use url::Url;

use super::state::WorkerId;

/// An open window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
  pub id: String,
  pub url: Url,
  /// Worker currently controlling this page
  pub controller: Option<WorkerId>,
}

#[derive(Debug, Default)]
pub struct Clients {
  clients: Vec<Client>,
}

impl Clients {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register an open window. New pages start uncontrolled until a claim.
  pub fn open_window(&mut self, url: Url) -> &Client {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    let id = format!("client-{}", COUNTER.fetch_add(1, Ordering::Relaxed));
    self.clients.push(Client {
      id,
      url,
      controller: None,
    });
    &self.clients[self.clients.len() - 1]
  }

  #[allow(dead_code)]
  pub fn iter(&self) -> impl Iterator<Item = &Client> {
    self.clients.iter()
  }

  /// First window showing exactly `url`.
  pub fn find_by_url(&self, url: &Url) -> Option<&Client> {
    self.clients.iter().find(|c| &c.url == url)
  }

  /// Put every client under `worker`. Returns how many changed controller.
  pub fn claim(&mut self, worker: WorkerId) -> usize {
    let mut changed = 0;
    for client in &mut self.clients {
      if client.controller != Some(worker) {
        client.controller = Some(worker);
        changed += 1;
      }
    }
    changed
  }
}
