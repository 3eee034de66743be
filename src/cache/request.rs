//! Request/response types and the request identity used as cache key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use url::Url;

/// An outgoing request as seen by the fetch interception point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub method: String,
  pub url: Url,
  /// Header names are stored lowercase
  pub headers: BTreeMap<String, String>,
}

impl Request {
  pub fn new(method: &str, url: Url) -> Self {
    Self {
      method: method.to_uppercase(),
      url,
      headers: BTreeMap::new(),
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new("GET", url)
  }

  /// A top-level page navigation (GET accepting HTML).
  #[allow(dead_code)]
  pub fn navigate(url: Url) -> Self {
    Self::get(url).with_header("Accept", "text/html,application/xhtml+xml,*/*;q=0.8")
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self
      .headers
      .insert(name.to_lowercase(), value.to_string());
    self
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self.headers.get(&name.to_lowercase()).map(String::as_str)
  }

  /// Only GET is a fetch-for-content; everything else mutates server state.
  pub fn is_safe_read(&self) -> bool {
    self.method == "GET"
  }

  pub fn accepts_html(&self) -> bool {
    self
      .header("accept")
      .is_some_and(|accept| accept.contains("text/html"))
  }

  pub fn key(&self) -> RequestKey {
    RequestKey::new(&self.method, &self.url)
  }
}

/// A complete response. Bodies are always fully buffered before they reach the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  pub headers: BTreeMap<String, String>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: BTreeMap::new(),
      body: body.into(),
    }
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self
      .headers
      .insert(name.to_lowercase(), value.to_string());
    self
  }

  /// 2xx
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// Normalized (method, URL) pair identifying a cache entry.
///
/// The fragment is dropped since it never reaches the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  pub method: String,
  pub url: String,
}

impl RequestKey {
  pub fn new(method: &str, url: &Url) -> Self {
    let mut url = url.clone();
    url.set_fragment(None);
    Self {
      method: method.to_uppercase(),
      url: url.into(),
    }
  }

  pub fn get(url: &Url) -> Self {
    Self::new("GET", url)
  }

  /// SHA256 of the identity for stable, fixed-length storage keys.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.description().as_bytes());
    hex::encode(hasher.finalize())
  }

  pub fn description(&self) -> String {
    format!("{} {}", self.method, self.url)
  }
}

/// A stored response together with the time it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
  pub response: Response,
  pub stored_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn key_ignores_fragment_and_method_case() {
    let a = RequestKey::new("get", &url("https://app.example/page.html#top"));
    let b = RequestKey::new("GET", &url("https://app.example/page.html"));

    assert_eq!(a, b);
    assert_eq!(a.cache_hash(), b.cache_hash());
    assert_eq!(a.cache_hash().len(), 64);
  }

  #[test]
  fn key_distinguishes_query_and_method() {
    let plain = RequestKey::get(&url("https://app.example/data.json"));
    let query = RequestKey::get(&url("https://app.example/data.json?page=2"));
    let head = RequestKey::new("HEAD", &url("https://app.example/data.json"));

    assert_ne!(plain.cache_hash(), query.cache_hash());
    assert_ne!(plain.cache_hash(), head.cache_hash());
  }

  #[test]
  fn navigation_accepts_html() {
    let nav = Request::navigate(url("https://app.example/mobile"));
    assert!(nav.accepts_html());
    assert!(nav.is_safe_read());

    let asset = Request::get(url("https://app.example/app.js"));
    assert!(!asset.accepts_html());
  }

  #[test]
  fn header_lookup_is_case_insensitive() {
    let req = Request::get(url("https://app.example/")).with_header("Accept", "text/html");
    assert_eq!(req.header("ACCEPT"), Some("text/html"));
  }

  #[test]
  fn post_is_not_a_safe_read() {
    let req = Request::new("post", url("https://app.example/api/login"));
    assert_eq!(req.method, "POST");
    assert!(!req.is_safe_read());
  }

  #[test]
  fn success_is_2xx_only() {
    assert!(Response::new(200, "ok").is_success());
    assert!(Response::new(204, "").is_success());
    assert!(!Response::new(304, "").is_success());
    assert!(!Response::new(404, "missing").is_success());
  }
}
