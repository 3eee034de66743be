//! Live network access used by the cache controller.

#[cfg(test)]
pub mod fake;

use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::cache::{Request, Response};

/// A failed network attempt. Any HTTP status, including 4xx/5xx, is a response, not an error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
  #[error("connection failed: {0}")]
  Connect(String),

  #[error("request timed out")]
  Timeout,

  #[error("failed to read response body: {0}")]
  Body(String),
}

/// Something that can perform a live fetch.
pub trait Network: Send + Sync {
  fn fetch(
    &self,
    request: &Request,
  ) -> impl Future<Output = Result<Response, NetworkError>> + Send;
}

/// HTTP network backed by reqwest.
#[derive(Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
}

impl HttpNetwork {
  pub fn new(timeout: Duration) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .user_agent(concat!("shellcache/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

impl Network for HttpNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
    let method = reqwest::Method::from_bytes(request.method.as_bytes())
      .map_err(|e| NetworkError::Connect(format!("invalid method {}: {}", request.method, e)))?;

    let mut builder = self.client.request(method, request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }

    let response = builder.send().await.map_err(classify)?;

    let status = response.status().as_u16();
    let headers: Vec<(String, String)> = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    // Buffer the whole body so nothing partial is ever cached
    let body = response
      .bytes()
      .await
      .map_err(|e| NetworkError::Body(e.to_string()))?
      .to_vec();

    Ok(
      headers
        .iter()
        .fold(Response::new(status, body), |response, (name, value)| {
          response.with_header(name, value)
        }),
    )
  }
}

fn classify(err: reqwest::Error) -> NetworkError {
  if err.is_timeout() {
    NetworkError::Timeout
  } else {
    NetworkError::Connect(err.to_string())
  }
}
