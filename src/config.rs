use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::cache::CacheError;
use crate::notify::NotificationDefaults;

const DEFAULT_VERSION_KEY: &str = "employee-management-mobile-v1";
const DEFAULT_ORIGIN: &str = "http://localhost:5000/";
const DEFAULT_OFFLINE_PAGE: &str = "/mobile/offline.html";

/// Shell assets needed for an offline first paint of the mobile app.
const DEFAULT_MANIFEST: &[&str] = &[
  "/mobile",
  "/mobile/",
  "/mobile/offline.html",
  "/static/mobile/css/mobile-style.css",
  "/static/mobile/js/mobile-script.js",
  "/static/mobile/js/service-worker.js",
  "/static/mobile/images/logo.png",
  "/static/mobile/images/icon-192.png",
  "/static/mobile/images/icon-512.png",
  "/static/mobile/manifest.json",
  "/static/fonts/Tajawal-Regular.ttf",
  "/static/fonts/Tajawal-Bold.ttf",
  "/static/css/fontawesome.min.css",
  "/static/css/solid.min.css",
  "https://cdn.replit.com/agent/bootstrap-agent-dark-theme.min.css",
  "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.4.0/css/all.min.css",
];

/// Session-sensitive endpoints that are never cached.
const DEFAULT_EXCLUSIONS: &[&str] = &["/api/", "/login", "/logout"];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  pub cache: CacheConfig,
  /// Timeout for a single live fetch, in seconds
  pub request_timeout_secs: u64,
  /// Cache database path (default: $XDG_DATA_HOME/shellcache/cache.db)
  pub database: Option<PathBuf>,
  pub notifications: NotificationDefaults,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      cache: CacheConfig::default(),
      request_timeout_secs: 15,
      database: None,
      notifications: NotificationDefaults::default(),
    }
  }
}

/// Everything the cache controller needs; one instance per controller.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Name of the current cache generation. Bump it to rotate the cache.
  pub version_key: String,
  /// Base URL that root-relative manifest entries resolve against
  pub origin: Url,
  /// URLs that must be cached before an install succeeds
  pub manifest: Vec<String>,
  /// Page served to HTML requests that miss both network and cache
  pub offline_fallback_url: String,
  /// URL substrings that bypass the cache entirely
  pub exclusion_patterns: Vec<String>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      version_key: DEFAULT_VERSION_KEY.to_string(),
      origin: Url::parse(DEFAULT_ORIGIN).expect("default origin is a valid URL"),
      manifest: DEFAULT_MANIFEST.iter().map(|s| s.to_string()).collect(),
      offline_fallback_url: DEFAULT_OFFLINE_PAGE.to_string(),
      exclusion_patterns: DEFAULT_EXCLUSIONS.iter().map(|s| s.to_string()).collect(),
    }
  }
}

impl CacheConfig {
  /// Resolve a manifest entry or user supplied URL against the origin.
  pub fn resolve(&self, raw: &str) -> Result<Url, CacheError> {
    self.origin.join(raw).map_err(|e| CacheError::InvalidUrl {
      url: raw.to_string(),
      reason: e.to_string(),
    })
  }

  pub fn manifest_urls(&self) -> Result<Vec<Url>, CacheError> {
    self.manifest.iter().map(|raw| self.resolve(raw)).collect()
  }

  pub fn offline_url(&self) -> Result<Url, CacheError> {
    self.resolve(&self.offline_fallback_url)
  }

  pub fn is_same_origin(&self, url: &Url) -> bool {
    url.origin() == self.origin.origin()
  }

  pub fn is_excluded(&self, url: &Url) -> bool {
    let url = url.as_str();
    self
      .exclusion_patterns
      .iter()
      .any(|pattern| url.contains(pattern.as_str()))
  }

  pub fn validate(&self) -> Result<()> {
    if self.version_key.trim().is_empty() {
      return Err(eyre!("cache.version_key must not be empty"));
    }
    if self.manifest.is_empty() {
      return Err(eyre!("cache.manifest must list at least one URL"));
    }

    let manifest = self.manifest_urls().map_err(|e| eyre!("cache.manifest: {}", e))?;
    let offline = self
      .offline_url()
      .map_err(|e| eyre!("cache.offline_fallback_url: {}", e))?;

    if !manifest.contains(&offline) {
      return Err(eyre!(
        "cache.offline_fallback_url {} must be part of cache.manifest",
        self.offline_fallback_url
      ));
    }

    Ok(())
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./shellcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/shellcache/config.yaml
  ///
  /// Falls back to the built-in mobile app defaults when no file exists.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    Self::load_or_default(path.as_deref())
  }

  /// Read `path`, or use the built-in defaults when there is none.
  fn load_or_default(path: Option<&Path>) -> Result<Self> {
    let config = match path {
      Some(p) => Self::load_from_path(p)?,
      None => Self::default(),
    };

    config.cache.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("shellcache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("shellcache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request_timeout_secs)
  }
}
