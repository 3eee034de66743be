//! Display contract for push notifications and routing of notification clicks.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::cache::CacheError;
use crate::worker::Clients;

/// Notifications are rendered right-to-left.
const TEXT_DIRECTION: &str = "rtl";

/// Values used when a push payload leaves a field out.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NotificationDefaults {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  /// Page opened when a notification carries no target URL
  pub default_url: String,
}

impl Default for NotificationDefaults {
  fn default() -> Self {
    Self {
      title: "نظام إدارة الموظفين".to_string(),
      body: "تم استلام إشعار جديد".to_string(),
      icon: "/static/mobile/images/icon-192.png".to_string(),
      badge: "/static/mobile/images/badge.png".to_string(),
      default_url: "/mobile".to_string(),
    }
  }
}

#[derive(Debug, Default, Deserialize)]
struct PushPayload {
  title: Option<String>,
  body: Option<String>,
  icon: Option<String>,
  data: Option<Value>,
}

/// A notification ready to be shown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub data: Value,
  pub dir: String,
}

/// What the host does when the user taps a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickAction {
  /// Bring an already open window to the front
  Focus(String),
  OpenWindow(Url),
}

impl Notification {
  /// Build the notification for a push message. Messages without data show nothing.
  pub fn from_push(
    payload: Option<&[u8]>,
    defaults: &NotificationDefaults,
  ) -> Result<Option<Self>, serde_json::Error> {
    let Some(bytes) = payload.filter(|b| !b.is_empty()) else {
      return Ok(None);
    };

    let push: PushPayload = serde_json::from_slice(bytes)?;

    Ok(Some(Self {
      title: push.title.unwrap_or_else(|| defaults.title.clone()),
      body: push.body.unwrap_or_else(|| defaults.body.clone()),
      icon: push.icon.unwrap_or_else(|| defaults.icon.clone()),
      badge: defaults.badge.clone(),
      data: push.data.unwrap_or_else(|| Value::Object(Map::new())),
      dir: TEXT_DIRECTION.to_string(),
    }))
  }

  /// `data.url` if present, else the configured default page.
  pub fn target_url<'a>(&'a self, defaults: &'a NotificationDefaults) -> &'a str {
    self
      .data
      .get("url")
      .and_then(Value::as_str)
      .unwrap_or(&defaults.default_url)
  }

  /// Focus a window already showing the target, or open a new one.
  pub fn click_action(
    &self,
    clients: &Clients,
    base: &Url,
    defaults: &NotificationDefaults,
  ) -> Result<ClickAction, CacheError> {
    let raw = self.target_url(defaults);
    let target = base.join(raw).map_err(|e| CacheError::InvalidUrl {
      url: raw.to_string(),
      reason: e.to_string(),
    })?;

    Ok(match clients.find_by_url(&target) {
      Some(client) => ClickAction::Focus(client.id.clone()),
      None => ClickAction::OpenWindow(target),
    })
  }
}
