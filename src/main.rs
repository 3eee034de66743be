mod cache;
mod config;
mod logging;
mod net;
mod notify;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use cache::{CacheStorage, FetchOutcome, OfflineCacheController, Request, SqliteStorage};
use config::Config;
use net::HttpNetwork;
use notify::{ClickAction, Notification};
use worker::{Clients, Registration};

#[derive(Parser, Debug)]
#[command(name = "shellcache")]
#[command(about = "Versioned network-first offline cache for the employee management web shell")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./shellcache.yaml or $XDG_CONFIG_HOME/shellcache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Cache generation name, overrides cache.version_key
  #[arg(long, env = "SHELLCACHE_VERSION")]
  version_key: Option<String>,

  /// Cache database path, overrides the config file
  #[arg(long)]
  database: Option<PathBuf>,

  /// Also write logs to a daily rolling file in this directory
  #[arg(long)]
  log_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Precache the manifest into the current generation and activate it
  Install,
  /// Delete every cache generation except the current, already installed one
  Activate,
  /// Fetch a URL network-first, falling back to the cache when offline
  Fetch {
    /// Absolute URL or path relative to cache.origin
    url: String,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Send the request as a page navigation (Accept: text/html)
    #[arg(long)]
    html: bool,
    /// Write the body here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
  /// List cache generations
  Generations,
  /// Show the notification a push payload would display
  Push {
    /// JSON payload; omit for an empty push
    payload: Option<String>,
  },
  /// Show what tapping a notification would do
  Click {
    /// JSON payload of the notification
    #[arg(default_value = "{}")]
    payload: String,
    /// URL of an open window (repeatable)
    #[arg(long = "window")]
    windows: Vec<String>,
  },
}

type Controller = OfflineCacheController<SqliteStorage, HttpNetwork>;

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = logging::init(args.log_dir.as_deref())?;

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;

  // Command line overrides
  if let Some(version_key) = args.version_key {
    config.cache.version_key = version_key;
    config.cache.validate()?;
  }
  if let Some(database) = args.database {
    config.database = Some(database);
  }

  match args.command {
    Command::Install => install(&config).await,
    Command::Activate => activate(&config).await,
    Command::Fetch {
      url,
      method,
      html,
      output,
    } => fetch(&config, &url, &method, html, output).await,
    Command::Generations => generations(&config),
    Command::Push { payload } => push(&config, payload.as_deref()),
    Command::Click { payload, windows } => click(&config, &payload, &windows),
  }
}

fn open_storage(config: &Config) -> Result<Arc<SqliteStorage>> {
  let storage = match &config.database {
    Some(path) => SqliteStorage::open_at(path)?,
    None => SqliteStorage::open()?,
  };
  Ok(Arc::new(storage))
}

fn build_controller(config: &Config) -> Result<(Controller, Arc<HttpNetwork>, Arc<SqliteStorage>)> {
  let storage = open_storage(config)?;
  let network = Arc::new(HttpNetwork::new(config.request_timeout())?);
  let controller =
    OfflineCacheController::new(config.cache.clone(), Arc::clone(&storage), Arc::clone(&network));
  Ok((controller, network, storage))
}

async fn install(config: &Config) -> Result<()> {
  let (controller, network, _) = build_controller(config)?;
  let mut registration = Registration::new(network);

  let report = registration.install(controller).await?;

  println!(
    "installed {} ({} entries)",
    report.install.generation, report.install.stored
  );
  for url in &report.install.skipped {
    println!("  skipped {}", url);
  }
  if let Some(activate) = &report.activate {
    for name in &activate.deleted {
      println!("  deleted stale generation {}", name);
    }
  }
  if let Some(active) = registration.active() {
    info!(
      worker = %active.id(),
      state = ?active.state(),
      since = %active.state_changed_at(),
      "worker active"
    );
  }

  Ok(())
}

/// Whether the current generation has been precached by an earlier install.
fn is_installed(storage: &impl CacheStorage, version_key: &str) -> Result<bool> {
  Ok(
    storage
      .generation_names()?
      .iter()
      .any(|name| name == version_key),
  )
}

async fn activate(config: &Config) -> Result<()> {
  let version_key = &config.cache.version_key;
  // Pruning is only safe once the generation that replaces the old ones exists
  if !is_installed(open_storage(config)?.as_ref(), version_key)? {
    return Err(eyre!(
      "Generation {} is not installed, run `shellcache install` first",
      version_key
    ));
  }

  let (controller, _, _) = build_controller(config)?;
  let report = controller.on_activate().await?;

  if report.deleted.is_empty() {
    println!("no stale generations");
  }
  for name in &report.deleted {
    println!("deleted {}", name);
  }

  Ok(())
}

async fn fetch(
  config: &Config,
  url: &str,
  method: &str,
  html: bool,
  output: Option<PathBuf>,
) -> Result<()> {
  let (controller, network, storage) = build_controller(config)?;
  let mut registration = Registration::new(network);

  // A generation that is already installed was activated by an earlier run
  if is_installed(storage.as_ref(), controller.version_key())? {
    registration.restore(controller);
  } else if let Err(err) = registration.install(controller).await {
    warn!(error = %err, "install failed, fetching without offline support");
  }

  let mut request = Request::new(method, config.cache.resolve(url)?);
  if html {
    request = request.with_header("Accept", "text/html");
  }

  let outcome = registration.dispatch_fetch(&request).await?;
  let (source, response) = match &outcome {
    FetchOutcome::Failed(err) => return Err(eyre!("{}", err)),
    FetchOutcome::Fetched(response) => ("network", response),
    FetchOutcome::ServedFromCache(cached) => ("cache", &cached.response),
    FetchOutcome::ServedOfflinePage(response) => ("offline page", response),
    FetchOutcome::Bypassed => return Err(eyre!("request was not handled")),
  };
  info!(url = %request.url, status = response.status, source, "fetched");

  match output {
    Some(path) => std::fs::write(&path, &response.body)
      .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?,
    None => std::io::stdout()
      .write_all(&response.body)
      .map_err(|e| eyre!("Failed to write response body: {}", e))?,
  }

  Ok(())
}

fn generations(config: &Config) -> Result<()> {
  let storage = open_storage(config)?;
  let names = storage.generation_names()?;

  if names.is_empty() {
    println!("no cache generations");
  }
  for name in names {
    let marker = if name == config.cache.version_key {
      " (current)"
    } else {
      ""
    };
    println!("{}\t{} entries{}", name, storage.entry_count(&name)?, marker);
  }

  Ok(())
}

fn push(config: &Config, payload: Option<&str>) -> Result<()> {
  let notification = Notification::from_push(payload.map(str::as_bytes), &config.notifications)
    .map_err(|e| eyre!("Invalid push payload: {}", e))?;

  match notification {
    Some(n) => println!("{}", serde_json::to_string_pretty(&n)?),
    None => println!("no notification (empty push)"),
  }

  Ok(())
}

fn click(config: &Config, payload: &str, windows: &[String]) -> Result<()> {
  let defaults = &config.notifications;
  let notification = Notification::from_push(Some(payload.as_bytes()), defaults)
    .map_err(|e| eyre!("Invalid push payload: {}", e))?
    .ok_or_else(|| eyre!("Empty payload shows no notification"))?;

  let mut clients = Clients::new();
  for window in windows {
    clients.open_window(config.cache.resolve(window)?);
  }

  match notification.click_action(&clients, &config.cache.origin, defaults)? {
    ClickAction::Focus(id) => println!("focus {}", id),
    ClickAction::OpenWindow(url) => println!("open {}", url),
  }

  Ok(())
}
