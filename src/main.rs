mod app;
mod cache;
mod commands;
mod config;
mod event;
mod logging;
mod mutation;
mod pagination;
mod query;
mod tasks;
mod ui;

use cache::CacheStore;
use clap::Parser;
use color_eyre::Result;
use mutation::MutationClient;
use query::{QueryClient, QueryOptions};
use std::path::PathBuf;
use std::sync::Arc;
use tasks::TaskClient;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "t9s")]
#[command(about = "A terminal UI for a remote to-do list, inspired by k9s")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/t9s/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Base URL of the task service
  #[arg(short, long, env = config::URL_ENV)]
  url: Option<String>,

  /// Owner id pre-filled when adding tasks
  #[arg(short, long)]
  owner: Option<u64>,

  /// Initial page size of the task list
  #[arg(long)]
  page_size: Option<u64>,

  /// Log file (default: $XDG_DATA_HOME/t9s/t9s.log)
  #[arg(long)]
  log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Held until exit so buffered log lines are flushed
  let _log_guard = logging::init(args.log_file.as_deref())?;

  // Load configuration, then apply command line overrides
  let mut config = config::Config::load(args.config.as_deref())?;
  if let Some(url) = args.url {
    config.api.url = url;
  }
  if let Some(owner) = args.owner {
    config.default_owner = owner;
  }
  if let Some(page_size) = args.page_size {
    config.page_size = page_size;
  }
  config.validate()?;
  info!(url = %config.api.url, page_size = config.page_size, "configuration loaded");

  let api = Arc::new(TaskClient::new(&config.api)?);
  let store = Arc::new(CacheStore::new().with_stale_time(config.query.stale_time()));
  let queries = QueryClient::new(
    store,
    api,
    QueryOptions {
      retry: config.query.retry,
    },
  );
  let mutations = MutationClient::new(queries.clone());

  let mut app = app::App::new(config, queries, mutations);
  app.run().await?;

  Ok(())
}
