mod app;
mod commands;
mod config;
mod demo;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "entity-cache")]
#[command(about = "Query and save entities through a client-side entity cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/entity-cache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Use the built-in in-memory backend even if an API root is configured
  #[arg(short, long)]
  memory: bool,

  #[command(subcommand)]
  command: app::Command,
}

/// Log to a file so command output stays clean. Level from ENTITY_CACHE_LOG.
fn init_logging(path: &Path) -> Result<WorkerGuard> {
  let dir = match path.parent() {
    Some(dir) if !dir.as_os_str().is_empty() => dir,
    _ => Path::new("."),
  };
  let file_name = path
    .file_name()
    .ok_or_else(|| eyre!("Log file path has no file name: {}", path.display()))?;
  std::fs::create_dir_all(dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::never(dir, file_name);
  let (writer, guard) = tracing_appender::non_blocking(appender);
  let filter =
    EnvFilter::try_from_env("ENTITY_CACHE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  let _log_guard = init_logging(&config.log_file())?;

  let app = app::App::new(&config, args.memory)?;
  app.run(args.command).await?;

  Ok(())
}
