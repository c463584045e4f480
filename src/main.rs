mod app;
mod cache;
mod cli;
mod commands;
mod config;
mod error;
mod event;
mod gateway;
mod handles;
mod logging;
mod sync;
mod ui;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;

use cli::Cmd;
use gateway::{HttpGateway, Principal};
use sync::SyncClient;

#[derive(Parser, Debug)]
#[command(name = "threadline")]
#[command(about = "A terminal client for community discussion boards")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/threadline/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Act as this principal instead of the configured one
  #[arg(short, long)]
  principal: Option<Principal>,

  #[command(subcommand)]
  command: Option<Cmd>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = logging::init()?;

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  // Override principal if specified on command line
  let config = if let Some(principal) = args.principal {
    config::Config {
      principal: Some(principal),
      ..config
    }
  } else {
    config
  };

  let client = SyncClient::new(&config.cache, config.principal.clone());
  client.connect(Arc::new(HttpGateway::new(&config)?));

  match args.command.unwrap_or(Cmd::Browse) {
    Cmd::Browse => {
      let mut app = app::App::new(client, &config.gateway.url, config.cache.gc_after());
      app.run().await
    }
    cmd => cli::run(&client, cmd).await,
  }
}
