mod cache;
mod cli;
mod config;
mod event;
mod image;
mod inventory;
mod logging;
mod notify;
mod push;
mod query;
mod store;
mod sync;
mod validate;

use clap::Parser;
use color_eyre::Result;

use cli::args::{Cli, Commands};
use cli::handlers::{clientes, maquinas, recortes, stats, summary, watch};
use cli::Ctx;

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let cli = Cli::parse();

  // Keep the guard alive so buffered log lines are flushed on exit
  let _log_guard = logging::init_default()?;

  let config = config::Config::load(cli.config.as_deref())?
    .with_overrides(cli.api_url.clone(), cli.socket_url.clone());
  tracing::info!(api = %config.api_url, socket = %config.socket_url, "starting");

  let client = inventory::CachedInventoryClient::new(&config)?;
  let engine = sync::SyncEngine::new(config, client);
  let mut ctx = Ctx::new(engine, cli.json)?;

  let result = match cli.command {
    Commands::Recortes(cmd) => recortes::handle(&mut ctx, cmd.action).await,
    Commands::Clientes(cmd) => clientes::handle(&mut ctx, cmd.action).await,
    Commands::Maquinas(cmd) => maquinas::handle(&mut ctx, cmd.action).await,
    Commands::Stats(cmd) => stats::handle(&mut ctx, cmd.action).await,
    Commands::Summary => summary::handle(&mut ctx).await,
    Commands::Watch => return watch::handle(ctx).await,
  };

  ctx.flush_toasts();
  result
}
