//! Command-line front end over the sync engine.

pub mod args;
pub mod handlers;
pub mod print;

use color_eyre::{eyre::eyre, Result};
use tokio::sync::mpsc;

use crate::cache::CacheSource;
use crate::inventory::lookup::resolve_maquina;
use crate::inventory::types::Maquina;
use crate::notify::Toast;
use crate::store::Collection;
use crate::sync::SyncEngine;

/// Shared state for command handlers
pub struct Ctx {
  engine: SyncEngine,
  toasts: mpsc::UnboundedReceiver<Toast>,
  json: bool,
}

impl Ctx {
  pub fn new(mut engine: SyncEngine, json: bool) -> Result<Self> {
    let toasts = engine
      .take_toasts()
      .ok_or_else(|| eyre!("Toast receiver already taken"))?;
    Ok(Self {
      engine,
      toasts,
      json,
    })
  }

  /// Print every toast queued so far to stderr.
  pub fn flush_toasts(&mut self) {
    while let Ok(toast) = self.toasts.try_recv() {
      print::toast(&toast);
    }
  }

  /// Make sure the given collections are in the store.
  async fn load(&mut self, collections: &[Collection]) -> Result<()> {
    for &collection in collections {
      let source = self.engine.refresh(collection, false).await?;
      if source == CacheSource::Offline {
        tracing::warn!(collection = collection.name(), "serving offline data");
      }
    }
    Ok(())
  }

  /// Resolve a machine by id or name against the loaded list.
  fn maquina(&self, input: &str) -> Result<Maquina> {
    resolve_maquina(input, &self.engine.state().maquinas)
      .cloned()
      .map_err(|e| eyre!("{}", e))
  }

  fn per_page(&self, requested: Option<usize>) -> usize {
    requested.unwrap_or(self.engine.config().page_size).max(1)
  }
}
