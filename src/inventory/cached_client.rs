//! Inventory client with a transparent offline cache in front of the REST API.

use chrono::{DateTime, Utc};
use color_eyre::Result;
use serde_json::Value;

use crate::cache::{CacheLayer, CacheResult, SqliteStorage};
use crate::config::Config;

use super::api_types::{ClienteForm, MaquinaForm, RecorteForm};
use super::cache::InventoryQueryKey;
use super::client::InventoryClient;
use super::types::{Cliente, Maquina, PaginatedResponse, Recorte, RecorteWithMaquina, StatsRange};

/// Inventory client with transparent caching support.
///
/// List reads always try the network first and fall back to the last
/// snapshot when it is unreachable. Paginated per-machine reads are served
/// from cache while younger than the page cache time. Writes go straight
/// to the API and invalidate the affected pages.
#[derive(Clone)]
pub struct CachedInventoryClient {
  inner: InventoryClient,
  lists: CacheLayer<SqliteStorage>,
  pages: CacheLayer<SqliteStorage>,
}

impl CachedInventoryClient {
  pub fn new(config: &Config) -> Result<Self> {
    let inner = InventoryClient::new(config)?;
    let (lists, pages) = if config.sync.offline_cache {
      let lists = SqliteStorage::open_default()?;
      let pages = SqliteStorage::open(&crate::config::data_dir()?.join("pages.db"))?;
      (lists, pages)
    } else {
      (SqliteStorage::in_memory()?, SqliteStorage::in_memory()?)
    };
    Ok(Self::with_storage(
      inner,
      lists,
      pages,
      config.sync.page_cache_time(),
    ))
  }

  pub fn with_storage(
    inner: InventoryClient,
    lists: SqliteStorage,
    pages: SqliteStorage,
    page_cache_time: std::time::Duration,
  ) -> Self {
    Self {
      inner,
      lists: CacheLayer::new(lists).with_stale_time(std::time::Duration::ZERO),
      pages: CacheLayer::new(pages).with_stale_time(page_cache_time),
    }
  }

  pub async fn get_recortes(&self, since: Option<DateTime<Utc>>) -> Result<CacheResult<Vec<Recorte>>> {
    self
      .lists
      .fetch_list(&InventoryQueryKey::Recortes, || self.inner.get_recortes(since))
      .await
  }

  pub async fn get_maquinas(&self) -> Result<CacheResult<Vec<Maquina>>> {
    self
      .lists
      .fetch_list(&InventoryQueryKey::Maquinas, || self.inner.get_maquinas())
      .await
  }

  pub async fn get_clientes(&self) -> Result<CacheResult<Vec<Cliente>>> {
    self
      .lists
      .fetch_list(&InventoryQueryKey::Clientes, || self.inner.get_clientes())
      .await
  }

  pub async fn get_recortes_by_maquina_estado(
    &self,
    maquina_id: &str,
    estado: bool,
    page: u32,
    limit: u32,
  ) -> Result<CacheResult<PaginatedResponse<RecorteWithMaquina>>> {
    let key = InventoryQueryKey::RecortesByMaquina {
      maquina_id: maquina_id.to_string(),
      estado,
      page,
      limit,
    };
    self
      .pages
      .fetch_snapshot(&key, || {
        self
          .inner
          .get_recortes_by_maquina_estado(maquina_id, estado, page, limit)
      })
      .await
  }

  pub async fn get_recortes_pendientes(
    &self,
    maquina_id: &str,
    page: u32,
    limit: u32,
  ) -> Result<CacheResult<PaginatedResponse<RecorteWithMaquina>>> {
    let key = InventoryQueryKey::RecortesPendientes {
      maquina_id: maquina_id.to_string(),
      page,
      limit,
    };
    self
      .pages
      .fetch_snapshot(&key, || {
        self.inner.get_recortes_pendientes(maquina_id, page, limit)
      })
      .await
  }

  pub async fn get_estadisticas_tiempo_real(&self) -> Result<CacheResult<Value>> {
    self
      .pages
      .fetch_snapshot(&InventoryQueryKey::EstadisticasTiempoReal, || {
        self.inner.get_estadisticas_tiempo_real()
      })
      .await
  }

  pub async fn get_estadisticas_maquina(
    &self,
    maquina_id: &str,
    range: &StatsRange,
  ) -> Result<CacheResult<Value>> {
    let key = InventoryQueryKey::EstadisticasMaquina {
      maquina_id: maquina_id.to_string(),
      range: range.clone(),
    };
    self
      .pages
      .fetch_snapshot(&key, || self.inner.get_estadisticas_maquina(maquina_id, range))
      .await
  }

  pub async fn get_estadisticas_resumen(&self, range: &StatsRange) -> Result<CacheResult<Value>> {
    let key = InventoryQueryKey::EstadisticasResumen {
      range: range.clone(),
    };
    self
      .pages
      .fetch_snapshot(&key, || self.inner.get_estadisticas_resumen(range))
      .await
  }

  // Writes (not cached)

  pub async fn create_recorte(&self, form: &RecorteForm) -> Result<Value> {
    let created = self.inner.create_recorte(form).await?;
    self.invalidate_machine(&form.maquina_id);
    Ok(created)
  }

  pub async fn update_recorte(&self, id: &str, form: &RecorteForm) -> Result<()> {
    self.inner.update_recorte(id, form).await?;
    // The record may have moved between machines
    self.invalidate_machine("");
    Ok(())
  }

  pub async fn delete_recorte(&self, id: &str) -> Result<()> {
    self.inner.delete_recorte(id).await?;
    self.invalidate_machine("");
    Ok(())
  }

  pub async fn use_recorte(&self, id: &str, cantidad: u32) -> Result<()> {
    self.inner.use_recorte(id, cantidad).await?;
    self.invalidate_machine("");
    Ok(())
  }

  pub async fn create_cliente(&self, form: &ClienteForm) -> Result<Value> {
    Ok(self.inner.create_cliente(form).await?)
  }

  pub async fn update_cliente(&self, id: &str, form: &ClienteForm) -> Result<()> {
    Ok(self.inner.update_cliente(id, form).await?)
  }

  pub async fn delete_cliente(&self, id: &str) -> Result<()> {
    Ok(self.inner.delete_cliente(id).await?)
  }

  pub async fn use_cliente(&self, id: &str, cantidad: u32) -> Result<()> {
    Ok(self.inner.use_cliente(id, cantidad).await?)
  }

  pub async fn create_maquina(&self, form: &MaquinaForm) -> Result<Maquina> {
    Ok(self.inner.create_maquina(form).await?)
  }

  /// Drop cached pages of one machine, or of every machine when `maquina_id` is empty.
  fn invalidate_machine(&self, maquina_id: &str) {
    let pattern = if maquina_id.is_empty() {
      "recortes maquina".to_string()
    } else {
      format!("recortes maquina {} ", maquina_id)
    };
    if let Err(e) = self.pages.invalidate(&pattern) {
      tracing::warn!(error = %e, "failed to invalidate page cache");
    }
  }

  /// Expire page snapshots that outlived their stale time by more than `max_age`.
  pub fn clean_expired(&self, max_age: std::time::Duration) {
    match self.pages.clean_expired(max_age) {
      Ok(0) => {}
      Ok(removed) => tracing::debug!(removed, "expired cached pages"),
      Err(e) => tracing::warn!(error = %e, "failed to expire cached pages"),
    }
  }
}
