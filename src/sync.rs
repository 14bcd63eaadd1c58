//! The sync engine: keeps the local store in step with the backend.
//!
//! Push events and finished loads share one channel and are applied in
//! arrival order. Collections are loaded on connect and refetched on ticks
//! once stale. Mutations only go to the REST API; the store learns about
//! them through the resulting push events.

use chrono::{DateTime, Months, Utc};
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use tokio::sync::{mpsc, watch};

use crate::cache::{CacheResult, CacheSource};
use crate::config::Config;
use crate::event::{Event, EventHandler, Loaded};
use crate::inventory::api_types::{ClienteForm, MaquinaForm, RecorteForm};
use crate::inventory::types::{Cliente, Maquina, Recorte};
use crate::inventory::{ApiError, CachedInventoryClient};
use crate::notify::Toast;
use crate::push::{ConnectionStatus, PushClient, PushEvent, PushHandle};
use crate::query::Query;
use crate::store::{CacheAction, CacheState, Collection};
use crate::validate;

/// How far back the recortes list reaches
const RECORTES_WINDOW_MONTHS: u32 = 6;

/// Start of the recortes window relative to `now`
pub fn recortes_since(now: DateTime<Utc>) -> DateTime<Utc> {
  now
    .checked_sub_months(Months::new(RECORTES_WINDOW_MONTHS))
    .unwrap_or(now)
}

pub struct SyncEngine {
  config: Config,
  client: CachedInventoryClient,
  state: CacheState,

  recortes: Query<CacheResult<Vec<Recorte>>>,
  maquinas: Query<CacheResult<Vec<Maquina>>>,
  clientes: Query<CacheResult<Vec<Cliente>>>,

  snapshots: watch::Sender<CacheState>,
  toasts: mpsc::UnboundedSender<Toast>,
  toasts_rx: Option<mpsc::UnboundedReceiver<Toast>>,

  /// Channel that finished loads report into
  events: Option<mpsc::UnboundedSender<Event>>,
  push: Option<PushHandle>,
  connection: Option<ConnectionStatus>,
}

impl SyncEngine {
  pub fn new(config: Config, client: CachedInventoryClient) -> Self {
    let c = client.clone();
    let recortes = Query::new("recortes", Loaded::recortes, move || {
      let c = c.clone();
      async move {
        c.get_recortes(Some(recortes_since(Utc::now())))
          .await
          .map_err(|e| e.to_string())
      }
    });

    let c = client.clone();
    let maquinas = Query::new("maquinas", Loaded::maquinas, move || {
      let c = c.clone();
      async move { c.get_maquinas().await.map_err(|e| e.to_string()) }
    });

    let c = client.clone();
    let clientes = Query::new("clientes", Loaded::clientes, move || {
      let c = c.clone();
      async move { c.get_clientes().await.map_err(|e| e.to_string()) }
    });

    let (snapshots, _) = watch::channel(CacheState::default());
    let (toasts, toasts_rx) = mpsc::unbounded_channel();

    Self {
      config,
      client,
      state: CacheState::default(),
      recortes,
      maquinas,
      clientes,
      snapshots,
      toasts,
      toasts_rx: Some(toasts_rx),
      events: None,
      push: None,
      connection: None,
    }
  }

  pub fn state(&self) -> &CacheState {
    &self.state
  }

  pub fn client(&self) -> &CachedInventoryClient {
    &self.client
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn connection(&self) -> Option<&ConnectionStatus> {
    self.connection.as_ref()
  }

  /// Receiver of state snapshots, updated after every change.
  pub fn subscribe(&self) -> watch::Receiver<CacheState> {
    self.snapshots.subscribe()
  }

  /// Route background load results into `events`. Without a channel,
  /// only [`SyncEngine::refresh`] can load collections.
  pub fn attach(&mut self, events: mpsc::UnboundedSender<Event>) {
    self.events = Some(events);
  }

  /// Receiver of user-facing toasts. Only the first caller gets it.
  pub fn take_toasts(&mut self) -> Option<mpsc::UnboundedReceiver<Toast>> {
    self.toasts_rx.take()
  }

  fn toast(&self, toast: Toast) {
    toast.log();
    let _ = self.toasts.send(toast);
  }

  fn stale_time(&self) -> chrono::Duration {
    chrono::Duration::from_std(self.config.sync.stale_time()).unwrap_or(chrono::Duration::MAX)
  }

  fn publish(&self) {
    self.snapshots.send_replace(self.state.clone());
  }

  /// Apply a batch of actions, publishing once if anything changed.
  pub fn dispatch(&mut self, actions: Vec<CacheAction>) -> bool {
    let mut changed = false;
    for action in actions {
      let name = action.name();
      if self.state.apply(action) {
        tracing::debug!(action = name, "state changed");
        changed = true;
      }
    }
    if changed {
      self.publish();
    }
    changed
  }

  // ==========================================================================
  // Event loop
  // ==========================================================================

  /// Connect the push channel and process events until the channel closes.
  pub async fn run(mut self, mut events: EventHandler) -> Result<()> {
    self.attach(events.sender());
    let push = PushClient::new(&self.config.socket_url, self.config.socket.clone())
      .map_err(|e| eyre!("Invalid socket URL {}: {}", self.config.socket_url, e))?;
    tracing::info!(url = %push.url(), "starting push client");
    self.push = Some(push.spawn(events.sender()));

    while let Some(event) = events.next().await {
      self.handle_event(event);
    }
    Ok(())
  }

  /// Handle one event. Returns whether the state changed.
  pub fn handle_event(&mut self, event: Event) -> bool {
    match event {
      Event::Push(PushEvent::ForceReload) => {
        tracing::info!("server requested a reload");
        self.load_all(true);
        false
      }
      Event::Push(push) => {
        let name = push.name();
        let changed = self.dispatch(push.into_actions(Utc::now()));
        if changed {
          tracing::info!(event = name, "applied push event");
        }
        changed
      }
      Event::Connection(status) => {
        match &status {
          ConnectionStatus::Connected => self.load_all(false),
          ConnectionStatus::Disconnected(reason) => {
            tracing::warn!(%reason, "push channel disconnected");
          }
          ConnectionStatus::Reconnecting { attempt, delay } => {
            tracing::info!(attempt, ?delay, "reconnecting push channel");
          }
          ConnectionStatus::ReconnectFailed => {
            self.toast(Toast::error(
              "Lost connection to the server; live updates stopped",
            ));
          }
        }
        self.connection = Some(status);
        false
      }
      Event::Loaded(loaded) => self.on_loaded(loaded),
      Event::Tick => {
        self.load_all(false);
        self.client.clean_expired(self.config.sync.stale_time());
        false
      }
    }
  }

  fn on_loaded(&mut self, loaded: Loaded) -> bool {
    match loaded {
      Loaded::Recortes(done) => match self.recortes.complete(done) {
        Some(result) => self.finish_load(Collection::Recortes, result, CacheAction::SetRecortes),
        None => false,
      },
      Loaded::Maquinas(done) => match self.maquinas.complete(done) {
        Some(result) => self.finish_load(Collection::Maquinas, result, CacheAction::SetMaquinas),
        None => false,
      },
      Loaded::Clientes(done) => match self.clientes.complete(done) {
        Some(result) => self.finish_load(Collection::Clientes, result, CacheAction::SetClientes),
        None => false,
      },
    }
  }

  fn finish_load<T>(
    &mut self,
    collection: Collection,
    result: std::result::Result<CacheResult<Vec<T>>, String>,
    set: impl FnOnce(Vec<T>) -> CacheAction,
  ) -> bool {
    match result {
      Ok(result) => self.apply_loaded(collection, result, set),
      Err(error) => {
        self.toast(Toast::error(format!(
          "Failed to load {}: {}",
          collection.name(),
          error
        )));
        false
      }
    }
  }

  /// Store a loaded collection.
  ///
  /// Offline results keep their original timestamp so the collection stays
  /// stale and is retried on the next tick.
  fn apply_loaded<T>(
    &mut self,
    collection: Collection,
    result: CacheResult<Vec<T>>,
    set: impl FnOnce(Vec<T>) -> CacheAction,
  ) -> bool {
    let at = match (result.source, result.cached_at) {
      (CacheSource::Offline, Some(cached_at)) => {
        self.toast(Toast::error(format!(
          "Server unreachable, showing {} cached at {}",
          collection.name(),
          cached_at.format("%Y-%m-%d %H:%M")
        )));
        cached_at
      }
      _ => Utc::now(),
    };
    let count = self.state_len(collection);
    let changed = self.dispatch(vec![set(result.data), CacheAction::MarkLoaded { collection, at }]);
    tracing::info!(
      collection = collection.name(),
      before = count,
      after = self.state_len(collection),
      source = ?result.source,
      "collection loaded"
    );
    changed
  }

  fn state_len(&self, collection: Collection) -> usize {
    match collection {
      Collection::Recortes => self.state.recortes.len(),
      Collection::Maquinas => self.state.maquinas.len(),
      Collection::Clientes => self.state.clientes.len(),
    }
  }

  fn needs_load(&self, collection: Collection) -> bool {
    !self.state.is_loaded(collection)
      || self.state.is_stale(collection, Utc::now(), self.stale_time())
  }

  /// Start background loads. Without `force`, fresh collections are skipped.
  pub fn load_all(&mut self, force: bool) {
    for collection in Collection::ALL {
      self.load(collection, force);
    }
  }

  /// Start a background load. A forced load supersedes one in flight.
  pub fn load(&mut self, collection: Collection, force: bool) {
    if !force && !self.needs_load(collection) {
      return;
    }
    let Some(events) = &self.events else {
      tracing::debug!(collection = collection.name(), "no event channel, load skipped");
      return;
    };
    tracing::debug!(collection = collection.name(), force, "loading collection");
    match (collection, force) {
      (Collection::Recortes, true) => self.recortes.refetch(events),
      (Collection::Recortes, false) => self.recortes.fetch(events),
      (Collection::Maquinas, true) => self.maquinas.refetch(events),
      (Collection::Maquinas, false) => self.maquinas.fetch(events),
      (Collection::Clientes, true) => self.clientes.refetch(events),
      (Collection::Clientes, false) => self.clientes.fetch(events),
    }
  }

  /// Load a collection now and wait for it. Used by one-shot commands.
  pub async fn refresh(&mut self, collection: Collection, force: bool) -> Result<CacheSource> {
    if !force && !self.needs_load(collection) {
      return Ok(CacheSource::CacheFresh);
    }
    let source = match collection {
      Collection::Recortes => {
        let result = self
          .client
          .get_recortes(Some(recortes_since(Utc::now())))
          .await?;
        let source = result.source;
        self.apply_loaded(collection, result, CacheAction::SetRecortes);
        source
      }
      Collection::Maquinas => {
        let result = self.client.get_maquinas().await?;
        let source = result.source;
        self.apply_loaded(collection, result, CacheAction::SetMaquinas);
        source
      }
      Collection::Clientes => {
        let result = self.client.get_clientes().await?;
        let source = result.source;
        self.apply_loaded(collection, result, CacheAction::SetClientes);
        source
      }
    };
    Ok(source)
  }

  // ==========================================================================
  // Mutations
  // ==========================================================================

  fn failed(&self, what: &str, error: color_eyre::Report) -> color_eyre::Report {
    let description = match error.downcast_ref::<ApiError>() {
      Some(ApiError::PayloadTooLarge) => "The image is too large for the server".to_string(),
      Some(ApiError::Status { status: 500, .. }) => format!("Server error while trying to {}", what),
      Some(api) => format!("Failed to {}: {}", what, api),
      None => format!("Failed to {}: {}", what, error),
    };
    self.toast(Toast::error(description));
    error
  }

  pub async fn create_recorte(&mut self, form: &RecorteForm) -> Result<Value> {
    validate::validate_recorte(form)?;
    let created = self
      .client
      .create_recorte(form)
      .await
      .map_err(|e| self.failed("create the recorte", e))?;
    self.toast(Toast::success("Recorte created", "The recorte was created"));
    Ok(created)
  }

  pub async fn update_recorte(&mut self, id: &str, form: &RecorteForm) -> Result<()> {
    validate::validate_recorte(form)?;
    self
      .client
      .update_recorte(id, form)
      .await
      .map_err(|e| self.failed("update the recorte", e))?;
    self.toast(Toast::success("Recorte updated", format!("Recorte {} was updated", id)));
    Ok(())
  }

  pub async fn delete_recorte(&mut self, id: &str) -> Result<()> {
    self
      .client
      .delete_recorte(id)
      .await
      .map_err(|e| self.failed("delete the recorte", e))?;
    self.toast(Toast::success("Recorte deleted", format!("Recorte {} was deleted", id)));
    Ok(())
  }

  /// Use `cantidad` pieces of a recorte. The record must be in the store.
  pub async fn use_recorte(&mut self, id: &str, cantidad: u32) -> Result<()> {
    let recorte = self
      .state
      .recortes
      .iter()
      .find(|r| r.id == id)
      .ok_or_else(|| eyre!("Unknown recorte: {}", id))?;
    validate::validate_use(cantidad, recorte.cantidad, recorte.estado)?;

    self
      .client
      .use_recorte(id, cantidad)
      .await
      .map_err(|e| self.failed("use the recorte", e))?;
    self.toast(Toast::success(
      "Recorte used",
      format!("{} piece(s) of {} used", cantidad, id),
    ));
    Ok(())
  }

  pub async fn create_cliente(&mut self, form: &ClienteForm) -> Result<Value> {
    validate::validate_cliente(form)?;
    let created = self
      .client
      .create_cliente(form)
      .await
      .map_err(|e| self.failed("add the material", e))?;
    self.toast(Toast::success("Material added", "The client material was added"));
    Ok(created)
  }

  pub async fn update_cliente(&mut self, id: &str, form: &ClienteForm) -> Result<()> {
    validate::validate_cliente(form)?;
    self
      .client
      .update_cliente(id, form)
      .await
      .map_err(|e| self.failed("update the material", e))?;
    self.toast(Toast::success("Material updated", format!("Material {} was updated", id)));
    Ok(())
  }

  /// Delete a client material and ask the server for a fresh list.
  pub async fn delete_cliente(&mut self, id: &str) -> Result<()> {
    self
      .client
      .delete_cliente(id)
      .await
      .map_err(|e| self.failed("delete the material", e))?;
    if let Some(push) = &self.push {
      push.emit("getClientes", Value::Null);
    }
    self.toast(Toast::success("Material deleted", format!("Material {} was deleted", id)));
    Ok(())
  }

  pub async fn use_cliente(&mut self, id: &str, cantidad: u32) -> Result<()> {
    let cliente = self
      .state
      .clientes
      .iter()
      .find(|c| c.id == id)
      .ok_or_else(|| eyre!("Unknown material: {}", id))?;
    validate::validate_use(cantidad, cliente.cantidad, cliente.estado)?;

    self
      .client
      .use_cliente(id, cantidad)
      .await
      .map_err(|e| self.failed("use the material", e))?;
    self.toast(Toast::success(
      "Material used",
      format!("{} piece(s) of {} used", cantidad, id),
    ));
    Ok(())
  }

  /// Create a machine. There is no push event for this, so the store is
  /// updated directly.
  pub async fn create_maquina(&mut self, form: &MaquinaForm) -> Result<Maquina> {
    validate::validate_maquina(form)?;
    let maquina = self
      .client
      .create_maquina(form)
      .await
      .map_err(|e| self.failed("create the machine", e))?;
    self.dispatch(vec![CacheAction::UpsertMaquina(maquina.clone())]);
    self.toast(Toast::success(
      "Machine created",
      format!("{} was created", maquina.nombre),
    ));
    Ok(maquina)
  }
}
