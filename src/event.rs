use std::time::Duration;
use tokio::sync::mpsc;

use crate::cache::CacheResult;
use crate::inventory::types::{Cliente, Maquina, Recorte};
use crate::push::{ConnectionStatus, PushEvent};
use crate::query::Completion;

/// Sync engine events
#[derive(Debug)]
pub enum Event {
  /// Event pushed by the backend
  Push(PushEvent),
  /// Push channel connection change
  Connection(ConnectionStatus),
  /// A collection load finished
  Loaded(Loaded),
  /// Periodic tick for staleness checks
  Tick,
}

/// Finished collection loads, one variant per collection
#[derive(Debug)]
pub enum Loaded {
  Recortes(Completion<CacheResult<Vec<Recorte>>>),
  Maquinas(Completion<CacheResult<Vec<Maquina>>>),
  Clientes(Completion<CacheResult<Vec<Cliente>>>),
}

impl Loaded {
  pub fn recortes(done: Completion<CacheResult<Vec<Recorte>>>) -> Event {
    Event::Loaded(Loaded::Recortes(done))
  }

  pub fn maquinas(done: Completion<CacheResult<Vec<Maquina>>>) -> Event {
    Event::Loaded(Loaded::Maquinas(done))
  }

  pub fn clientes(done: Completion<CacheResult<Vec<Cliente>>>) -> Event {
    Event::Loaded(Loaded::Clientes(done))
  }
}

/// Event handler that merges a tick timer with events from spawned tasks
pub struct EventHandler {
  tx: mpsc::UnboundedSender<Event>,
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Create a new event handler with the given tick rate
  pub fn new(tick_rate: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    let tick_tx = tx.clone();
    tokio::spawn(async move {
      let mut interval = tokio::time::interval(tick_rate);
      interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      // The first tick completes immediately
      interval.tick().await;
      loop {
        interval.tick().await;
        if tick_tx.send(Event::Tick).is_err() {
          break;
        }
      }
    });

    Self { tx, rx }
  }

  /// Sender for tasks that feed events into the loop
  pub fn sender(&self) -> mpsc::UnboundedSender<Event> {
    self.tx.clone()
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
