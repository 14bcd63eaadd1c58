use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::inventory::types::{Cliente, Maquina, Recorte};

/// The three collections mirrored from the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
  Recortes,
  Maquinas,
  Clientes,
}

impl Collection {
  pub const ALL: [Collection; 3] = [Collection::Recortes, Collection::Maquinas, Collection::Clientes];

  pub fn name(&self) -> &'static str {
    match self {
      Collection::Recortes => "recortes",
      Collection::Maquinas => "maquinas",
      Collection::Clientes => "clientes",
    }
  }
}

/// Load bookkeeping for one collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadStatus {
  pub loaded: bool,
  pub last_fetch: Option<DateTime<Utc>>,
}

/// Local mirror of server state
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheState {
  /// Newest first, one entry per id
  pub recortes: Vec<Recorte>,
  /// Recortes whose `estado` is false
  pub recortes_utilizados: Vec<Recorte>,
  pub maquinas: Vec<Maquina>,
  pub clientes: Vec<Cliente>,
  status: HashMap<Collection, LoadStatus>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheAction {
  SetRecortes(Vec<Recorte>),
  MergeRecortes(Vec<Recorte>),
  AddRecorte(Recorte),
  UpdateRecorte(Recorte),
  DeleteRecorte(String),
  SetMaquinas(Vec<Maquina>),
  UpsertMaquina(Maquina),
  SetClientes(Vec<Cliente>),
  AddCliente(Cliente),
  UpdateCliente(Cliente),
  DeleteCliente(String),
  MarkLoaded {
    collection: Collection,
    at: DateTime<Utc>,
  },
  Clear,
}

impl CacheAction {
  /// Short name used in logs
  pub fn name(&self) -> &'static str {
    match self {
      CacheAction::SetRecortes(_) => "set_recortes",
      CacheAction::MergeRecortes(_) => "merge_recortes",
      CacheAction::AddRecorte(_) => "add_recorte",
      CacheAction::UpdateRecorte(_) => "update_recorte",
      CacheAction::DeleteRecorte(_) => "delete_recorte",
      CacheAction::SetMaquinas(_) => "set_maquinas",
      CacheAction::UpsertMaquina(_) => "upsert_maquina",
      CacheAction::SetClientes(_) => "set_clientes",
      CacheAction::AddCliente(_) => "add_cliente",
      CacheAction::UpdateCliente(_) => "update_cliente",
      CacheAction::DeleteCliente(_) => "delete_cliente",
      CacheAction::MarkLoaded { .. } => "mark_loaded",
      CacheAction::Clear => "clear",
    }
  }
}

/// Records keyed by a backend id
trait Keyed {
  fn id(&self) -> &str;
}

impl Keyed for Recorte {
  fn id(&self) -> &str {
    &self.id
  }
}

impl Keyed for Cliente {
  fn id(&self) -> &str {
    &self.id
  }
}

impl Keyed for Maquina {
  fn id(&self) -> &str {
    &self.id
  }
}

impl CacheState {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn load_status(&self, collection: Collection) -> LoadStatus {
    self.status.get(&collection).copied().unwrap_or_default()
  }

  pub fn is_loaded(&self, collection: Collection) -> bool {
    self.load_status(collection).loaded
  }

  pub fn last_fetch(&self, collection: Collection) -> Option<DateTime<Utc>> {
    self.load_status(collection).last_fetch
  }

  /// A collection is stale when it was never fetched or its last fetch is
  /// older than `stale_time`.
  pub fn is_stale(&self, collection: Collection, now: DateTime<Utc>, stale_time: chrono::Duration) -> bool {
    match self.last_fetch(collection) {
      Some(at) => now - at > stale_time,
      None => true,
    }
  }

  /// Apply an action. Returns whether the state changed.
  pub fn apply(&mut self, action: CacheAction) -> bool {
    match action {
      CacheAction::SetRecortes(list) => {
        let recortes = dedupe(list);
        let utilizados: Vec<Recorte> = recortes.iter().filter(|r| !r.estado).cloned().collect();
        if recortes == self.recortes && utilizados == self.recortes_utilizados {
          return false;
        }
        self.recortes = recortes;
        self.recortes_utilizados = utilizados;
        true
      }
      CacheAction::MergeRecortes(list) => {
        let mut changed = false;
        for recorte in list {
          changed |= self.track_utilizado(&recorte);
          changed |= upsert_back(&mut self.recortes, recorte);
        }
        changed
      }
      CacheAction::AddRecorte(recorte) | CacheAction::UpdateRecorte(recorte) => {
        let utilizados_changed = self.track_utilizado(&recorte);
        upsert_front(&mut self.recortes, recorte) | utilizados_changed
      }
      CacheAction::DeleteRecorte(id) => {
        remove(&mut self.recortes, &id) | remove(&mut self.recortes_utilizados, &id)
      }
      CacheAction::SetMaquinas(list) => replace(&mut self.maquinas, dedupe(list)),
      CacheAction::UpsertMaquina(maquina) => upsert_back(&mut self.maquinas, maquina),
      CacheAction::SetClientes(list) => replace(&mut self.clientes, dedupe(list)),
      CacheAction::AddCliente(cliente) | CacheAction::UpdateCliente(cliente) => {
        upsert_front(&mut self.clientes, cliente)
      }
      CacheAction::DeleteCliente(id) => remove(&mut self.clientes, &id),
      CacheAction::MarkLoaded { collection, at } => {
        let next = LoadStatus {
          loaded: true,
          last_fetch: Some(at),
        };
        self.status.insert(collection, next) != Some(next)
      }
      CacheAction::Clear => {
        if *self == CacheState::default() {
          return false;
        }
        *self = CacheState::default();
        true
      }
    }
  }

  /// Keep `recortes_utilizados` in step with the `estado` of `recorte`.
  fn track_utilizado(&mut self, recorte: &Recorte) -> bool {
    if recorte.estado {
      remove(&mut self.recortes_utilizados, &recorte.id)
    } else {
      upsert_front(&mut self.recortes_utilizados, recorte.clone())
    }
  }
}

/// Collapse duplicate ids: first position wins, last value wins.
fn dedupe<T: Keyed>(list: Vec<T>) -> Vec<T> {
  let mut index: HashMap<String, usize> = HashMap::with_capacity(list.len());
  let mut out: Vec<T> = Vec::with_capacity(list.len());
  for item in list {
    match index.get(item.id()) {
      Some(&i) => out[i] = item,
      None => {
        index.insert(item.id().to_string(), out.len());
        out.push(item);
      }
    }
  }
  out
}

fn replace<T: PartialEq>(slot: &mut Vec<T>, next: Vec<T>) -> bool {
  if *slot == next {
    return false;
  }
  *slot = next;
  true
}

/// Replace in place, or insert at the front when the id is new.
fn upsert_front<T: Keyed + PartialEq>(list: &mut Vec<T>, item: T) -> bool {
  match list.iter().position(|x| x.id() == item.id()) {
    Some(i) if list[i] == item => false,
    Some(i) => {
      list[i] = item;
      true
    }
    None => {
      list.insert(0, item);
      true
    }
  }
}

/// Replace in place, or append when the id is new.
fn upsert_back<T: Keyed + PartialEq>(list: &mut Vec<T>, item: T) -> bool {
  match list.iter().position(|x| x.id() == item.id()) {
    Some(i) if list[i] == item => false,
    Some(i) => {
      list[i] = item;
      true
    }
    None => {
      list.push(item);
      true
    }
  }
}

fn remove<T: Keyed>(list: &mut Vec<T>, id: &str) -> bool {
  let before = list.len();
  list.retain(|x| x.id() != id);
  list.len() != before
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;

  pub(crate) fn recorte(id: &str, maquina_id: &str, estado: bool) -> Recorte {
    Recorte {
      id: id.to_string(),
      largo: 1000.0,
      ancho: 500.0,
      espesor: 3.0,
      cantidad: 2,
      estado,
      imagen: None,
      observaciones: None,
      maquina_id: maquina_id.to_string(),
      maquina: None,
      fecha_creacion: "2024-01-01T00:00:00Z".to_string(),
      fecha_actualizacion: "2024-01-01T00:00:00Z".to_string(),
    }
  }

  pub(crate) fn cliente(id: &str, nombre: &str) -> Cliente {
    Cliente {
      id: id.to_string(),
      cliente: nombre.to_string(),
      espesor: 2.0,
      tipo_material: "Acero".to_string(),
      largo: 100.0,
      ancho: 50.0,
      cantidad: 1,
      remito: "1001".to_string(),
      observaciones: None,
      estado: true,
      created_at: "2024-01-01T00:00:00Z".to_string(),
      updated_at: "2024-01-01T00:00:00Z".to_string(),
    }
  }

  fn ids(list: &[Recorte]) -> Vec<&str> {
    list.iter().map(|r| r.id.as_str()).collect()
  }

  #[test]
  fn test_set_recortes_computes_utilizados() {
    let mut state = CacheState::new();
    assert!(state.apply(CacheAction::SetRecortes(vec![
      recorte("a", "m1", true),
      recorte("b", "m1", false),
    ])));
    assert_eq!(ids(&state.recortes), vec!["a", "b"]);
    assert_eq!(ids(&state.recortes_utilizados), vec!["b"]);
  }

  #[test]
  fn test_set_recortes_collapses_duplicates() {
    let mut state = CacheState::new();
    let mut later = recorte("a", "m1", true);
    later.cantidad = 9;
    state.apply(CacheAction::SetRecortes(vec![
      recorte("a", "m1", true),
      recorte("b", "m1", true),
      later,
    ]));
    assert_eq!(ids(&state.recortes), vec!["a", "b"]);
    assert_eq!(state.recortes[0].cantidad, 9);
  }

  #[test]
  fn test_set_same_list_is_unchanged() {
    let mut state = CacheState::new();
    let list = vec![recorte("a", "m1", true)];
    assert!(state.apply(CacheAction::SetRecortes(list.clone())));
    assert!(!state.apply(CacheAction::SetRecortes(list)));
  }

  #[test]
  fn test_add_inserts_at_front() {
    let mut state = CacheState::new();
    state.apply(CacheAction::SetRecortes(vec![recorte("a", "m1", true)]));
    state.apply(CacheAction::AddRecorte(recorte("b", "m1", true)));
    assert_eq!(ids(&state.recortes), vec!["b", "a"]);
  }

  #[test]
  fn test_duplicate_add_is_idempotent() {
    let mut state = CacheState::new();
    assert!(state.apply(CacheAction::AddRecorte(recorte("a", "m1", true))));
    assert!(!state.apply(CacheAction::AddRecorte(recorte("a", "m1", true))));
    assert_eq!(state.recortes.len(), 1);
  }

  #[test]
  fn test_update_before_add_inserts() {
    let mut state = CacheState::new();
    assert!(state.apply(CacheAction::UpdateRecorte(recorte("a", "m1", true))));
    assert_eq!(ids(&state.recortes), vec!["a"]);
  }

  #[test]
  fn test_update_replaces_in_place() {
    let mut state = CacheState::new();
    state.apply(CacheAction::SetRecortes(vec![
      recorte("a", "m1", true),
      recorte("b", "m1", true),
    ]));
    let mut updated = recorte("b", "m1", true);
    updated.cantidad = 1;
    state.apply(CacheAction::UpdateRecorte(updated));
    assert_eq!(ids(&state.recortes), vec!["a", "b"]);
    assert_eq!(state.recortes[1].cantidad, 1);
  }

  #[test]
  fn test_utilizados_follow_estado() {
    let mut state = CacheState::new();
    state.apply(CacheAction::SetRecortes(vec![recorte("a", "m1", true)]));

    state.apply(CacheAction::UpdateRecorte(recorte("a", "m1", false)));
    assert_eq!(ids(&state.recortes_utilizados), vec!["a"]);

    state.apply(CacheAction::UpdateRecorte(recorte("a", "m1", true)));
    assert!(state.recortes_utilizados.is_empty());
  }

  #[test]
  fn test_add_used_recorte_tracks_utilizado() {
    let mut state = CacheState::new();
    state.apply(CacheAction::AddRecorte(recorte("a", "m1", false)));
    assert_eq!(ids(&state.recortes_utilizados), vec!["a"]);
  }

  #[test]
  fn test_delete_removes_from_both_lists() {
    let mut state = CacheState::new();
    state.apply(CacheAction::SetRecortes(vec![
      recorte("a", "m1", false),
      recorte("b", "m1", true),
    ]));
    assert!(state.apply(CacheAction::DeleteRecorte("a".to_string())));
    assert_eq!(ids(&state.recortes), vec!["b"]);
    assert!(state.recortes_utilizados.is_empty());
  }

  #[test]
  fn test_delete_unknown_is_noop() {
    let mut state = CacheState::new();
    state.apply(CacheAction::SetRecortes(vec![recorte("a", "m1", true)]));
    assert!(!state.apply(CacheAction::DeleteRecorte("zzz".to_string())));
  }

  #[test]
  fn test_merge_appends_new_and_keeps_order() {
    let mut state = CacheState::new();
    state.apply(CacheAction::SetRecortes(vec![recorte("a", "m1", true)]));
    state.apply(CacheAction::MergeRecortes(vec![
      recorte("b", "m1", false),
      recorte("a", "m1", false),
    ]));
    assert_eq!(ids(&state.recortes), vec!["a", "b"]);
    assert!(!state.recortes[0].estado);
    assert_eq!(state.recortes_utilizados.len(), 2);
  }

  #[test]
  fn test_clientes_keyed_merge() {
    let mut state = CacheState::new();
    state.apply(CacheAction::SetClientes(vec![cliente("c1", "ACME")]));
    state.apply(CacheAction::AddCliente(cliente("c2", "Beta")));
    state.apply(CacheAction::UpdateCliente(cliente("c1", "ACME SA")));
    assert_eq!(state.clientes.len(), 2);
    assert_eq!(state.clientes[0].id, "c2");
    assert_eq!(state.clientes[1].cliente, "ACME SA");

    assert!(state.apply(CacheAction::DeleteCliente("c2".to_string())));
    assert_eq!(state.clientes.len(), 1);
  }

  #[test]
  fn test_upsert_maquina() {
    let mut state = CacheState::new();
    let laser = Maquina {
      id: "m1".to_string(),
      nombre: "Laser".to_string(),
    };
    assert!(state.apply(CacheAction::UpsertMaquina(laser.clone())));
    assert!(!state.apply(CacheAction::UpsertMaquina(laser)));
    assert_eq!(state.maquinas.len(), 1);
  }

  #[test]
  fn test_mark_loaded_and_staleness() {
    let mut state = CacheState::new();
    let now = Utc::now();
    let five_min = chrono::Duration::minutes(5);

    assert!(!state.is_loaded(Collection::Recortes));
    assert!(state.is_stale(Collection::Recortes, now, five_min));

    assert!(state.apply(CacheAction::MarkLoaded {
      collection: Collection::Recortes,
      at: now - chrono::Duration::minutes(1),
    }));
    assert!(state.is_loaded(Collection::Recortes));
    assert!(!state.is_stale(Collection::Recortes, now, five_min));
    assert!(state.is_stale(Collection::Recortes, now + chrono::Duration::minutes(10), five_min));
    assert!(!state.is_loaded(Collection::Clientes));
  }

  #[test]
  fn test_clear_resets_everything() {
    let mut state = CacheState::new();
    assert!(!state.apply(CacheAction::Clear));
    state.apply(CacheAction::AddRecorte(recorte("a", "m1", true)));
    state.apply(CacheAction::MarkLoaded {
      collection: Collection::Recortes,
      at: Utc::now(),
    });
    assert!(state.apply(CacheAction::Clear));
    assert_eq!(state, CacheState::default());
  }
}
