use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::inventory::types::{Cliente, Maquina, Recorte};
use crate::store::{CacheAction, Collection};

/// Events pushed by the backend over the socket
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
  InitialRecortes(Vec<Recorte>),
  InitialRecortesUtilizados(Vec<Recorte>),
  NewRecorte(Recorte),
  RecorteUpdated(Recorte),
  RecorteUtilizado(Recorte),
  RecorteDeleted(String),
  InitialMaquinas(Vec<Maquina>),
  NewCliente(Cliente),
  ClienteUpdated(Cliente),
  MaterialUpdated(Cliente),
  ClienteDeleted(String),
  ForceReload,
}

#[derive(Debug, thiserror::Error)]
pub enum EventError {
  #[error("malformed '{event}' payload: {source}")]
  Payload {
    event: String,
    #[source]
    source: serde_json::Error,
  },
  #[error("'{0}' payload carries no id")]
  MissingId(String),
}

fn parse<T: DeserializeOwned>(name: &str, data: Value) -> Result<T, EventError> {
  serde_json::from_value(data).map_err(|source| EventError::Payload {
    event: name.to_string(),
    source,
  })
}

/// Delete payloads arrive either as a bare id or as `{ "id": ... }`.
fn parse_id(name: &str, data: &Value) -> Result<String, EventError> {
  let id = match data {
    Value::Object(map) => map.get("id"),
    other => Some(other),
  };
  match id {
    Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
    Some(Value::Number(n)) => Ok(n.to_string()),
    _ => Err(EventError::MissingId(name.to_string())),
  }
}

impl PushEvent {
  /// Decode a named event. Unknown names yield `Ok(None)`.
  pub fn decode(name: &str, data: Value) -> Result<Option<Self>, EventError> {
    let event = match name {
      "initialRecortes" => PushEvent::InitialRecortes(parse(name, data)?),
      "initialRecortesUtilizados" => PushEvent::InitialRecortesUtilizados(parse(name, data)?),
      "newRecorte" => PushEvent::NewRecorte(parse(name, data)?),
      "recorteUpdated" => PushEvent::RecorteUpdated(parse(name, data)?),
      "recorteUtilizado" => PushEvent::RecorteUtilizado(parse(name, data)?),
      "recorteDeleted" => PushEvent::RecorteDeleted(parse_id(name, &data)?),
      "initialMaquinas" => PushEvent::InitialMaquinas(parse(name, data)?),
      "newCliente" => PushEvent::NewCliente(parse(name, data)?),
      "clienteUpdated" => PushEvent::ClienteUpdated(parse(name, data)?),
      "materialUpdated" => PushEvent::MaterialUpdated(parse(name, data)?),
      "clienteDeleted" => PushEvent::ClienteDeleted(parse_id(name, &data)?),
      "forceReload" => PushEvent::ForceReload,
      _ => return Ok(None),
    };
    Ok(Some(event))
  }

  pub fn name(&self) -> &'static str {
    match self {
      PushEvent::InitialRecortes(_) => "initialRecortes",
      PushEvent::InitialRecortesUtilizados(_) => "initialRecortesUtilizados",
      PushEvent::NewRecorte(_) => "newRecorte",
      PushEvent::RecorteUpdated(_) => "recorteUpdated",
      PushEvent::RecorteUtilizado(_) => "recorteUtilizado",
      PushEvent::RecorteDeleted(_) => "recorteDeleted",
      PushEvent::InitialMaquinas(_) => "initialMaquinas",
      PushEvent::NewCliente(_) => "newCliente",
      PushEvent::ClienteUpdated(_) => "clienteUpdated",
      PushEvent::MaterialUpdated(_) => "materialUpdated",
      PushEvent::ClienteDeleted(_) => "clienteDeleted",
      PushEvent::ForceReload => "forceReload",
    }
  }

  /// Reducer actions for this event. `forceReload` maps to none; the
  /// engine handles it by refetching.
  pub fn into_actions(self, now: DateTime<Utc>) -> Vec<CacheAction> {
    match self {
      PushEvent::InitialRecortes(list) => vec![
        CacheAction::SetRecortes(list),
        CacheAction::MarkLoaded {
          collection: Collection::Recortes,
          at: now,
        },
      ],
      PushEvent::InitialRecortesUtilizados(list) => vec![CacheAction::MergeRecortes(list)],
      PushEvent::NewRecorte(r) => vec![CacheAction::AddRecorte(r)],
      PushEvent::RecorteUpdated(r) | PushEvent::RecorteUtilizado(r) => {
        vec![CacheAction::UpdateRecorte(r)]
      }
      PushEvent::RecorteDeleted(id) => vec![CacheAction::DeleteRecorte(id)],
      PushEvent::InitialMaquinas(list) => vec![
        CacheAction::SetMaquinas(list),
        CacheAction::MarkLoaded {
          collection: Collection::Maquinas,
          at: now,
        },
      ],
      PushEvent::NewCliente(c) => vec![CacheAction::AddCliente(c)],
      PushEvent::ClienteUpdated(c) | PushEvent::MaterialUpdated(c) => {
        vec![CacheAction::UpdateCliente(c)]
      }
      PushEvent::ClienteDeleted(id) => vec![CacheAction::DeleteCliente(id)],
      PushEvent::ForceReload => Vec::new(),
    }
  }
}
