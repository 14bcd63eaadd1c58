//! Caching implementations for inventory types.

use crate::cache::{Cacheable, QueryKey};

use super::types::{Cliente, Maquina, Recorte, StatsRange};

// ============================================================================
// Cacheable implementations
// ============================================================================

impl Cacheable for Recorte {
  fn cache_key(&self) -> String {
    self.id.clone()
  }

  fn updated_at(&self) -> Option<&str> {
    Some(&self.fecha_actualizacion)
  }

  fn entity_type() -> &'static str {
    "recorte"
  }
}

impl Cacheable for Cliente {
  fn cache_key(&self) -> String {
    self.id.clone()
  }

  fn updated_at(&self) -> Option<&str> {
    Some(&self.updated_at)
  }

  fn entity_type() -> &'static str {
    "cliente"
  }
}

impl Cacheable for Maquina {
  fn cache_key(&self) -> String {
    self.id.clone()
  }

  fn updated_at(&self) -> Option<&str> {
    // Machines don't carry timestamps
    None
  }

  fn entity_type() -> &'static str {
    "maquina"
  }
}

// ============================================================================
// Query key types
// ============================================================================

/// Query key types for inventory API calls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InventoryQueryKey {
  /// Recortes list (the six-month window is implied)
  Recortes,
  Maquinas,
  Clientes,
  /// Paginated recortes of a machine filtered by estado
  RecortesByMaquina {
    maquina_id: String,
    estado: bool,
    page: u32,
    limit: u32,
  },
  /// Paginated pending recortes of a machine
  RecortesPendientes {
    maquina_id: String,
    page: u32,
    limit: u32,
  },
  EstadisticasTiempoReal,
  EstadisticasMaquina {
    maquina_id: String,
    range: StatsRange,
  },
  EstadisticasResumen {
    range: StatsRange,
  },
}

impl QueryKey for InventoryQueryKey {
  fn description(&self) -> String {
    match self {
      Self::Recortes => "recortes".to_string(),
      Self::Maquinas => "maquinas".to_string(),
      Self::Clientes => "clientes".to_string(),
      Self::RecortesByMaquina {
        maquina_id,
        estado,
        page,
        limit,
      } => format!(
        "recortes maquina {} estado {} page {} limit {}",
        maquina_id, estado, page, limit
      ),
      Self::RecortesPendientes {
        maquina_id,
        page,
        limit,
      } => format!(
        "recortes maquina {} pendientes page {} limit {}",
        maquina_id, page, limit
      ),
      Self::EstadisticasTiempoReal => "estadisticas tiempo-real".to_string(),
      Self::EstadisticasMaquina { maquina_id, range } => {
        format!("estadisticas maquina {} {}", maquina_id, describe_range(range))
      }
      Self::EstadisticasResumen { range } => {
        format!("estadisticas resumen {}", describe_range(range))
      }
    }
  }
}

fn describe_range(range: &StatsRange) -> String {
  range
    .query_pairs()
    .into_iter()
    .map(|(k, v)| format!("{}={}", k, v))
    .collect::<Vec<_>>()
    .join("&")
}
