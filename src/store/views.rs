//! Derived read-only views over [`CacheState`].
//!
//! Views borrow from the state and never mutate it. Time-dependent views
//! take `now` explicitly so callers (and tests) control the clock.

use chrono::{DateTime, Duration, Months, NaiveDate, Utc};
use serde::Serialize;

use super::reducer::{CacheState, Collection};
use crate::inventory::types::{Cliente, Maquina, Recorte};

pub fn recortes_disponibles(state: &CacheState) -> Vec<&Recorte> {
  state.recortes.iter().filter(|r| r.estado).collect()
}

/// One calendar month before `now`
fn one_month_before(now: DateTime<Utc>) -> DateTime<Utc> {
  now.checked_sub_months(Months::new(1)).unwrap_or(now - Duration::days(30))
}

fn used_since(recorte: &Recorte, cutoff: DateTime<Utc>) -> bool {
  !recorte.estado && recorte.updated_at().is_some_and(|t| t > cutoff)
}

pub fn recortes_utilizados_ultimo_mes(state: &CacheState, now: DateTime<Utc>) -> Vec<&Recorte> {
  let cutoff = one_month_before(now);
  state
    .recortes_utilizados
    .iter()
    .filter(|r| used_since(r, cutoff))
    .collect()
}

/// Share of available recortes owned by one machine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaquinaShare {
  pub maquina_id: String,
  pub nombre: String,
  pub disponibles: usize,
  pub porcentaje: u32,
}

pub fn porcentaje_por_maquina(state: &CacheState) -> Vec<MaquinaShare> {
  let disponibles = recortes_disponibles(state);
  let total = disponibles.len();
  if total == 0 {
    return Vec::new();
  }

  state
    .maquinas
    .iter()
    .map(|maquina| {
      let count = disponibles.iter().filter(|r| r.maquina_id == maquina.id).count();
      MaquinaShare {
        maquina_id: maquina.id.clone(),
        nombre: maquina.nombre.clone(),
        disponibles: count,
        porcentaje: (count as f64 * 100.0 / total as f64).round() as u32,
      }
    })
    .collect()
}

/// Available recortes per machine family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FamilyCounts {
  pub laser: usize,
  pub plasma: usize,
  pub oxi: usize,
}

pub fn family_counts(state: &CacheState) -> FamilyCounts {
  let mut counts = FamilyCounts::default();
  for recorte in recortes_disponibles(state) {
    let Some(nombre) = machine_name(&state.maquinas, recorte) else {
      continue;
    };
    let nombre = nombre.to_lowercase();
    if nombre.contains("laser") {
      counts.laser += 1;
    }
    if nombre.contains("plasma") {
      counts.plasma += 1;
    }
    if nombre.contains("oxi") {
      counts.oxi += 1;
    }
  }
  counts
}

fn machine_name<'a>(maquinas: &'a [Maquina], recorte: &'a Recorte) -> Option<&'a str> {
  maquinas
    .iter()
    .find(|m| m.id == recorte.maquina_id)
    .map(|m| m.nombre.as_str())
    .or_else(|| recorte.maquina_nombre())
}

// ============================================================================
// Filters
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, clap::ValueEnum)]
pub enum EstadoFilter {
  #[default]
  Todos,
  Disponibles,
  Utilizados,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecorteFilter {
  pub maquina_id: Option<String>,
  pub search: Option<String>,
  pub espesor: Option<f64>,
  pub estado: EstadoFilter,
}

impl RecorteFilter {
  pub fn apply<'a>(&self, recortes: &'a [Recorte], now: DateTime<Utc>) -> Vec<&'a Recorte> {
    let cutoff = one_month_before(now);
    let search = self
      .search
      .as_deref()
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .map(str::to_lowercase);

    recortes
      .iter()
      .filter(|r| self.maquina_id.as_deref().map_or(true, |id| r.maquina_id == id))
      .filter(|r| {
        search.as_deref().map_or(true, |q| {
          r.id.to_lowercase().contains(q)
            || r.maquina_nombre().unwrap_or_default().to_lowercase().contains(q)
        })
      })
      .filter(|r| self.espesor.map_or(true, |e| r.espesor == e))
      .filter(|r| match self.estado {
        EstadoFilter::Todos => true,
        EstadoFilter::Disponibles => r.estado,
        EstadoFilter::Utilizados => used_since(r, cutoff),
      })
      .collect()
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
  Asc,
  #[default]
  Desc,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClienteFilter {
  pub search: Option<String>,
  pub estado: EstadoFilter,
  pub desde: Option<NaiveDate>,
  pub hasta: Option<NaiveDate>,
  pub sort: SortOrder,
}

impl ClienteFilter {
  pub fn apply<'a>(&self, clientes: &'a [Cliente]) -> Vec<&'a Cliente> {
    let raw = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let lower = raw.map(str::to_lowercase);
    let desde = self.desde.map(|d| d.and_time(chrono::NaiveTime::MIN).and_utc());
    // The whole `hasta` day is included
    let hasta = self
      .hasta
      .map(|d| (d + Duration::days(1)).and_time(chrono::NaiveTime::MIN).and_utc());

    let mut out: Vec<&Cliente> = clientes
      .iter()
      .filter(|c| match (raw, lower.as_deref()) {
        (Some(raw), Some(q)) => {
          c.cliente.to_lowercase().contains(q)
            || c.tipo_material.to_lowercase().contains(q)
            || c
              .observaciones
              .as_deref()
              .is_some_and(|o| o.to_lowercase().contains(q))
            || c.remito.contains(raw)
        }
        _ => true,
      })
      .filter(|c| match self.estado {
        EstadoFilter::Todos => true,
        EstadoFilter::Disponibles => c.estado,
        EstadoFilter::Utilizados => !c.estado,
      })
      .filter(|c| {
        if desde.is_none() && hasta.is_none() {
          return true;
        }
        let Some(created) = c.created() else {
          return false;
        };
        desde.map_or(true, |d| created >= d) && hasta.map_or(true, |h| created <= h)
      })
      .collect();

    // Records without a timestamp sort as the oldest
    out.sort_by(|a, b| {
      let ordering = a.created().cmp(&b.created());
      match self.sort {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
      }
    });
    out
  }
}

/// Headline figures for client material
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClienteSummary {
  pub disponibles: usize,
  pub utilizados: usize,
  pub ultimos_30_dias: usize,
}

pub fn cliente_summary(state: &CacheState, now: DateTime<Utc>) -> ClienteSummary {
  let cutoff = now - Duration::days(30);
  ClienteSummary {
    disponibles: state.clientes.iter().filter(|c| c.estado).count(),
    utilizados: state.clientes.iter().filter(|c| !c.estado).count(),
    ultimos_30_dias: state
      .clientes
      .iter()
      .filter(|c| c.created().is_some_and(|t| t >= cutoff))
      .count(),
  }
}

// ============================================================================
// Pagination
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
  pub items: Vec<T>,
  pub page: usize,
  pub per_page: usize,
  pub total: usize,
  pub total_pages: usize,
  /// 1-based index of the first item shown, 0 when empty
  pub first: usize,
  /// 1-based index of the last item shown
  pub last: usize,
}

/// Slice `items` into 1-based pages. Out-of-range pages clamp into range.
pub fn paginate<T: Clone>(items: &[T], page: usize, per_page: usize) -> Page<T> {
  let per_page = per_page.max(1);
  let total = items.len();
  let total_pages = total.div_ceil(per_page);
  let page = page.clamp(1, total_pages.max(1));

  let start = ((page - 1) * per_page).min(total);
  let end = (start + per_page).min(total);

  Page {
    items: items[start..end].to_vec(),
    page,
    per_page,
    total,
    total_pages,
    first: if start < end { start + 1 } else { 0 },
    last: end,
  }
}

// ============================================================================
// Cache status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
  Loading,
  Stale,
  Fresh,
}

impl std::fmt::Display for CacheStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let text = match self {
      CacheStatus::Loading => "loading",
      CacheStatus::Stale => "stale",
      CacheStatus::Fresh => "fresh",
    };
    f.write_str(text)
  }
}

pub fn cache_status(state: &CacheState, now: DateTime<Utc>, stale_time: Duration) -> CacheStatus {
  if Collection::ALL.iter().all(|c| !state.is_loaded(*c)) {
    return CacheStatus::Loading;
  }
  if Collection::ALL
    .iter()
    .any(|c| state.is_stale(*c, now, stale_time))
  {
    return CacheStatus::Stale;
  }
  CacheStatus::Fresh
}

pub fn format_last_fetch(last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
  let Some(last) = last else {
    return "never".to_string();
  };
  let secs = (now - last).num_seconds().max(0);
  let (minutes, seconds) = (secs / 60, secs % 60);
  if minutes > 0 {
    format!("{}m {}s ago", minutes, seconds)
  } else {
    format!("{}s ago", seconds)
  }
}

/// Parse a `YYYY-MM-DD` argument
pub fn parse_date(s: &str) -> Option<NaiveDate> {
  NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}
