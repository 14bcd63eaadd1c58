use chrono::{DateTime, Utc};
use color_eyre::Result;
use serde::Serialize;

use crate::cli::print::print_json;
use crate::cli::Ctx;
use crate::store::views::{
  cache_status, cliente_summary, family_counts, format_last_fetch, porcentaje_por_maquina,
  recortes_disponibles, recortes_utilizados_ultimo_mes, CacheStatus, ClienteSummary,
  FamilyCounts, MaquinaShare,
};
use crate::store::{CacheState, Collection};

/// Dashboard figures derived from the store
#[derive(Debug, Serialize)]
pub struct Summary {
  pub status: CacheStatus,
  pub last_fetch: Vec<(&'static str, String)>,
  pub recortes: usize,
  pub disponibles: usize,
  pub utilizados_ultimo_mes: usize,
  pub familias: FamilyCounts,
  pub por_maquina: Vec<MaquinaShare>,
  pub clientes: ClienteSummary,
}

impl Summary {
  pub fn build(state: &CacheState, now: DateTime<Utc>, stale_time: chrono::Duration) -> Self {
    Self {
      status: cache_status(state, now, stale_time),
      last_fetch: Collection::ALL
        .iter()
        .map(|c| (c.name(), format_last_fetch(state.last_fetch(*c), now)))
        .collect(),
      recortes: state.recortes.len(),
      disponibles: recortes_disponibles(state).len(),
      utilizados_ultimo_mes: recortes_utilizados_ultimo_mes(state, now).len(),
      familias: family_counts(state),
      por_maquina: porcentaje_por_maquina(state),
      clientes: cliente_summary(state, now),
    }
  }

  pub fn print(&self) {
    println!("Cache: {}", self.status);
    for (name, when) in &self.last_fetch {
      println!("  {:<10} {}", name, when);
    }
    println!();
    println!(
      "Recortes: {} disponibles, {} utilizados el ultimo mes ({} en total)",
      self.disponibles, self.utilizados_ultimo_mes, self.recortes
    );
    println!(
      "  laser {}  plasma {}  oxicorte {}",
      self.familias.laser, self.familias.plasma, self.familias.oxi
    );
    for share in &self.por_maquina {
      println!(
        "  {:<24} {:>5} {:>4}%",
        share.nombre, share.disponibles, share.porcentaje
      );
    }
    println!();
    println!(
      "Clientes: {} disponibles, {} utilizados, {} nuevos en 30 dias",
      self.clientes.disponibles, self.clientes.utilizados, self.clientes.ultimos_30_dias
    );
  }
}

pub fn stale_time(ctx: &Ctx) -> chrono::Duration {
  chrono::Duration::from_std(ctx.engine.config().sync.stale_time())
    .unwrap_or(chrono::Duration::MAX)
}

pub async fn handle(ctx: &mut Ctx) -> Result<()> {
  ctx.load(&Collection::ALL).await?;
  let summary = Summary::build(ctx.engine.state(), Utc::now(), stale_time(ctx));
  if ctx.json {
    return print_json(&summary);
  }
  summary.print();
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::inventory::types::Maquina;
  use crate::store::fixtures::{cliente, recorte};
  use crate::store::CacheAction;
  use chrono::TimeZone;

  #[test]
  fn test_build_from_state() {
    let now = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).single().expect("now");
    let mut state = CacheState::default();
    state.apply(CacheAction::SetMaquinas(vec![Maquina {
      id: "m1".to_string(),
      nombre: "Laser CO2".to_string(),
    }]));
    state.apply(CacheAction::SetRecortes(vec![
      recorte("r1", "m1", true),
      recorte("r2", "m1", false),
    ]));
    state.apply(CacheAction::SetClientes(vec![cliente("c1", "ACME")]));
    state.apply(CacheAction::MarkLoaded {
      collection: Collection::Recortes,
      at: now,
    });

    let summary = Summary::build(&state, now, chrono::Duration::minutes(5));
    assert_eq!(summary.recortes, 2);
    assert_eq!(summary.disponibles, 1);
    assert_eq!(summary.utilizados_ultimo_mes, 1);
    assert_eq!(summary.familias.laser, 1);
    assert_eq!(summary.clientes.ultimos_30_dias, 1);
    assert_eq!(summary.status, CacheStatus::Stale);
    assert_eq!(summary.last_fetch[0], ("recortes", "0s ago".to_string()));
  }
}
