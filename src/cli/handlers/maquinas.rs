use color_eyre::Result;
use serde::Serialize;

use crate::cli::args::MaquinasCmd;
use crate::cli::print::print_json;
use crate::cli::Ctx;
use crate::inventory::api_types::MaquinaForm;
use crate::store::views::{porcentaje_por_maquina, MaquinaShare};
use crate::store::{CacheState, Collection};

pub async fn handle(ctx: &mut Ctx, cmd: MaquinasCmd) -> Result<()> {
  match cmd {
    MaquinasCmd::List => list(ctx).await,
    MaquinasCmd::Create { nombre } => {
      let maquina = ctx.engine.create_maquina(&MaquinaForm { nombre }).await?;
      if ctx.json {
        print_json(&maquina)?;
      }
      Ok(())
    }
  }
}

#[derive(Debug, Serialize, PartialEq)]
struct MaquinaRow {
  id: String,
  nombre: String,
  disponibles: usize,
  porcentaje: u32,
}

/// Every machine with its share of available recortes, including
/// machines that hold none.
fn rows(state: &CacheState) -> Vec<MaquinaRow> {
  let shares = porcentaje_por_maquina(state);
  state
    .maquinas
    .iter()
    .map(|m| {
      let share = shares.iter().find(|s: &&MaquinaShare| s.maquina_id == m.id);
      MaquinaRow {
        id: m.id.clone(),
        nombre: m.nombre.clone(),
        disponibles: share.map_or(0, |s| s.disponibles),
        porcentaje: share.map_or(0, |s| s.porcentaje),
      }
    })
    .collect()
}

async fn list(ctx: &mut Ctx) -> Result<()> {
  ctx.load(&[Collection::Maquinas, Collection::Recortes]).await?;
  let rows = rows(ctx.engine.state());

  if ctx.json {
    return print_json(&rows);
  }
  println!("{:<24} {:<24} {:>11} {:>5}", "ID", "NOMBRE", "DISPONIBLES", "%");
  for row in &rows {
    println!(
      "{:<24} {:<24} {:>11} {:>4}%",
      row.id, row.nombre, row.disponibles, row.porcentaje
    );
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::inventory::types::Maquina;
  use crate::store::fixtures::recorte;
  use crate::store::CacheAction;

  #[test]
  fn test_rows_include_empty_machines() {
    let mut state = CacheState::default();
    state.apply(CacheAction::SetMaquinas(vec![
      Maquina {
        id: "m1".to_string(),
        nombre: "Laser".to_string(),
      },
      Maquina {
        id: "m2".to_string(),
        nombre: "Plasma".to_string(),
      },
    ]));
    state.apply(CacheAction::SetRecortes(vec![
      recorte("r1", "m1", true),
      recorte("r2", "m1", true),
    ]));

    let rows = rows(&state);
    assert_eq!(rows.len(), 2);
    assert_eq!((rows[0].disponibles, rows[0].porcentaje), (2, 100));
    assert_eq!((rows[1].disponibles, rows[1].porcentaje), (0, 0));
  }
}
