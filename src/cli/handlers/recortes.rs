use chrono::Utc;
use color_eyre::{eyre::eyre, Result};

use crate::cli::args::{RecorteCreateArgs, RecorteEditArgs, RecortesCmd};
use crate::cli::print::{self, print_json};
use crate::cli::Ctx;
use crate::image::image_src;
use crate::inventory::api_types::RecorteForm;
use crate::inventory::types::Recorte;
use crate::store::views::{paginate, EstadoFilter, RecorteFilter};
use crate::store::Collection;

pub async fn handle(ctx: &mut Ctx, cmd: RecortesCmd) -> Result<()> {
  match cmd {
    RecortesCmd::List {
      maquina,
      search,
      espesor,
      estado,
      page,
      per_page,
    } => list(ctx, maquina, search, espesor, estado, page, per_page).await,
    RecortesCmd::Show { id } => show(ctx, &id).await,
    RecortesCmd::Create(args) => create(ctx, args).await,
    RecortesCmd::Edit { id, fields } => edit(ctx, &id, fields).await,
    RecortesCmd::Delete { id } => {
      ctx.engine.delete_recorte(&id).await?;
      Ok(())
    }
    RecortesCmd::Use { id, cantidad } => {
      ctx.load(&[Collection::Recortes]).await?;
      ctx.engine.use_recorte(&id, cantidad).await?;
      Ok(())
    }
    RecortesCmd::Pending {
      maquina,
      estado,
      page,
      limit,
    } => pending(ctx, &maquina, estado, page, limit).await,
  }
}

#[allow(clippy::too_many_arguments)]
async fn list(
  ctx: &mut Ctx,
  maquina: Option<String>,
  search: Option<String>,
  espesor: Option<f64>,
  estado: EstadoFilter,
  page: usize,
  per_page: Option<usize>,
) -> Result<()> {
  ctx.load(&[Collection::Maquinas, Collection::Recortes]).await?;
  let maquina_id = match maquina.as_deref() {
    Some(input) => Some(ctx.maquina(input)?.id),
    None => None,
  };

  let filter = RecorteFilter {
    maquina_id,
    search,
    espesor,
    estado,
  };
  let matches: Vec<Recorte> = filter
    .apply(&ctx.engine.state().recortes, Utc::now())
    .into_iter()
    .cloned()
    .collect();
  let page = paginate(&matches, page, ctx.per_page(per_page));

  if ctx.json {
    return print_json(&page);
  }
  print::recorte_header();
  for recorte in &page.items {
    print::recorte_row(recorte);
  }
  print::page_footer(&page);
  Ok(())
}

async fn show(ctx: &mut Ctx, id: &str) -> Result<()> {
  ctx.load(&[Collection::Recortes]).await?;
  let recorte = ctx
    .engine
    .state()
    .recortes
    .iter()
    .find(|r| r.id == id)
    .ok_or_else(|| eyre!("Unknown recorte: {}", id))?;

  if ctx.json {
    return print_json(recorte);
  }
  println!("ID:             {}", recorte.id);
  println!(
    "Maquina:        {}",
    recorte.maquina_nombre().unwrap_or(&recorte.maquina_id)
  );
  println!(
    "Medidas:        {} x {} x {}",
    recorte.largo, recorte.ancho, recorte.espesor
  );
  println!("Cantidad:       {}", recorte.cantidad);
  println!(
    "Estado:         {}",
    if recorte.estado { "disponible" } else { "utilizado" }
  );
  if let Some(obs) = recorte.observaciones.as_deref().filter(|o| !o.is_empty()) {
    println!("Observaciones:  {}", obs);
  }
  if let Some(src) = image_src(recorte.imagen.as_deref(), &ctx.engine.config().api_url) {
    if src.starts_with("data:") {
      println!("Imagen:         (inline, {} bytes)", src.len());
    } else {
      println!("Imagen:         {}", src);
    }
  }
  println!("Creado:         {}", recorte.fecha_creacion);
  println!("Actualizado:    {}", recorte.fecha_actualizacion);
  Ok(())
}

async fn create(ctx: &mut Ctx, args: RecorteCreateArgs) -> Result<()> {
  ctx.load(&[Collection::Maquinas]).await?;
  let maquina = ctx.maquina(&args.maquina)?;

  let form = RecorteForm {
    largo: args.largo,
    ancho: args.ancho,
    espesor: args.espesor,
    cantidad: args.cantidad,
    maquina_id: maquina.id,
    observaciones: args.observaciones,
    imagen: args.imagen,
  };
  let created = ctx.engine.create_recorte(&form).await?;
  if ctx.json {
    print_json(&created)?;
  }
  Ok(())
}

/// Start from the stored record and overlay the given fields.
fn edit_form(existing: &Recorte, fields: RecorteEditArgs, maquina_id: Option<String>) -> RecorteForm {
  RecorteForm {
    largo: fields.largo.unwrap_or(existing.largo),
    ancho: fields.ancho.unwrap_or(existing.ancho),
    espesor: fields.espesor.unwrap_or(existing.espesor),
    cantidad: fields.cantidad.unwrap_or(existing.cantidad),
    maquina_id: maquina_id.unwrap_or_else(|| existing.maquina_id.clone()),
    observaciones: fields.observaciones.or_else(|| existing.observaciones.clone()),
    imagen: fields.imagen,
  }
}

async fn edit(ctx: &mut Ctx, id: &str, fields: RecorteEditArgs) -> Result<()> {
  ctx.load(&[Collection::Maquinas, Collection::Recortes]).await?;
  let maquina_id = match fields.maquina.as_deref() {
    Some(input) => Some(ctx.maquina(input)?.id),
    None => None,
  };
  let existing = ctx
    .engine
    .state()
    .recortes
    .iter()
    .find(|r| r.id == id)
    .cloned()
    .ok_or_else(|| eyre!("Unknown recorte: {}", id))?;

  let form = edit_form(&existing, fields, maquina_id);
  ctx.engine.update_recorte(id, &form).await
}

async fn pending(
  ctx: &mut Ctx,
  maquina: &str,
  estado: Option<bool>,
  page: u32,
  limit: u32,
) -> Result<()> {
  ctx.load(&[Collection::Maquinas]).await?;
  let maquina = ctx.maquina(maquina)?;
  let client = ctx.engine.client();
  let result = match estado {
    Some(estado) => {
      client
        .get_recortes_by_maquina_estado(&maquina.id, estado, page, limit)
        .await?
    }
    None => client.get_recortes_pendientes(&maquina.id, page, limit).await?,
  };
  if result.source.is_offline() {
    eprintln!("warning: server unreachable, showing cached page");
  }

  let response = result.data;
  if ctx.json {
    return print_json(&response);
  }
  print::recorte_header();
  for row in &response.data {
    print::recorte_page_row(row);
  }
  println!();
  println!(
    "Page {} of {} ({} results)",
    response.page, response.total_pages, response.total
  );
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::fixtures::recorte;

  #[test]
  fn test_edit_form_keeps_unset_fields() {
    let mut existing = recorte("r1", "m1", true);
    existing.observaciones = Some("borde dañado".to_string());

    let form = edit_form(
      &existing,
      RecorteEditArgs {
        cantidad: Some(7),
        ..Default::default()
      },
      None,
    );
    assert_eq!(form.cantidad, 7);
    assert_eq!(form.largo, existing.largo);
    assert_eq!(form.maquina_id, "m1");
    assert_eq!(form.observaciones.as_deref(), Some("borde dañado"));
    assert!(form.imagen.is_none());
  }

  #[test]
  fn test_edit_form_moves_machine() {
    let existing = recorte("r1", "m1", true);
    let form = edit_form(&existing, RecorteEditArgs::default(), Some("m2".to_string()));
    assert_eq!(form.maquina_id, "m2");
  }
}
