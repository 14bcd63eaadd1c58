use color_eyre::{eyre::eyre, Result};

use crate::cli::args::{ClienteCreateArgs, ClienteEditArgs, ClientesCmd};
use crate::cli::print::{self, print_json};
use crate::cli::Ctx;
use crate::inventory::api_types::ClienteForm;
use crate::inventory::types::Cliente;
use crate::store::views::{paginate, ClienteFilter, SortOrder};
use crate::store::Collection;

pub async fn handle(ctx: &mut Ctx, cmd: ClientesCmd) -> Result<()> {
  match cmd {
    ClientesCmd::List {
      search,
      estado,
      desde,
      hasta,
      asc,
      page,
      per_page,
    } => {
      let filter = ClienteFilter {
        search,
        estado,
        desde,
        hasta,
        sort: if asc { SortOrder::Asc } else { SortOrder::Desc },
      };
      list(ctx, &filter, page, per_page).await
    }
    ClientesCmd::Create(args) => create(ctx, args).await,
    ClientesCmd::Edit { id, fields } => edit(ctx, &id, fields).await,
    ClientesCmd::Delete { id } => ctx.engine.delete_cliente(&id).await,
    ClientesCmd::Use { id, cantidad } => {
      ctx.load(&[Collection::Clientes]).await?;
      ctx.engine.use_cliente(&id, cantidad).await
    }
  }
}

async fn list(
  ctx: &mut Ctx,
  filter: &ClienteFilter,
  page: usize,
  per_page: Option<usize>,
) -> Result<()> {
  ctx.load(&[Collection::Clientes]).await?;
  let matches: Vec<Cliente> = filter
    .apply(&ctx.engine.state().clientes)
    .into_iter()
    .cloned()
    .collect();
  let page = paginate(&matches, page, ctx.per_page(per_page));

  if ctx.json {
    return print_json(&page);
  }
  print::cliente_header();
  for cliente in &page.items {
    print::cliente_row(cliente);
  }
  print::page_footer(&page);
  Ok(())
}

async fn create(ctx: &mut Ctx, args: ClienteCreateArgs) -> Result<()> {
  let form = ClienteForm {
    cliente: args.cliente,
    espesor: args.espesor,
    tipo_material: args.tipo_material,
    largo: args.largo,
    ancho: args.ancho,
    cantidad: args.cantidad,
    remito: args.remito,
    observaciones: args.observaciones,
  };
  let created = ctx.engine.create_cliente(&form).await?;
  if ctx.json {
    print_json(&created)?;
  }
  Ok(())
}

fn edit_form(existing: &Cliente, fields: ClienteEditArgs) -> ClienteForm {
  ClienteForm {
    cliente: fields.cliente.unwrap_or_else(|| existing.cliente.clone()),
    espesor: fields.espesor.unwrap_or(existing.espesor),
    tipo_material: fields
      .tipo_material
      .unwrap_or_else(|| existing.tipo_material.clone()),
    largo: fields.largo.unwrap_or(existing.largo),
    ancho: fields.ancho.unwrap_or(existing.ancho),
    cantidad: fields.cantidad.unwrap_or(existing.cantidad),
    remito: fields.remito.unwrap_or_else(|| existing.remito.clone()),
    observaciones: fields.observaciones.or_else(|| existing.observaciones.clone()),
  }
}

async fn edit(ctx: &mut Ctx, id: &str, fields: ClienteEditArgs) -> Result<()> {
  ctx.load(&[Collection::Clientes]).await?;
  let existing = ctx
    .engine
    .state()
    .clientes
    .iter()
    .find(|c| c.id == id)
    .cloned()
    .ok_or_else(|| eyre!("Unknown material: {}", id))?;

  ctx.engine.update_cliente(id, &edit_form(&existing, fields)).await
}
