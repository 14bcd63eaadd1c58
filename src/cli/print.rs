use color_eyre::{eyre::eyre, Result};
use serde::Serialize;

use crate::inventory::types::{Cliente, Recorte, RecorteWithMaquina};
use crate::notify::Toast;
use crate::store::views::Page;

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
  let out =
    serde_json::to_string_pretty(value).map_err(|e| eyre!("failed to render output: {}", e))?;
  println!("{}", out);
  Ok(())
}

pub fn toast(toast: &Toast) {
  if toast.is_error() {
    eprintln!("error: {}", toast.description);
  } else {
    eprintln!("{}: {}", toast.title, toast.description);
  }
}

fn estado(available: bool) -> &'static str {
  if available {
    "disponible"
  } else {
    "utilizado"
  }
}

/// Trim a timestamp to its date part
fn day(timestamp: &str) -> &str {
  timestamp.get(..10).unwrap_or(timestamp)
}

pub fn recorte_header() {
  println!(
    "{:<24} {:<16} {:>8} {:>8} {:>6} {:>4}  {:<10}  {}",
    "ID", "MAQUINA", "LARGO", "ANCHO", "ESP", "CANT", "ESTADO", "CREADO"
  );
}

pub fn recorte_row(r: &Recorte) {
  println!(
    "{:<24} {:<16} {:>8} {:>8} {:>6} {:>4}  {:<10}  {}",
    r.id,
    r.maquina_nombre().unwrap_or(&r.maquina_id),
    r.largo,
    r.ancho,
    r.espesor,
    r.cantidad,
    estado(r.estado),
    day(&r.fecha_creacion)
  );
}

pub fn recorte_page_row(r: &RecorteWithMaquina) {
  println!(
    "{:<24} {:<16} {:>8} {:>8} {:>6} {:>4}  {:<10}  {}",
    r.id,
    r.maquina_nombre,
    r.largo,
    r.ancho,
    r.espesor,
    r.cantidad,
    estado(r.estado),
    day(&r.fecha_creacion)
  );
}

pub fn cliente_header() {
  println!(
    "{:<24} {:<20} {:<14} {:>8} {:>8} {:>6} {:>4} {:<10} {:<10}  {}",
    "ID", "CLIENTE", "MATERIAL", "LARGO", "ANCHO", "ESP", "CANT", "REMITO", "ESTADO", "CREADO"
  );
}

pub fn cliente_row(c: &Cliente) {
  println!(
    "{:<24} {:<20} {:<14} {:>8} {:>8} {:>6} {:>4} {:<10} {:<10}  {}",
    c.id,
    c.cliente,
    c.tipo_material,
    c.largo,
    c.ancho,
    c.espesor,
    c.cantidad,
    c.remito,
    estado(c.estado),
    day(&c.created_at)
  );
}

pub fn page_footer<T>(page: &Page<T>) {
  println!();
  if page.total == 0 {
    println!("No results");
    return;
  }
  println!(
    "Showing {} to {} of {} results (page {} of {})",
    page.first, page.last, page.total, page.page, page.total_pages
  );
}
