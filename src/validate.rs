//! Client-side checks run before a request leaves the machine.

use std::path::Path;

use crate::inventory::api_types::{ClienteForm, MaquinaForm, RecorteForm};

/// Largest image accepted for upload
pub const MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
  #[error("missing required field '{0}'")]
  Missing(&'static str),
  #[error("'{0}' must be greater than zero")]
  NotPositive(&'static str),
  #[error("image is too large ({size} bytes, max {max})")]
  ImageTooLarge { size: u64, max: u64 },
  #[error("cannot read image {path}: {reason}")]
  ImageUnreadable { path: String, reason: String },
  #[error("quantity must be between 1 and {available}")]
  QuantityOutOfRange { requested: u32, available: u32 },
  #[error("record is already used")]
  NotAvailable,
}

fn positive(field: &'static str, value: f64) -> Result<(), ValidationError> {
  // NaN fails too
  if value > 0.0 {
    Ok(())
  } else {
    Err(ValidationError::NotPositive(field))
  }
}

fn present(field: &'static str, value: &str) -> Result<(), ValidationError> {
  if value.trim().is_empty() {
    Err(ValidationError::Missing(field))
  } else {
    Ok(())
  }
}

pub fn validate_recorte(form: &RecorteForm) -> Result<(), ValidationError> {
  present("maquinaId", &form.maquina_id)?;
  positive("largo", form.largo)?;
  positive("ancho", form.ancho)?;
  positive("espesor", form.espesor)?;
  positive("cantidad", form.cantidad as f64)?;
  if let Some(path) = &form.imagen {
    validate_image(path)?;
  }
  Ok(())
}

pub fn validate_image(path: &Path) -> Result<(), ValidationError> {
  let meta = std::fs::metadata(path).map_err(|e| ValidationError::ImageUnreadable {
    path: path.display().to_string(),
    reason: e.to_string(),
  })?;
  if meta.len() > MAX_IMAGE_BYTES {
    return Err(ValidationError::ImageTooLarge {
      size: meta.len(),
      max: MAX_IMAGE_BYTES,
    });
  }
  Ok(())
}

pub fn validate_cliente(form: &ClienteForm) -> Result<(), ValidationError> {
  present("cliente", &form.cliente)?;
  present("tipoMaterial", &form.tipo_material)?;
  positive("espesor", form.espesor)?;
  positive("largo", form.largo)?;
  positive("ancho", form.ancho)?;
  positive("cantidad", form.cantidad as f64)?;
  present("remito", &form.remito)?;
  Ok(())
}

pub fn validate_maquina(form: &MaquinaForm) -> Result<(), ValidationError> {
  present("nombre", &form.nombre)
}

/// Check a use request against the record's current stock.
pub fn validate_use(requested: u32, available: u32, estado: bool) -> Result<(), ValidationError> {
  if !estado {
    return Err(ValidationError::NotAvailable);
  }
  if requested == 0 || requested > available {
    return Err(ValidationError::QuantityOutOfRange { requested, available });
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  fn recorte_form() -> RecorteForm {
    RecorteForm {
      largo: 1000.0,
      ancho: 500.0,
      espesor: 3.0,
      cantidad: 1,
      maquina_id: "m1".to_string(),
      ..Default::default()
    }
  }

  fn cliente_form() -> ClienteForm {
    ClienteForm {
      cliente: "ACME".to_string(),
      espesor: 2.0,
      tipo_material: "Acero".to_string(),
      largo: 100.0,
      ancho: 50.0,
      cantidad: 1,
      remito: "0012".to_string(),
      observaciones: None,
    }
  }

  #[test]
  fn test_valid_recorte() {
    assert_eq!(validate_recorte(&recorte_form()), Ok(()));
  }

  #[test]
  fn test_recorte_missing_fields_rejected() {
    let mut form = recorte_form();
    form.maquina_id = " ".to_string();
    assert_eq!(validate_recorte(&form), Err(ValidationError::Missing("maquinaId")));

    let mut form = recorte_form();
    form.largo = 0.0;
    assert_eq!(validate_recorte(&form), Err(ValidationError::NotPositive("largo")));

    let mut form = recorte_form();
    form.cantidad = 0;
    assert_eq!(validate_recorte(&form), Err(ValidationError::NotPositive("cantidad")));

    let mut form = recorte_form();
    form.espesor = f64::NAN;
    assert!(validate_recorte(&form).is_err());
  }

  #[test]
  fn test_image_size_limit() {
    let mut small = tempfile::NamedTempFile::new().expect("tmp");
    small.write_all(&[0u8; 1024]).expect("write");
    let mut form = recorte_form();
    form.imagen = Some(small.path().to_path_buf());
    assert_eq!(validate_recorte(&form), Ok(()));

    let big = tempfile::NamedTempFile::new().expect("tmp");
    big.as_file().set_len(MAX_IMAGE_BYTES + 1).expect("grow");
    form.imagen = Some(big.path().to_path_buf());
    assert!(matches!(
      validate_recorte(&form),
      Err(ValidationError::ImageTooLarge { .. })
    ));
  }

  #[test]
  fn test_missing_image_file() {
    let mut form = recorte_form();
    form.imagen = Some("/definitely/not/here.jpg".into());
    assert!(matches!(
      validate_recorte(&form),
      Err(ValidationError::ImageUnreadable { .. })
    ));
  }

  #[test]
  fn test_cliente_rules() {
    assert_eq!(validate_cliente(&cliente_form()), Ok(()));

    let mut form = cliente_form();
    form.remito = String::new();
    assert_eq!(validate_cliente(&form), Err(ValidationError::Missing("remito")));

    let mut form = cliente_form();
    form.tipo_material = String::new();
    assert_eq!(validate_cliente(&form), Err(ValidationError::Missing("tipoMaterial")));
  }

  #[test]
  fn test_maquina_name_required() {
    assert!(validate_maquina(&MaquinaForm { nombre: "  ".to_string() }).is_err());
    assert!(validate_maquina(&MaquinaForm { nombre: "Laser".to_string() }).is_ok());
  }

  #[test]
  fn test_use_quantity_bounds() {
    assert_eq!(validate_use(1, 3, true), Ok(()));
    assert_eq!(validate_use(3, 3, true), Ok(()));
    assert!(validate_use(0, 3, true).is_err());
    assert!(validate_use(4, 3, true).is_err());
    assert_eq!(validate_use(1, 3, false), Err(ValidationError::NotAvailable));
  }
}
