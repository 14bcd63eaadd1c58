//! Request payloads and error bodies exchanged with the inventory backend.
//!
//! These are kept apart from the domain types so that forms can be built and
//! validated before any id or timestamp exists.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Fields of a recorte form (create or edit). Sent as multipart.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecorteForm {
  pub largo: f64,
  pub ancho: f64,
  pub espesor: f64,
  pub cantidad: u32,
  pub maquina_id: String,
  pub observaciones: Option<String>,
  /// Local image file to upload with the record
  pub imagen: Option<PathBuf>,
}

impl RecorteForm {
  /// Text parts of the multipart body, in the order the backend expects.
  pub fn text_fields(&self) -> Vec<(&'static str, String)> {
    vec![
      ("largo", self.largo.to_string()),
      ("ancho", self.ancho.to_string()),
      ("espesor", self.espesor.to_string()),
      ("cantidad", self.cantidad.to_string()),
      ("maquinaId", self.maquina_id.clone()),
      (
        "observaciones",
        self.observaciones.clone().unwrap_or_default(),
      ),
    ]
  }
}

/// Fields of a client-material form (create or edit). Sent as JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClienteForm {
  pub cliente: String,
  pub espesor: f64,
  pub tipo_material: String,
  pub largo: f64,
  pub ancho: f64,
  pub cantidad: u32,
  pub remito: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub observaciones: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaquinaForm {
  pub nombre: String,
}

/// Body of the `/use` endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UseRequest {
  pub cantidad: u32,
}

/// Error body the backend returns on failed writes
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
  pub message: Option<String>,
  pub error: Option<String>,
}

impl ApiErrorBody {
  /// Best human-readable message from a raw error body.
  pub fn message_from(body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
      Ok(parsed) => parsed
        .message
        .or(parsed.error)
        .unwrap_or_else(|| body.trim().to_string()),
      Err(_) => body.trim().to_string(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_recorte_form_fields() {
    let form = RecorteForm {
      largo: 1200.0,
      ancho: 300.5,
      espesor: 3.0,
      cantidad: 2,
      maquina_id: "m1".to_string(),
      observaciones: None,
      imagen: None,
    };
    let fields = form.text_fields();
    assert_eq!(fields[0], ("largo", "1200".to_string()));
    assert_eq!(fields[1], ("ancho", "300.5".to_string()));
    assert_eq!(fields[4], ("maquinaId", "m1".to_string()));
    assert_eq!(fields[5], ("observaciones", String::new()));
  }

  #[test]
  fn test_cliente_form_serializes_camel_case() {
    let form = ClienteForm {
      cliente: "ACME".to_string(),
      espesor: 2.0,
      tipo_material: "Acero".to_string(),
      largo: 100.0,
      ancho: 50.0,
      cantidad: 3,
      remito: "991".to_string(),
      observaciones: None,
    };
    let value = serde_json::to_value(&form).expect("json");
    assert_eq!(value["tipoMaterial"], "Acero");
    assert_eq!(value["remito"], "991");
    assert!(value.get("observaciones").is_none());
  }

  #[test]
  fn test_error_message_extraction() {
    assert_eq!(
      ApiErrorBody::message_from(r#"{"message":"Cantidad insuficiente"}"#),
      "Cantidad insuficiente"
    );
    assert_eq!(
      ApiErrorBody::message_from(r#"{"error":"not found"}"#),
      "not found"
    );
    assert_eq!(ApiErrorBody::message_from("Bad Gateway\n"), "Bad Gateway");
  }
}
