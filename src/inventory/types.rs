use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A cutting machine (laser, plasma, oxy-cut, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Maquina {
  pub id: String,
  pub nombre: String,
}

/// An offcut tracked as inventory. `estado == true` means still available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recorte {
  pub id: String,
  pub largo: f64,
  pub ancho: f64,
  pub espesor: f64,
  pub cantidad: u32,
  pub estado: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub imagen: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub observaciones: Option<String>,
  #[serde(rename = "maquinaId")]
  pub maquina_id: String,
  /// Joined machine row, present on most backend responses
  #[serde(rename = "Maquina", default, skip_serializing_if = "Option::is_none")]
  pub maquina: Option<Maquina>,
  #[serde(default)]
  pub fecha_creacion: String,
  #[serde(default)]
  pub fecha_actualizacion: String,
}

impl Recorte {
  pub fn updated_at(&self) -> Option<DateTime<Utc>> {
    parse_timestamp(&self.fecha_actualizacion)
  }

  pub fn maquina_nombre(&self) -> Option<&str> {
    self.maquina.as_ref().map(|m| m.nombre.as_str())
  }
}

/// Material owned by a client and stored on their behalf
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cliente {
  pub id: String,
  pub cliente: String,
  pub espesor: f64,
  pub tipo_material: String,
  pub largo: f64,
  pub ancho: f64,
  pub cantidad: u32,
  /// Delivery receipt number; the backend sends either a number or a string
  #[serde(default, deserialize_with = "deserialize_remito")]
  pub remito: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub observaciones: Option<String>,
  pub estado: bool,
  #[serde(default)]
  pub created_at: String,
  #[serde(default)]
  pub updated_at: String,
}

impl Cliente {
  pub fn created(&self) -> Option<DateTime<Utc>> {
    parse_timestamp(&self.created_at)
  }
}

/// Flattened row returned by the per-machine paginated endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorteWithMaquina {
  pub id: String,
  pub maquina_id: String,
  pub estado: bool,
  #[serde(rename = "fecha_creacion", default)]
  pub fecha_creacion: String,
  #[serde(rename = "fecha_actualizacion", default)]
  pub fecha_actualizacion: String,
  pub largo: f64,
  pub ancho: f64,
  pub espesor: f64,
  pub cantidad: u32,
  #[serde(default)]
  pub observaciones: Option<String>,
  #[serde(default)]
  pub imagen: Option<String>,
  #[serde(rename = "maquina_nombre", default)]
  pub maquina_nombre: String,
}

/// Server-side pagination envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResponse<T> {
  pub page: u32,
  pub limit: u32,
  pub total: u64,
  pub total_pages: u32,
  pub data: Vec<T>,
}

/// Date window accepted by the statistics endpoints
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsRange {
  pub ultimo_mes: bool,
  pub fecha_inicio: Option<String>,
  pub fecha_fin: Option<String>,
}

impl StatsRange {
  pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
    let mut q = Vec::new();
    if self.ultimo_mes {
      q.push(("ultimoMes", "true".to_string()));
    }
    if let Some(inicio) = &self.fecha_inicio {
      q.push(("fechaInicio", inicio.clone()));
    }
    if let Some(fin) = &self.fecha_fin {
      q.push(("fechaFin", fin.clone()));
    }
    q
  }
}

/// Parse a backend timestamp. Accepts RFC 3339 and the naive
/// `YYYY-MM-DD HH:MM:SS` form (treated as UTC).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
  if s.is_empty() {
    return None;
  }
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Some(dt.with_timezone(&Utc));
  }
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
    .map(|dt| dt.and_utc())
    .ok()
}

fn deserialize_remito<'de, D>(deserializer: D) -> Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  let value = Option::<serde_json::Value>::deserialize(deserializer)?;
  Ok(match value {
    None | Some(serde_json::Value::Null) => String::new(),
    Some(serde_json::Value::String(s)) => s,
    Some(serde_json::Value::Number(n)) => n.to_string(),
    Some(other) => other.to_string(),
  })
}
