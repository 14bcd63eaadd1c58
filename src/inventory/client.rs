use crate::config::Config;
use crate::inventory::api_types::{ApiErrorBody, ClienteForm, MaquinaForm, RecorteForm, UseRequest};
use crate::inventory::types::{
  Cliente, Maquina, PaginatedResponse, Recorte, RecorteWithMaquina, StatsRange,
};
use chrono::{DateTime, Utc};
use reqwest::{multipart, Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
  #[error("invalid URL: {0}")]
  Url(#[from] url::ParseError),
  #[error("API URL cannot carry a path: {0}")]
  BaseUrl(String),
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),
  #[error("the file is too large for the server")]
  PayloadTooLarge,
  #[error("server returned {status}: {message}")]
  Status { status: u16, message: String },
  #[error("failed to parse response: {0}")]
  Decode(String),
  #[error("failed to read {path}: {source}")]
  Io {
    path: String,
    source: std::io::Error,
  },
}

/// REST client for the inventory backend
#[derive(Clone, Debug)]
pub struct InventoryClient {
  client: Client,
  base: Url,
}

impl InventoryClient {
  pub fn new(config: &Config) -> Result<Self, ApiError> {
    Self::with_base(&config.api_url, config.request_timeout())
  }

  pub fn with_base(api_url: &str, timeout: Duration) -> Result<Self, ApiError> {
    let base = Url::parse(api_url)?;
    if base.cannot_be_a_base() {
      return Err(ApiError::BaseUrl(api_url.to_string()));
    }
    let client = Client::builder()
      .user_agent(concat!("recortes/", env!("CARGO_PKG_VERSION")))
      .timeout(timeout)
      .build()?;
    Ok(Self { client, base })
  }

  /// Append path segments to the base URL. Each segment is escaped, so
  /// ids cannot change the request target.
  fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
    let mut url = self.base.clone();
    url
      .path_segments_mut()
      .map_err(|_| ApiError::BaseUrl(self.base.to_string()))?
      .pop_if_empty()
      .extend(segments);
    Ok(url)
  }

  fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, ApiError> {
    Ok(self.client.request(method, self.url(segments)?))
  }

  async fn send_json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, ApiError> {
    let resp = Self::check(req.send().await?).await?;
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
  }

  async fn send_unit(req: RequestBuilder) -> Result<(), ApiError> {
    Self::check(req.send().await?).await?;
    Ok(())
  }

  async fn check(resp: Response) -> Result<Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
      return Ok(resp);
    }
    if status == StatusCode::PAYLOAD_TOO_LARGE {
      return Err(ApiError::PayloadTooLarge);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ApiError::Status {
      status: status.as_u16(),
      message: ApiErrorBody::message_from(&body),
    })
  }

  // ==========================================================================
  // Recortes
  // ==========================================================================

  /// List recortes, optionally only those changed since `since`.
  pub async fn get_recortes(&self, since: Option<DateTime<Utc>>) -> Result<Vec<Recorte>, ApiError> {
    let mut req = self.request(Method::GET, &["api", "recortes"])?;
    if let Some(since) = since {
      req = req.query(&[("since", since.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))]);
    }
    Self::send_json(req).await
  }

  pub async fn create_recorte(&self, form: &RecorteForm) -> Result<Value, ApiError> {
    let body = Self::recorte_multipart(form).await?;
    let req = self.request(Method::POST, &["api", "recortes"])?.multipart(body);
    Self::send_json(req).await
  }

  pub async fn update_recorte(&self, id: &str, form: &RecorteForm) -> Result<(), ApiError> {
    let body = Self::recorte_multipart(form).await?;
    let req = self
      .request(Method::PUT, &["api", "recortes", id])?
      .multipart(body);
    Self::send_unit(req).await
  }

  pub async fn delete_recorte(&self, id: &str) -> Result<(), ApiError> {
    let req = self.request(Method::DELETE, &["api", "recortes", id])?;
    Self::send_unit(req).await
  }

  /// Consume `cantidad` units of a recorte.
  pub async fn use_recorte(&self, id: &str, cantidad: u32) -> Result<(), ApiError> {
    let req = self
      .request(Method::PUT, &["api", "recortes", id, "use"])?
      .json(&UseRequest { cantidad });
    Self::send_unit(req).await
  }

  pub async fn get_recortes_pendientes(
    &self,
    maquina_id: &str,
    page: u32,
    limit: u32,
  ) -> Result<PaginatedResponse<RecorteWithMaquina>, ApiError> {
    let req = self
      .request(
        Method::GET,
        &["api", "recortes", "maquina", maquina_id, "pendientes"],
      )?
      .query(&[("page", page), ("limit", limit)]);
    Self::send_json(req).await
  }

  pub async fn get_recortes_by_maquina_estado(
    &self,
    maquina_id: &str,
    estado: bool,
    page: u32,
    limit: u32,
  ) -> Result<PaginatedResponse<RecorteWithMaquina>, ApiError> {
    let req = self
      .request(
        Method::GET,
        &["api", "recortes", "maquina", maquina_id, "estado", if estado { "true" } else { "false" }],
      )?
      .query(&[("page", page), ("limit", limit)]);
    Self::send_json(req).await
  }

  async fn recorte_multipart(form: &RecorteForm) -> Result<multipart::Form, ApiError> {
    let mut body = multipart::Form::new();
    for (name, value) in form.text_fields() {
      body = body.text(name, value);
    }
    if let Some(path) = &form.imagen {
      body = body.part("imagen", Self::image_part(path).await?);
    }
    Ok(body)
  }

  async fn image_part(path: &Path) -> Result<multipart::Part, ApiError> {
    let data = tokio::fs::read(path).await.map_err(|source| ApiError::Io {
      path: path.display().to_string(),
      source,
    })?;
    let file_name = path
      .file_name()
      .and_then(|s| s.to_str())
      .unwrap_or("imagen.jpg")
      .to_string();
    let part = multipart::Part::bytes(data)
      .file_name(file_name)
      .mime_str(image_mime(path))?;
    Ok(part)
  }

  // ==========================================================================
  // Client material
  // ==========================================================================

  pub async fn get_clientes(&self) -> Result<Vec<Cliente>, ApiError> {
    Self::send_json(self.request(Method::GET, &["api", "clientes"])?).await
  }

  pub async fn create_cliente(&self, form: &ClienteForm) -> Result<Value, ApiError> {
    let req = self.request(Method::POST, &["api", "clientes"])?.json(form);
    Self::send_json(req).await
  }

  pub async fn update_cliente(&self, id: &str, form: &ClienteForm) -> Result<(), ApiError> {
    let req = self
      .request(Method::PUT, &["api", "clientes", id])?
      .json(form);
    Self::send_unit(req).await
  }

  pub async fn delete_cliente(&self, id: &str) -> Result<(), ApiError> {
    let req = self.request(Method::DELETE, &["api", "clientes", id])?;
    Self::send_unit(req).await
  }

  pub async fn use_cliente(&self, id: &str, cantidad: u32) -> Result<(), ApiError> {
    let req = self
      .request(Method::PUT, &["api", "clientes", id, "use"])?
      .json(&UseRequest { cantidad });
    Self::send_unit(req).await
  }

  // ==========================================================================
  // Machines
  // ==========================================================================

  pub async fn get_maquinas(&self) -> Result<Vec<Maquina>, ApiError> {
    Self::send_json(self.request(Method::GET, &["api", "maquinas"])?).await
  }

  pub async fn create_maquina(&self, form: &MaquinaForm) -> Result<Maquina, ApiError> {
    let req = self.request(Method::POST, &["api", "maquinas"])?.json(form);
    Self::send_json(req).await
  }

  // ==========================================================================
  // Statistics (backend-defined shapes)
  // ==========================================================================

  pub async fn get_estadisticas_tiempo_real(&self) -> Result<Value, ApiError> {
    Self::send_json(self.request(Method::GET, &["api", "estadisticas", "tiempo-real"])?).await
  }

  pub async fn get_estadisticas_maquina(
    &self,
    maquina_id: &str,
    range: &StatsRange,
  ) -> Result<Value, ApiError> {
    let req = self
      .request(
        Method::GET,
        &["api", "estadisticas", "maquina", maquina_id],
      )?
      .query(&range.query_pairs());
    Self::send_json(req).await
  }

  pub async fn get_estadisticas_resumen(&self, range: &StatsRange) -> Result<Value, ApiError> {
    let req = self
      .request(Method::GET, &["api", "estadisticas", "resumen"])?
      .query(&range.query_pairs());
    Self::send_json(req).await
  }
}

fn image_mime(path: &Path) -> &'static str {
  let ext = path
    .extension()
    .and_then(|e| e.to_str())
    .map(|e| e.to_ascii_lowercase());
  match ext.as_deref() {
    Some("png") => "image/png",
    Some("webp") => "image/webp",
    Some("gif") => "image/gif",
    _ => "image/jpeg",
  }
}
