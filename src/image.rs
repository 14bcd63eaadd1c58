//! Resolution of stored image references into displayable sources.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Turn a stored `imagen` value into something a viewer can open.
///
/// The backend stores either an upload path, a full URL, a `data:` URL or
/// raw base64 (assumed JPEG).
pub fn image_src(imagen: Option<&str>, api_base: &str) -> Option<String> {
  let imagen = imagen.filter(|s| !s.is_empty())?;
  let base = api_base.trim_end_matches('/');

  if imagen.starts_with("data:") {
    return Some(imagen.to_string());
  }
  if is_base64(imagen) {
    return Some(format!("data:image/jpeg;base64,{}", imagen));
  }
  if imagen.starts_with('/') {
    return Some(format!("{}{}", base, imagen));
  }
  if imagen.starts_with("http") {
    return Some(imagen.to_string());
  }
  Some(format!("{}/{}", base, imagen))
}

fn is_base64(s: &str) -> bool {
  let body = s.trim_end_matches('=');
  if s.len() - body.len() > 2 || s.len() % 4 != 0 {
    return false;
  }
  if !body
    .bytes()
    .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/')
  {
    return false;
  }
  STANDARD.decode(s).is_ok()
}
