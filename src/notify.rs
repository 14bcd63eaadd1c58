//! User-facing notifications.

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastVariant {
  #[default]
  Default,
  Destructive,
}

/// A short message shown to the user after an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toast {
  pub title: String,
  pub description: String,
  pub variant: ToastVariant,
}

impl Toast {
  pub fn success(title: impl Into<String>, description: impl Into<String>) -> Self {
    Self {
      title: title.into(),
      description: description.into(),
      variant: ToastVariant::Default,
    }
  }

  pub fn error(description: impl Into<String>) -> Self {
    Self {
      title: "Error".to_string(),
      description: description.into(),
      variant: ToastVariant::Destructive,
    }
  }

  pub fn is_error(&self) -> bool {
    self.variant == ToastVariant::Destructive
  }

  /// Record the toast in the log at a level matching its variant.
  pub fn log(&self) {
    if self.is_error() {
      tracing::warn!(title = %self.title, "{}", self.description);
    } else {
      tracing::info!(title = %self.title, "{}", self.description);
    }
  }
}

impl std::fmt::Display for Toast {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}: {}", self.title, self.description)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_variants() {
    assert!(!Toast::success("Recorte eliminado", "done").is_error());
    let err = Toast::error("Error al eliminar el recorte");
    assert!(err.is_error());
    assert_eq!(err.to_string(), "Error: Error al eliminar el recorte");
  }
}
