/// Machine lookup by id or name, with ranked partial matching
use super::types::Maquina;

/// Rank machines against user input.
///
/// Matching is case-insensitive; the best candidates come first.
pub fn suggest_maquinas<'a>(input: &str, maquinas: &'a [Maquina]) -> Vec<&'a Maquina> {
  let input_lower = input.trim().to_lowercase();

  if input_lower.is_empty() {
    return maquinas.iter().collect();
  }

  let mut matches: Vec<(&Maquina, u32)> = Vec::new();

  for maquina in maquinas {
    let nombre = maquina.nombre.to_lowercase();

    // Exact match on id
    if maquina.id.to_lowercase() == input_lower {
      matches.push((maquina, 0));
      continue;
    }

    if nombre == input_lower {
      matches.push((maquina, 1));
      continue;
    }

    if nombre.starts_with(&input_lower) {
      matches.push((maquina, 2));
      continue;
    }

    if nombre.contains(&input_lower) {
      matches.push((maquina, 3));
    }
  }

  // Stable sort keeps server order within a priority
  matches.sort_by_key(|(_, priority)| *priority);

  matches.into_iter().map(|(maquina, _)| maquina).collect()
}

/// Resolve input to exactly one machine.
///
/// Partial matches only resolve when they are unambiguous.
pub fn resolve_maquina<'a>(input: &str, maquinas: &'a [Maquina]) -> Result<&'a Maquina, LookupError> {
  let input_lower = input.trim().to_lowercase();
  let suggestions = suggest_maquinas(input, maquinas);

  let Some(first) = suggestions.first() else {
    return Err(LookupError::NotFound(input.to_string()));
  };

  let exact = first.id.to_lowercase() == input_lower || first.nombre.to_lowercase() == input_lower;
  if exact || suggestions.len() == 1 {
    return Ok(first);
  }

  Err(LookupError::Ambiguous {
    input: input.to_string(),
    candidates: suggestions.iter().map(|m| m.nombre.clone()).collect(),
  })
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum LookupError {
  #[error("no machine matches '{0}'")]
  NotFound(String),
  #[error("'{input}' matches several machines: {}", candidates.join(", "))]
  Ambiguous {
    input: String,
    candidates: Vec<String>,
  },
}

#[cfg(test)]
mod tests {
  use super::*;

  fn maquinas() -> Vec<Maquina> {
    [
      ("m1", "Laser 1"),
      ("m2", "Laser 2"),
      ("m3", "Plasma"),
      ("m4", "Oxicorte"),
    ]
    .into_iter()
    .map(|(id, nombre)| Maquina {
      id: id.to_string(),
      nombre: nombre.to_string(),
    })
    .collect()
  }

  #[test]
  fn test_empty_input_returns_all() {
    let all = maquinas();
    assert_eq!(suggest_maquinas("", &all).len(), all.len());
  }

  #[test]
  fn test_exact_id_match() {
    let all = maquinas();
    assert_eq!(resolve_maquina("m3", &all).expect("resolve").nombre, "Plasma");
  }

  #[test]
  fn test_exact_name_is_case_insensitive() {
    let all = maquinas();
    assert_eq!(resolve_maquina("laser 2", &all).expect("resolve").id, "m2");
  }

  #[test]
  fn test_prefix_match() {
    let all = maquinas();
    assert_eq!(resolve_maquina("plas", &all).expect("resolve").id, "m3");
  }

  #[test]
  fn test_contains_match() {
    let all = maquinas();
    assert_eq!(resolve_maquina("corte", &all).expect("resolve").id, "m4");
  }

  #[test]
  fn test_prefix_ranks_before_contains() {
    let all = vec![
      Maquina {
        id: "a".to_string(),
        nombre: "Gran Laser".to_string(),
      },
      Maquina {
        id: "b".to_string(),
        nombre: "Laser".to_string(),
      },
    ];
    let suggestions = suggest_maquinas("las", &all);
    assert_eq!(suggestions[0].id, "b");
  }

  #[test]
  fn test_ambiguous_prefix() {
    let all = maquinas();
    let err = resolve_maquina("laser", &all).unwrap_err();
    assert!(matches!(err, LookupError::Ambiguous { ref candidates, .. } if candidates.len() == 2));
  }

  #[test]
  fn test_not_found() {
    let all = maquinas();
    assert_eq!(
      resolve_maquina("waterjet", &all).unwrap_err(),
      LookupError::NotFound("waterjet".to_string())
    );
  }
}
