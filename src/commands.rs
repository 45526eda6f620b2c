//! Entity name matching for command line arguments

/// Resolve user input to a registered entity name.
///
/// Candidates are tried in priority order: exact name, name ignoring case,
/// plural ignoring case, then a unique prefix.
pub fn resolve_entity<'a>(input: &str, names: &'a [(String, String)]) -> Option<&'a str> {
  let input_lower = input.to_lowercase();
  if input_lower.is_empty() {
    return None;
  }

  let mut matches: Vec<(&str, u32)> = Vec::new();

  for (name, plural) in names {
    // Exact match on name
    if name == input {
      matches.push((name.as_str(), 0)); // Highest priority
      continue;
    }

    if name.to_lowercase() == input_lower {
      matches.push((name.as_str(), 1));
      continue;
    }

    if plural.to_lowercase() == input_lower {
      matches.push((name.as_str(), 2));
      continue;
    }

    if name.to_lowercase().starts_with(&input_lower) {
      matches.push((name.as_str(), 3));
    }
  }

  matches.sort_by_key(|(_, priority)| *priority);

  match matches.as_slice() {
    [] => None,
    [(name, _)] => Some(*name),
    [(first, p1), (_, p2), ..] if p1 < p2 => Some(*first),
    // Ambiguous prefix
    _ => None,
  }
}
