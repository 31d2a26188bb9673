//! Traversée de chemins dans une réponse API
//!
//! Un chemin `_path` est une suite de segments séparés par des points.
//! `\.` est un point littéral à l'intérieur d'une clé, `\\` un backslash
//! littéral. Un segment numérique indexe un tableau.

use serde_json::Value;

/// Découpe un chemin en segments, en respectant les échappements
pub fn split_segments(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) => current.push(escaped),
                // Backslash final: conservé tel quel
                None => current.push('\\'),
            },
            '.' => {
                segments.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    segments.push(current);
    segments
}

/// Extrait la valeur pointée par `path` dans `response`
///
/// Un chemin vide désigne la réponse entière. Retourne `None` si un
/// segment est introuvable; l'appelant décide de l'erreur.
pub fn extract<'a>(response: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(response);
    }

    let mut current = response;
    for segment in split_segments(path) {
        current = match current {
            Value::Object(map) => map.get(&segment)?,
            Value::Array(items) => {
                let index: usize = segment.parse().ok()?;
                items.get(index)?
            }
            _ => return None,
        };
    }
    Some(current)
}
