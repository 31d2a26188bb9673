//! Paramètres réservés d'une requête
//!
//! `_type`, `_path` et `_times` contrôlent l'encodage de la réponse au lieu
//! d'être transmis à l'API cible. Ils sont exclus du hachage d'égalité des
//! paramètres.

use bigdecimal::num_bigint::BigInt;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::codec::grammar::ResponseType;
use crate::error::CodecError;

/// Noms des paramètres réservés, jamais transmis à l'API cible
pub const RESERVED_PARAMETER_NAMES: [&str; 3] = ["_type", "_path", "_times"];

/// Vrai si `name` est un paramètre réservé
pub fn is_reserved_name(name: &str) -> bool {
    RESERVED_PARAMETER_NAMES.contains(&name)
}

/// Paramètres réservés bruts, tels que portés par la requête
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservedParameters {
    /// Grammaire `_type`, éventuellement multi-valeurs séparées par virgules
    #[serde(rename = "_type")]
    pub response_type: String,
    /// Chemins `_path` alignés sur `_type`
    #[serde(rename = "_path", skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Multiplicateurs `_times` alignés sur `_type`
    #[serde(rename = "_times", skip_serializing_if = "Option::is_none")]
    pub times: Option<String>,
}

/// Un champ d'encodage résolu: type, chemin et multiplicateur
#[derive(Debug, Clone)]
pub struct EncodeField {
    pub ty: ResponseType,
    /// `None` équivaut à un chemin vide: la réponse entière
    pub path: Option<String>,
    pub times: Option<BigInt>,
}

impl ReservedParameters {
    pub fn new(response_type: &str, path: Option<&str>, times: Option<&str>) -> Self {
        Self {
            response_type: response_type.to_string(),
            path: path.map(str::to_string),
            times: times.map(str::to_string),
        }
    }

    /// Résout les champs d'encodage en vérifiant l'arité des listes
    ///
    /// Les entrées `_times` manquantes en fin de liste valent "pas de
    /// multiplicateur"; une liste `_times` plus longue que `_type` est une
    /// erreur.
    pub fn split_fields(&self) -> Result<Vec<EncodeField>, CodecError> {
        let type_tokens: Vec<&str> = self.response_type.split(',').collect();
        let types = type_tokens
            .iter()
            .map(|t| ResponseType::parse(t.trim()))
            .collect::<Result<Vec<_>, _>>()?;

        let paths: Vec<Option<String>> = match &self.path {
            Some(p) => p
                .split(',')
                .map(|s| Some(s.to_string()))
                .collect(),
            None => vec![None; types.len()],
        };

        let times_entries: Vec<Option<BigInt>> = match &self.times {
            Some(t) => t
                .split(',')
                .map(|entry| parse_times_entry(entry))
                .collect::<Result<Vec<_>, _>>()?,
            None => vec![None; types.len()],
        };

        if paths.len() != types.len() || times_entries.len() > types.len() {
            return Err(CodecError::ArityMismatch {
                types: types.len(),
                paths: paths.len(),
                times: times_entries.len(),
            });
        }

        let mut fields = Vec::with_capacity(types.len());
        for (i, ty) in types.into_iter().enumerate() {
            let times = times_entries.get(i).cloned().flatten();
            if times.is_some() && !ty.base().is_numeric() {
                return Err(CodecError::InvalidValue {
                    target: "_times".to_string(),
                    value: format!("multiplicateur sur le type non numérique {}", type_tokens[i]),
                });
            }
            fields.push(EncodeField {
                ty,
                path: paths[i].clone(),
                times,
            });
        }
        Ok(fields)
    }
}

fn parse_times_entry(entry: &str) -> Result<Option<BigInt>, CodecError> {
    let trimmed = entry.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let invalid = || CodecError::InvalidValue {
        target: "_times".to_string(),
        value: trimmed.to_string(),
    };
    let dec = BigDecimal::from_str(trimmed).map_err(|_| invalid())?;
    // Le multiplicateur est un entier exact
    if !dec.is_integer() {
        return Err(invalid());
    }
    let (digits, _) = dec.with_scale(0).into_bigint_and_exponent();
    Ok(Some(digits))
}
