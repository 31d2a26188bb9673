//! Hachage d'égalité des paramètres
//!
//! Identifie un couple (endpoint, jeu de paramètres ordinaires) à travers
//! les connexions redondantes. Les paramètres réservés sont exclus du
//! hachage: ils contrôlent l'encodage de la réponse, pas l'identité de
//! l'appel.

use ethers::types::H256;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::codec::is_reserved_name;
use crate::params::Parameter;

/// Taille du hachage en bytes
pub const PARAMETER_HASH_SIZE: usize = 32;

/// Hachage Blake3 de 256 bits sur (endpoint, paramètres ordinaires)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParameterHash([u8; PARAMETER_HASH_SIZE]);

impl ParameterHash {
    /// Crée un hachage à partir d'un array de bytes
    pub fn new(data: [u8; PARAMETER_HASH_SIZE]) -> Self {
        Self(data)
    }

    /// Retourne les bytes du hachage
    pub fn as_bytes(&self) -> &[u8; PARAMETER_HASH_SIZE] {
        &self.0
    }

    /// Retourne une représentation hexadécimale
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ParameterHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Calcule le hachage d'égalité d'un appel
///
/// Les paramètres réservés sont filtrés, les autres triés par nom puis
/// hachés sous forme canonique avec préfixes de longueur.
pub fn parameter_hash(endpoint_id: &H256, params: &[Parameter]) -> ParameterHash {
    let mut ordinary: Vec<&Parameter> = params
        .iter()
        .filter(|p| !is_reserved_name(&p.name))
        .collect();
    ordinary.sort_by(|a, b| a.name.cmp(&b.name));

    let mut hasher = blake3::Hasher::new();
    hasher.update(endpoint_id.as_bytes());
    for param in ordinary {
        let canonical = param.value.canonical();
        hasher.update(&(param.name.len() as u64).to_le_bytes());
        hasher.update(param.name.as_bytes());
        hasher.update(&(canonical.len() as u64).to_le_bytes());
        hasher.update(canonical.as_bytes());
    }
    ParameterHash(*hasher.finalize().as_bytes())
}
