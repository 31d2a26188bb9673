//! Grammaire des types de réponse encodables
//!
//! Les types primitifs de la chaîne plus les suffixes de tableau `[]` et
//! `[N]`, imbriqués avec la dimension la plus interne en premier (convention
//! ABI des tableaux déclarés "à l'envers").

use ethers::abi::ParamType;
use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Type primitif encodable vers la chaîne
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrimitiveType {
    /// Entier signé 256 bits
    Int256,
    /// Entier non signé 256 bits
    Uint256,
    /// Booléen
    Bool,
    /// Mot de 32 bytes (texte UTF-8 complété à droite)
    Bytes32,
    /// Bytes dynamiques (hex préfixé 0x)
    Bytes,
    /// Chaîne de caractères dynamique
    String,
    /// Chaîne courte encodée sur 32 bytes
    String32,
    /// Adresse de compte (20 bytes)
    Address,
    /// Horloge de l'encodeur en secondes entières (uint256)
    Timestamp,
}

impl PrimitiveType {
    fn parse(token: &str) -> Result<Self, CodecError> {
        match token {
            "int256" => Ok(Self::Int256),
            "uint256" => Ok(Self::Uint256),
            "bool" => Ok(Self::Bool),
            "bytes32" => Ok(Self::Bytes32),
            "bytes" => Ok(Self::Bytes),
            "string" => Ok(Self::String),
            "string32" => Ok(Self::String32),
            "address" => Ok(Self::Address),
            "timestamp" => Ok(Self::Timestamp),
            _ => Err(CodecError::InvalidType {
                token: token.to_string(),
            }),
        }
    }

    /// Type ABI correspondant
    pub fn param_type(&self) -> ParamType {
        match self {
            Self::Int256 => ParamType::Int(256),
            Self::Uint256 | Self::Timestamp => ParamType::Uint(256),
            Self::Bool => ParamType::Bool,
            Self::Bytes32 | Self::String32 => ParamType::FixedBytes(32),
            Self::Bytes => ParamType::Bytes,
            Self::String => ParamType::String,
            Self::Address => ParamType::Address,
        }
    }

    /// Vrai si le multiplicateur `_times` s'applique à ce type
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int256 | Self::Uint256)
    }
}

/// Type de réponse complet, éventuellement imbriqué en tableaux
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseType {
    Primitive(PrimitiveType),
    Array {
        element: Box<ResponseType>,
        /// `None` pour un tableau de taille dynamique
        length: Option<usize>,
    },
}

impl ResponseType {
    /// Parse un token de la grammaire `_type`, p.ex. `int256[2][]`
    ///
    /// Le suffixe le plus à gauche est la dimension la plus interne.
    pub fn parse(token: &str) -> Result<Self, CodecError> {
        let invalid = || CodecError::InvalidType {
            token: token.to_string(),
        };

        let base_end = token.find('[').unwrap_or(token.len());
        let base = PrimitiveType::parse(&token[..base_end])?;

        let mut current = ResponseType::Primitive(base);
        let mut rest = &token[base_end..];
        while !rest.is_empty() {
            if !rest.starts_with('[') {
                return Err(invalid());
            }
            let close = rest.find(']').ok_or_else(invalid)?;
            let dim = &rest[1..close];
            let length = if dim.is_empty() {
                None
            } else {
                Some(dim.parse::<usize>().map_err(|_| invalid())?)
            };
            if base == PrimitiveType::Timestamp {
                // Un timestamp n'a pas de forme tableau
                return Err(invalid());
            }
            current = ResponseType::Array {
                element: Box::new(current),
                length,
            };
            rest = &rest[close + 1..];
        }

        Ok(current)
    }

    /// Type ABI correspondant
    pub fn param_type(&self) -> ParamType {
        match self {
            Self::Primitive(p) => p.param_type(),
            Self::Array { element, length } => match length {
                Some(n) => ParamType::FixedArray(Box::new(element.param_type()), *n),
                None => ParamType::Array(Box::new(element.param_type())),
            },
        }
    }

    /// Type primitif au cœur du tableau
    pub fn base(&self) -> PrimitiveType {
        match self {
            Self::Primitive(p) => *p,
            Self::Array { element, .. } => element.base(),
        }
    }
}
