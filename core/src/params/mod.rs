//! Codec des paramètres d'appel on-chain
//!
//! Les paramètres opaques d'une requête sont encodés en ABI: un mot
//! d'en-tête ASCII de 32 bytes (version `1` puis un caractère de type par
//! paramètre) suivi de paires `(bytes32 nom, valeur)`. Le décodage produit
//! une somme typée des formes de valeur permises; des bytes malformés sont
//! terminaux pour la requête concernée.

pub mod hash;

pub use hash::{parameter_hash, ParameterHash, PARAMETER_HASH_SIZE};

use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, Bytes, H256, I256, U256};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::{is_reserved_name, ReservedParameters};
use crate::error::ParamsError;

/// Version d'encodage supportée
pub const ENCODING_VERSION: char = '1';

/// Nombre maximum de paramètres par requête (l'en-tête fait 32 caractères)
pub const MAX_PARAMETERS: usize = 31;

/// Valeur typée d'un paramètre d'appel
///
/// Uniquement des formes scalaires: la validation a lieu à la frontière de
/// décodage, pas plus tard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamValue {
    Uint(U256),
    Int(I256),
    Address(Address),
    Bytes32(H256),
    Bool(bool),
    String(String),
    Bytes(Bytes),
}

impl ParamValue {
    /// Caractère de type dans le mot d'en-tête
    pub fn type_char(&self) -> char {
        match self {
            Self::Uint(_) => 'u',
            Self::Int(_) => 'i',
            Self::Address(_) => 'a',
            Self::Bytes32(_) => 'b',
            Self::Bool(_) => 'f',
            Self::String(_) => 'S',
            Self::Bytes(_) => 'B',
        }
    }

    fn param_type(type_char: char) -> Result<ParamType, ParamsError> {
        match type_char {
            'u' => Ok(ParamType::Uint(256)),
            'i' => Ok(ParamType::Int(256)),
            'a' => Ok(ParamType::Address),
            'b' => Ok(ParamType::FixedBytes(32)),
            'f' => Ok(ParamType::Bool),
            'S' => Ok(ParamType::String),
            'B' => Ok(ParamType::Bytes),
            other => Err(ParamsError::UnknownTypeChar { type_char: other }),
        }
    }

    fn to_token(&self) -> Token {
        match self {
            Self::Uint(v) => Token::Uint(*v),
            Self::Int(v) => Token::Int(v.into_raw()),
            Self::Address(a) => Token::Address(*a),
            Self::Bytes32(h) => Token::FixedBytes(h.as_bytes().to_vec()),
            Self::Bool(b) => Token::Bool(*b),
            Self::String(s) => Token::String(s.clone()),
            Self::Bytes(b) => Token::Bytes(b.to_vec()),
        }
    }

    fn from_token(type_char: char, token: Token) -> Option<Self> {
        match (type_char, token) {
            ('u', Token::Uint(v)) => Some(Self::Uint(v)),
            ('i', Token::Int(raw)) => Some(Self::Int(I256::from_raw(raw))),
            ('a', Token::Address(a)) => Some(Self::Address(a)),
            ('b', Token::FixedBytes(w)) if w.len() == 32 => {
                Some(Self::Bytes32(H256::from_slice(&w)))
            }
            ('f', Token::Bool(b)) => Some(Self::Bool(b)),
            ('S', Token::String(s)) => Some(Self::String(s)),
            ('B', Token::Bytes(b)) => Some(Self::Bytes(Bytes::from(b))),
            _ => None,
        }
    }

    /// Forme canonique utilisée par le hachage d'égalité
    pub fn canonical(&self) -> String {
        match self {
            Self::Uint(v) => format!("u:{v}"),
            Self::Int(v) => format!("i:{v}"),
            Self::Address(a) => format!("a:0x{}", hex::encode(a.as_bytes())),
            Self::Bytes32(h) => format!("b:0x{}", hex::encode(h.as_bytes())),
            Self::Bool(b) => format!("f:{b}"),
            Self::String(s) => format!("S:{s}"),
            Self::Bytes(b) => format!("B:0x{}", hex::encode(b)),
        }
    }

    /// Représentation JSON transmise à l'API cible
    pub fn to_json(&self) -> Value {
        match self {
            Self::Uint(v) => Value::String(v.to_string()),
            Self::Int(v) => Value::String(v.to_string()),
            Self::Address(a) => Value::String(format!("0x{}", hex::encode(a.as_bytes()))),
            Self::Bytes32(h) => {
                let bytes = h.as_bytes();
                let end = bytes.iter().rposition(|b| *b != 0).map(|i| i + 1).unwrap_or(0);
                match std::str::from_utf8(&bytes[..end]) {
                    Ok(text) => Value::String(text.to_string()),
                    Err(_) => Value::String(format!("0x{}", hex::encode(bytes))),
                }
            }
            Self::Bool(b) => Value::Bool(*b),
            Self::String(s) => Value::String(s.clone()),
            Self::Bytes(b) => Value::String(format!("0x{}", hex::encode(b))),
        }
    }
}

/// Paramètre nommé d'un appel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: ParamValue,
}

impl Parameter {
    pub fn new(name: &str, value: ParamValue) -> Self {
        Self {
            name: name.to_string(),
            value,
        }
    }

    /// Paramètre de type chaîne, forme la plus courante
    pub fn string(name: &str, value: &str) -> Self {
        Self::new(name, ParamValue::String(value.to_string()))
    }
}

/// Encode une liste de paramètres vers les bytes on-chain
pub fn encode(params: &[Parameter]) -> Result<Bytes, ParamsError> {
    if params.len() > MAX_PARAMETERS {
        return Err(ParamsError::TooManyParameters {
            count: params.len(),
        });
    }

    let mut header = [0u8; 32];
    header[0] = ENCODING_VERSION as u8;
    for (i, param) in params.iter().enumerate() {
        header[1 + i] = param.value.type_char() as u8;
    }

    let mut tokens = Vec::with_capacity(1 + params.len() * 2);
    tokens.push(Token::FixedBytes(header.to_vec()));
    for param in params {
        let name_bytes = param.name.as_bytes();
        if name_bytes.len() > 32 {
            return Err(ParamsError::NameTooLong {
                name: param.name.clone(),
                len: name_bytes.len(),
            });
        }
        let mut name_word = [0u8; 32];
        name_word[..name_bytes.len()].copy_from_slice(name_bytes);
        tokens.push(Token::FixedBytes(name_word.to_vec()));
        tokens.push(param.value.to_token());
    }

    Ok(Bytes::from(abi::encode(&tokens)))
}

/// Décode les bytes on-chain en paramètres typés
///
/// Des bytes vides sont une liste vide valide. Toute autre malformation est
/// une erreur terminale qui embarque les bytes d'origine.
pub fn decode(bytes: &[u8]) -> Result<Vec<Parameter>, ParamsError> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }

    let malformed = |reason: String| ParamsError::Malformed {
        bytes_hex: hex::encode(bytes),
        reason,
    };

    if bytes.len() < 32 {
        return Err(malformed("moins d'un mot d'en-tête".to_string()));
    }

    let header = &bytes[..32];
    let version = header[0] as char;
    if version != ENCODING_VERSION {
        return Err(ParamsError::UnsupportedVersion { version });
    }

    let type_chars: Vec<char> = header[1..]
        .iter()
        .take_while(|b| **b != 0)
        .map(|b| *b as char)
        .collect();

    let mut types = Vec::with_capacity(1 + type_chars.len() * 2);
    types.push(ParamType::FixedBytes(32));
    for c in &type_chars {
        types.push(ParamType::FixedBytes(32));
        types.push(ParamValue::param_type(*c)?);
    }

    let mut tokens = abi::decode(&types, bytes)
        .map_err(|e| malformed(e.to_string()))?
        .into_iter();
    // Mot d'en-tête déjà interprété
    tokens.next();

    let mut params = Vec::with_capacity(type_chars.len());
    for c in type_chars {
        let name_token = tokens.next().ok_or_else(|| malformed("nom absent".to_string()))?;
        let value_token = tokens
            .next()
            .ok_or_else(|| malformed("valeur absente".to_string()))?;

        let name_word = match name_token {
            Token::FixedBytes(w) => w,
            other => return Err(malformed(format!("nom inattendu: {other:?}"))),
        };
        let end = name_word
            .iter()
            .rposition(|b| *b != 0)
            .map(|i| i + 1)
            .unwrap_or(0);
        let name = String::from_utf8(name_word[..end].to_vec())
            .map_err(|_| malformed("nom non UTF-8".to_string()))?;

        let value = ParamValue::from_token(c, value_token)
            .ok_or_else(|| malformed(format!("valeur incohérente pour '{c}'")))?;
        params.push(Parameter { name, value });
    }

    Ok(params)
}

/// Sépare les paramètres réservés des paramètres ordinaires
///
/// Retourne `None` pour les paramètres réservés si `_type` est absent: la
/// requête ne peut alors pas être encodée.
pub fn split_reserved(params: &[Parameter]) -> (Vec<Parameter>, Option<ReservedParameters>) {
    let mut response_type = None;
    let mut path = None;
    let mut times = None;
    let mut ordinary = Vec::with_capacity(params.len());

    for param in params {
        if !is_reserved_name(&param.name) {
            ordinary.push(param.clone());
            continue;
        }
        let text = match &param.value {
            ParamValue::String(s) => s.clone(),
            // Un paramètre réservé non textuel est ignoré
            _ => continue,
        };
        match param.name.as_str() {
            "_type" => response_type = Some(text),
            "_path" => path = Some(text),
            "_times" => times = Some(text),
            _ => {}
        }
    }

    let reserved = response_type.map(|ty| ReservedParameters {
        response_type: ty,
        path,
        times,
    });
    (ordinary, reserved)
}
