//! Extraction et encodage d'une réponse API vers les bytes ABI
//!
//! Fonction pure et déterministe pour des entrées données, à la seule
//! exception du type `timestamp` qui lit l'horloge de l'encodeur.

use chrono::Utc;
use ethers::abi::{self, Token};
use ethers::types::I256;
use serde_json::Value;

use crate::codec::grammar::{PrimitiveType, ResponseType};
use crate::codec::path::extract;
use crate::codec::reserved::{EncodeField, ReservedParameters};
use crate::codec::value::json_to_token;
use crate::error::CodecError;

/// Encode la valeur extraite d'une réponse API selon les paramètres réservés
pub fn encode_response(
    api_response: &Value,
    reserved: &ReservedParameters,
) -> Result<Vec<u8>, CodecError> {
    let fields = reserved.split_fields()?;
    let now_seconds = Utc::now().timestamp().max(0) as u64;

    let tokens = fields
        .iter()
        .map(|field| encode_field(api_response, field, now_seconds))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(abi::encode(&tokens))
}

fn encode_field(
    api_response: &Value,
    field: &EncodeField,
    now_seconds: u64,
) -> Result<Token, CodecError> {
    // Le contenu de `_path` est ignoré pour un timestamp
    if field.ty == ResponseType::Primitive(PrimitiveType::Timestamp) {
        return json_to_token(&Value::Null, &field.ty, None, now_seconds);
    }

    let path = field.path.as_deref().unwrap_or("");
    let extracted = extract(api_response, path).ok_or_else(|| CodecError::PathNotFound {
        path: path.to_string(),
    })?;
    json_to_token(extracted, &field.ty, field.times.as_ref(), now_seconds)
}

/// Décode un scalaire encodé en sa représentation JSON canonique
///
/// Inverse du chemin d'encodage pour les types scalaires; utilisé par la
/// passerelle et les tests d'aller-retour. Les adresses ressortent toujours
/// sous la forme canonique préfixée `0x`.
pub fn decode_scalar(bytes: &[u8], ty: &ResponseType) -> Result<Value, CodecError> {
    let invalid = |reason: String| CodecError::InvalidValue {
        target: "decode".to_string(),
        value: reason,
    };

    let tokens = abi::decode(&[ty.param_type()], bytes).map_err(|e| invalid(e.to_string()))?;
    let token = tokens
        .into_iter()
        .next()
        .ok_or_else(|| invalid("aucun token".to_string()))?;

    let primitive = match ty {
        ResponseType::Primitive(p) => *p,
        ResponseType::Array { .. } => {
            return Err(invalid("scalaire attendu".to_string()));
        }
    };

    match (primitive, token) {
        (PrimitiveType::Uint256 | PrimitiveType::Timestamp, Token::Uint(v)) => {
            Ok(Value::String(v.to_string()))
        }
        (PrimitiveType::Int256, Token::Int(raw)) => {
            Ok(Value::String(I256::from_raw(raw).to_string()))
        }
        (PrimitiveType::Bool, Token::Bool(b)) => Ok(Value::Bool(b)),
        (PrimitiveType::Address, Token::Address(a)) => {
            Ok(Value::String(format!("0x{}", hex::encode(a.as_bytes()))))
        }
        (PrimitiveType::String, Token::String(s)) => Ok(Value::String(s)),
        (PrimitiveType::Bytes, Token::Bytes(b)) => {
            Ok(Value::String(format!("0x{}", hex::encode(b))))
        }
        (PrimitiveType::Bytes32 | PrimitiveType::String32, Token::FixedBytes(word)) => {
            let end = word
                .iter()
                .rposition(|b| *b != 0)
                .map(|i| i + 1)
                .unwrap_or(0);
            let text = String::from_utf8(word[..end].to_vec())
                .map_err(|_| invalid("UTF-8 invalide".to_string()))?;
            Ok(Value::String(text))
        }
        (p, t) => Err(invalid(format!("token {t:?} inattendu pour {p:?}"))),
    }
}
