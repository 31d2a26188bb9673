//! Coercition des valeurs JSON vers les primitives de la chaîne
//!
//! Les nombres arrivent comme nombres JSON ou comme chaînes décimales
//! (y compris au-delà de la précision 64 bits natifs); la conversion passe
//! par une arithmétique décimale à précision arbitraire. Le dépassement des
//! bornes de la cible est une erreur d'encodage, jamais un enroulement
//! silencieux.

use bigdecimal::num_bigint::{BigInt, Sign};
use bigdecimal::{BigDecimal, RoundingMode};
use ethers::abi::Token;
use ethers::types::{Address, U256};
use serde_json::Value;
use std::str::FromStr;

use crate::codec::grammar::{PrimitiveType, ResponseType};
use crate::error::CodecError;

/// Coerce une valeur JSON en décimal à précision arbitraire
pub fn parse_decimal(value: &Value, target: &str) -> Result<BigDecimal, CodecError> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        other => {
            return Err(CodecError::InvalidValue {
                target: target.to_string(),
                value: other.to_string(),
            })
        }
    };
    BigDecimal::from_str(&text).map_err(|_| CodecError::InvalidValue {
        target: target.to_string(),
        value: text,
    })
}

/// Applique le multiplicateur puis tronque vers zéro en entier
pub fn scale_to_integer(value: BigDecimal, times: Option<&BigInt>) -> BigInt {
    let scaled = match times {
        Some(multiplier) => value * BigDecimal::from(multiplier.clone()),
        None => value,
    };
    let (digits, exponent) = scaled
        .with_scale_round(0, RoundingMode::Down)
        .into_bigint_and_exponent();
    debug_assert_eq!(exponent, 0);
    digits
}

fn u256_from_magnitude(v: &BigInt) -> U256 {
    let (_, bytes) = v.to_bytes_be();
    U256::from_big_endian(&bytes)
}

/// Convertit un entier en uint256, bornes vérifiées
pub fn to_uint256(v: &BigInt) -> Result<U256, CodecError> {
    let out_of_range = || CodecError::ValueOutOfRange {
        target: "uint256".to_string(),
        value: v.to_string(),
    };
    if v.sign() == Sign::Minus || v.bits() > 256 {
        return Err(out_of_range());
    }
    Ok(u256_from_magnitude(v))
}

/// Convertit un entier en int256, en complément à deux, bornes vérifiées
pub fn to_int256_raw(v: &BigInt) -> Result<U256, CodecError> {
    let out_of_range = || CodecError::ValueOutOfRange {
        target: "int256".to_string(),
        value: v.to_string(),
    };
    let bound = BigInt::from(1u8) << 255u32;
    if v >= &bound || v < &(-bound.clone()) {
        return Err(out_of_range());
    }
    if v.sign() == Sign::Minus {
        let raw = (BigInt::from(1u8) << 256u32) + v;
        Ok(u256_from_magnitude(&raw))
    } else {
        Ok(u256_from_magnitude(v))
    }
}

fn string_value(value: &Value) -> Result<String, CodecError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(CodecError::InvalidValue {
            target: "string".to_string(),
            value: other.to_string(),
        }),
    }
}

fn fixed_text_32(value: &Value) -> Result<Vec<u8>, CodecError> {
    let text = match value {
        Value::String(s) => s.clone(),
        other => {
            return Err(CodecError::InvalidValue {
                target: "bytes32".to_string(),
                value: other.to_string(),
            })
        }
    };
    let bytes = text.as_bytes();
    // Politique choisie: un texte qui ne tient pas dans 32 bytes est une
    // erreur d'encodage, jamais une troncature silencieuse
    if bytes.len() > 32 {
        return Err(CodecError::TextTooLong { len: bytes.len() });
    }
    let mut word = vec![0u8; 32];
    word[..bytes.len()].copy_from_slice(bytes);
    Ok(word)
}

/// Parse une adresse avec ou sans préfixe `0x`
pub fn parse_address(text: &str) -> Result<Address, CodecError> {
    let stripped = text.strip_prefix("0x").unwrap_or(text);
    let invalid = || CodecError::InvalidValue {
        target: "address".to_string(),
        value: text.to_string(),
    };
    let bytes = hex::decode(stripped).map_err(|_| invalid())?;
    if bytes.len() != 20 {
        return Err(invalid());
    }
    Ok(Address::from_slice(&bytes))
}

/// Convertit une valeur JSON extraite en token ABI du type demandé
///
/// `now_seconds` alimente le type `timestamp`; `times` ne s'applique
/// qu'aux types numériques, élément par élément dans les tableaux.
pub fn json_to_token(
    value: &Value,
    ty: &ResponseType,
    times: Option<&BigInt>,
    now_seconds: u64,
) -> Result<Token, CodecError> {
    match ty {
        ResponseType::Primitive(p) => primitive_to_token(value, *p, times, now_seconds),
        ResponseType::Array { element, length } => {
            let items = value.as_array().ok_or_else(|| CodecError::InvalidValue {
                target: "array".to_string(),
                value: value.to_string(),
            })?;
            if let Some(expected) = length {
                if items.len() != *expected {
                    return Err(CodecError::ArrayLengthMismatch {
                        expected: *expected,
                        actual: items.len(),
                    });
                }
            }
            let tokens = items
                .iter()
                .map(|item| json_to_token(item, element, times, now_seconds))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(match length {
                Some(_) => Token::FixedArray(tokens),
                None => Token::Array(tokens),
            })
        }
    }
}

fn primitive_to_token(
    value: &Value,
    p: PrimitiveType,
    times: Option<&BigInt>,
    now_seconds: u64,
) -> Result<Token, CodecError> {
    match p {
        PrimitiveType::Uint256 => {
            let dec = parse_decimal(value, "uint256")?;
            let int = scale_to_integer(dec, times);
            Ok(Token::Uint(to_uint256(&int)?))
        }
        PrimitiveType::Int256 => {
            let dec = parse_decimal(value, "int256")?;
            let int = scale_to_integer(dec, times);
            Ok(Token::Int(to_int256_raw(&int)?))
        }
        PrimitiveType::Bool => match value {
            // Uniquement un booléen JSON; pas de coercition depuis les chaînes
            Value::Bool(b) => Ok(Token::Bool(*b)),
            other => Err(CodecError::InvalidValue {
                target: "bool".to_string(),
                value: other.to_string(),
            }),
        },
        PrimitiveType::Bytes => {
            let text = value.as_str().ok_or_else(|| CodecError::InvalidValue {
                target: "bytes".to_string(),
                value: value.to_string(),
            })?;
            let stripped = text
                .strip_prefix("0x")
                .ok_or_else(|| CodecError::InvalidValue {
                    target: "bytes".to_string(),
                    value: text.to_string(),
                })?;
            let bytes = hex::decode(stripped).map_err(|_| CodecError::InvalidValue {
                target: "bytes".to_string(),
                value: text.to_string(),
            })?;
            Ok(Token::Bytes(bytes))
        }
        PrimitiveType::String => Ok(Token::String(string_value(value)?)),
        PrimitiveType::Bytes32 | PrimitiveType::String32 => {
            Ok(Token::FixedBytes(fixed_text_32(value)?))
        }
        PrimitiveType::Address => {
            let text = value.as_str().ok_or_else(|| CodecError::InvalidValue {
                target: "address".to_string(),
                value: value.to_string(),
            })?;
            Ok(Token::Address(parse_address(text)?))
        }
        PrimitiveType::Timestamp => Ok(Token::Uint(U256::from(now_seconds))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bigint(s: &str) -> BigInt {
        BigInt::from_str(s).unwrap()
    }

    #[test]
    fn test_scale_truncates_toward_zero() {
        let dec = BigDecimal::from_str("7.9").unwrap();
        assert_eq!(scale_to_integer(dec, None), bigint("7"));

        let neg = BigDecimal::from_str("-7.9").unwrap();
        assert_eq!(scale_to_integer(neg, None), bigint("-7"));
    }

    #[test]
    fn test_scale_with_multiplier_is_exact() {
        let dec = BigDecimal::from_str("0.000000001").unwrap();
        let times = bigint("1000000000000000000");
        assert_eq!(scale_to_integer(dec, Some(&times)), bigint("1000000000"));
    }

    #[test]
    fn test_uint256_rejects_negative_and_overflow() {
        assert!(to_uint256(&bigint("-1")).is_err());
        let too_big = BigInt::from(1u8) << 256u32;
        assert!(to_uint256(&too_big).is_err());
        assert_eq!(to_uint256(&bigint("42")).unwrap(), U256::from(42u8));
    }

    #[test]
    fn test_int256_twos_complement() {
        let raw = to_int256_raw(&bigint("-1")).unwrap();
        assert_eq!(raw, U256::MAX);

        let bound = BigInt::from(1u8) << 255u32;
        assert!(to_int256_raw(&bound).is_err());
        assert!(to_int256_raw(&(-bound.clone())).is_ok());
        assert!(to_int256_raw(&(-bound - 1)).is_err());
    }

    #[test]
    fn test_decimal_from_string_beyond_u64() {
        let dec = parse_decimal(&json!("123456789012345678901234567890"), "uint256").unwrap();
        let int = scale_to_integer(dec, None);
        assert_eq!(int, bigint("123456789012345678901234567890"));
    }

    #[test]
    fn test_bool_strict() {
        let ty = ResponseType::Primitive(PrimitiveType::Bool);
        assert!(json_to_token(&json!(true), &ty, None, 0).is_ok());
        assert!(json_to_token(&json!("true"), &ty, None, 0).is_err());
    }

    #[test]
    fn test_bytes32_too_long_is_an_error() {
        let ty = ResponseType::Primitive(PrimitiveType::Bytes32);
        let long = "x".repeat(33);
        match json_to_token(&json!(long), &ty, None, 0) {
            Err(CodecError::TextTooLong { len }) => assert_eq!(len, 33),
            other => panic!("erreur attendue, reçu {other:?}"),
        }
    }

    #[test]
    fn test_address_with_and_without_prefix() {
        let plain = "2c7536e3605d9c16a7a3d7b1898e529396a65c23";
        let a = parse_address(plain).unwrap();
        let b = parse_address(&format!("0x{plain}")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_fixed_array_length_checked() {
        let ty = ResponseType::parse("uint256[3]").unwrap();
        match json_to_token(&json!([1, 2]), &ty, None, 0) {
            Err(CodecError::ArrayLengthMismatch { expected, actual }) => {
                assert_eq!((expected, actual), (3, 2));
            }
            other => panic!("erreur attendue, reçu {other:?}"),
        }
    }

    #[test]
    fn test_nested_array_tokens() {
        let ty = ResponseType::parse("int256[2][]").unwrap();
        let token = json_to_token(&json!([[1, -2], [3, 4]]), &ty, None, 0).unwrap();
        match token {
            Token::Array(outer) => {
                assert_eq!(outer.len(), 2);
                match &outer[0] {
                    Token::FixedArray(inner) => assert_eq!(inner.len(), 2),
                    other => panic!("FixedArray attendu, reçu {other:?}"),
                }
            }
            other => panic!("Array attendu, reçu {other:?}"),
        }
    }
}
