//! Codec des paramètres réservés
//!
//! Extrait une valeur d'une réponse API arbitraire, la transforme et
//! l'encode dans la grammaire fixe des types primitifs de la chaîne.
//! Aucun effet de bord; déterministe pour des entrées données (à la seule
//! exception du type `timestamp`).

pub mod encode;
pub mod grammar;
pub mod path;
pub mod reserved;
pub mod value;

// Re-exports pour l'interface publique
pub use encode::{decode_scalar, encode_response};
pub use grammar::{PrimitiveType, ResponseType};
pub use path::{extract, split_segments};
pub use reserved::{is_reserved_name, EncodeField, ReservedParameters, RESERVED_PARAMETER_NAMES};
pub use value::{parse_address, parse_decimal, scale_to_integer, to_int256_raw, to_uint256};
