//! Instantané de gas et de nonce d'une cascade
//!
//! Toutes les transactions d'une cascade pour une même requête partagent
//! un couple `(gas_price, nonce)` calculé une fois par passage: ré-estimer
//! en milieu de cascade risquerait une collision de nonce avec la première
//! tentative.

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest, U256};
use serde::{Deserialize, Serialize};

/// Limite de gas par défaut des transactions de résolution
pub const DEFAULT_GAS_LIMIT: u64 = 500_000;

/// Couple (prix du gas, nonce) figé pour une cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasSnapshot {
    pub gas_price: U256,
    pub nonce: U256,
}

/// Construit une transaction legacy prête à signer
pub fn build_transaction(
    from: Address,
    to: Address,
    data: Bytes,
    gas: &GasSnapshot,
    gas_limit: U256,
    value: U256,
    chain_id: u64,
) -> TypedTransaction {
    TransactionRequest::new()
        .from(from)
        .to(to)
        .data(data)
        .gas(gas_limit)
        .gas_price(gas.gas_price)
        .nonce(gas.nonce)
        .value(value)
        .chain_id(chain_id)
        .into()
}
