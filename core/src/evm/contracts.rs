//! ABI fixe du contrat de protocole
//!
//! Les topics d'événements et les sélecteurs de fonctions consommés par le
//! décodeur et la cascade de soumission. Changer une de ces signatures est
//! un changement cassant pour tout le pipeline.

use ethers::abi::{self, Token};
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::keccak256;

/// Code de statut d'une réponse réussie
pub const FULFILLMENT_OK_STATUS: u64 = 0;

/// Code de statut fixe du rapport d'échec de résolution
pub const FULFILLMENT_FAILED_STATUS: u64 = 1;

/// Signatures des événements du contrat
pub const MADE_API_REQUEST_SIG: &str =
    "MadeApiRequest(address,bytes32,bytes32,address,address,address,bytes4,bytes)";
pub const MADE_TEMPLATE_REQUEST_SIG: &str =
    "MadeTemplateRequest(address,bytes32,bytes32,address,address,address,bytes4,bytes)";
pub const FULFILLED_API_REQUEST_SIG: &str = "FulfilledApiRequest(address,bytes32,uint256,bytes)";
pub const FAILED_API_REQUEST_SIG: &str = "FailedApiRequest(address,bytes32,string)";
pub const REQUESTED_WITHDRAWAL_SIG: &str =
    "RequestedWithdrawal(address,address,bytes32,address,address)";
pub const FULFILLED_WITHDRAWAL_SIG: &str =
    "FulfilledWithdrawal(address,address,bytes32,address,uint256)";

/// Topic d'un événement à partir de sa signature
pub fn event_topic(signature: &str) -> H256 {
    H256::from(keccak256(signature.as_bytes()))
}

fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

fn calldata(signature: &str, tokens: &[Token]) -> Bytes {
    let mut data = selector(signature).to_vec();
    data.extend(abi::encode(tokens));
    Bytes::from(data)
}

/// Calldata de `fulfill(bytes32,uint256,bytes,bytes,address,bytes4)`
pub fn fulfill_calldata(
    request_id: H256,
    status_code: u64,
    data: &Bytes,
    signature: &Bytes,
    fulfill_address: Address,
    fulfill_function_id: [u8; 4],
) -> Bytes {
    calldata(
        "fulfill(bytes32,uint256,bytes,bytes,address,bytes4)",
        &[
            Token::FixedBytes(request_id.as_bytes().to_vec()),
            Token::Uint(U256::from(status_code)),
            Token::Bytes(data.to_vec()),
            Token::Bytes(signature.to_vec()),
            Token::Address(fulfill_address),
            Token::FixedBytes(fulfill_function_id.to_vec()),
        ],
    )
}

/// Calldata de `fail(bytes32,address,bytes4,string)`
///
/// Aucune validation de charge utile: cette transaction garantit l'état
/// terminal on-chain quand les chemins plus riches sont rejetés.
pub fn fail_calldata(
    request_id: H256,
    fulfill_address: Address,
    fulfill_function_id: [u8; 4],
    error_message: &str,
) -> Bytes {
    calldata(
        "fail(bytes32,address,bytes4,string)",
        &[
            Token::FixedBytes(request_id.as_bytes().to_vec()),
            Token::Address(fulfill_address),
            Token::FixedBytes(fulfill_function_id.to_vec()),
            Token::String(error_message.to_string()),
        ],
    )
}

/// Calldata de `fulfillWithdrawal(bytes32,address)`
pub fn fulfill_withdrawal_calldata(withdrawal_request_id: H256, sponsor: Address) -> Bytes {
    calldata(
        "fulfillWithdrawal(bytes32,address)",
        &[
            Token::FixedBytes(withdrawal_request_id.as_bytes().to_vec()),
            Token::Address(sponsor),
        ],
    )
}

/// Décode le retour `(bool, bytes)` d'une simulation de `fulfill`
///
/// `None` si le retour est inintelligible; l'appelant le traite comme un
/// rejet structurel.
pub fn decode_fulfill_simulation(output: &[u8]) -> Option<bool> {
    let tokens = abi::decode(
        &[abi::ParamType::Bool, abi::ParamType::Bytes],
        output,
    )
    .ok()?;
    match tokens.first() {
        Some(Token::Bool(ok)) => Some(*ok),
        _ => None,
    }
}
