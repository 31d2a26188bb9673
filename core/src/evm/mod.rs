//! Interface avec la chaîne EVM
//!
//! Types de requêtes, ABI fixe du contrat de protocole, décodage des logs
//! et client RPC.

pub mod client;
pub mod contracts;
pub mod events;
pub mod types;

// Re-exports pour l'interface publique
pub use client::{ChainClient, EvmChainClient, LogWindow};
pub use events::{ApiRequestEvent, ChainEvent, EventKind, WithdrawalRequestEvent};
pub use types::{
    ApiCall, ApiCallPayload, ApiCallResponse, Request, RequestMetadata, RequestStatus, Withdrawal,
    WithdrawalPayload,
};
