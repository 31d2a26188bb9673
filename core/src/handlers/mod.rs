//! Handlers des unités de travail invocables
//!
//! Les trois fonctions nommées de l'abstraction de dispatch. Chaque handler
//! convertit ses erreurs applicatives en `DispatchResponse::Failed`: seule
//! la couche de transport produit des `DispatchError`.

pub mod api;
pub mod call_api;
pub mod initialize;
pub mod transactions;

pub use api::perform_api_call;

use std::sync::Arc;
use tracing::error;

use crate::config::{ChainConfig, NodeConfig};
use crate::dispatch::envelope::{
    CallApiPayload, DispatchResponse, FunctionName, InitializeProviderPayload,
    ProcessTransactionsPayload, RequestEnvelope,
};
use crate::error::{ChainError, CoreError, DispatchError, WalletError};
use crate::evm::{ChainClient, EvmChainClient};
use crate::sandbox::Sandbox;
use crate::wallet::MasterKey;

/// Fabrique de clients de chaîne, injectable pour les tests
pub type ChainClientFactory =
    Arc<dyn Fn(&ChainConfig) -> Result<Arc<dyn ChainClient>, ChainError> + Send + Sync>;

/// Contexte partagé des handlers
///
/// Construit une fois par processus; les états de cycle, eux, circulent
/// par valeur dans les enveloppes.
pub struct NodeContext {
    pub config: NodeConfig,
    pub master_key: MasterKey,
    pub sandbox: Arc<Sandbox>,
    pub http: reqwest::Client,
    chain_clients: ChainClientFactory,
}

impl std::fmt::Debug for NodeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeContext").finish_non_exhaustive()
    }
}

impl NodeContext {
    pub fn new(config: NodeConfig) -> Result<Self, CoreError> {
        let seed = hex::decode(&config.master_seed_hex)
            .map_err(|e| WalletError::InvalidSeed(e.to_string()))?;
        let master_key = MasterKey::from_seed(&seed)?;
        Ok(Self {
            config,
            master_key,
            sandbox: Arc::new(Sandbox::new()),
            http: reqwest::Client::new(),
            chain_clients: Arc::new(|chain: &ChainConfig| {
                let client = EvmChainClient::new(&chain.rpc_url, chain.rpc_timeout_ms)?;
                Ok(Arc::new(client) as Arc<dyn ChainClient>)
            }),
        })
    }

    /// Remplace la fabrique de clients de chaîne (tests)
    pub fn with_chain_client_factory(mut self, factory: ChainClientFactory) -> Self {
        self.chain_clients = factory;
        self
    }

    pub fn chain_client(&self, chain: &ChainConfig) -> Result<Arc<dyn ChainClient>, ChainError> {
        (self.chain_clients)(chain)
    }
}

fn failed(function: FunctionName, error: &CoreError) -> DispatchResponse {
    error!(%function, "handler en échec: {error}");
    DispatchResponse::Failed {
        error_log: error.to_string(),
    }
}

/// Route une enveloppe vers son handler
///
/// Une charge utile indéchiffrable est une faute d'enveloppe (transport);
/// toute erreur du handler lui-même est un échec applicatif discriminé.
pub async fn route(
    ctx: &Arc<NodeContext>,
    envelope: RequestEnvelope,
) -> Result<DispatchResponse, DispatchError> {
    match envelope.function_name {
        FunctionName::InitializeProviderConnection => {
            let payload: InitializeProviderPayload = serde_json::from_value(envelope.payload)?;
            match initialize::initialize_provider_connection(ctx, payload).await {
                Ok(state) => Ok(DispatchResponse::Ok(serde_json::to_value(state)?)),
                Err(e) => Ok(failed(envelope.function_name, &e)),
            }
        }
        FunctionName::CallApi => {
            let payload: CallApiPayload = serde_json::from_value(envelope.payload)?;
            match call_api::call_api(ctx, payload).await {
                Ok(response) => Ok(DispatchResponse::Ok(serde_json::to_value(response)?)),
                Err(e) => Ok(failed(envelope.function_name, &e)),
            }
        }
        FunctionName::ProcessPendingTransactions => {
            let payload: ProcessTransactionsPayload = serde_json::from_value(envelope.payload)?;
            match transactions::process_pending_transactions(ctx, payload).await {
                Ok(state) => Ok(DispatchResponse::Ok(serde_json::to_value(state)?)),
                Err(e) => Ok(failed(envelope.function_name, &e)),
            }
        }
    }
}
