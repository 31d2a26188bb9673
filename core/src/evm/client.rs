//! Client de chaîne
//!
//! Le trait `ChainClient` est la couture testable entre le pipeline et le
//! RPC: l'implémentation de production signe et parle au fournisseur HTTP,
//! les tests branchent un client en mémoire. Chaque appel porte un timeout
//! explicite; le dépasser est une erreur de transport, jamais un blocage
//! silencieux.

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, BlockNumber, Bytes, Filter, Log, H256, U256};
use std::future::Future;
use std::time::Duration;

use crate::error::ChainError;

/// Fenêtre de récupération des logs d'un contrat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogWindow {
    pub address: Address,
    pub from_block: u64,
    pub to_block: u64,
}

/// Accès à la chaîne, à timeout explicite
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Numéro du bloc courant
    async fn block_number(&self) -> Result<u64, ChainError>;

    /// Logs du contrat dans la fenêtre donnée
    async fn fetch_logs(&self, window: &LogWindow) -> Result<Vec<Log>, ChainError>;

    /// Appel en lecture seule (simulation)
    async fn call(&self, tx: &TypedTransaction) -> Result<Bytes, ChainError>;

    /// Estimation du gas d'une transaction
    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, ChainError>;

    /// Prix du gas courant
    async fn gas_price(&self) -> Result<U256, ChainError>;

    /// Solde d'un compte
    async fn balance(&self, address: Address) -> Result<U256, ChainError>;

    /// Nonce en attente d'un compte
    async fn pending_nonce(&self, address: Address) -> Result<U256, ChainError>;

    /// Signe et soumet une transaction
    async fn submit(&self, tx: TypedTransaction, signer: &LocalWallet) -> Result<H256, ChainError>;
}

/// Client de production sur un fournisseur JSON-RPC HTTP
#[derive(Debug, Clone)]
pub struct EvmChainClient {
    provider: Provider<Http>,
    timeout: Duration,
}

impl EvmChainClient {
    /// Crée un client vers l'URL RPC donnée
    pub fn new(rpc_url: &str, timeout_ms: u64) -> Result<Self, ChainError> {
        let provider =
            Provider::<Http>::try_from(rpc_url).map_err(|e| ChainError::Rpc(e.to_string()))?;
        Ok(Self {
            provider,
            timeout: Duration::from_millis(timeout_ms),
        })
    }

    async fn rpc<T, E, F>(&self, fut: F) -> Result<T, ChainError>
    where
        E: std::fmt::Display,
        F: Future<Output = std::result::Result<T, E>> + Send,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| ChainError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            })?
            .map_err(|e| ChainError::Rpc(e.to_string()))
    }
}

#[async_trait]
impl ChainClient for EvmChainClient {
    async fn block_number(&self) -> Result<u64, ChainError> {
        let number = self.rpc(self.provider.get_block_number()).await?;
        Ok(number.as_u64())
    }

    async fn fetch_logs(&self, window: &LogWindow) -> Result<Vec<Log>, ChainError> {
        let filter = Filter::new()
            .address(window.address)
            .from_block(window.from_block)
            .to_block(window.to_block);
        self.rpc(self.provider.get_logs(&filter)).await
    }

    async fn call(&self, tx: &TypedTransaction) -> Result<Bytes, ChainError> {
        self.rpc(self.provider.call(tx, None)).await
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, ChainError> {
        self.rpc(self.provider.estimate_gas(tx, None)).await
    }

    async fn gas_price(&self) -> Result<U256, ChainError> {
        self.rpc(self.provider.get_gas_price()).await
    }

    async fn balance(&self, address: Address) -> Result<U256, ChainError> {
        self.rpc(self.provider.get_balance(address, None)).await
    }

    async fn pending_nonce(&self, address: Address) -> Result<U256, ChainError> {
        self.rpc(
            self.provider
                .get_transaction_count(address, Some(BlockNumber::Pending.into())),
        )
        .await
    }

    async fn submit(&self, tx: TypedTransaction, signer: &LocalWallet) -> Result<H256, ChainError> {
        let signature = signer
            .sign_transaction(&tx)
            .await
            .map_err(|e| ChainError::Signing(e.to_string()))?;
        let raw = tx.rlp_signed(&signature);
        let pending = self.rpc(self.provider.send_raw_transaction(raw)).await?;
        Ok(*pending)
    }
}
