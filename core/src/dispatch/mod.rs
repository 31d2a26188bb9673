//! Abstraction de dispatch
//!
//! Invoque une unité de travail nommée soit en processus, soit par un
//! appel serverless distant. Une interface, trois implémentations choisies
//! par configuration: jamais de branchement conditionnel éparpillé dans le
//! code appelant.

pub mod envelope;
pub mod local;
pub mod remote;

pub use envelope::{
    decode_plain, decode_wrapped, CallApiPayload, DispatchResponse, FunctionName,
    InitializeProviderPayload, LogOptions, ProcessTransactionsPayload, RequestEnvelope,
    ResponseEnvelope, WrappedTransportResponse,
};
pub use local::LocalDispatcher;
pub use remote::{HttpFunctionDispatcher, WrappedFunctionDispatcher};

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::DispatchConfig;
use crate::error::DispatchError;
use crate::handlers::NodeContext;

/// Invocation d'une unité de travail nommée
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Invoque la fonction et normalise le résultat
    ///
    /// `Err` ne couvre que les fautes de transport/infrastructure;
    /// l'échec applicatif de la fonction est un
    /// `DispatchResponse::Failed` que l'appelant doit discriminer.
    async fn spawn(&self, envelope: RequestEnvelope) -> Result<DispatchResponse, DispatchError>;
}

/// Construit le dispatcher choisi par la configuration
pub fn build_dispatcher(config: &DispatchConfig, node: Arc<NodeContext>) -> Arc<dyn Dispatcher> {
    match config {
        DispatchConfig::Local => Arc::new(LocalDispatcher::new(node)),
        DispatchConfig::HttpFunction {
            base_url,
            timeout_ms,
        } => Arc::new(HttpFunctionDispatcher::new(base_url, *timeout_ms)),
        DispatchConfig::WrappedFunction {
            base_url,
            timeout_ms,
        } => Arc::new(WrappedFunctionDispatcher::new(base_url, *timeout_ms)),
    }
}
