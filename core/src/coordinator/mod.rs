//! Coordinateur d'un cycle de scrutation
//!
//! Un coordinateur logique par cycle: initialisation des connexions en
//! parallèle via l'abstraction de dispatch, agrégation, exécution des
//! appels API uniques, désagrégation (barrière de jointure) puis balayage
//! des transactions. L'état du cycle circule par valeur d'étape en étape;
//! aucun singleton ambiant.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{ChainConfig, NodeConfig};
use crate::dispatch::{
    CallApiPayload, DispatchResponse, Dispatcher, FunctionName, InitializeProviderPayload,
    LogOptions, ProcessTransactionsPayload, RequestEnvelope,
};
use crate::error::{CoreError, DispatchError};
use crate::evm::ApiCallResponse;
use crate::pipeline::{
    aggregate, disaggregate, index_by_request_id, AggregatedApiCall, AggregatedResult,
    ProviderConnectionState,
};

/// Délai par défaut d'une invocation de dispatch
pub const DEFAULT_DISPATCH_TIMEOUT_MS: u64 = 60_000;

/// État d'un cycle, passé par valeur d'étape en étape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorState {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub connections: Vec<ProviderConnectionState>,
    pub aggregated: Vec<AggregatedApiCall>,
}

impl CoordinatorState {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            connections: Vec::new(),
            aggregated: Vec::new(),
        }
    }
}

/// Coordinateur des cycles de scrutation
pub struct Coordinator {
    config: NodeConfig,
    dispatcher: Arc<dyn Dispatcher>,
    dispatch_timeout_ms: u64,
}

impl Coordinator {
    pub fn new(config: NodeConfig, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            config,
            dispatcher,
            dispatch_timeout_ms: DEFAULT_DISPATCH_TIMEOUT_MS,
        }
    }

    pub fn with_dispatch_timeout(mut self, timeout_ms: u64) -> Self {
        self.dispatch_timeout_ms = timeout_ms;
        self
    }

    async fn spawn(
        &self,
        function_name: FunctionName,
        payload: Value,
        log_options: LogOptions,
    ) -> Result<DispatchResponse, DispatchError> {
        let envelope = RequestEnvelope {
            function_name,
            payload,
            log_options,
        };
        // Le délai abandonne l'attente, jamais l'invocation elle-même
        match tokio::time::timeout(
            Duration::from_millis(self.dispatch_timeout_ms),
            self.dispatcher.spawn(envelope),
        )
        .await
        {
            Err(_) => Err(DispatchError::Timeout {
                function: function_name.to_string(),
                timeout_ms: self.dispatch_timeout_ms,
            }),
            Ok(result) => result,
        }
    }

    fn log_options(&self, state: &CoordinatorState, chain: Option<&ChainConfig>) -> LogOptions {
        LogOptions {
            coordinator_id: state.id.to_string(),
            chain_id: chain.map(|c| c.chain_id),
            provider_name: chain.map(|c| c.provider_name.clone()),
        }
    }

    /// Étape 1: initialisation de chaque connexion, en parallèle
    ///
    /// Une connexion dont l'initialisation échoue est écartée du cycle.
    async fn initialize_connections(&self, mut state: CoordinatorState) -> CoordinatorState {
        let futures = self.config.chains.iter().map(|chain| {
            let payload = InitializeProviderPayload {
                chain: chain.clone(),
            };
            let log_options = self.log_options(&state, Some(chain));
            async move {
                let payload = serde_json::to_value(payload)?;
                self.spawn(FunctionName::InitializeProviderConnection, payload, log_options)
                    .await
            }
        });

        for (chain, result) in self.config.chains.iter().zip(join_all(futures).await) {
            match result {
                Ok(DispatchResponse::Ok(value)) => {
                    match serde_json::from_value::<ProviderConnectionState>(value) {
                        Ok(connection) => state.connections.push(connection),
                        Err(e) => warn!(
                            provider = %chain.provider_name,
                            "état de connexion indéchiffrable: {e}"
                        ),
                    }
                }
                Ok(DispatchResponse::Failed { error_log }) => warn!(
                    provider = %chain.provider_name,
                    "initialisation en échec, connexion écartée: {error_log}"
                ),
                Err(e) => warn!(
                    provider = %chain.provider_name,
                    "transport d'initialisation en échec, connexion écartée: {e}"
                ),
            }
        }
        state
    }

    fn chain_id_for(&self, call: &AggregatedApiCall, state: &CoordinatorState) -> u64 {
        state
            .connections
            .iter()
            .find(|connection| {
                connection
                    .api_calls
                    .iter()
                    .any(|c| call.request_ids.contains(&c.id))
            })
            .map(|connection| connection.chain_id)
            .or_else(|| self.config.chains.first().map(|c| c.chain_id))
            .unwrap_or_default()
    }

    /// Étapes 2 et 3: agrégation puis exécution des appels uniques
    ///
    /// Une faute de transport laisse l'appel sans résultat: la
    /// désagrégation écartera ses copies (fail-safe, retentées au cycle
    /// suivant).
    async fn execute_api_calls(&self, mut state: CoordinatorState) -> CoordinatorState {
        let mut aggregated = aggregate(&state.connections);

        let futures = aggregated.iter().map(|call| {
            let payload = CallApiPayload {
                aggregated_api_call: call.clone(),
                chain_id: self.chain_id_for(call, &state),
            };
            let log_options = self.log_options(&state, None);
            async move {
                let payload = serde_json::to_value(payload)?;
                self.spawn(FunctionName::CallApi, payload, log_options).await
            }
        });
        let results = join_all(futures).await;

        for (call, result) in aggregated.iter_mut().zip(results) {
            match result {
                Ok(DispatchResponse::Ok(value)) => {
                    match serde_json::from_value::<ApiCallResponse>(value) {
                        Ok(response) => {
                            call.result = Some(AggregatedResult::Success {
                                encoded_data: response.encoded_data,
                                signature: response.signature,
                            });
                        }
                        Err(e) => {
                            call.result = Some(AggregatedResult::Failure {
                                error_log: format!("réponse call-api indéchiffrable: {e}"),
                            });
                        }
                    }
                }
                Ok(DispatchResponse::Failed { error_log }) => {
                    call.result = Some(AggregatedResult::Failure { error_log });
                }
                Err(e) => {
                    warn!(
                        endpoint_id = %call.endpoint_id,
                        "transport call-api en échec, résultat absent: {e}"
                    );
                }
            }
        }

        state.aggregated = aggregated;
        state
    }

    /// Étape 5: balayage des transactions de chaque connexion
    async fn submit_transactions(&self, mut state: CoordinatorState) -> CoordinatorState {
        let connections = std::mem::take(&mut state.connections);
        let futures = connections.into_iter().map(|connection| {
            let chain = self
                .config
                .chains
                .iter()
                .find(|c| {
                    c.chain_id == connection.chain_id
                        && c.provider_name == connection.provider_name
                })
                .cloned();
            let log_options = self.log_options(&state, chain.as_ref());
            async move {
                let chain = match chain {
                    Some(chain) => chain,
                    None => return (connection, None),
                };
                let payload = ProcessTransactionsPayload {
                    chain,
                    state: connection.clone(),
                };
                let result = match serde_json::to_value(payload) {
                    Ok(payload) => {
                        self.spawn(FunctionName::ProcessPendingTransactions, payload, log_options)
                            .await
                    }
                    Err(e) => Err(DispatchError::Serialization(e)),
                };
                (connection, Some(result))
            }
        });

        for (previous, result) in join_all(futures).await {
            let connection = match result {
                Some(Ok(DispatchResponse::Ok(value))) => {
                    serde_json::from_value::<ProviderConnectionState>(value).unwrap_or(previous)
                }
                Some(Ok(DispatchResponse::Failed { error_log })) => {
                    warn!(
                        provider = %previous.provider_name,
                        "balayage des transactions en échec: {error_log}"
                    );
                    previous
                }
                Some(Err(e)) => {
                    warn!(
                        provider = %previous.provider_name,
                        "transport du balayage en échec: {e}"
                    );
                    previous
                }
                None => previous,
            };
            state.connections.push(connection);
        }
        state
    }

    /// Exécute un cycle complet de scrutation
    pub async fn run_cycle(&self) -> Result<CoordinatorState, CoreError> {
        let mut state = CoordinatorState::new();
        info!(cycle_id = %state.id, chains = self.config.chains.len(), "début de cycle");

        state = self.initialize_connections(state).await;
        state = self.execute_api_calls(state).await;

        // Barrière de jointure: fusion pure des résultats par connexion
        let by_id = index_by_request_id(state.aggregated.clone());
        state.connections = disaggregate(std::mem::take(&mut state.connections), &by_id);

        state = self.submit_transactions(state).await;

        info!(
            cycle_id = %state.id,
            connections = state.connections.len(),
            unique_api_calls = state.aggregated.len(),
            "fin de cycle"
        );
        Ok(state)
    }
}
