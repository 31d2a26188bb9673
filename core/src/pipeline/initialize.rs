//! Construction de l'état d'une connexion depuis les logs bruts
//!
//! Décodage des événements, décodage des paramètres, contrôle d'âge.
//! Fonctions pures sur des logs déjà récupérés: l'accès RPC appartient au
//! handler d'initialisation.

use ethers::types::Log;
use tracing::{debug, info, warn};

use crate::config::{ChainConfig, NodeConfig};
use crate::error::EventsError;
use crate::evm::events::{decode_log, ApiRequestEvent, ChainEvent, WithdrawalRequestEvent};
use crate::evm::{
    ApiCall, ApiCallPayload, Request, RequestMetadata, RequestStatus, Withdrawal,
    WithdrawalPayload,
};
use crate::params::{self, Parameter};
use crate::pipeline::state::ProviderConnectionState;

fn metadata(
    chain: &ChainConfig,
    current_block: u64,
    block_number: u64,
    transaction_hash: ethers::types::H256,
) -> RequestMetadata {
    RequestMetadata {
        block_number,
        transaction_hash,
        current_block,
        ignore_blocked_after: chain.ignore_blocked_after,
    }
}

/// Fusionne les paramètres d'un gabarit avec ceux de la requête
///
/// Les paramètres de la requête priment sur ceux du gabarit à nom égal.
fn merge_template_parameters(template: Vec<Parameter>, request: Vec<Parameter>) -> Vec<Parameter> {
    let mut merged = template;
    for param in request {
        if let Some(existing) = merged.iter_mut().find(|p| p.name == param.name) {
            *existing = param;
        } else {
            merged.push(param);
        }
    }
    merged
}

fn build_api_call(
    config: &NodeConfig,
    chain: &ChainConfig,
    current_block: u64,
    event: ApiRequestEvent,
    from_template: bool,
) -> ApiCall {
    let mut request = Request {
        id: event.request_id,
        status: RequestStatus::Pending,
        error_message: None,
        metadata: metadata(chain, current_block, event.block_number, event.transaction_hash),
        kind: ApiCallPayload {
            endpoint_id: event.target_id,
            template_id: from_template.then_some(event.target_id),
            sponsor: event.sponsor,
            sponsor_wallet: event.sponsor_wallet,
            fulfill_address: event.fulfill_address,
            fulfill_function_id: event.fulfill_function_id,
            encoded_parameters: event.parameters.clone(),
            parameters: Vec::new(),
            response: None,
        },
    };

    // Des paramètres on-chain malformés sont terminaux: jamais retentés
    let request_parameters = match params::decode(&event.parameters) {
        Ok(parameters) => parameters,
        Err(e) => {
            warn!(request_id = %request.id, "paramètres malformés: {e}");
            request.set_errored(e.to_string());
            return request;
        }
    };

    if from_template {
        match config.template(&event.target_id) {
            Some(template) => {
                request.kind.endpoint_id = template.endpoint_id;
                let template_bytes = match hex::decode(&template.parameters_hex) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        request.set_errored(format!(
                            "paramètres de gabarit illisibles: {e}"
                        ));
                        return request;
                    }
                };
                match params::decode(&template_bytes) {
                    Ok(template_parameters) => {
                        request.kind.parameters =
                            merge_template_parameters(template_parameters, request_parameters);
                    }
                    Err(e) => {
                        request.set_errored(format!("paramètres de gabarit malformés: {e}"));
                    }
                }
            }
            None => {
                warn!(request_id = %request.id, template_id = %event.target_id, "gabarit inconnu");
                request.set_errored(format!("gabarit inconnu: {:#x}", event.target_id));
            }
        }
    } else {
        request.kind.parameters = request_parameters;
    }

    request
}

fn build_withdrawal(
    chain: &ChainConfig,
    current_block: u64,
    event: WithdrawalRequestEvent,
) -> Withdrawal {
    Request {
        id: event.withdrawal_request_id,
        status: RequestStatus::Pending,
        error_message: None,
        metadata: metadata(chain, current_block, event.block_number, event.transaction_hash),
        kind: WithdrawalPayload {
            sponsor: event.sponsor,
            sponsor_wallet: event.sponsor_wallet,
            destination: event.destination,
        },
    }
}

/// Marque Blocked les requêtes dont l'âge dépasse l'horizon
///
/// Purement lié à l'âge, sans aucune tentative de dispatch: les échecs
/// d'exécution passent par la cascade, jamais par ici.
fn apply_age_policy<K>(requests: &mut [Request<K>]) {
    for request in requests.iter_mut() {
        if request.is_pending() && request.metadata.exceeds_horizon() {
            info!(
                request_id = %request.id,
                age = request.metadata.age(),
                horizon = request.metadata.ignore_blocked_after,
                "requête bloquée par l'horizon de politique"
            );
            request.transition_to(RequestStatus::Blocked);
        }
    }
}

/// Construit l'état d'une connexion depuis les logs d'une fenêtre
///
/// Un topic inconnu est une erreur de programmation fatale pour le cycle:
/// les logs proviennent d'une requête filtrée sur nos propres topics.
pub fn build_connection_state(
    config: &NodeConfig,
    chain: &ChainConfig,
    current_block: u64,
    logs: &[Log],
) -> Result<ProviderConnectionState, EventsError> {
    let mut state = ProviderConnectionState::new(chain, current_block);

    for log in logs {
        match decode_log(log)? {
            ChainEvent::ApiRequest(event) => {
                state
                    .api_calls
                    .push(build_api_call(config, chain, current_block, event, false));
            }
            ChainEvent::TemplateRequest(event) => {
                state
                    .api_calls
                    .push(build_api_call(config, chain, current_block, event, true));
            }
            ChainEvent::ApiFulfilled { request_id } | ChainEvent::ApiFailed { request_id } => {
                state.fulfilled_api_calls.insert(request_id);
            }
            ChainEvent::WithdrawalRequested(event) => {
                state
                    .withdrawals
                    .push(build_withdrawal(chain, current_block, event));
            }
            ChainEvent::WithdrawalFulfilled {
                withdrawal_request_id,
            } => {
                state.fulfilled_withdrawals.insert(withdrawal_request_id);
            }
        }
    }

    // Les requêtes déjà résolues on-chain sont terminales dès maintenant
    for call in state.api_calls.iter_mut() {
        if state.fulfilled_api_calls.contains(&call.id) {
            call.transition_to(RequestStatus::Fulfilled);
        }
    }
    for withdrawal in state.withdrawals.iter_mut() {
        if state.fulfilled_withdrawals.contains(&withdrawal.id) {
            withdrawal.transition_to(RequestStatus::Fulfilled);
        }
    }

    apply_age_policy(&mut state.api_calls);
    apply_age_policy(&mut state.withdrawals);

    debug!(
        chain_id = chain.chain_id,
        provider = %chain.provider_name,
        api_calls = state.api_calls.len(),
        withdrawals = state.withdrawals.len(),
        "état de connexion construit"
    );

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DispatchConfig, GatewayConfig, TemplateConfig};
    use crate::evm::contracts;
    use ethers::abi::{self, Token};
    use ethers::types::{Address, Bytes, H256, U64};

    fn chain() -> ChainConfig {
        ChainConfig {
            chain_id: 31337,
            provider_name: "local".to_string(),
            rpc_url: "http://127.0.0.1:8545".to_string(),
            contract_address: Address::repeat_byte(9),
            poll_window: 300,
            ignore_blocked_after: 20,
            rpc_timeout_ms: 10_000,
        }
    }

    fn node_config() -> NodeConfig {
        NodeConfig {
            master_seed_hex: "07".repeat(32),
            chains: vec![chain()],
            endpoints: vec![],
            templates: vec![TemplateConfig {
                template_id: H256::repeat_byte(0xab),
                endpoint_id: H256::repeat_byte(0xee),
                parameters_hex: hex::encode(
                    params::encode(&[Parameter::string("from", "ETH")]).unwrap(),
                ),
            }],
            dispatch: DispatchConfig::Local,
            gateway: GatewayConfig::default(),
        }
    }

    fn request_log(topic_sig: &str, request_id: H256, parameters: &[u8], block: u64) -> Log {
        let data = abi::encode(&[
            Token::FixedBytes(H256::repeat_byte(0xab).as_bytes().to_vec()),
            Token::Address(Address::repeat_byte(1)),
            Token::Address(Address::repeat_byte(2)),
            Token::Address(Address::repeat_byte(3)),
            Token::FixedBytes(vec![0xde, 0xad, 0xbe, 0xef]),
            Token::Bytes(parameters.to_vec()),
        ]);
        Log {
            address: Address::repeat_byte(9),
            topics: vec![
                contracts::event_topic(topic_sig),
                H256::from(Address::repeat_byte(7)),
                request_id,
            ],
            data: data.into(),
            block_number: Some(U64::from(block)),
            transaction_hash: Some(H256::repeat_byte(0xaa)),
            ..Default::default()
        }
    }

    fn fulfilled_log(request_id: H256) -> Log {
        Log {
            topics: vec![
                contracts::event_topic(contracts::FULFILLED_API_REQUEST_SIG),
                H256::from(Address::repeat_byte(7)),
                request_id,
            ],
            data: abi::encode(&[Token::Uint(0u8.into()), Token::Bytes(vec![])]).into(),
            block_number: Some(U64::from(1u64)),
            transaction_hash: Some(H256::zero()),
            ..Default::default()
        }
    }

    fn valid_parameters() -> Bytes {
        params::encode(&[
            Parameter::string("_type", "uint256"),
            Parameter::string("_path", "price"),
        ])
        .unwrap()
    }

    #[test]
    fn test_pending_request_decoded() {
        let id = H256::repeat_byte(5);
        let logs = vec![request_log(
            contracts::MADE_API_REQUEST_SIG,
            id,
            &valid_parameters(),
            100,
        )];
        let state = build_connection_state(&node_config(), &chain(), 110, &logs).unwrap();
        assert_eq!(state.api_calls.len(), 1);
        let call = &state.api_calls[0];
        assert_eq!(call.id, id);
        assert!(call.is_pending());
        assert_eq!(call.kind.parameters.len(), 2);
    }

    #[test]
    fn test_malformed_parameters_are_terminal() {
        let logs = vec![request_log(
            contracts::MADE_API_REQUEST_SIG,
            H256::repeat_byte(5),
            &[0xff; 40],
            100,
        )];
        let state = build_connection_state(&node_config(), &chain(), 110, &logs).unwrap();
        let call = &state.api_calls[0];
        assert_eq!(call.status, RequestStatus::Errored);
        // Le message embarque les bytes d'origine
        assert!(call
            .error_message
            .as_ref()
            .unwrap()
            .contains(&hex::encode([0xffu8; 40])));
    }

    #[test]
    fn test_aged_request_blocked_without_dispatch() {
        // horizon = 20 blocs, âge = 21: Blocked sans aucune tentative
        let logs = vec![request_log(
            contracts::MADE_API_REQUEST_SIG,
            H256::repeat_byte(5),
            &valid_parameters(),
            100,
        )];
        let state = build_connection_state(&node_config(), &chain(), 121, &logs).unwrap();
        assert_eq!(state.api_calls[0].status, RequestStatus::Blocked);
    }

    #[test]
    fn test_fulfilled_event_marks_request() {
        let id = H256::repeat_byte(5);
        let logs = vec![
            request_log(contracts::MADE_API_REQUEST_SIG, id, &valid_parameters(), 100),
            fulfilled_log(id),
        ];
        let state = build_connection_state(&node_config(), &chain(), 110, &logs).unwrap();
        assert_eq!(state.api_calls[0].status, RequestStatus::Fulfilled);
        assert!(state.fulfilled_api_calls.contains(&id));
    }

    #[test]
    fn test_template_request_resolved_and_merged() {
        let request_params = params::encode(&[Parameter::string("to", "USD")]).unwrap();
        let logs = vec![request_log(
            contracts::MADE_TEMPLATE_REQUEST_SIG,
            H256::repeat_byte(5),
            &request_params,
            100,
        )];
        let state = build_connection_state(&node_config(), &chain(), 110, &logs).unwrap();
        let call = &state.api_calls[0];
        assert!(call.is_pending());
        assert_eq!(call.kind.endpoint_id, H256::repeat_byte(0xee));
        let names: Vec<&str> = call.kind.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["from", "to"]);
    }

    #[test]
    fn test_unknown_template_is_terminal() {
        let mut config = node_config();
        config.templates.clear();
        let logs = vec![request_log(
            contracts::MADE_TEMPLATE_REQUEST_SIG,
            H256::repeat_byte(5),
            &valid_parameters(),
            100,
        )];
        let state = build_connection_state(&config, &chain(), 110, &logs).unwrap();
        assert_eq!(state.api_calls[0].status, RequestStatus::Errored);
    }

    #[test]
    fn test_unknown_topic_is_fatal_for_the_cycle() {
        let mut log = request_log(
            contracts::MADE_API_REQUEST_SIG,
            H256::repeat_byte(5),
            &valid_parameters(),
            100,
        );
        log.topics[0] = H256::repeat_byte(0x42);
        assert!(build_connection_state(&node_config(), &chain(), 110, &[log]).is_err());
    }
}
