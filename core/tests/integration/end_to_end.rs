//! Cycle complet: logs bruts → appel API → encodage → soumission

use ethers::types::{H256, U256};
use std::sync::Arc;

use oraclechain_core::coordinator::Coordinator;
use oraclechain_core::dispatch::build_dispatcher;
use oraclechain_core::evm::{ChainClient, RequestStatus};
use oraclechain_core::handlers::NodeContext;

use crate::helpers::{
    api_request_log, init_tracing, node_config, spawn_stub_api, standard_parameters, MockChain,
};

fn context_with_chain(
    config: oraclechain_core::config::NodeConfig,
    chain: Arc<MockChain>,
) -> Arc<NodeContext> {
    let ctx = NodeContext::new(config).unwrap();
    let factory_chain = Arc::clone(&chain);
    Arc::new(ctx.with_chain_client_factory(Arc::new(
        move |_: &oraclechain_core::config::ChainConfig| {
            Ok(Arc::clone(&factory_chain) as Arc<dyn ChainClient>)
        },
    )))
}

#[tokio::test]
async fn test_full_cycle_fulfills_request() {
    init_tracing();
    let (api_addr, api_hits) = spawn_stub_api(r#"{"price": 1000}"#).await;
    let config = node_config(api_addr);

    let chain = Arc::new(MockChain::default());
    let request_id = H256::repeat_byte(5);
    chain
        .logs
        .lock()
        .unwrap()
        .push(api_request_log(request_id, &standard_parameters(), 100));
    chain.accept_simulations(1);

    let ctx = context_with_chain(config.clone(), Arc::clone(&chain));
    let dispatcher = build_dispatcher(&config.dispatch, ctx);
    let coordinator = Coordinator::new(config, dispatcher);

    let state = coordinator.run_cycle().await.unwrap();

    // L'appel unique a été exécuté et encodé: 1000 × 1000000
    assert_eq!(state.aggregated.len(), 1);
    assert_eq!(api_hits.load(std::sync::atomic::Ordering::SeqCst), 1);

    let connection = &state.connections[0];
    let call = &connection.api_calls[0];
    let response = call.kind.response.as_ref().expect("réponse désagrégée");
    assert_eq!(
        U256::from_big_endian(&response.encoded_data),
        U256::from(1_000_000_000u64)
    );
    assert!(!response.signature.is_empty());

    // Une transaction fulfill soumise; la chaîne reste la source de
    // vérité du statut: toujours Pending
    assert_eq!(chain.submissions().len(), 1);
    assert_eq!(call.status, RequestStatus::Pending);
}

#[tokio::test]
async fn test_aged_request_blocked_without_any_dispatch() {
    init_tracing();
    let (api_addr, api_hits) = spawn_stub_api(r#"{"price": 1000}"#).await;
    let config = node_config(api_addr);

    let chain = Arc::new(MockChain::default());
    // horizon = 20 blocs, bloc de requête 100, bloc courant 121: âge 21
    *chain.current_block.lock().unwrap() = 121;
    chain
        .logs
        .lock()
        .unwrap()
        .push(api_request_log(H256::repeat_byte(5), &standard_parameters(), 100));

    let ctx = context_with_chain(config.clone(), Arc::clone(&chain));
    let dispatcher = build_dispatcher(&config.dispatch, ctx);
    let coordinator = Coordinator::new(config, dispatcher);

    let state = coordinator.run_cycle().await.unwrap();

    assert_eq!(
        state.connections[0].api_calls[0].status,
        RequestStatus::Blocked
    );
    // Zéro tentative de dispatch: ni appel API, ni transaction
    assert!(state.aggregated.is_empty());
    assert_eq!(api_hits.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert!(chain.submissions().is_empty());
}

#[tokio::test]
async fn test_malformed_parameters_errored_without_api_call() {
    init_tracing();
    let (api_addr, api_hits) = spawn_stub_api(r#"{"price": 1000}"#).await;
    let config = node_config(api_addr);

    let chain = Arc::new(MockChain::default());
    chain.logs.lock().unwrap().push(api_request_log(
        H256::repeat_byte(5),
        &ethers::types::Bytes::from(vec![0xffu8; 40]),
        100,
    ));

    let ctx = context_with_chain(config.clone(), Arc::clone(&chain));
    let dispatcher = build_dispatcher(&config.dispatch, ctx);
    let coordinator = Coordinator::new(config, dispatcher);

    let state = coordinator.run_cycle().await.unwrap();

    // Terminale dès le décodage: ni appel API, ni agrégation, ni
    // transaction, et jamais de nouvelle tentative
    let call = &state.connections[0].api_calls[0];
    assert_eq!(call.status, RequestStatus::Errored);
    assert!(call.error_message.is_some());
    assert!(state.aggregated.is_empty());
    assert_eq!(api_hits.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert!(chain.submissions().is_empty());
}
