//! Idempotence de la cascade entre deux cycles de scrutation

use ethers::types::H256;
use std::sync::Arc;

use oraclechain_core::coordinator::Coordinator;
use oraclechain_core::dispatch::build_dispatcher;
use oraclechain_core::evm::{ChainClient, RequestStatus};
use oraclechain_core::handlers::NodeContext;

use crate::helpers::{
    api_request_log, fulfilled_log, init_tracing, node_config, spawn_stub_api,
    standard_parameters, MockChain,
};

#[tokio::test]
async fn test_second_cycle_is_idempotent_after_onchain_fulfillment() -> anyhow::Result<()> {
    init_tracing();
    let (api_addr, _) = spawn_stub_api(r#"{"price": 1000}"#).await;
    let config = node_config(api_addr);

    let chain = Arc::new(MockChain::default());
    let request_id = H256::repeat_byte(5);
    chain
        .logs
        .lock()
        .unwrap()
        .push(api_request_log(request_id, &standard_parameters(), 100));
    chain.accept_simulations(1);

    let factory_chain = Arc::clone(&chain);
    let ctx = Arc::new(NodeContext::new(config.clone())?.with_chain_client_factory(
        Arc::new(move |_: &oraclechain_core::config::ChainConfig| {
            Ok(Arc::clone(&factory_chain) as Arc<dyn ChainClient>)
        }),
    ));
    let dispatcher = build_dispatcher(&config.dispatch, ctx);
    let coordinator = Coordinator::new(config, dispatcher);

    // Premier cycle: la requête part on-chain
    let state = coordinator.run_cycle().await?;
    assert_eq!(chain.submissions().len(), 1);
    assert_eq!(
        state.connections[0].api_calls[0].status,
        RequestStatus::Pending
    );

    // La chaîne a résolu la requête entre les deux cycles
    chain.logs.lock().unwrap().push(fulfilled_log(request_id));
    *chain.current_block.lock().unwrap() = 112;

    // Second cycle: Fulfilled, zéro transaction supplémentaire
    let state = coordinator.run_cycle().await?;
    assert_eq!(
        state.connections[0].api_calls[0].status,
        RequestStatus::Fulfilled
    );
    assert_eq!(chain.submissions().len(), 1);
    Ok(())
}
