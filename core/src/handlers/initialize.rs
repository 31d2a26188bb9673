//! Handler initialize-provider-connection: de la chaîne à l'état typé

use tracing::info;

use crate::dispatch::envelope::InitializeProviderPayload;
use crate::error::CoreError;
use crate::evm::LogWindow;
use crate::handlers::NodeContext;
use crate::pipeline::{build_connection_state, ProviderConnectionState};

/// Construit l'état d'une connexion: bloc courant, fenêtre de logs,
/// décodage, politique d'âge
pub async fn initialize_provider_connection(
    ctx: &NodeContext,
    payload: InitializeProviderPayload,
) -> Result<ProviderConnectionState, CoreError> {
    let chain = payload.chain;
    let client = ctx.chain_client(&chain)?;

    let current_block = client.block_number().await?;
    let window = LogWindow {
        address: chain.contract_address,
        from_block: current_block.saturating_sub(chain.poll_window),
        to_block: current_block,
    };
    let logs = client.fetch_logs(&window).await?;

    let state = build_connection_state(&ctx.config, &chain, current_block, &logs)?;
    info!(
        chain_id = chain.chain_id,
        provider = %chain.provider_name,
        current_block,
        api_calls = state.api_calls.len(),
        withdrawals = state.withdrawals.len(),
        "connexion initialisée"
    );
    Ok(state)
}
