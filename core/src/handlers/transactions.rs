//! Handler process-pending-transactions: cascade de soumission d'une
//! connexion

use tracing::info;

use crate::dispatch::envelope::ProcessTransactionsPayload;
use crate::error::CoreError;
use crate::handlers::NodeContext;
use crate::pipeline::ProviderConnectionState;
use crate::submission::process_connection;

/// Balaye les requêtes Pending de la connexion et soumet les cascades
pub async fn process_pending_transactions(
    ctx: &NodeContext,
    payload: ProcessTransactionsPayload,
) -> Result<ProviderConnectionState, CoreError> {
    let chain = payload.chain;
    let client = ctx.chain_client(&chain)?;

    let state = process_connection(&ctx.master_key, client, &chain, payload.state).await;
    info!(
        chain_id = chain.chain_id,
        provider = %chain.provider_name,
        "balayage des transactions terminé"
    );
    Ok(state)
}
