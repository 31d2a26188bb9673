//! Handler call-api: de l'appel agrégé à la réponse encodée et attestée

use tracing::{debug, info};

use crate::codec::{encode_response, is_reserved_name};
use crate::dispatch::envelope::CallApiPayload;
use crate::error::{ApiCallError, ChainError, CodecError, CoreError};
use crate::evm::ApiCallResponse;
use crate::handlers::api::perform_api_call;
use crate::handlers::NodeContext;
use crate::processing::{parameters_to_json, post_process_response, pre_process_parameters};
use ethers::signers::Signer;
use ethers::utils::keccak256;

/// Exécute un appel agrégé: pré-processing, appel HTTP, post-processing,
/// encodage, attestation
pub async fn call_api(
    ctx: &NodeContext,
    payload: CallApiPayload,
) -> Result<ApiCallResponse, CoreError> {
    let aggregated = payload.aggregated_api_call;

    let reserved = aggregated
        .reserved
        .clone()
        .ok_or_else(|| CodecError::InvalidType {
            token: "(_type manquant)".to_string(),
        })?;

    let endpoint = ctx
        .config
        .endpoint(&aggregated.endpoint_id)
        .ok_or_else(|| ApiCallError::UnknownEndpoint {
            endpoint_id: format!("{:#x}", aggregated.endpoint_id),
        })?;

    // Pré-processing avec quarantaine des paramètres réservés
    let parameters = parameters_to_json(&aggregated.parameters);
    let processed =
        pre_process_parameters(&ctx.sandbox, &endpoint.pre_processing, parameters).await?;

    // Les clés réservées ne partent jamais vers l'API cible
    let api_parameters = processed
        .into_iter()
        .filter(|(name, _)| !is_reserved_name(name))
        .collect();

    debug!(
        endpoint_id = %aggregated.endpoint_id,
        parameter_hash = %aggregated.parameter_hash,
        "appel API sortant"
    );
    let response = perform_api_call(&ctx.http, endpoint, &api_parameters).await?;

    let post_processed =
        post_process_response(&ctx.sandbox, &endpoint.post_processing, response).await?;

    let encoded_data = encode_response(&post_processed, &reserved)?;

    // Attestation: signature du couple (identité de l'appel, données)
    let signer = ctx.master_key.attestor_signer(payload.chain_id)?;
    let mut message = Vec::with_capacity(64 + encoded_data.len());
    message.extend_from_slice(aggregated.endpoint_id.as_bytes());
    message.extend_from_slice(aggregated.parameter_hash.as_bytes());
    message.extend_from_slice(&encoded_data);
    let digest = keccak256(&message);
    let signature = signer
        .sign_message(digest)
        .await
        .map_err(|e| ChainError::Signing(e.to_string()))?;

    info!(
        endpoint_id = %aggregated.endpoint_id,
        requests = aggregated.request_ids.len(),
        bytes = encoded_data.len(),
        "appel API résolu"
    );

    Ok(ApiCallResponse {
        encoded_data: encoded_data.into(),
        signature: signature.to_vec().into(),
    })
}
