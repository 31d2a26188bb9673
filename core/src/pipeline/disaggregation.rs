//! Désagrégation: retour d'un résultat partagé vers chaque connexion
//!
//! Une réponse n'est appliquée à la copie d'une requête que si les
//! paramètres de cette copie sont identiques, byte pour byte, à ceux qui
//! ont réellement été agrégés et dispatchés. Toute divergence (course
//! entre deux connexions, lecture périmée, altération) écarte la copie
//! plutôt que de lui transmettre une réponse non vérifiée.

use ethers::types::H256;
use std::collections::HashMap;
use tracing::{error, warn};

use crate::evm::{ApiCallResponse, RequestStatus};
use crate::pipeline::aggregation::{AggregatedApiCall, AggregatedResult};
use crate::pipeline::state::ProviderConnectionState;

/// Fusionne les résultats agrégés sur chaque copie par connexion
///
/// Barrière de jointure pure: aucune entrée/sortie, uniquement la
/// réconciliation des états.
pub fn disaggregate(
    connections: Vec<ProviderConnectionState>,
    aggregated_by_id: &HashMap<H256, AggregatedApiCall>,
) -> Vec<ProviderConnectionState> {
    connections
        .into_iter()
        .map(|connection| disaggregate_connection(connection, aggregated_by_id))
        .collect()
}

fn disaggregate_connection(
    mut connection: ProviderConnectionState,
    aggregated_by_id: &HashMap<H256, AggregatedApiCall>,
) -> ProviderConnectionState {
    let provider = connection.provider_name.clone();
    let mut kept = Vec::with_capacity(connection.api_calls.len());

    for mut call in connection.api_calls {
        if !call.is_pending() {
            kept.push(call);
            continue;
        }

        let aggregated = match aggregated_by_id.get(&call.id) {
            Some(aggregated) => aggregated,
            None => {
                // Incohérence interne: jamais transmettre une réponse non
                // vérifiée, la copie est écartée de la sortie
                error!(
                    request_id = %call.id,
                    provider = %provider,
                    "aucun résultat agrégé pour cette requête"
                );
                continue;
            }
        };

        if call.parameter_hash() != aggregated.parameter_hash {
            warn!(
                request_id = %call.id,
                provider = %provider,
                "paramètres divergents entre la copie et l'appel agrégé, copie écartée"
            );
            continue;
        }

        match &aggregated.result {
            Some(AggregatedResult::Success {
                encoded_data,
                signature,
            }) => {
                call.kind.response = Some(ApiCallResponse {
                    encoded_data: encoded_data.clone(),
                    signature: signature.clone(),
                });
            }
            Some(AggregatedResult::Failure { error_log }) => {
                call.set_errored(error_log.clone());
            }
            None => {
                error!(
                    request_id = %call.id,
                    provider = %provider,
                    "appel agrégé sans résultat"
                );
                continue;
            }
        }
        kept.push(call);
    }

    connection.api_calls = kept;
    connection
}
