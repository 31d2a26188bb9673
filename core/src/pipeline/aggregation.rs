//! Agrégation des appels API à travers les connexions
//!
//! Une instance d'`AggregatedApiCall` par couple unique (endpoint, hachage
//! de paramètres) sur l'ensemble des connexions d'un cycle: le même appel
//! logique soumis de façon redondante ne part qu'une fois vers l'API.

use ethers::types::{Bytes, H256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::codec::ReservedParameters;
use crate::params::{split_reserved, Parameter, ParameterHash};
use crate::pipeline::state::ProviderConnectionState;

/// Résultat d'un appel agrégé
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregatedResult {
    /// Réponse encodée et signée par l'attesteur
    Success {
        encoded_data: Bytes,
        signature: Bytes,
    },
    /// Échec applicatif, déjà loggué par l'exécutant
    Failure { error_log: String },
}

/// Unité de travail exécutée par l'abstraction de dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedApiCall {
    pub endpoint_id: H256,
    /// Paramètres ordinaires, hors paramètres réservés
    pub parameters: Vec<Parameter>,
    /// Paramètres réservés; `None` si `_type` est absent
    pub reserved: Option<ReservedParameters>,
    pub parameter_hash: ParameterHash,
    /// Identifiants de toutes les requêtes couvertes par cet appel
    pub request_ids: Vec<H256>,
    /// Posé après exécution
    pub result: Option<AggregatedResult>,
}

/// Agrège les appels en attente de toutes les connexions
///
/// Les requêtes non-Pending ne sont jamais agrégées. Si deux copies
/// partagent le hachage de paramètres, les paramètres réservés de la
/// première copie rencontrée font foi.
pub fn aggregate(connections: &[ProviderConnectionState]) -> Vec<AggregatedApiCall> {
    let mut by_key: HashMap<(H256, ParameterHash), AggregatedApiCall> = HashMap::new();
    let mut order: Vec<(H256, ParameterHash)> = Vec::new();

    for connection in connections {
        for call in connection.pending_api_calls() {
            let hash = call.parameter_hash();
            let key = (call.kind.endpoint_id, hash);
            match by_key.get_mut(&key) {
                Some(existing) => {
                    if !existing.request_ids.contains(&call.id) {
                        existing.request_ids.push(call.id);
                    }
                }
                None => {
                    let (ordinary, reserved) = split_reserved(&call.kind.parameters);
                    by_key.insert(
                        key,
                        AggregatedApiCall {
                            endpoint_id: call.kind.endpoint_id,
                            parameters: ordinary,
                            reserved,
                            parameter_hash: hash,
                            request_ids: vec![call.id],
                            result: None,
                        },
                    );
                    order.push(key);
                }
            }
        }
    }

    let aggregated: Vec<AggregatedApiCall> = order
        .into_iter()
        .filter_map(|key| by_key.remove(&key))
        .collect();

    debug!(unique_calls = aggregated.len(), "appels agrégés");
    aggregated
}

/// Indexe les appels agrégés exécutés par identifiant de requête
pub fn index_by_request_id(
    aggregated: Vec<AggregatedApiCall>,
) -> HashMap<H256, AggregatedApiCall> {
    let mut by_id = HashMap::new();
    for call in aggregated {
        for id in &call.request_ids {
            by_id.insert(*id, call.clone());
        }
    }
    by_id
}
