//! Surface de la passerelle HTTP (interface uniquement)
//!
//! Types de requête/réponse, contrôle d'allowlist d'origine et traitement
//! d'un appel direct. Le serveur HTTP lui-même est un collaborateur
//! externe: rien ici n'écoute sur le réseau. Aucune trace de pile interne
//! ne sort jamais d'une réponse: uniquement un corps `{message}` structuré.

use ethers::types::H256;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::warn;

use crate::config::GatewayConfig;
use crate::dispatch::CallApiPayload;
use crate::error::{CoreError, GatewayError};
use crate::handlers::{call_api, NodeContext};
use crate::params::{self, parameter_hash, ParamValue, Parameter};
use crate::pipeline::AggregatedApiCall;

/// Requête entrante de la passerelle
///
/// Soit un couple (endpoint, paramètres en clair), soit des paramètres
/// déjà encodés au format on-chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRequest {
    pub endpoint_id: H256,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoded_parameters: Option<String>,
}

/// Réponse de la passerelle: la sortie brute du codec
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayResponse {
    /// Bytes encodés, préfixés 0x
    pub encoded_value: String,
    /// Signature d'attestation, préfixée 0x
    pub signature: String,
}

/// Corps d'erreur structuré renvoyé à l'appelant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayErrorBody {
    pub message: String,
}

/// Code de statut HTTP d'une erreur de passerelle
pub fn status_code(error: &GatewayError) -> u16 {
    match error {
        GatewayError::OriginNotAllowed { .. } => 403,
        GatewayError::InvalidRequest { .. } => 400,
        GatewayError::UnknownEndpoint { .. } => 404,
        GatewayError::Processing { .. } => 500,
    }
}

impl From<&GatewayError> for GatewayErrorBody {
    fn from(error: &GatewayError) -> Self {
        Self {
            message: error.to_string(),
        }
    }
}

/// Contrôle d'allowlist d'origine
///
/// Les motifs de configuration utilisent `*` comme joker; `*` seul
/// autorise toutes les origines.
pub fn origin_allowed(config: &GatewayConfig, origin: &str) -> bool {
    for pattern in &config.allowed_origins {
        if pattern == "*" {
            return true;
        }
        let translated = format!("^{}$", regex::escape(pattern).replace("\\*", ".*"));
        match Regex::new(&translated) {
            Ok(regex) => {
                if regex.is_match(origin) {
                    return true;
                }
            }
            Err(e) => {
                warn!("Erreur compilation regex '{}': {}", pattern, e);
            }
        }
    }
    false
}

fn parameters_from_json(map: &Map<String, Value>) -> Result<Vec<Parameter>, GatewayError> {
    let mut parameters = Vec::with_capacity(map.len());
    for (name, value) in map {
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            other => {
                return Err(GatewayError::InvalidRequest {
                    reason: format!("paramètre '{name}' non scalaire: {other}"),
                })
            }
        };
        parameters.push(Parameter::new(name, ParamValue::String(text)));
    }
    Ok(parameters)
}

fn decode_encoded_parameters(text: &str) -> Result<Vec<Parameter>, GatewayError> {
    let stripped = text.strip_prefix("0x").unwrap_or(text);
    let bytes = hex::decode(stripped).map_err(|e| GatewayError::InvalidRequest {
        reason: format!("encodedParameters non hexadécimaux: {e}"),
    })?;
    params::decode(&bytes).map_err(|e| GatewayError::InvalidRequest {
        reason: e.to_string(),
    })
}

/// Traite une requête de passerelle par le chemin local
///
/// Les paramètres réservés fournis par l'appelant sont mis en quarantaine
/// autour du pré-processing (voir le module processing), jamais transmis
/// au code utilisateur ni à l'API cible.
pub async fn handle_request(
    ctx: &Arc<NodeContext>,
    request: GatewayRequest,
) -> Result<GatewayResponse, GatewayError> {
    if ctx.config.endpoint(&request.endpoint_id).is_none() {
        return Err(GatewayError::UnknownEndpoint {
            endpoint_id: format!("{:#x}", request.endpoint_id),
        });
    }

    let parameters = match &request.encoded_parameters {
        Some(encoded) => decode_encoded_parameters(encoded)?,
        None => parameters_from_json(&request.parameters)?,
    };

    let (ordinary, reserved) = params::split_reserved(&parameters);
    let aggregated = AggregatedApiCall {
        endpoint_id: request.endpoint_id,
        parameter_hash: parameter_hash(&request.endpoint_id, &ordinary),
        parameters: ordinary,
        reserved,
        request_ids: Vec::new(),
        result: None,
    };

    let chain_id = ctx.config.chains.first().map(|c| c.chain_id).unwrap_or(1);
    let payload = CallApiPayload {
        aggregated_api_call: aggregated,
        chain_id,
    };

    match call_api::call_api(ctx, payload).await {
        Ok(response) => Ok(GatewayResponse {
            encoded_value: format!("0x{}", hex::encode(&response.encoded_data)),
            signature: format!("0x{}", hex::encode(&response.signature)),
        }),
        Err(CoreError::Codec(e)) => Err(GatewayError::InvalidRequest {
            reason: e.to_string(),
        }),
        Err(e) => Err(GatewayError::Processing {
            message: e.to_string(),
        }),
    }
}
