//! Enveloppes d'invocation de l'abstraction de dispatch
//!
//! Requête `{functionName, payload, logOptions}` et réponse
//! `{ok, data|errorLog}`, sérialisées en JSON. Les backends distants
//! enveloppent la réponse une fois de plus dans le transport générique
//! `{statusCode, body}`; le corps doit alors être désenveloppé deux fois.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ChainConfig;
use crate::error::DispatchError;
use crate::pipeline::{AggregatedApiCall, ProviderConnectionState};

/// Unités de travail invocables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FunctionName {
    InitializeProviderConnection,
    CallApi,
    ProcessPendingTransactions,
}

impl FunctionName {
    /// Nom côté transport, aussi utilisé comme segment d'URL
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InitializeProviderConnection => "initialize-provider-connection",
            Self::CallApi => "call-api",
            Self::ProcessPendingTransactions => "process-pending-transactions",
        }
    }
}

impl std::fmt::Display for FunctionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contexte de log propagé avec chaque invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogOptions {
    pub coordinator_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_name: Option<String>,
}

/// Enveloppe de requête vers une fonction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    pub function_name: FunctionName,
    pub payload: Value,
    pub log_options: LogOptions,
}

/// Enveloppe de réponse d'une fonction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_log: Option<String>,
}

/// Résultat discriminé d'une invocation
///
/// Un échec applicatif n'est pas une exception: l'appelant doit brancher
/// dessus. Les fautes de transport passent par `DispatchError`.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchResponse {
    Ok(Value),
    Failed { error_log: String },
}

impl DispatchResponse {
    pub fn into_envelope(self) -> ResponseEnvelope {
        match self {
            Self::Ok(data) => ResponseEnvelope {
                ok: true,
                data: Some(data),
                error_log: None,
            },
            Self::Failed { error_log } => ResponseEnvelope {
                ok: false,
                data: None,
                error_log: Some(error_log),
            },
        }
    }

    pub fn from_envelope(envelope: ResponseEnvelope) -> Result<Self, DispatchError> {
        if envelope.ok {
            Ok(Self::Ok(envelope.data.unwrap_or(Value::Null)))
        } else {
            match envelope.error_log {
                Some(error_log) => Ok(Self::Failed { error_log }),
                None => Err(DispatchError::MalformedEnvelope {
                    reason: "ok=false sans errorLog".to_string(),
                }),
            }
        }
    }
}

/// Enveloppe externe ajoutée par le transport d'invocation distant
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrappedTransportResponse {
    pub status_code: u16,
    /// Corps stringifié: une `ResponseEnvelope` en JSON
    pub body: String,
}

/// Désenveloppe une réponse simple (un seul niveau)
pub fn decode_plain(text: &str) -> Result<DispatchResponse, DispatchError> {
    let envelope: ResponseEnvelope =
        serde_json::from_str(text).map_err(|e| DispatchError::MalformedEnvelope {
            reason: e.to_string(),
        })?;
    DispatchResponse::from_envelope(envelope)
}

/// Désenveloppe une réponse du transport enveloppant (deux niveaux)
pub fn decode_wrapped(text: &str) -> Result<DispatchResponse, DispatchError> {
    let outer: WrappedTransportResponse =
        serde_json::from_str(text).map_err(|e| DispatchError::MalformedEnvelope {
            reason: format!("enveloppe externe: {e}"),
        })?;
    if outer.status_code != 200 {
        return Err(DispatchError::RemoteUnavailable {
            status: outer.status_code,
        });
    }
    let envelope: ResponseEnvelope =
        serde_json::from_str(&outer.body).map_err(|e| DispatchError::MalformedEnvelope {
            reason: format!("corps interne: {e}"),
        })?;
    DispatchResponse::from_envelope(envelope)
}

/// Charge utile d'initialize-provider-connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeProviderPayload {
    pub chain: ChainConfig,
}

/// Charge utile de call-api
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallApiPayload {
    pub aggregated_api_call: AggregatedApiCall,
    pub chain_id: u64,
}

/// Charge utile de process-pending-transactions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessTransactionsPayload {
    pub chain: ChainConfig,
    pub state: ProviderConnectionState,
}
