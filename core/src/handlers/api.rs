//! Appel HTTP sortant vers l'API cible
//!
//! Aucune hypothèse au-delà de "JSON valide": la forme de la réponse est
//! entièrement l'affaire du codec et du post-processing.

use reqwest::Client;
use serde_json::{Map, Value};
use std::time::Duration;
use url::Url;

use crate::config::{EndpointConfig, HttpMethod};
use crate::error::ApiCallError;

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Exécute l'appel vers l'endpoint avec les paramètres donnés
///
/// GET transmet les paramètres en query string, POST en corps JSON. Le
/// délai de l'endpoint borne l'attente; le dépasser abandonne l'attente
/// sans rétracter l'appel lui-même.
pub async fn perform_api_call(
    http: &Client,
    endpoint: &EndpointConfig,
    parameters: &Map<String, Value>,
) -> Result<Value, ApiCallError> {
    let url = Url::parse(&endpoint.url).map_err(|e| ApiCallError::InvalidUrl(e.to_string()))?;
    let timeout = Duration::from_millis(endpoint.timeout_ms);

    let request = match endpoint.method {
        HttpMethod::Get => {
            let pairs: Vec<(String, String)> = parameters
                .iter()
                .map(|(name, value)| (name.clone(), query_value(value)))
                .collect();
            http.get(url).query(&pairs)
        }
        HttpMethod::Post => http.post(url).json(&Value::Object(parameters.clone())),
    };

    let response = request.timeout(timeout).send().await.map_err(|e| {
        if e.is_timeout() {
            ApiCallError::Timeout {
                timeout_ms: endpoint.timeout_ms,
            }
        } else {
            ApiCallError::Http(e.to_string())
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(ApiCallError::Http(format!("statut HTTP {status}")));
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| ApiCallError::InvalidJson(e.to_string()))
}
