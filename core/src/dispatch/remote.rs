//! Backends de dispatch distants
//!
//! Deux styles d'invocation serverless, normalisés au même contrat:
//! - `HttpFunctionDispatcher`: la fonction répond directement avec
//!   l'enveloppe de réponse (un seul désenveloppement);
//! - `WrappedFunctionDispatcher`: le transport enveloppe la réponse une
//!   fois de plus en `{statusCode, body}` et le corps stringifié doit être
//!   désenveloppé deux fois.
//!
//! Une faute réseau ou une enveloppe malformée est un `DispatchError`
//! (retentable); l'échec applicatif de la fonction invoquée arrive en
//! `DispatchResponse::Failed` et n'est pas retentable à cette couche.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::dispatch::envelope::{decode_plain, decode_wrapped, DispatchResponse, RequestEnvelope};
use crate::dispatch::Dispatcher;
use crate::error::DispatchError;

async fn post_envelope(
    client: &Client,
    base_url: &str,
    timeout_ms: u64,
    envelope: &RequestEnvelope,
) -> Result<String, DispatchError> {
    let url = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        envelope.function_name.as_str()
    );
    let response = client
        .post(&url)
        .json(envelope)
        .timeout(Duration::from_millis(timeout_ms))
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                DispatchError::Timeout {
                    function: envelope.function_name.to_string(),
                    timeout_ms,
                }
            } else {
                DispatchError::Network(e.to_string())
            }
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(DispatchError::RemoteUnavailable {
            status: status.as_u16(),
        });
    }
    response
        .text()
        .await
        .map_err(|e| DispatchError::Network(e.to_string()))
}

/// Fonction distante derrière un POST HTTP simple
#[derive(Debug, Clone)]
pub struct HttpFunctionDispatcher {
    client: Client,
    base_url: String,
    timeout_ms: u64,
}

impl HttpFunctionDispatcher {
    pub fn new(base_url: &str, timeout_ms: u64) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.to_string(),
            timeout_ms,
        }
    }
}

#[async_trait]
impl Dispatcher for HttpFunctionDispatcher {
    async fn spawn(&self, envelope: RequestEnvelope) -> Result<DispatchResponse, DispatchError> {
        let body = post_envelope(&self.client, &self.base_url, self.timeout_ms, &envelope).await?;
        decode_plain(&body)
    }
}

/// Transport d'invocation qui enveloppe la réponse une fois de plus
#[derive(Debug, Clone)]
pub struct WrappedFunctionDispatcher {
    client: Client,
    base_url: String,
    timeout_ms: u64,
}

impl WrappedFunctionDispatcher {
    pub fn new(base_url: &str, timeout_ms: u64) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.to_string(),
            timeout_ms,
        }
    }
}

#[async_trait]
impl Dispatcher for WrappedFunctionDispatcher {
    async fn spawn(&self, envelope: RequestEnvelope) -> Result<DispatchResponse, DispatchError> {
        let body = post_envelope(&self.client, &self.base_url, self.timeout_ms, &envelope).await?;
        decode_wrapped(&body)
    }
}
