//! Backend de dispatch en processus
//!
//! Appel direct des handlers, sans isolation, pour l'exploitation sur une
//! seule machine. L'enveloppe passe quand même par une sérialisation JSON
//! aller-retour: le contrat observé est strictement le même que celui des
//! backends distants.

use async_trait::async_trait;
use std::sync::Arc;

use crate::dispatch::envelope::{DispatchResponse, RequestEnvelope};
use crate::dispatch::Dispatcher;
use crate::error::DispatchError;
use crate::handlers::{self, NodeContext};

/// Dispatcher local: les handlers s'exécutent dans ce processus
#[derive(Debug, Clone)]
pub struct LocalDispatcher {
    node: Arc<NodeContext>,
}

impl LocalDispatcher {
    pub fn new(node: Arc<NodeContext>) -> Self {
        Self { node }
    }
}

#[async_trait]
impl Dispatcher for LocalDispatcher {
    async fn spawn(&self, envelope: RequestEnvelope) -> Result<DispatchResponse, DispatchError> {
        // Normalisation: même chemin de sérialisation que le transport
        // distant, pour qu'une charge utile non sérialisable échoue ici
        // aussi et pas seulement en production distante
        let serialized = serde_json::to_string(&envelope)?;
        let envelope: RequestEnvelope = serde_json::from_str(&serialized)?;

        handlers::route(&self.node, envelope).await
    }
}
