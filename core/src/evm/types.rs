//! Types de requêtes on-chain
//!
//! La requête est l'entité centrale du pipeline. Son statut est monotone:
//! Pending → {Fulfilled, Errored, Blocked}, et aucun statut terminal n'est
//! jamais quitté. Blocked ne provient que de l'âge de la requête, jamais
//! d'un échec d'exécution.

use ethers::types::{Address, Bytes, H256};
use serde::{Deserialize, Serialize};

use crate::params::Parameter;

/// Statut d'une requête dans son cycle de vie
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    /// En attente de résolution
    Pending,
    /// Résolue on-chain (état terminal)
    Fulfilled,
    /// Invalide ou échouée (état terminal)
    Errored,
    /// Expirée au-delà de l'horizon de politique (état terminal)
    Blocked,
}

impl RequestStatus {
    /// Vrai pour les statuts dont on ne sort jamais
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Métadonnées de chaîne d'une requête
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMetadata {
    /// Bloc d'émission de la requête
    pub block_number: u64,
    /// Transaction d'émission
    pub transaction_hash: H256,
    /// Instantané du bloc courant au moment du cycle
    pub current_block: u64,
    /// Horizon de politique en blocs au-delà duquel une requête non
    /// résolue devient Blocked
    pub ignore_blocked_after: u64,
}

impl RequestMetadata {
    /// Âge de la requête en blocs
    pub fn age(&self) -> u64 {
        self.current_block.saturating_sub(self.block_number)
    }

    /// Vrai si l'âge dépasse l'horizon de politique
    pub fn exceeds_horizon(&self) -> bool {
        self.age() > self.ignore_blocked_after
    }
}

/// Requête générique sur son genre (appel API ou retrait)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request<K> {
    /// Identifiant de 32 bytes dérivé on-chain
    pub id: H256,
    pub status: RequestStatus,
    /// Message d'erreur porté par un statut Errored
    pub error_message: Option<String>,
    pub metadata: RequestMetadata,
    pub kind: K,
}

impl<K> Request<K> {
    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    /// Transition de statut, monotone
    ///
    /// Une tentative de quitter un statut terminal est ignorée et signalée:
    /// c'est une violation d'invariant du pipeline.
    pub fn transition_to(&mut self, status: RequestStatus) {
        if self.status.is_terminal() {
            tracing::warn!(
                request_id = %self.id,
                from = ?self.status,
                to = ?status,
                "transition de statut refusée depuis un état terminal"
            );
            return;
        }
        self.status = status;
    }

    /// Passe la requête en Errored avec son message
    pub fn set_errored(&mut self, message: String) {
        self.error_message = Some(message);
        self.transition_to(RequestStatus::Errored);
    }
}

/// Réponse encodée et attestée d'un appel API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCallResponse {
    /// Bytes ABI produits par le codec
    pub encoded_data: Bytes,
    /// Signature d'attestation de l'opérateur
    pub signature: Bytes,
}

/// Charge utile d'une requête d'appel API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCallPayload {
    pub endpoint_id: H256,
    /// Gabarit d'origine si la requête est passée par un template
    pub template_id: Option<H256>,
    pub sponsor: Address,
    pub sponsor_wallet: Address,
    pub fulfill_address: Address,
    pub fulfill_function_id: [u8; 4],
    /// Paramètres opaques tels qu'émis on-chain
    pub encoded_parameters: Bytes,
    /// Paramètres décodés; vide si le décodage a échoué
    pub parameters: Vec<Parameter>,
    /// Réponse agréée, posée par la désagrégation
    pub response: Option<ApiCallResponse>,
}

/// Charge utile d'une demande de retrait
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalPayload {
    pub sponsor: Address,
    pub sponsor_wallet: Address,
    pub destination: Address,
}

/// Requête d'appel API
pub type ApiCall = Request<ApiCallPayload>;

/// Demande de retrait
pub type Withdrawal = Request<WithdrawalPayload>;

impl ApiCall {
    /// Hachage d'égalité des paramètres ordinaires de cet appel
    pub fn parameter_hash(&self) -> crate::params::ParameterHash {
        crate::params::parameter_hash(&self.kind.endpoint_id, &self.kind.parameters)
    }
}
