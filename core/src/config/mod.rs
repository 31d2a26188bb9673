//! Configuration typée du nœud
//!
//! Les enregistrements ci-dessous sont consommés déjà validés: le
//! chargement de fichiers et la validation de schéma appartiennent aux
//! collaborateurs externes. Chaque module reçoit sa configuration en
//! argument; aucun singleton ambiant.

use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};

use crate::processing::ProcessingSpec;

/// Méthode HTTP d'un endpoint d'API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

/// Connexion à une chaîne
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    /// Nom du fournisseur, pour les logs
    pub provider_name: String,
    pub rpc_url: String,
    /// Adresse du contrat de protocole
    pub contract_address: Address,
    /// Profondeur de la fenêtre de scrutation en blocs
    pub poll_window: u64,
    /// Horizon de politique: âge en blocs au-delà duquel une requête non
    /// résolue devient Blocked
    pub ignore_blocked_after: u64,
    pub rpc_timeout_ms: u64,
}

/// Endpoint d'API cible
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub endpoint_id: H256,
    pub url: String,
    pub method: HttpMethod,
    pub timeout_ms: u64,
    #[serde(default)]
    pub pre_processing: Vec<ProcessingSpec>,
    #[serde(default)]
    pub post_processing: Vec<ProcessingSpec>,
}

/// Gabarit de requête: endpoint et paramètres de base
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateConfig {
    pub template_id: H256,
    pub endpoint_id: H256,
    /// Paramètres encodés du gabarit, en hexadécimal
    pub parameters_hex: String,
}

/// Sélection du backend de dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "kebab-case")]
pub enum DispatchConfig {
    /// Appel direct en processus
    Local,
    /// Fonction distante derrière un POST HTTP simple
    HttpFunction { base_url: String, timeout_ms: u64 },
    /// Transport d'invocation qui enveloppe la réponse une fois de plus
    WrappedFunction { base_url: String, timeout_ms: u64 },
}

/// Surface de la passerelle HTTP (interface uniquement)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GatewayConfig {
    /// Motifs d'origines autorisées; `*` est un joker
    pub allowed_origins: Vec<String>,
}

/// Configuration complète du nœud
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Graine maîtresse de l'opérateur, en hexadécimal
    pub master_seed_hex: String,
    pub chains: Vec<ChainConfig>,
    pub endpoints: Vec<EndpointConfig>,
    #[serde(default)]
    pub templates: Vec<TemplateConfig>,
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl NodeConfig {
    /// Cherche un endpoint par identifiant
    pub fn endpoint(&self, endpoint_id: &H256) -> Option<&EndpointConfig> {
        self.endpoints.iter().find(|e| &e.endpoint_id == endpoint_id)
    }

    /// Cherche un gabarit par identifiant
    pub fn template(&self, template_id: &H256) -> Option<&TemplateConfig> {
        self.templates.iter().find(|t| &t.template_id == template_id)
    }
}
