//! État par connexion de fournisseur
//!
//! Chaque connexion possède sa propre copie de toutes les requêtes en vol;
//! les connexions s'exécutent indépendamment et ne partagent aucun état
//! mutable. L'état est passé par valeur à travers les étapes du pipeline,
//! jamais par singleton ambiant.

use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::config::ChainConfig;
use crate::evm::{ApiCall, Withdrawal};

/// État d'une connexion de chaîne pour un cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConnectionState {
    pub chain_id: u64,
    pub provider_name: String,
    pub contract_address: Address,
    /// Instantané du bloc courant au début du cycle
    pub current_block: u64,
    pub api_calls: Vec<ApiCall>,
    pub withdrawals: Vec<Withdrawal>,
    /// Identifiants déjà résolus ou échoués on-chain, pour l'idempotence
    pub fulfilled_api_calls: HashSet<H256>,
    pub fulfilled_withdrawals: HashSet<H256>,
}

impl ProviderConnectionState {
    pub fn new(chain: &ChainConfig, current_block: u64) -> Self {
        Self {
            chain_id: chain.chain_id,
            provider_name: chain.provider_name.clone(),
            contract_address: chain.contract_address,
            current_block,
            api_calls: Vec::new(),
            withdrawals: Vec::new(),
            fulfilled_api_calls: HashSet::new(),
            fulfilled_withdrawals: HashSet::new(),
        }
    }

    /// Appels API encore en attente
    pub fn pending_api_calls(&self) -> impl Iterator<Item = &ApiCall> {
        self.api_calls.iter().filter(|c| c.is_pending())
    }

    /// Retraits encore en attente
    pub fn pending_withdrawals(&self) -> impl Iterator<Item = &Withdrawal> {
        self.withdrawals.iter().filter(|w| w.is_pending())
    }
}
