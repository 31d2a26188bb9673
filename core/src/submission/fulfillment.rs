//! Cascade de soumission des appels API
//!
//! Ordre strict par requête: contrôle d'idempotence, contrôle d'âge,
//! simulation du fulfill, simulation du rapport d'échec, puis transaction
//! fail inconditionnelle. La chaîne reste la source de vérité du statut
//! final: une soumission réussie laisse la requête Pending jusqu'à ce que
//! le contrôle d'idempotence la rattrape au cycle suivant.

use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, H256, U256};
use std::collections::HashSet;
use tracing::{error, info, warn};

use crate::error::ChainError;
use crate::evm::contracts::{
    decode_fulfill_simulation, fail_calldata, fulfill_calldata, FULFILLMENT_FAILED_STATUS,
    FULFILLMENT_OK_STATUS,
};
use crate::evm::{ApiCall, ChainClient, RequestStatus};
use crate::submission::gas::{build_transaction, GasSnapshot, DEFAULT_GAS_LIMIT};

/// Issue d'une cascade pour une requête
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeOutcome {
    /// Nombre de simulations tentées
    pub simulations: u32,
    /// Transaction réellement soumise, s'il y en a une
    pub submitted: Option<H256>,
}

enum StepResult {
    /// Transaction soumise, la cascade s'arrête
    Submitted(H256),
    /// Rejet structurel, passer au repli suivant
    Rejected,
    /// Faute de transport, abandonner ce cycle (retentable)
    Transport(ChainError),
}

async fn simulate_then_submit(
    client: &dyn ChainClient,
    signer: &LocalWallet,
    contract: Address,
    chain_id: u64,
    data: Bytes,
    gas: &GasSnapshot,
    request_id: H256,
    outcome: &mut CascadeOutcome,
) -> StepResult {
    let tx = build_transaction(
        signer.address(),
        contract,
        data,
        gas,
        U256::from(DEFAULT_GAS_LIMIT),
        U256::zero(),
        chain_id,
    );

    outcome.simulations += 1;
    let simulated = match client.call(&tx).await {
        Ok(output) => output,
        Err(e) => return StepResult::Transport(e),
    };

    // Un retour inintelligible compte comme un rejet structurel
    if decode_fulfill_simulation(&simulated) != Some(true) {
        return StepResult::Rejected;
    }

    match client.submit(tx, signer).await {
        Ok(hash) => {
            outcome.submitted = Some(hash);
            StepResult::Submitted(hash)
        }
        Err(e) => {
            warn!(request_id = %request_id, "soumission échouée: {e}");
            StepResult::Transport(e)
        }
    }
}

/// Mène une requête Pending vers un état terminal on-chain
pub async fn submit_api_call(
    client: &dyn ChainClient,
    signer: &LocalWallet,
    contract: Address,
    chain_id: u64,
    call: &mut ApiCall,
    fulfilled: &HashSet<H256>,
    gas: &GasSnapshot,
) -> CascadeOutcome {
    let mut outcome = CascadeOutcome::default();
    let request_id = call.id;

    // Étape 1: idempotence entre cycles de scrutation
    if fulfilled.contains(&request_id) {
        info!(request_id = %request_id, "déjà résolue on-chain");
        call.transition_to(RequestStatus::Fulfilled);
        return outcome;
    }

    // Étape 2: horizon de politique, aucune transaction émise
    if call.metadata.exceeds_horizon() {
        info!(
            request_id = %request_id,
            age = call.metadata.age(),
            "bloquée par l'horizon, aucune transaction"
        );
        call.transition_to(RequestStatus::Blocked);
        return outcome;
    }

    // Étape 3: fulfill avec la charge utile de succès
    if let Some(response) = call.kind.response.clone() {
        let data = fulfill_calldata(
            request_id,
            FULFILLMENT_OK_STATUS,
            &response.encoded_data,
            &response.signature,
            call.kind.fulfill_address,
            call.kind.fulfill_function_id,
        );
        match simulate_then_submit(
            client, signer, contract, chain_id, data, gas, request_id, &mut outcome,
        )
        .await
        {
            StepResult::Submitted(hash) => {
                info!(request_id = %request_id, tx = %hash, "fulfill soumis");
                return outcome;
            }
            StepResult::Transport(e) => {
                // Retentable au prochain cycle, le statut ne change pas
                error!(request_id = %request_id, "transport pendant le fulfill: {e}");
                return outcome;
            }
            StepResult::Rejected => {
                warn!(request_id = %request_id, "simulation de fulfill rejetée");
            }
        }
    } else {
        warn!(request_id = %request_id, "aucune réponse à soumettre, passage au rapport d'échec");
    }

    // Étape 4: rapport d'échec avec le code fixe; tout échec ici ou en
    // étape 3 retombe sur l'étape 5
    let error_data = fulfill_calldata(
        request_id,
        FULFILLMENT_FAILED_STATUS,
        &Bytes::new(),
        &Bytes::new(),
        call.kind.fulfill_address,
        call.kind.fulfill_function_id,
    );
    match simulate_then_submit(
        client, signer, contract, chain_id, error_data, gas, request_id, &mut outcome,
    )
    .await
    {
        StepResult::Submitted(hash) => {
            info!(request_id = %request_id, tx = %hash, "rapport d'échec soumis");
            return outcome;
        }
        StepResult::Rejected | StepResult::Transport(_) => {
            warn!(request_id = %request_id, "rapport d'échec rejeté, transaction fail");
        }
    }

    // Étape 5: fail inconditionnel, sans simulation
    let message = call
        .error_message
        .clone()
        .unwrap_or_else(|| "fulfillment failed".to_string());
    let fail_tx = build_transaction(
        signer.address(),
        contract,
        fail_calldata(
            request_id,
            call.kind.fulfill_address,
            call.kind.fulfill_function_id,
            &message,
        ),
        gas,
        U256::from(DEFAULT_GAS_LIMIT),
        U256::zero(),
        chain_id,
    );
    match client.submit(fail_tx, signer).await {
        Ok(hash) => {
            info!(request_id = %request_id, tx = %hash, "transaction fail soumise");
            outcome.submitted = Some(hash);
        }
        Err(e) => {
            // Aucun repli supplémentaire: la requête reste Pending
            error!(request_id = %request_id, "échec de la transaction fail: {e}");
        }
    }
    outcome
}
