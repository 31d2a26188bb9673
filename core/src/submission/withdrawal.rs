//! Cascade de résolution des retraits
//!
//! Plus simple que la cascade des appels API: solde du portefeuille
//! désigné, estimation du coût en gas, puis soumission du montant exact.
//! Jamais de transaction qui ne couvrirait pas son propre gas.

use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, H256, U256};
use std::collections::HashSet;
use tracing::{error, info, warn};

use crate::evm::contracts::fulfill_withdrawal_calldata;
use crate::evm::{ChainClient, RequestStatus, Withdrawal};
use crate::submission::gas::{build_transaction, GasSnapshot};

/// Résout une demande de retrait en vidant le portefeuille désigné
pub async fn submit_withdrawal(
    client: &dyn ChainClient,
    signer: &LocalWallet,
    contract: Address,
    chain_id: u64,
    withdrawal: &mut Withdrawal,
    fulfilled: &HashSet<H256>,
    gas_price: U256,
) -> Option<H256> {
    let request_id = withdrawal.id;

    if fulfilled.contains(&request_id) {
        info!(request_id = %request_id, "retrait déjà résolu on-chain");
        withdrawal.transition_to(RequestStatus::Fulfilled);
        return None;
    }

    if withdrawal.metadata.exceeds_horizon() {
        info!(request_id = %request_id, "retrait bloqué par l'horizon");
        withdrawal.transition_to(RequestStatus::Blocked);
        return None;
    }

    let wallet_address = withdrawal.kind.sponsor_wallet;

    let nonce = match client.pending_nonce(wallet_address).await {
        Ok(nonce) => nonce,
        Err(e) => {
            error!(request_id = %request_id, "nonce illisible: {e}");
            return None;
        }
    };
    let balance = match client.balance(wallet_address).await {
        Ok(balance) => balance,
        Err(e) => {
            error!(request_id = %request_id, "solde illisible: {e}");
            return None;
        }
    };

    let gas = GasSnapshot { gas_price, nonce };
    let data = fulfill_withdrawal_calldata(request_id, withdrawal.kind.sponsor);
    let estimate_tx = build_transaction(
        signer.address(),
        contract,
        data.clone(),
        &gas,
        U256::from(crate::submission::gas::DEFAULT_GAS_LIMIT),
        U256::zero(),
        chain_id,
    );
    let gas_limit = match client.estimate_gas(&estimate_tx).await {
        Ok(limit) => limit,
        Err(e) => {
            error!(request_id = %request_id, "estimation de gas échouée: {e}");
            return None;
        }
    };

    let cost = gas_limit * gas_price;
    if balance < cost {
        // amount = solde − gasLimit × gasPrice serait négatif
        warn!(
            request_id = %request_id,
            %balance,
            %cost,
            "solde insuffisant pour couvrir le gas, aucune transaction"
        );
        return None;
    }
    let amount = balance - cost;

    let tx = build_transaction(
        signer.address(),
        contract,
        data,
        &gas,
        gas_limit,
        amount,
        chain_id,
    );
    match client.submit(tx, signer).await {
        Ok(hash) => {
            info!(request_id = %request_id, tx = %hash, %amount, "retrait soumis");
            Some(hash)
        }
        Err(e) => {
            error!(request_id = %request_id, "soumission du retrait échouée: {e}");
            None
        }
    }
}
