//! Cascade de soumission des transactions
//!
//! Balaye les requêtes Pending d'une connexion et mène chacune vers un
//! état terminal on-chain malgré les échecs d'estimation de gas ou les
//! fautes RPC. Le nonce est attribué en série par portefeuille: le
//! portefeuille signataire est mono-écrivain.

pub mod fulfillment;
pub mod gas;
pub mod withdrawal;

pub use fulfillment::{submit_api_call, CascadeOutcome};
pub use gas::{build_transaction, GasSnapshot, DEFAULT_GAS_LIMIT};
pub use withdrawal::submit_withdrawal;

use ethers::signers::Signer;
use ethers::types::{Address, U256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, warn};

use crate::config::ChainConfig;
use crate::evm::ChainClient;
use crate::pipeline::ProviderConnectionState;
use crate::wallet::MasterKey;

async fn nonce_for(
    client: &dyn ChainClient,
    nonces: &mut HashMap<Address, U256>,
    wallet: Address,
) -> Option<U256> {
    if let Some(nonce) = nonces.get(&wallet) {
        return Some(*nonce);
    }
    match client.pending_nonce(wallet).await {
        Ok(nonce) => {
            nonces.insert(wallet, nonce);
            Some(nonce)
        }
        Err(e) => {
            error!(wallet = %wallet, "nonce illisible: {e}");
            None
        }
    }
}

/// Balaye toutes les requêtes en attente d'une connexion
///
/// Le prix du gas est figé une fois par passage; chaque requête reçoit son
/// propre nonce, en série par portefeuille de sponsor.
pub async fn process_connection(
    master_key: &MasterKey,
    client: Arc<dyn ChainClient>,
    chain: &ChainConfig,
    mut state: ProviderConnectionState,
) -> ProviderConnectionState {
    let gas_price = match client.gas_price().await {
        Ok(price) => price,
        Err(e) => {
            // Transport: tout reste Pending pour le cycle suivant
            error!(chain_id = chain.chain_id, "prix du gas illisible: {e}");
            return state;
        }
    };

    let mut nonces: HashMap<Address, U256> = HashMap::new();

    let fulfilled_api_calls = state.fulfilled_api_calls.clone();
    for call in state.api_calls.iter_mut().filter(|c| c.is_pending()) {
        let signer = match master_key.sponsor_signer(call.kind.sponsor, chain.chain_id) {
            Ok(signer) => signer,
            Err(e) => {
                call.set_errored(format!("dérivation du portefeuille échouée: {e}"));
                continue;
            }
        };
        if signer.address() != call.kind.sponsor_wallet {
            // Le portefeuille désigné n'est pas le nôtre: donnée invalide
            warn!(
                request_id = %call.id,
                designated = %call.kind.sponsor_wallet,
                derived = %signer.address(),
                "portefeuille désigné inattendu"
            );
            call.set_errored("portefeuille désigné inattendu".to_string());
            continue;
        }

        let wallet = call.kind.sponsor_wallet;
        let nonce = match nonce_for(client.as_ref(), &mut nonces, wallet).await {
            Some(nonce) => nonce,
            None => continue,
        };
        let snapshot = GasSnapshot { gas_price, nonce };

        let outcome = submit_api_call(
            client.as_ref(),
            &signer,
            chain.contract_address,
            chain.chain_id,
            call,
            &fulfilled_api_calls,
            &snapshot,
        )
        .await;
        if outcome.submitted.is_some() {
            nonces.insert(wallet, nonce + U256::one());
        }
    }

    let fulfilled_withdrawals = state.fulfilled_withdrawals.clone();
    for request in state.withdrawals.iter_mut().filter(|w| w.is_pending()) {
        let signer = match master_key.sponsor_signer(request.kind.sponsor, chain.chain_id) {
            Ok(signer) => signer,
            Err(e) => {
                request.set_errored(format!("dérivation du portefeuille échouée: {e}"));
                continue;
            }
        };
        if signer.address() != request.kind.sponsor_wallet {
            warn!(request_id = %request.id, "portefeuille désigné inattendu");
            request.set_errored("portefeuille désigné inattendu".to_string());
            continue;
        }
        submit_withdrawal(
            client.as_ref(),
            &signer,
            chain.contract_address,
            chain.chain_id,
            request,
            &fulfilled_withdrawals,
            gas_price,
        )
        .await;
    }

    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChainError;
    use crate::evm::{
        contracts, ApiCall, ApiCallPayload, ApiCallResponse, LogWindow, Request, RequestMetadata,
        RequestStatus, Withdrawal, WithdrawalPayload,
    };
    use async_trait::async_trait;
    use ethers::abi::{self, Token};
    use ethers::signers::LocalWallet;
    use ethers::types::transaction::eip2718::TypedTransaction;
    use ethers::types::{Bytes, Log, H256};
    use std::collections::{HashSet, VecDeque};
    use std::sync::Mutex;

    /// Client de chaîne en mémoire, comportements programmables
    struct MockChain {
        call_results: Mutex<VecDeque<Result<Bytes, ChainError>>>,
        submit_error: Option<ChainError>,
        submitted: Mutex<Vec<TypedTransaction>>,
        gas_price: U256,
        balance: U256,
        nonce: U256,
        gas_estimate: U256,
    }

    impl Default for MockChain {
        fn default() -> Self {
            Self {
                call_results: Mutex::new(VecDeque::new()),
                submit_error: None,
                submitted: Mutex::new(Vec::new()),
                gas_price: U256::from(1_000u64),
                balance: U256::from(10_000_000u64),
                nonce: U256::from(7u64),
                gas_estimate: U256::from(50_000u64),
            }
        }
    }

    impl MockChain {
        fn simulation_accepts(self, count: usize) -> Self {
            let ok = abi::encode(&[Token::Bool(true), Token::Bytes(vec![])]);
            for _ in 0..count {
                self.call_results
                    .lock()
                    .unwrap()
                    .push_back(Ok(Bytes::from(ok.clone())));
            }
            self
        }

        fn simulation_rejects(self, count: usize) -> Self {
            let rejected = abi::encode(&[Token::Bool(false), Token::Bytes(vec![])]);
            for _ in 0..count {
                self.call_results
                    .lock()
                    .unwrap()
                    .push_back(Ok(Bytes::from(rejected.clone())));
            }
            self
        }

        fn simulation_transport_fails(self) -> Self {
            self.call_results
                .lock()
                .unwrap()
                .push_back(Err(ChainError::Rpc("connexion refusée".to_string())));
            self
        }

        fn submissions(&self) -> Vec<TypedTransaction> {
            self.submitted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChainClient for MockChain {
        async fn block_number(&self) -> Result<u64, ChainError> {
            Ok(100)
        }

        async fn fetch_logs(&self, _window: &LogWindow) -> Result<Vec<Log>, ChainError> {
            Ok(Vec::new())
        }

        async fn call(&self, _tx: &TypedTransaction) -> Result<Bytes, ChainError> {
            self.call_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ChainError::Rpc("simulation imprévue".to_string())))
        }

        async fn estimate_gas(&self, _tx: &TypedTransaction) -> Result<U256, ChainError> {
            Ok(self.gas_estimate)
        }

        async fn gas_price(&self) -> Result<U256, ChainError> {
            Ok(self.gas_price)
        }

        async fn balance(&self, _address: Address) -> Result<U256, ChainError> {
            Ok(self.balance)
        }

        async fn pending_nonce(&self, _address: Address) -> Result<U256, ChainError> {
            Ok(self.nonce)
        }

        async fn submit(
            &self,
            tx: TypedTransaction,
            _signer: &LocalWallet,
        ) -> Result<H256, ChainError> {
            if let Some(e) = &self.submit_error {
                return Err(ChainError::Rpc(e.to_string()));
            }
            let mut submitted = self.submitted.lock().unwrap();
            submitted.push(tx);
            Ok(H256::from_low_u64_be(submitted.len() as u64))
        }
    }

    fn signer() -> LocalWallet {
        "0101010101010101010101010101010101010101010101010101010101010101"
            .parse()
            .unwrap()
    }

    fn api_call(age: u64, with_response: bool) -> ApiCall {
        Request {
            id: H256::repeat_byte(5),
            status: RequestStatus::Pending,
            error_message: None,
            metadata: RequestMetadata {
                block_number: 100,
                transaction_hash: H256::zero(),
                current_block: 100 + age,
                ignore_blocked_after: 20,
            },
            kind: ApiCallPayload {
                endpoint_id: H256::repeat_byte(0xee),
                template_id: None,
                sponsor: Address::repeat_byte(1),
                sponsor_wallet: Address::repeat_byte(2),
                fulfill_address: Address::repeat_byte(3),
                fulfill_function_id: [0xde, 0xad, 0xbe, 0xef],
                encoded_parameters: Bytes::new(),
                parameters: vec![],
                response: with_response.then(|| ApiCallResponse {
                    encoded_data: Bytes::from(vec![1u8, 2, 3]),
                    signature: Bytes::from(vec![9u8]),
                }),
            },
        }
    }

    fn gas() -> GasSnapshot {
        GasSnapshot {
            gas_price: U256::from(1_000u64),
            nonce: U256::from(7u64),
        }
    }

    fn selector_of(tx: &TypedTransaction) -> [u8; 4] {
        let data = tx.data().unwrap();
        [data[0], data[1], data[2], data[3]]
    }

    #[tokio::test]
    async fn test_happy_path_submits_fulfill() {
        let chain = MockChain::default().simulation_accepts(1);
        let mut call = api_call(5, true);

        let outcome = submit_api_call(
            &chain,
            &signer(),
            Address::repeat_byte(9),
            31337,
            &mut call,
            &HashSet::new(),
            &gas(),
        )
        .await;

        assert_eq!(outcome.simulations, 1);
        assert!(outcome.submitted.is_some());
        // La chaîne reste la source de vérité: toujours Pending
        assert_eq!(call.status, RequestStatus::Pending);

        let submitted = chain.submissions();
        assert_eq!(submitted.len(), 1);
        let expected = contracts::fulfill_calldata(
            call.id,
            contracts::FULFILLMENT_OK_STATUS,
            &Bytes::from(vec![1u8, 2, 3]),
            &Bytes::from(vec![9u8]),
            call.kind.fulfill_address,
            call.kind.fulfill_function_id,
        );
        assert_eq!(selector_of(&submitted[0]), expected[..4]);
        assert_eq!(submitted[0].nonce(), Some(&U256::from(7u64)));
        assert_eq!(submitted[0].gas_price(), Some(U256::from(1_000u64)));
    }

    #[tokio::test]
    async fn test_terminal_guarantee_when_everything_rejects() {
        // Rejet structurel aux étapes fulfill et rapport d'échec: une
        // seule transaction (fail), jamais plus de trois simulations
        let chain = MockChain::default().simulation_rejects(2);
        let mut call = api_call(5, true);

        let outcome = submit_api_call(
            &chain,
            &signer(),
            Address::repeat_byte(9),
            31337,
            &mut call,
            &HashSet::new(),
            &gas(),
        )
        .await;

        assert!(outcome.simulations <= 3);
        assert_eq!(outcome.simulations, 2);
        let submitted = chain.submissions();
        assert_eq!(submitted.len(), 1);

        let fail_prefix = contracts::fail_calldata(
            call.id,
            call.kind.fulfill_address,
            call.kind.fulfill_function_id,
            "x",
        );
        assert_eq!(selector_of(&submitted[0]), fail_prefix[..4]);
        // Même nonce que les étapes précédentes auraient utilisé
        assert_eq!(submitted[0].nonce(), Some(&U256::from(7u64)));
    }

    #[tokio::test]
    async fn test_idempotency_zero_transactions_on_second_run() {
        let chain = MockChain::default();
        let mut call = api_call(5, true);
        let mut fulfilled = HashSet::new();
        fulfilled.insert(call.id);

        let outcome = submit_api_call(
            &chain,
            &signer(),
            Address::repeat_byte(9),
            31337,
            &mut call,
            &fulfilled,
            &gas(),
        )
        .await;

        assert_eq!(call.status, RequestStatus::Fulfilled);
        assert_eq!(outcome.simulations, 0);
        assert!(chain.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_blocked_without_any_transaction() {
        let chain = MockChain::default();
        let mut call = api_call(21, true);

        let outcome = submit_api_call(
            &chain,
            &signer(),
            Address::repeat_byte(9),
            31337,
            &mut call,
            &HashSet::new(),
            &gas(),
        )
        .await;

        assert_eq!(call.status, RequestStatus::Blocked);
        assert_eq!(outcome.simulations, 0);
        assert!(chain.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_leaves_pending_for_retry() {
        let chain = MockChain::default().simulation_transport_fails();
        let mut call = api_call(5, true);

        let outcome = submit_api_call(
            &chain,
            &signer(),
            Address::repeat_byte(9),
            31337,
            &mut call,
            &HashSet::new(),
            &gas(),
        )
        .await;

        assert_eq!(call.status, RequestStatus::Pending);
        assert!(outcome.submitted.is_none());
        assert!(chain.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_missing_response_goes_through_error_report() {
        let chain = MockChain::default().simulation_accepts(1);
        let mut call = api_call(5, false);

        let outcome = submit_api_call(
            &chain,
            &signer(),
            Address::repeat_byte(9),
            31337,
            &mut call,
            &HashSet::new(),
            &gas(),
        )
        .await;

        // Pas de charge utile: directement le rapport d'échec
        assert_eq!(outcome.simulations, 1);
        let submitted = chain.submissions();
        assert_eq!(submitted.len(), 1);
        let error_prefix = contracts::fulfill_calldata(
            call.id,
            contracts::FULFILLMENT_FAILED_STATUS,
            &Bytes::new(),
            &Bytes::new(),
            call.kind.fulfill_address,
            call.kind.fulfill_function_id,
        );
        assert_eq!(selector_of(&submitted[0]), error_prefix[..4]);
    }

    fn withdrawal(age: u64) -> Withdrawal {
        Request {
            id: H256::repeat_byte(0xcc),
            status: RequestStatus::Pending,
            error_message: None,
            metadata: RequestMetadata {
                block_number: 100,
                transaction_hash: H256::zero(),
                current_block: 100 + age,
                ignore_blocked_after: 20,
            },
            kind: WithdrawalPayload {
                sponsor: Address::repeat_byte(1),
                sponsor_wallet: Address::repeat_byte(2),
                destination: Address::repeat_byte(4),
            },
        }
    }

    #[tokio::test]
    async fn test_withdrawal_submits_exact_remainder() {
        let chain = MockChain::default();
        let mut request = withdrawal(5);

        let hash = submit_withdrawal(
            &chain,
            &signer(),
            Address::repeat_byte(9),
            31337,
            &mut request,
            &HashSet::new(),
            U256::from(100u64),
        )
        .await;

        assert!(hash.is_some());
        let submitted = chain.submissions();
        assert_eq!(submitted.len(), 1);
        // amount = solde − gasLimit × gasPrice = 10_000_000 − 50_000 × 100
        let expected = U256::from(10_000_000u64) - U256::from(50_000u64) * U256::from(100u64);
        assert_eq!(submitted[0].value(), Some(&expected));
        assert_eq!(submitted[0].nonce(), Some(&U256::from(7u64)));
    }

    #[tokio::test]
    async fn test_withdrawal_underfunded_is_a_no_op() {
        let chain = MockChain {
            balance: U256::from(10u64),
            ..Default::default()
        };
        let mut request = withdrawal(5);

        let hash = submit_withdrawal(
            &chain,
            &signer(),
            Address::repeat_byte(9),
            31337,
            &mut request,
            &HashSet::new(),
            U256::from(1_000u64),
        )
        .await;

        assert!(hash.is_none());
        assert!(chain.submissions().is_empty());
        assert_eq!(request.status, RequestStatus::Pending);
    }
}
