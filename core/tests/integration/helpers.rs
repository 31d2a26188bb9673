//! Aides partagées des tests d'intégration

use async_trait::async_trait;
use ethers::abi::{self, Token};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Log, H256, U256, U64};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use oraclechain_core::config::{
    ChainConfig, DispatchConfig, EndpointConfig, GatewayConfig, HttpMethod, NodeConfig,
};
use oraclechain_core::error::ChainError;
use oraclechain_core::evm::{contracts, ChainClient, LogWindow};
use oraclechain_core::params::{self, Parameter};
use oraclechain_core::wallet::MasterKey;

pub const MASTER_SEED: [u8; 32] = [7u8; 32];
pub const CHAIN_ID: u64 = 31337;
pub const ENDPOINT_ID_BYTE: u8 = 0xee;

/// Initialise le souscripteur de traces des tests, une seule fois
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn master_key() -> MasterKey {
    MasterKey::from_seed(&MASTER_SEED).unwrap()
}

pub fn endpoint_id() -> H256 {
    H256::repeat_byte(ENDPOINT_ID_BYTE)
}

/// Client de chaîne en mémoire, partageable entre le test et la fabrique
pub struct MockChain {
    pub current_block: Mutex<u64>,
    pub logs: Mutex<Vec<Log>>,
    pub call_results: Mutex<VecDeque<Result<Bytes, ChainError>>>,
    pub submitted: Mutex<Vec<TypedTransaction>>,
}

impl Default for MockChain {
    fn default() -> Self {
        Self {
            current_block: Mutex::new(110),
            logs: Mutex::new(Vec::new()),
            call_results: Mutex::new(VecDeque::new()),
            submitted: Mutex::new(Vec::new()),
        }
    }
}

impl MockChain {
    pub fn accept_simulations(&self, count: usize) {
        let ok = abi::encode(&[Token::Bool(true), Token::Bytes(vec![])]);
        let mut results = self.call_results.lock().unwrap();
        for _ in 0..count {
            results.push_back(Ok(Bytes::from(ok.clone())));
        }
    }

    pub fn submissions(&self) -> Vec<TypedTransaction> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn block_number(&self) -> Result<u64, ChainError> {
        Ok(*self.current_block.lock().unwrap())
    }

    async fn fetch_logs(&self, _window: &LogWindow) -> Result<Vec<Log>, ChainError> {
        Ok(self.logs.lock().unwrap().clone())
    }

    async fn call(&self, _tx: &TypedTransaction) -> Result<Bytes, ChainError> {
        self.call_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ChainError::Rpc("simulation imprévue".to_string())))
    }

    async fn estimate_gas(&self, _tx: &TypedTransaction) -> Result<U256, ChainError> {
        Ok(U256::from(50_000u64))
    }

    async fn gas_price(&self) -> Result<U256, ChainError> {
        Ok(U256::from(1_000u64))
    }

    async fn balance(&self, _address: Address) -> Result<U256, ChainError> {
        Ok(U256::from(10_000_000_000u64))
    }

    async fn pending_nonce(&self, _address: Address) -> Result<U256, ChainError> {
        Ok(U256::zero())
    }

    async fn submit(
        &self,
        tx: TypedTransaction,
        _signer: &LocalWallet,
    ) -> Result<H256, ChainError> {
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(tx);
        Ok(H256::from_low_u64_be(submitted.len() as u64))
    }
}

/// Paramètres on-chain standards des tests: prix ETH en uint256 × 1e6
pub fn standard_parameters() -> Bytes {
    params::encode(&[
        Parameter::string("from", "ETH"),
        Parameter::string("_type", "uint256"),
        Parameter::string("_path", "price"),
        Parameter::string("_times", "1000000"),
    ])
    .unwrap()
}

/// Log MadeApiRequest avec le portefeuille de sponsor réellement dérivé
pub fn api_request_log(request_id: H256, parameters: &Bytes, block: u64) -> Log {
    let sponsor = Address::repeat_byte(1);
    let sponsor_wallet = master_key()
        .sponsor_signer(sponsor, CHAIN_ID)
        .unwrap()
        .address();
    let data = abi::encode(&[
        Token::FixedBytes(endpoint_id().as_bytes().to_vec()),
        Token::Address(sponsor),
        Token::Address(sponsor_wallet),
        Token::Address(Address::repeat_byte(3)),
        Token::FixedBytes(vec![0xde, 0xad, 0xbe, 0xef]),
        Token::Bytes(parameters.to_vec()),
    ]);
    Log {
        address: Address::repeat_byte(9),
        topics: vec![
            contracts::event_topic(contracts::MADE_API_REQUEST_SIG),
            H256::from(Address::repeat_byte(7)),
            request_id,
        ],
        data: data.into(),
        block_number: Some(U64::from(block)),
        transaction_hash: Some(H256::repeat_byte(0xaa)),
        ..Default::default()
    }
}

/// Log FulfilledApiRequest pour le contrôle d'idempotence
pub fn fulfilled_log(request_id: H256) -> Log {
    Log {
        address: Address::repeat_byte(9),
        topics: vec![
            contracts::event_topic(contracts::FULFILLED_API_REQUEST_SIG),
            H256::from(Address::repeat_byte(7)),
            request_id,
        ],
        data: abi::encode(&[Token::Uint(0u8.into()), Token::Bytes(vec![])]).into(),
        block_number: Some(U64::from(111u64)),
        transaction_hash: Some(H256::zero()),
        ..Default::default()
    }
}

/// Stub d'API HTTP sur la boucle locale, réponse JSON fixe
///
/// Retourne l'adresse d'écoute et le compteur de requêtes servies.
pub async fn spawn_stub_api(body: &'static str) -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_server = Arc::clone(&hits);

    tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => return,
            };
            hits_server.fetch_add(1, Ordering::SeqCst);
            let mut buffer = [0u8; 4096];
            let _ = socket.read(&mut buffer).await;
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
        }
    });

    (addr, hits)
}

/// Configuration de nœud pointant sur le stub d'API
pub fn node_config(api_addr: SocketAddr) -> NodeConfig {
    NodeConfig {
        master_seed_hex: hex::encode(MASTER_SEED),
        chains: vec![ChainConfig {
            chain_id: CHAIN_ID,
            provider_name: "mock".to_string(),
            rpc_url: "http://127.0.0.1:1".to_string(),
            contract_address: Address::repeat_byte(9),
            poll_window: 300,
            ignore_blocked_after: 20,
            rpc_timeout_ms: 5_000,
        }],
        endpoints: vec![EndpointConfig {
            endpoint_id: endpoint_id(),
            url: format!("http://{api_addr}/price"),
            method: HttpMethod::Get,
            timeout_ms: 5_000,
            pre_processing: vec![],
            post_processing: vec![],
        }],
        templates: vec![],
        dispatch: DispatchConfig::Local,
        gateway: GatewayConfig {
            allowed_origins: vec!["*".to_string()],
        },
    }
}
