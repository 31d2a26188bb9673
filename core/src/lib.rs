//! OracleChain Core Library
//!
//! This is the core library for OracleChain, a decentralized oracle node
//! that lets smart contracts request data from arbitrary web APIs and
//! receive responses back on-chain.
//!
//! # Features
//!
//! - **Reserved-Parameter Codec**: extracts a value from an arbitrary API
//!   response and re-encodes it into a fixed grammar of chain-primitive
//!   types, with arbitrary-precision numeric coercion
//! - **Request Pipeline**: decodes on-chain request events, applies
//!   sandboxed pre/post-processing and merges results across redundant
//!   provider connections
//! - **Transaction Submission Cascade**: drives every pending request to a
//!   terminal on-chain state despite gas-estimation failures or RPC faults
//! - **Dispatch Abstraction**: runs units of work as local calls or remote
//!   serverless invocations behind one interface
//! - **Deterministic Wallets**: sponsors pre-fund the exact wallet that
//!   will answer their requests, derived from the published extended key
//! - **WASM Sandbox**: processing snippets run isolated with bounded
//!   deadlines and no ambient I/O capability
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use oraclechain_core::{config::NodeConfig, coordinator::Coordinator};
//! use oraclechain_core::dispatch::build_dispatcher;
//! use oraclechain_core::handlers::NodeContext;
//! use std::sync::Arc;
//!
//! async fn run(config: NodeConfig) -> Result<(), Box<dyn std::error::Error>> {
//!     let node = Arc::new(NodeContext::new(config.clone())?);
//!     let dispatcher = build_dispatcher(&config.dispatch, node);
//!     let coordinator = Coordinator::new(config, dispatcher);
//!
//!     let state = coordinator.run_cycle().await?;
//!     println!("cycle {} terminé", state.id);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! OracleChain is organized into several key modules:
//!
//! - [`codec`] - Reserved-parameter codec over the chain type grammar
//! - [`params`] - On-chain call-parameter codec and equality hashing
//! - [`evm`] - Request model, contract ABI, event decoding, RPC client
//! - [`wallet`] - Deterministic sponsor-wallet derivation
//! - [`sandbox`] - WASM sandbox for processing snippets
//! - [`processing`] - Ordered pre/post-processing chains
//! - [`dispatch`] - Local and remote invocation backends
//! - [`handlers`] - The named units of work behind the dispatch layer
//! - [`pipeline`] - Per-connection state, aggregation, disaggregation
//! - [`submission`] - Fulfill/error/fail transaction cascade
//! - [`coordinator`] - One polling cycle across all connections
//! - [`gateway`] - HTTP gateway surface types (interface only)

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

// Codec and parameter handling
pub mod codec;
pub mod params;

// Chain interface
pub mod evm;
pub mod wallet;

// Processing sandbox
pub mod processing;
pub mod sandbox;

// Work dispatch and handlers
pub mod dispatch;
pub mod handlers;

// Request pipeline and submission
pub mod coordinator;
pub mod pipeline;
pub mod submission;

// External surfaces
pub mod config;
pub mod gateway;

// Error handling
pub mod error;

// Re-exports for convenience
pub use error::{CoreError, Result};

pub use codec::{encode_response, ReservedParameters, ResponseType};
pub use coordinator::{Coordinator, CoordinatorState};
pub use evm::{ApiCall, ChainClient, Request, RequestStatus, Withdrawal};
pub use params::{parameter_hash, ParamValue, Parameter, ParameterHash};
pub use pipeline::{
    aggregate, disaggregate, AggregatedApiCall, AggregatedResult, ProviderConnectionState,
};
pub use wallet::{derive_sponsor_wallet_address, MasterKey};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
