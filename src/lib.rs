//! SLP-Regnet: a token-aware wallet engine for a two-node regtest network
//!
//! This crate drives Simple Ledger Protocol (token type 1) operations over
//! a pair of connected regtest nodes:
//! - Token message codec (GENESIS, MINT, SEND OP_RETURN payloads)
//! - Output classification with DAG validity and shared, injectable caches
//! - A UTXO ledger partitioning currency, token units, and minting batons
//! - A builder/signer producing fully signed, re-signable transactions
//! - Convergence polling and notification-feed observation
//! - A double-spend orchestration that partitions the network, hands each
//!   side one of two conflicting spends, and verifies convergence on the
//!   winner
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use slp_regnet::rpc::NodeClient;
//! use slp_regnet::slp::TokenCache;
//! use slp_regnet::wallet::Wallet;
//!
//! async fn issue(node: Arc<dyn NodeClient>) -> Result<(), Box<dyn std::error::Error>> {
//!     let mut wallet = Wallet::create(node, TokenCache::new()).await?;
//!     let token_id = wallet.genesis(1).await?;
//!     println!("issued token {token_id}");
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod crypto;
pub mod rpc;
pub mod scenario;
pub mod slp;
pub mod wallet;

// Re-export commonly used types
pub use core::{Address, Outpoint, PendingTransaction, Transaction, DUST_VALUE};
pub use crypto::KeyPair;
pub use rpc::{GraphSearchClient, NodeClient, RawTxFetcher, RpcError};
pub use scenario::{run_double_spend, run_long_mint_chain, PollOutcome, Poller, ScenarioError};
pub use slp::{SlpMessage, TokenCache, TokenClassifier, TokenFacet, TokenKind};
pub use wallet::{Wallet, WalletError};
